//! Processors: ordered routes from predicate to handler.
//!
//! Routes are evaluated top to bottom by descending priority and the first whose
//! predicate matches owns the utterance. `AiFallback` matches everything, so every
//! accepted utterance is owned by exactly one processor.

use crate::context::PipelineContext;
use crate::extract::BookingExtractor;
use crate::resolver::SearchResolver;
use crate::result::ProcessingResult;
use crate::vocabulary;
use std::sync::Arc;
use tracing::{info, warn};
use vernon_core::{
    BookingConfirmation, BookingKind, BookingService, PipelineConfig, ProviderChain,
    SearchProvider, TextGenerator, VenueDirectory, VernonError, VernonResult,
};

/// Shown while a booking is in flight; replaced in place by the outcome.
pub const BOOKING_PLACEHOLDER: &str = "Working on your booking…";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessorKind {
    Booking,
    AgentEvent,
    LocationSearch,
    AiFallback,
}

impl ProcessorKind {
    pub fn name(&self) -> &'static str {
        match self {
            ProcessorKind::Booking => "booking",
            ProcessorKind::AgentEvent => "agent-event",
            ProcessorKind::LocationSearch => "location-search",
            ProcessorKind::AiFallback => "ai-fallback",
        }
    }

    pub fn priority(&self) -> u8 {
        match self {
            ProcessorKind::Booking => 100,
            ProcessorKind::AgentEvent => 80,
            ProcessorKind::LocationSearch => 60,
            ProcessorKind::AiFallback => 0,
        }
    }

    pub fn can_handle(&self, ctx: &PipelineContext, directory: &dyn VenueDirectory) -> bool {
        let text = ctx.text();
        match self {
            ProcessorKind::Booking => vocabulary::is_booking(text),
            ProcessorKind::AgentEvent => vocabulary::is_event(text),
            ProcessorKind::LocationSearch => {
                ctx.directive.is_some()
                    || vocabulary::is_place(text)
                    || vocabulary::city_in(text, directory).is_some()
            }
            ProcessorKind::AiFallback => true,
        }
    }

    pub async fn process(&self, ctx: &PipelineContext, services: &Services) -> ProcessingResult {
        match self {
            ProcessorKind::Booking => book(ctx, services).await,
            ProcessorKind::AgentEvent => {
                let resolution = services.resolver.resolve(ctx, Some("events")).await;
                ProcessingResult::reply(resolution.into_reply())
            }
            ProcessorKind::LocationSearch => {
                let resolution = services.resolver.resolve(ctx, None).await;
                ProcessingResult::reply(resolution.into_reply())
            }
            ProcessorKind::AiFallback => ai_fallback(ctx, services).await,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub kind: ProcessorKind,
    pub priority: u8,
}

/// Booking → Agent/Event → Location/Search → AI fallback.
pub fn default_routes() -> Vec<Route> {
    let mut routes: Vec<Route> = [
        ProcessorKind::AiFallback,
        ProcessorKind::LocationSearch,
        ProcessorKind::AgentEvent,
        ProcessorKind::Booking,
    ]
    .into_iter()
    .map(|kind| Route {
        kind,
        priority: kind.priority(),
    })
    .collect();
    routes.sort_by(|a, b| b.priority.cmp(&a.priority));
    routes
}

/// Collaborators the processors call into.
pub struct Services {
    pub generators: ProviderChain<dyn TextGenerator>,
    pub resolver: SearchResolver,
    pub bookings: Arc<dyn BookingService>,
    pub directory: Arc<dyn VenueDirectory>,
    pub extractor: BookingExtractor,
}

impl Services {
    pub fn new(
        generators: ProviderChain<dyn TextGenerator>,
        search: ProviderChain<dyn SearchProvider>,
        directory: Arc<dyn VenueDirectory>,
        bookings: Arc<dyn BookingService>,
        config: &PipelineConfig,
    ) -> VernonResult<Self> {
        Ok(Self {
            generators,
            resolver: SearchResolver::new(search, Arc::clone(&directory), config),
            bookings,
            directory,
            extractor: BookingExtractor::new()?,
        })
    }
}

async fn book(ctx: &PipelineContext, services: &Services) -> ProcessingResult {
    ctx.reply().placeholder(BOOKING_PLACEHOLDER);
    let request = services
        .extractor
        .extract(ctx.text(), services.directory.as_ref());
    info!(
        kind = ?request.kind,
        party_size = request.party_size,
        venue = request.venue.as_deref().unwrap_or("-"),
        "booking request extracted"
    );

    match services.bookings.book(&request).await {
        Ok(confirmation) => ProcessingResult::reply(confirmation_text(&confirmation)),
        Err(e) => {
            warn!(error = %e, "booking failed");
            let response = match &e {
                VernonError::Booking(reason) if request.venue.is_none() => {
                    format!("I couldn't book that ({}). Which venue should I try?", reason)
                }
                VernonError::Booking(reason) => format!("I couldn't book that: {}.", reason),
                _ => "Sorry, the booking desk isn't answering right now. Please try again in a moment."
                    .to_string(),
            };
            ProcessingResult::failed(e.to_string(), response)
        }
    }
}

fn confirmation_text(confirmation: &BookingConfirmation) -> String {
    let request = &confirmation.request;
    let mut text = match request.kind {
        BookingKind::Table => format!("You're booked: a table for {}", request.party_size),
        BookingKind::Tickets => format!(
            "You're booked: {} ticket{}",
            request.party_size,
            if request.party_size == 1 { "" } else { "s" }
        ),
    };
    if let Some(venue) = &request.venue {
        let joiner = match request.kind {
            BookingKind::Table => "at",
            BookingKind::Tickets => "for",
        };
        text.push_str(&format!(" {} {}", joiner, venue));
    }
    if let Some(date) = &request.date {
        match date.as_str() {
            "tonight" | "today" | "tomorrow" | "this weekend" => text.push_str(&format!(" {}", date)),
            day => text.push_str(&format!(" on {}", day)),
        }
    }
    if let Some(time) = &request.time {
        text.push_str(&format!(" at {}", time));
    }
    format!("{}. Confirmation code: {}.", text, confirmation.code)
}

async fn ai_fallback(ctx: &PipelineContext, services: &Services) -> ProcessingResult {
    let prompt = ctx.text();
    let prior = ctx.recent();
    let generated = services
        .generators
        .first_success(
            |generator| async move { generator.generate(prompt, prior).await },
            |text: &String| !text.trim().is_empty(),
        )
        .await;

    match generated {
        Ok(win) => {
            info!(provider = %win.provider, attempts = win.attempts, "generator answered");
            ProcessingResult::reply(win.value.trim())
        }
        Err(e) => {
            warn!(error = %e, "text generation exhausted, falling back to search");
            let resolution = services.resolver.resolve(ctx, None).await;
            ProcessingResult::reply(resolution.into_reply())
        }
    }
}
