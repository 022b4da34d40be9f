//! External collaborators the assistant consumes: text generation, search, the venue
//! directory and the booking desk. Network-bound calls may fail or hang; callers wrap
//! them in a [`crate::ProviderChain`].

use crate::conversation::Utterance;
use crate::error::VernonResult;
use crate::provider_chain::Named;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Text-generation provider (`generate(prompt, priorContext) -> text`).
#[async_trait]
pub trait TextGenerator: Named + Send + Sync {
    async fn generate(&self, prompt: &str, prior: &[Utterance]) -> VernonResult<String>;
}

/// Hints passed along with a search query.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchOptions {
    /// Narrow topic the query is about (e.g. "comedy").
    pub topic: Option<String>,
    /// City the query is anchored to.
    pub city: Option<String>,
    /// Ask for a thorough, multi-source answer.
    pub detailed: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchResult {
    pub text: String,
    #[serde(default)]
    pub citations: Vec<String>,
}

/// Search provider (`search(query, options) -> text | structured-result`).
#[async_trait]
pub trait SearchProvider: Named + Send + Sync {
    async fn search(&self, query: &str, options: &SearchOptions) -> VernonResult<SearchResult>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Venue {
    pub name: String,
    pub city: String,
    /// Directory category, e.g. "dining", "nightlife", "music".
    pub category: String,
    pub address: String,
    pub rating: f32,
    pub description: String,
}

/// Local venue data. Synchronous and infallible.
pub trait VenueDirectory: Send + Sync {
    /// Venues in `city` (case-insensitive); empty when the city is unknown.
    fn locations_by_city(&self, city: &str) -> Vec<Venue>;

    /// Cities the directory knows about, used to spot a city in free text.
    fn cities(&self) -> Vec<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingKind {
    Table,
    Tickets,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingRequest {
    pub kind: BookingKind,
    pub venue: Option<String>,
    pub party_size: u32,
    /// Free-form time as the user said it ("7pm", "19:30").
    pub time: Option<String>,
    pub date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingConfirmation {
    pub code: String,
    pub request: BookingRequest,
}

/// Reservation and ticketing backend.
#[async_trait]
pub trait BookingService: Send + Sync {
    async fn book(&self, request: &BookingRequest) -> VernonResult<BookingConfirmation>;
}
