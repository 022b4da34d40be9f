//! Search resolver: strategies tried in order until one yields usable text.
//!
//! 1. specialized topic (comedy, live music, ...) across the whole search chain
//! 2. complex multi-criteria query across the whole chain, asking for detail
//! 3. general query against the first search provider only
//! 4. local venue directory for a city named now or earlier in the conversation
//! 5. canned apology (never fails)
//!
//! A strategy that errors or comes back shorter than `min_result_chars` just hands over
//! to the next one.

use crate::context::PipelineContext;
use crate::pagination::DEFAULT_CATEGORY;
use crate::vocabulary;
use std::sync::Arc;
use tracing::{debug, info, warn};
use vernon_core::{
    Origin, PipelineConfig, ProviderChain, SearchOptions, SearchProvider, SearchResult, Venue,
    VenueDirectory, VernonError, VernonResult,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    SpecializedTopic,
    ComplexMultiCriteria,
    General,
    LocalDataAugmentation,
    CannedApology,
}

impl Strategy {
    pub const ORDER: [Strategy; 5] = [
        Strategy::SpecializedTopic,
        Strategy::ComplexMultiCriteria,
        Strategy::General,
        Strategy::LocalDataAugmentation,
        Strategy::CannedApology,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Strategy::SpecializedTopic => "specialized-topic",
            Strategy::ComplexMultiCriteria => "complex-multi-criteria",
            Strategy::General => "general",
            Strategy::LocalDataAugmentation => "local-data",
            Strategy::CannedApology => "canned-apology",
        }
    }

    fn uses_search(&self) -> bool {
        matches!(
            self,
            Strategy::SpecializedTopic | Strategy::ComplexMultiCriteria | Strategy::General
        )
    }
}

#[derive(Debug, Clone)]
pub struct Resolution {
    pub strategy: Strategy,
    /// Search provider that answered, if any.
    pub provider: Option<String>,
    pub text: String,
    pub citations: Vec<String>,
}

impl Resolution {
    /// Reply text with sources appended.
    pub fn into_reply(self) -> String {
        if self.citations.is_empty() {
            return self.text;
        }
        format!("{}\n\nSources: {}", self.text.trim_end(), self.citations.join(", "))
    }
}

pub struct SearchResolver {
    search: ProviderChain<dyn SearchProvider>,
    directory: Arc<dyn VenueDirectory>,
    min_result_chars: usize,
    page_size: usize,
}

impl SearchResolver {
    pub fn new(
        search: ProviderChain<dyn SearchProvider>,
        directory: Arc<dyn VenueDirectory>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            search,
            directory,
            min_result_chars: config.min_result_chars,
            page_size: config.page_size.max(1),
        }
    }

    /// Resolve `ctx`'s utterance. `topic_hint` is passed to the general strategy's
    /// search options (e.g. "events").
    pub async fn resolve(&self, ctx: &PipelineContext, topic_hint: Option<&str>) -> Resolution {
        let mut searched = false;
        for strategy in Strategy::ORDER {
            // A paging request refers to directory results already shown.
            if strategy.uses_search() && ctx.directive.is_some() {
                continue;
            }
            let attempt = match strategy {
                Strategy::SpecializedTopic => self.specialized_topic(ctx).await,
                Strategy::ComplexMultiCriteria => self.complex(ctx).await,
                Strategy::General => self.general(ctx, topic_hint).await,
                Strategy::LocalDataAugmentation => self.local_data(ctx, searched),
                Strategy::CannedApology => Ok(Some(self.canned(strategy))),
            };
            match attempt {
                Ok(Some(resolution)) => {
                    info!(
                        strategy = strategy.name(),
                        provider = resolution.provider.as_deref().unwrap_or("-"),
                        chars = resolution.text.chars().count(),
                        "search resolved"
                    );
                    return resolution;
                }
                Ok(None) => debug!(strategy = strategy.name(), "strategy not applicable"),
                Err(e) => {
                    searched |= strategy.uses_search();
                    warn!(strategy = strategy.name(), error = %e, "strategy failed, trying next");
                }
            }
        }
        self.canned(Strategy::CannedApology)
    }

    /// Text used when nothing else produced a reply.
    pub fn apology(&self) -> String {
        let cities = self.directory.cities();
        if cities.is_empty() {
            return "Sorry, I couldn't find anything for that right now. Please try again in a moment."
                .to_string();
        }
        format!(
            "Sorry, I couldn't find anything for that right now. I know venues in {}; try asking about one of those.",
            join_list(&cities)
        )
    }

    fn canned(&self, strategy: Strategy) -> Resolution {
        Resolution {
            strategy,
            provider: None,
            text: self.apology(),
            citations: Vec::new(),
        }
    }

    async fn run_chain(
        &self,
        chain: &ProviderChain<dyn SearchProvider>,
        strategy: Strategy,
        query: &str,
        options: &SearchOptions,
    ) -> VernonResult<Resolution> {
        let min = self.min_result_chars;
        let win = chain
            .first_success(
                |provider| async move { provider.search(query, options).await },
                |result: &SearchResult| result.text.trim().chars().count() >= min,
            )
            .await?;
        Ok(Resolution {
            strategy,
            provider: Some(win.provider),
            text: win.value.text.trim().to_string(),
            citations: win.value.citations,
        })
    }

    async fn specialized_topic(&self, ctx: &PipelineContext) -> VernonResult<Option<Resolution>> {
        let Some((topic, _)) = vocabulary::topic(ctx.text()) else {
            return Ok(None);
        };
        let options = SearchOptions {
            topic: Some(topic.to_string()),
            city: self.city(ctx),
            detailed: false,
        };
        self.run_chain(&self.search, Strategy::SpecializedTopic, ctx.text(), &options)
            .await
            .map(Some)
    }

    async fn complex(&self, ctx: &PipelineContext) -> VernonResult<Option<Resolution>> {
        if !vocabulary::is_complex(ctx.text()) {
            return Ok(None);
        }
        let options = SearchOptions {
            topic: None,
            city: self.city(ctx),
            detailed: true,
        };
        self.run_chain(&self.search, Strategy::ComplexMultiCriteria, ctx.text(), &options)
            .await
            .map(Some)
    }

    async fn general(
        &self,
        ctx: &PipelineContext,
        topic_hint: Option<&str>,
    ) -> VernonResult<Option<Resolution>> {
        let options = SearchOptions {
            topic: topic_hint.map(str::to_string),
            city: self.city(ctx),
            detailed: false,
        };
        self.run_chain(&self.search.head(), Strategy::General, ctx.text(), &options)
            .await
            .map(Some)
    }

    /// City named in the utterance, else the most recent one the user mentioned.
    fn city(&self, ctx: &PipelineContext) -> Option<String> {
        let directory = self.directory.as_ref();
        vocabulary::city_in(ctx.text(), directory).or_else(|| {
            ctx.recent()
                .iter()
                .rev()
                .filter(|u| u.origin == Origin::User)
                .find_map(|u| vocabulary::city_in(&u.text, directory))
        })
    }

    fn local_data(&self, ctx: &PipelineContext, searched: bool) -> VernonResult<Option<Resolution>> {
        let city = self
            .city(ctx)
            .ok_or_else(|| VernonError::provider("local-directory", "no city in the conversation"))?;
        let venues = self.directory.locations_by_city(&city);
        if venues.is_empty() {
            return Err(VernonError::provider(
                "local-directory",
                format!("no venues for {}", city),
            ));
        }

        let wanted = ctx
            .directive
            .as_ref()
            .and_then(|d| d.category.clone())
            .or_else(|| vocabulary::category(ctx.text()).map(str::to_string))
            .or_else(|| {
                ctx.directive
                    .as_ref()
                    .and_then(|_| ctx.pagination().last_category())
            });
        let filtered: Vec<Venue> = match wanted.as_deref() {
            Some(category) => venues
                .iter()
                .filter(|v| v.category.eq_ignore_ascii_case(category))
                .cloned()
                .collect(),
            None => Vec::new(),
        };
        let (key, shown) = match wanted {
            Some(category) if !filtered.is_empty() => (category, filtered),
            _ => (DEFAULT_CATEGORY.to_string(), venues),
        };

        let total_pages = shown.len().div_ceil(self.page_size).max(1);
        let page = (ctx.page(&key) as usize).clamp(1, total_pages);
        ctx.pagination().set(&key, page as u32);

        let subject = if key == DEFAULT_CATEGORY {
            city.clone()
        } else {
            format!("{} in {}", key, city)
        };
        let intro = if searched {
            format!(
                "I couldn't reach my live search sources, but here's what I know about {}",
                subject
            )
        } else {
            format!("Here's what I know about {}", subject)
        };

        let mut text = format!("{} (page {} of {}):\n", intro, page, total_pages);
        for venue in shown.iter().skip((page - 1) * self.page_size).take(self.page_size) {
            text.push_str(&format!(
                "\n- {} ({}, rated {:.1}), {}. {}",
                venue.name, venue.category, venue.rating, venue.address, venue.description
            ));
        }
        if page < total_pages {
            text.push_str("\n\nSay \"next page\" for more.");
        }

        Ok(Some(Resolution {
            strategy: Strategy::LocalDataAugmentation,
            provider: None,
            text,
            citations: Vec::new(),
        }))
    }
}

/// "a, b and c"
fn join_list(items: &[String]) -> String {
    match items {
        [] => String::new(),
        [one] => one.clone(),
        [rest @ .., last] => format!("{} and {}", rest.join(", "), last),
    }
}
