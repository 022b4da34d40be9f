//! The message pipeline: middleware around ordered processor dispatch.

use crate::context::PipelineContext;
use crate::middleware::{BusyGate, Middleware};
use crate::pagination::{DirectiveParser, SharedPagination};
use crate::processors::{default_routes, Route, Services};
use crate::result::ProcessingResult;
use futures::future::{BoxFuture, FutureExt};
use std::collections::HashMap;
use tracing::{debug, info};
use vernon_core::{PipelineConfig, SharedConversation, VernonResult};

pub struct MessagePipeline {
    middleware: Vec<Middleware>,
    routes: Vec<Route>,
    services: Services,
    pagination: SharedPagination,
    directives: DirectiveParser,
    conversation: SharedConversation,
    history_window: usize,
}

impl MessagePipeline {
    pub fn new(
        config: &PipelineConfig,
        services: Services,
        conversation: SharedConversation,
    ) -> VernonResult<Self> {
        Ok(Self {
            middleware: vec![
                Middleware::Validation {
                    max_chars: config.max_input_chars,
                },
                Middleware::Logging,
                Middleware::BusyState(BusyGate::new(config.busy_policy)),
            ],
            routes: default_routes(),
            services,
            pagination: SharedPagination::default(),
            directives: DirectiveParser::new()?,
            conversation,
            history_window: config.history_window,
        })
    }

    pub fn conversation(&self) -> &SharedConversation {
        &self.conversation
    }

    /// Current page per category.
    pub fn pages(&self) -> HashMap<String, u32> {
        self.pagination.snapshot()
    }

    /// Answer one utterance.
    ///
    /// Accepted input always ends with exactly one assistant message: the processor's
    /// reply, or a canned apology when it produced nothing. Rejected input adds nothing.
    pub async fn process(&self, text: &str) -> ProcessingResult {
        let directive = self.directives.parse(text);
        let ctx = PipelineContext::new(
            text,
            self.conversation.clone(),
            self.pagination.clone(),
            self.history_window,
            directive,
        );

        let mut result = self.run(0, &ctx).await;

        if ctx.is_accepted() {
            let reply = match result.response.as_deref().map(str::trim) {
                Some(text) if !text.is_empty() => text.to_string(),
                _ => {
                    debug!("processor produced no text, using canned apology");
                    self.services.resolver.apology()
                }
            };
            ctx.reply().deliver(&reply);
            result.response = Some(reply);
        }
        result
    }

    fn run<'a>(&'a self, index: usize, ctx: &'a PipelineContext) -> BoxFuture<'a, ProcessingResult> {
        match self.middleware.get(index) {
            Some(middleware) => middleware.execute(ctx, Box::new(move || self.run(index + 1, ctx))),
            None => self.dispatch(ctx).boxed(),
        }
    }

    async fn dispatch(&self, ctx: &PipelineContext) -> ProcessingResult {
        let directory = self.services.directory.as_ref();
        let Some(route) = self
            .routes
            .iter()
            .find(|route| route.kind.can_handle(ctx, directory))
        else {
            return ProcessingResult::not_handled();
        };
        info!(processor = route.kind.name(), priority = route.priority, "processor selected");
        route.kind.process(ctx, &self.services).await
    }
}
