//! Middleware wrapping processor dispatch: Validation → Logging → Busy-state → dispatch.
//!
//! A run is accepted (utterance appended, history window taken, pagination merged) by the
//! busy-state middleware once it holds the gate, so queued utterances never interleave.

use crate::context::PipelineContext;
use crate::result::ProcessingResult;
use futures::future::{BoxFuture, FutureExt};
use std::time::Instant;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};
use vernon_core::{BusyPolicy, SharedConversation};

/// Reply given to an utterance dropped under [`BusyPolicy::Drop`].
pub const BUSY_REPLY: &str = "I'm still working on your last message. Give me a moment.";

/// The rest of the chain.
pub type Next<'a> = Box<dyn FnOnce() -> BoxFuture<'a, ProcessingResult> + Send + 'a>;

/// One-at-a-time gate for pipeline runs.
#[derive(Debug)]
pub struct BusyGate {
    policy: BusyPolicy,
    lock: AsyncMutex<()>,
}

impl BusyGate {
    pub fn new(policy: BusyPolicy) -> Self {
        Self {
            policy,
            lock: AsyncMutex::new(()),
        }
    }
}

/// Clears `is_busy` even if the run is cancelled.
struct BusyFlag<'a>(&'a SharedConversation);

impl<'a> BusyFlag<'a> {
    fn raise(conversation: &'a SharedConversation) -> Self {
        conversation.set_busy(true);
        Self(conversation)
    }
}

impl Drop for BusyFlag<'_> {
    fn drop(&mut self) {
        self.0.set_busy(false);
    }
}

#[derive(Debug)]
pub enum Middleware {
    /// Rejects empty input and input longer than `max_chars`.
    Validation { max_chars: usize },
    Logging,
    BusyState(BusyGate),
}

impl Middleware {
    pub fn name(&self) -> &'static str {
        match self {
            Middleware::Validation { .. } => "validation",
            Middleware::Logging => "logging",
            Middleware::BusyState(_) => "busy-state",
        }
    }

    pub fn execute<'a>(
        &'a self,
        ctx: &'a PipelineContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, ProcessingResult> {
        match self {
            Middleware::Validation { max_chars } => {
                let text = ctx.text().trim();
                if text.is_empty() {
                    debug!(middleware = self.name(), "rejecting empty input");
                    return futures::future::ready(ProcessingResult::rejected("empty input")).boxed();
                }
                let len = text.chars().count();
                if len > *max_chars {
                    warn!(middleware = self.name(), len, max = *max_chars, "rejecting oversized input");
                    return futures::future::ready(ProcessingResult::rejected(format!(
                        "input exceeds {} characters",
                        max_chars
                    )))
                    .boxed();
                }
                next()
            }
            Middleware::Logging => async move {
                let started = Instant::now();
                info!(chars = ctx.text().chars().count(), "pipeline run started");
                let result = next().await;
                info!(
                    history = ctx.recent().len(),
                    success = result.success,
                    handled = result.handled,
                    error = result.error.as_deref().unwrap_or(""),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "pipeline run finished"
                );
                result
            }
            .boxed(),
            Middleware::BusyState(gate) => async move {
                let _turn = match gate.policy {
                    BusyPolicy::Queue => gate.lock.lock().await,
                    BusyPolicy::Drop => match gate.lock.try_lock() {
                        Ok(turn) => turn,
                        Err(_) => {
                            info!("pipeline busy, dropping utterance");
                            return ProcessingResult::busy(BUSY_REPLY);
                        }
                    },
                };
                // Only the run holding the gate touches the transcript and pagination.
                ctx.accept();
                let _busy = BusyFlag::raise(ctx.conversation());
                next().await
            }
            .boxed(),
        }
    }
}
