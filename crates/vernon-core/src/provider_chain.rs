//! Provider chain: an ordered list of unreliable services tried until one succeeds.
//!
//! Every link is attempted in order; an error, a timeout or a result rejected by the
//! acceptance predicate all mean "try the next link". Only exhaustion is reported.

use crate::error::{VernonError, VernonResult};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Anything that can sit in a provider chain.
pub trait Named {
    fn name(&self) -> &str;
}

/// The winning link of a chain run.
#[derive(Debug, Clone)]
pub struct ChainSuccess<T> {
    pub provider: String,
    pub value: T,
    /// Links tried, including the winner.
    pub attempts: usize,
}

/// Ordered, first-success-wins list of providers.
pub struct ProviderChain<P: ?Sized> {
    links: Vec<Arc<P>>,
    timeout: Option<Duration>,
}

impl<P: ?Sized> Clone for ProviderChain<P> {
    fn clone(&self) -> Self {
        Self {
            links: self.links.clone(),
            timeout: self.timeout,
        }
    }
}

impl<P: ?Sized> Default for ProviderChain<P> {
    fn default() -> Self {
        Self {
            links: Vec::new(),
            timeout: None,
        }
    }
}

impl<P: ?Sized + Named + Send + Sync> ProviderChain<P> {
    pub fn new(links: Vec<Arc<P>>) -> Self {
        Self {
            links,
            timeout: None,
        }
    }

    /// Bound every link attempt; an elapsed attempt counts as a failure.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn push(&mut self, link: Arc<P>) {
        self.links.push(link);
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.links.iter().map(|l| l.name().to_string()).collect()
    }

    /// A chain holding only the first link, for single-provider strategies.
    pub fn head(&self) -> Self {
        Self {
            links: self.links.iter().take(1).cloned().collect(),
            timeout: self.timeout,
        }
    }

    /// Run `call` against each link in order until one returns an accepted value.
    pub async fn first_success<T, F, Fut, A>(
        &self,
        mut call: F,
        accept: A,
    ) -> VernonResult<ChainSuccess<T>>
    where
        F: FnMut(Arc<P>) -> Fut,
        Fut: Future<Output = VernonResult<T>>,
        A: Fn(&T) -> bool,
    {
        for (index, link) in self.links.iter().enumerate() {
            let name = link.name().to_string();
            let started = Instant::now();
            let attempt = call(Arc::clone(link));
            let outcome = match self.timeout {
                Some(limit) => match tokio::time::timeout(limit, attempt).await {
                    Ok(result) => result,
                    Err(_) => Err(VernonError::Timeout {
                        provider: name.clone(),
                        timeout_ms: limit.as_millis() as u64,
                    }),
                },
                None => attempt.await,
            };

            match outcome {
                Ok(value) if accept(&value) => {
                    debug!(
                        provider = %name,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "provider chain link succeeded"
                    );
                    return Ok(ChainSuccess {
                        provider: name,
                        value,
                        attempts: index + 1,
                    });
                }
                Ok(_) => {
                    warn!(provider = %name, "provider returned an unusable result, trying next");
                }
                Err(e) => {
                    warn!(provider = %name, error = %e, "provider failed, trying next");
                }
            }
        }

        Err(VernonError::ChainExhausted {
            attempted: self.links.len(),
        })
    }
}

/// Acceptance predicate for text results: trimmed length of at least `min_chars`.
pub fn min_chars(min_chars: usize) -> impl Fn(&String) -> bool {
    move |text: &String| text.trim().chars().count() >= min_chars
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fake {
        name: &'static str,
        reply: Option<&'static str>,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl Fake {
        fn new(name: &'static str, reply: Option<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                name,
                reply,
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            })
        }

        async fn call(&self) -> VernonResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.reply
                .map(str::to_string)
                .ok_or_else(|| VernonError::provider(self.name, "down"))
        }
    }

    impl Named for Fake {
        fn name(&self) -> &str {
            self.name
        }
    }

    #[tokio::test]
    async fn first_success_wins_and_later_links_are_skipped() {
        let a = Fake::new("a", None);
        let b = Fake::new("b", Some("from b"));
        let c = Fake::new("c", Some("from c"));
        let chain = ProviderChain::new(vec![a.clone(), b.clone(), c.clone()]);

        let out = chain
            .first_success(|p| async move { p.call().await }, |_| true)
            .await
            .unwrap();

        assert_eq!(out.provider, "b");
        assert_eq!(out.value, "from b");
        assert_eq!(out.attempts, 2);
        assert_eq!(c.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn rejected_results_fall_through() {
        let short = Fake::new("short", Some("tiny"));
        let long = Fake::new("long", Some("a perfectly reasonable answer"));
        let chain = ProviderChain::new(vec![short, long]);

        let out = chain
            .first_success(|p| async move { p.call().await }, min_chars(10))
            .await
            .unwrap();
        assert_eq!(out.provider, "long");
    }

    #[tokio::test]
    async fn exhaustion_reports_attempt_count() {
        let chain = ProviderChain::new(vec![Fake::new("a", None), Fake::new("b", None)]);
        let err = chain
            .first_success(|p| async move { p.call().await }, |_| true)
            .await
            .unwrap_err();
        assert!(matches!(err, VernonError::ChainExhausted { attempted: 2 }));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_link_times_out() {
        let slow = Arc::new(Fake {
            name: "slow",
            reply: Some("late"),
            delay: Duration::from_secs(30),
            calls: AtomicUsize::new(0),
        });
        let fast = Fake::new("fast", Some("on time"));
        let chain =
            ProviderChain::new(vec![slow, fast]).with_timeout(Duration::from_millis(500));

        let out = chain
            .first_success(|p| async move { p.call().await }, |_| true)
            .await
            .unwrap();
        assert_eq!(out.provider, "fast");
    }

    #[test]
    fn head_keeps_only_the_first_link() {
        let chain = ProviderChain::new(vec![
            Fake::new("a", None),
            Fake::new("b", None),
            Fake::new("c", None),
        ]);
        assert_eq!(chain.head().names(), vec!["a"]);
        assert_eq!(chain.names(), vec!["a", "b", "c"]);
    }
}
