//! Silence detection for turn-taking.
//!
//! Two phases: `Active` (speech ongoing) and `Quiet`. Entering `Quiet` starts a countdown
//! (default 1200ms); any new speech cancels it and returns to `Active`. When the countdown
//! expires in `Quiet` with a non-empty transcript, `SilenceDetected` is emitted, at most once
//! per continuous quiet period.

use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Events emitted by the silence detector
#[derive(Debug, Clone)]
pub enum SilenceEvent {
    /// The user stopped speaking; `transcript` is the utterance to finalize.
    SilenceDetected {
        transcript: String,
        quiet_for: Duration,
        timestamp: DateTime<Utc>,
    },
}

/// Configuration for silence detection
#[derive(Debug, Clone)]
pub struct SilenceConfig {
    /// Quiet time before the utterance is considered finished (default: 1200ms)
    pub threshold: Duration,
}

impl Default for SilenceConfig {
    fn default() -> Self {
        Self {
            threshold: Duration::from_millis(1200),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SilencePhase {
    /// Not observing (before start or after stop).
    Idle,
    Active,
    Quiet,
}

#[derive(Debug)]
struct Inner {
    phase: SilencePhase,
    transcript: String,
    /// Bumped on every transition; a timer only fires if its generation is still current.
    generation: u64,
    fired: bool,
    timer: Option<JoinHandle<()>>,
}

impl Inner {
    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        self.generation = self.generation.wrapping_add(1);
    }
}

/// Debounced end-of-speech detector
pub struct SilenceDetector {
    config: SilenceConfig,
    inner: Arc<Mutex<Inner>>,
    event_tx: mpsc::UnboundedSender<SilenceEvent>,
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl SilenceDetector {
    /// Create a new detector with the given configuration
    pub fn new(config: SilenceConfig) -> (Self, mpsc::UnboundedReceiver<SilenceEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let detector = Self {
            config,
            inner: Arc::new(Mutex::new(Inner {
                phase: SilencePhase::Idle,
                transcript: String::new(),
                generation: 0,
                fired: false,
                timer: None,
            })),
            event_tx,
        };
        (detector, event_rx)
    }

    /// New speech energy or transcript: back to `Active`, countdown cancelled.
    pub fn speech_detected(&self, transcript: &str) {
        let mut inner = lock(&self.inner);
        inner.cancel_timer();
        if inner.phase != SilencePhase::Active {
            debug!("speech resumed");
        }
        inner.phase = SilencePhase::Active;
        inner.fired = false;
        inner.transcript.clear();
        inner.transcript.push_str(transcript);
    }

    /// Speech paused: `Active -> Quiet`, countdown started.
    pub fn speech_paused(&self) {
        let mut inner = lock(&self.inner);
        if inner.phase != SilencePhase::Active {
            return;
        }
        inner.cancel_timer();
        inner.phase = SilencePhase::Quiet;

        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!("silence countdown needs a Tokio runtime; not armed");
                return;
            }
        };

        let generation = inner.generation;
        let threshold = self.config.threshold;
        let deadline = tokio::time::Instant::now() + threshold;
        let shared = Arc::clone(&self.inner);
        let tx = self.event_tx.clone();
        inner.timer = Some(handle.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let mut inner = lock(&shared);
            if inner.generation != generation || inner.phase != SilencePhase::Quiet || inner.fired {
                return;
            }
            if inner.transcript.trim().is_empty() {
                debug!("quiet period elapsed with empty transcript, not firing");
                return;
            }
            inner.fired = true;
            inner.timer = None;
            info!(chars = inner.transcript.len(), "silence detected, finalizing utterance");
            let event = SilenceEvent::SilenceDetected {
                transcript: inner.transcript.clone(),
                quiet_for: threshold,
                timestamp: Utc::now(),
            };
            if let Err(e) = tx.send(event) {
                warn!("silence event dropped: {}", e);
            }
        }));
    }

    /// Transcript-driven input: each transcript update is evidence of speech followed by a pause.
    pub fn observe_transcript(&self, transcript: &str) {
        self.speech_detected(transcript);
        self.speech_paused();
    }

    /// Start observing a new capture session.
    pub fn start(&self) {
        let mut inner = lock(&self.inner);
        inner.cancel_timer();
        inner.phase = SilencePhase::Quiet;
        inner.fired = false;
        inner.transcript.clear();
    }

    /// Cancel any pending countdown immediately; nothing fires after this returns.
    pub fn stop(&self) {
        let mut inner = lock(&self.inner);
        inner.cancel_timer();
        inner.phase = SilencePhase::Idle;
        inner.fired = false;
        inner.transcript.clear();
    }

    /// Forget the buffered transcript after it has been handed off.
    pub fn clear_transcript(&self) {
        lock(&self.inner).transcript.clear();
    }

    pub fn phase(&self) -> SilencePhase {
        lock(&self.inner).phase
    }

    pub fn threshold(&self) -> Duration {
        self.config.threshold
    }
}

impl Drop for SilenceDetector {
    fn drop(&mut self) {
        lock(&self.inner).cancel_timer();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector(ms: u64) -> (SilenceDetector, mpsc::UnboundedReceiver<SilenceEvent>) {
        SilenceDetector::new(SilenceConfig {
            threshold: Duration::from_millis(ms),
        })
    }

    async fn settle() {
        // Let spawned timer tasks observe the advanced clock.
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fires_once_after_threshold() {
        let (d, mut rx) = detector(1200);
        d.observe_transcript("find me a jazz bar");

        tokio::time::advance(Duration::from_millis(1199)).await;
        settle().await;
        assert!(rx.try_recv().is_err());

        tokio::time::advance(Duration::from_millis(2)).await;
        settle().await;
        let SilenceEvent::SilenceDetected { transcript, .. } = rx.try_recv().unwrap();
        assert_eq!(transcript, "find me a jazz bar");

        tokio::time::advance(Duration::from_secs(10)).await;
        settle().await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn new_speech_resets_countdown() {
        let (d, mut rx) = detector(1200);
        d.observe_transcript("find me");
        tokio::time::advance(Duration::from_millis(1000)).await;
        settle().await;
        d.observe_transcript("find me a table");
        assert_eq!(d.phase(), SilencePhase::Quiet);

        tokio::time::advance(Duration::from_millis(1000)).await;
        settle().await;
        assert!(rx.try_recv().is_err());

        tokio::time::advance(Duration::from_millis(300)).await;
        settle().await;
        let SilenceEvent::SilenceDetected { transcript, .. } = rx.try_recv().unwrap();
        assert_eq!(transcript, "find me a table");
    }

    #[tokio::test(start_paused = true)]
    async fn empty_transcript_never_fires() {
        let (d, mut rx) = detector(100);
        d.observe_transcript("   ");
        tokio::time::advance(Duration::from_secs(1)).await;
        settle().await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_cancels_pending_countdown() {
        let (d, mut rx) = detector(500);
        d.observe_transcript("late night tacos");
        d.stop();
        assert_eq!(d.phase(), SilencePhase::Idle);

        tokio::time::advance(Duration::from_secs(2)).await;
        settle().await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn fires_again_after_new_speech() {
        let (d, mut rx) = detector(200);
        d.observe_transcript("first");
        tokio::time::advance(Duration::from_millis(250)).await;
        settle().await;
        assert!(rx.try_recv().is_ok());

        d.clear_transcript();
        d.observe_transcript("second");
        tokio::time::advance(Duration::from_millis(250)).await;
        settle().await;
        let SilenceEvent::SilenceDetected { transcript, .. } = rx.try_recv().unwrap();
        assert_eq!(transcript, "second");
    }

    #[test]
    fn pause_without_runtime_does_not_panic() {
        let (d, _rx) = detector(100);
        d.speech_detected("hello");
        d.speech_paused();
        assert_eq!(d.phase(), SilencePhase::Quiet);
    }
}
