//! **SpeechOutput**: text-to-speech through an ordered provider chain, and the single
//! playback handle that barge-in cancels.
//!
//! Providers are tried in order per segment; a network error, empty audio or a playback
//! failure moves on to the next. Exhausting the chain is not an error: the reply stays
//! visible as text and `is_speaking` is false.

use crate::error::VoiceResult;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use vernon_core::{Named, ProviderChain, SharedConversation, VernonError};

/// Voice selection passed to every provider.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceOptions {
    pub voice: String,
    /// 1.0 = normal speed.
    pub rate: f32,
}

impl Default for VoiceOptions {
    fn default() -> Self {
        Self {
            voice: "nova".to_string(),
            rate: 1.0,
        }
    }
}

/// Backend that turns text into audio bytes (WAV/MP3). `Ok(None)` or empty bytes mean "no audio".
#[async_trait]
pub trait SpeechProvider: Named + Send + Sync {
    async fn synthesize(&self, text: &str, options: &VoiceOptions) -> VoiceResult<Option<Vec<u8>>>;
}

/// Receiving side of a playback handle's cancellation.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancelled (or once the handle is gone).
    pub async fn cancelled(&mut self) {
        while !*self.rx.borrow_and_update() {
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Output device for synthesized audio.
#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Play `audio` until it finishes or `cancel` fires. Returning early on cancel is `Ok`.
    async fn play(&self, audio: Vec<u8>, cancel: CancelSignal) -> VoiceResult<()>;

    /// Silence the device immediately. Synchronous and idempotent.
    fn halt(&self);
}

/// The one live "currently playing" resource.
#[derive(Debug)]
pub struct SpeechPlaybackHandle {
    id: u64,
    text: String,
    cancel_tx: watch::Sender<bool>,
}

impl SpeechPlaybackHandle {
    fn new(id: u64, text: &str) -> Self {
        let (cancel_tx, _) = watch::channel(false);
        Self {
            id,
            text: text.to_string(),
            cancel_tx,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    fn signal(&self) -> CancelSignal {
        CancelSignal {
            rx: self.cancel_tx.subscribe(),
        }
    }

    fn cancel(&self) {
        self.cancel_tx.send_replace(true);
    }

    fn is_cancelled(&self) -> bool {
        *self.cancel_tx.borrow()
    }
}

/// Result of one `speak` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeakOutcome {
    /// Every segment was played.
    Completed { provider: String, segments: usize },
    /// The same text is already playing; nothing was started.
    AlreadySpeaking,
    /// Cancelled by `stop`, barge-in or a newer `speak`.
    Interrupted { segments_played: usize },
    /// Every provider failed; the reply stays text-only.
    TextOnly,
    /// Nothing to say.
    Empty,
}

/// Split text into sentences at `.`, `!` or `?` followed by whitespace.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        current.push(c);
        if matches!(c, '.' | '!' | '?') {
            match chars.peek() {
                Some(next) if next.is_whitespace() => {
                    let sentence = current.trim();
                    if !sentence.is_empty() {
                        sentences.push(sentence.to_string());
                    }
                    current.clear();
                }
                _ => {}
            }
        }
    }
    let rest = current.trim();
    if !rest.is_empty() {
        sentences.push(rest.to_string());
    }
    sentences
}

/// Per-sentence segments for medium replies; one unit for very short or very long ones.
pub fn speech_segments(text: &str, max_sentences: usize) -> Vec<String> {
    let sentences = split_sentences(text);
    if sentences.len() > 1 && sentences.len() < max_sentences {
        sentences
    } else {
        vec![text.trim().to_string()]
    }
}

/// Manages synthesis and playback. Owns the single playback handle.
pub struct SpeechOutput {
    providers: ProviderChain<dyn SpeechProvider>,
    sink: Arc<dyn AudioSink>,
    current: Mutex<Option<SpeechPlaybackHandle>>,
    next_id: AtomicU64,
    options: VoiceOptions,
    max_sentences: usize,
    conversation: SharedConversation,
}

impl SpeechOutput {
    pub fn new(
        providers: ProviderChain<dyn SpeechProvider>,
        sink: Arc<dyn AudioSink>,
        options: VoiceOptions,
        max_sentences: usize,
        conversation: SharedConversation,
    ) -> Self {
        info!(providers = ?providers.names(), "SpeechOutput: provider chain ready");
        Self {
            providers,
            sink,
            current: Mutex::new(None),
            next_id: AtomicU64::new(1),
            options,
            max_sentences,
            conversation,
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<SpeechPlaybackHandle>> {
        self.current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Replace the live handle (cancelling the old one) unless `text` is already playing.
    fn acquire(&self, text: &str) -> Option<(u64, CancelSignal)> {
        let mut slot = self.slot();
        if let Some(live) = slot.as_ref() {
            if live.text == text && !live.is_cancelled() {
                return None;
            }
            live.cancel();
            self.sink.halt();
            debug!(id = live.id, "superseding playback");
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let handle = SpeechPlaybackHandle::new(id, text);
        let signal = handle.signal();
        *slot = Some(handle);
        self.conversation.set_speaking(true);
        Some((id, signal))
    }

    /// Drop the handle if it is still ours.
    fn release(&self, id: u64) {
        let mut slot = self.slot();
        if slot.as_ref().map(|h| h.id) == Some(id) {
            *slot = None;
            self.conversation.set_speaking(false);
        }
    }

    /// Speak `text`, sentence by sentence when it is of medium length.
    pub async fn speak(&self, text: &str) -> SpeakOutcome {
        let text = text.trim();
        if text.is_empty() {
            return SpeakOutcome::Empty;
        }
        let Some((id, signal)) = self.acquire(text) else {
            debug!("same text already playing, skipping");
            return SpeakOutcome::AlreadySpeaking;
        };

        let segments = speech_segments(text, self.max_sentences);
        let total = segments.len();
        let mut provider = String::new();

        for (played, segment) in segments.into_iter().enumerate() {
            if signal.is_cancelled() {
                return SpeakOutcome::Interrupted {
                    segments_played: played,
                };
            }
            match self.speak_segment(&segment, &signal).await {
                Ok(name) => provider = name,
                Err(e) => {
                    if signal.is_cancelled() {
                        return SpeakOutcome::Interrupted {
                            segments_played: played,
                        };
                    }
                    warn!(error = %e, "all speech providers failed, reply stays text-only");
                    self.release(id);
                    return SpeakOutcome::TextOnly;
                }
            }
            if signal.is_cancelled() {
                return SpeakOutcome::Interrupted {
                    segments_played: played + 1,
                };
            }
        }

        self.release(id);
        SpeakOutcome::Completed {
            provider,
            segments: total,
        }
    }

    async fn speak_segment(&self, segment: &str, signal: &CancelSignal) -> Result<String, VernonError> {
        let won = self
            .providers
            .first_success(
                |provider| {
                    let sink = Arc::clone(&self.sink);
                    let signal = signal.clone();
                    let options = self.options.clone();
                    let segment = segment.to_string();
                    async move {
                        if signal.is_cancelled() {
                            return Ok(());
                        }
                        let name = provider.name().to_string();
                        let audio = provider
                            .synthesize(&segment, &options)
                            .await
                            .map_err(|e| VernonError::provider(&name, e))?
                            .filter(|bytes| !bytes.is_empty())
                            .ok_or_else(|| VernonError::provider(&name, "empty audio payload"))?;
                        if signal.is_cancelled() {
                            return Ok(());
                        }
                        sink.play(audio, signal)
                            .await
                            .map_err(|e| VernonError::provider(&name, e))
                    }
                },
                |_| true,
            )
            .await?;
        Ok(won.provider)
    }

    /// Stop playback now. Idempotent; safe when nothing is playing.
    pub fn stop(&self) {
        let taken = self.slot().take();
        if let Some(handle) = taken {
            handle.cancel();
            info!(id = handle.id, "SpeechOutput: stopped (interruption or manual)");
        }
        self.sink.halt();
        self.conversation.set_speaking(false);
    }

    /// Whether a live, uncancelled handle exists.
    pub fn is_speaking(&self) -> bool {
        self.slot().as_ref().is_some_and(|h| !h.is_cancelled())
    }

    pub fn current_playback_id(&self) -> Option<u64> {
        self.slot().as_ref().map(|h| h.id)
    }

    pub fn current_text(&self) -> Option<String> {
        self.slot().as_ref().map(|h| h.text.clone())
    }
}
