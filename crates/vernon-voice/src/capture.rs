//! Speech capture controller.
//!
//! Owns the recognition device, restarts it when it drops while capture is still logically
//! on (bounded by `max_restarts`), and accumulates the transcript: final fragments are
//! concatenated, interim fragments are replaced wholesale on every update.

use crate::error::{CaptureErrorKind, VoiceResult};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};
use vernon_core::SharedConversation;

/// A microphone-backed recognizer (browser engine, local VAD + STT, ...).
pub trait RecognitionDevice: Send {
    /// Begin recognition. Events flow into `events` until `stop` or until the device ends.
    fn start(&mut self, events: mpsc::UnboundedSender<DeviceEvent>) -> VoiceResult<()>;

    /// Stop recognition. Must be idempotent.
    fn stop(&mut self);
}

/// One recognized piece of text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptFragment {
    pub text: String,
    pub is_final: bool,
}

impl TranscriptFragment {
    pub fn interim(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: false,
        }
    }

    pub fn final_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: true,
        }
    }
}

/// Callbacks from the recognition device.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    Result(Vec<TranscriptFragment>),
    Error(CaptureErrorKind),
    /// The device stopped on its own.
    End,
}

/// Continuous transcript output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureOutput {
    pub final_text: String,
    pub interim_text: String,
}

impl CaptureOutput {
    /// Final and interim text joined, as spoken so far.
    pub fn combined(&self) -> String {
        let mut out = self.final_text.trim().to_string();
        let interim = self.interim_text.trim();
        if !interim.is_empty() {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(interim);
        }
        out
    }
}

/// Why capture turned itself off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Needs the user (microphone denied, no device).
    Fatal(CaptureErrorKind),
    /// Too many consecutive device drops.
    RestartLimit { restarts: u32 },
}

/// What handling one device event did.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureUpdate {
    Transcript(CaptureOutput),
    Restarted { attempt: u32 },
    /// Recoverable error reported by the device; capture continues.
    Warning(CaptureErrorKind),
    Stopped(StopReason),
    Ignored,
}

#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Consecutive restarts allowed before capture is forced off (default: 5)
    pub max_restarts: u32,
    /// Delay before restart `n` is `restart_backoff * n`.
    pub restart_backoff: Duration,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            max_restarts: 5,
            restart_backoff: Duration::from_millis(250),
        }
    }
}

#[derive(Debug, Default)]
struct CaptureState {
    on: bool,
    restarts: u32,
    output: CaptureOutput,
    last_error: Option<CaptureErrorKind>,
}

pub struct SpeechCaptureController {
    config: CaptureConfig,
    device: Mutex<Box<dyn RecognitionDevice>>,
    state: Mutex<CaptureState>,
    events_tx: mpsc::UnboundedSender<DeviceEvent>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<DeviceEvent>>>,
    output_tx: watch::Sender<CaptureOutput>,
    conversation: SharedConversation,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Append a final fragment, inserting a space when neither side provides one.
fn append_final(buffer: &mut String, fragment: &str) {
    let fragment = fragment.trim_end();
    if fragment.trim().is_empty() {
        return;
    }
    let needs_space = !buffer.is_empty()
        && !buffer.ends_with(char::is_whitespace)
        && !fragment.starts_with(char::is_whitespace);
    if needs_space {
        buffer.push(' ');
    }
    if buffer.is_empty() {
        buffer.push_str(fragment.trim_start());
    } else {
        buffer.push_str(fragment);
    }
}

impl SpeechCaptureController {
    pub fn new(
        device: Box<dyn RecognitionDevice>,
        config: CaptureConfig,
        conversation: SharedConversation,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (output_tx, _) = watch::channel(CaptureOutput::default());
        Self {
            config,
            device: Mutex::new(device),
            state: Mutex::new(CaptureState::default()),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            output_tx,
            conversation,
        }
    }

    /// Device events to be fed back through [`Self::handle_event`]. Can be taken once.
    pub fn take_events(&self) -> Option<mpsc::UnboundedReceiver<DeviceEvent>> {
        lock(&self.events_rx).take()
    }

    /// Watch the `{final, interim}` transcript.
    pub fn subscribe(&self) -> watch::Receiver<CaptureOutput> {
        self.output_tx.subscribe()
    }

    /// Acquire the recognizer and start a fresh capture session.
    pub fn start(&self) -> VoiceResult<()> {
        {
            let state = lock(&self.state);
            if state.on {
                return Ok(());
            }
        }
        lock(&self.device).start(self.events_tx.clone())?;

        let mut state = lock(&self.state);
        state.on = true;
        state.restarts = 0;
        state.last_error = None;
        state.output = CaptureOutput::default();
        self.publish(&state.output);
        self.conversation.set_capturing(true);
        info!("capture started");
        Ok(())
    }

    /// Stop capture. Safe to call repeatedly.
    pub fn stop(&self) {
        let was_on = {
            let mut state = lock(&self.state);
            std::mem::replace(&mut state.on, false)
        };
        lock(&self.device).stop();
        self.conversation.set_capturing(false);
        if was_on {
            info!("capture stopped");
        }
    }

    pub fn is_capturing(&self) -> bool {
        lock(&self.state).on
    }

    pub fn output(&self) -> CaptureOutput {
        lock(&self.state).output.clone()
    }

    pub fn last_error(&self) -> Option<CaptureErrorKind> {
        lock(&self.state).last_error
    }

    /// Hand off the accumulated transcript and clear it for the next utterance.
    pub fn take_transcript(&self) -> String {
        let mut state = lock(&self.state);
        let text = state.output.combined();
        state.output = CaptureOutput::default();
        self.publish(&state.output);
        text
    }

    fn publish(&self, output: &CaptureOutput) {
        self.output_tx.send_replace(output.clone());
        self.conversation
            .set_transcript(&output.final_text, &output.interim_text);
    }

    /// Apply one device callback.
    pub async fn handle_event(&self, event: DeviceEvent) -> CaptureUpdate {
        match event {
            DeviceEvent::Result(fragments) => self.handle_result(fragments),
            DeviceEvent::Error(kind) => self.handle_error(kind),
            DeviceEvent::End => self.handle_end().await,
        }
    }

    fn handle_result(&self, fragments: Vec<TranscriptFragment>) -> CaptureUpdate {
        let mut state = lock(&self.state);
        if !state.on {
            return CaptureUpdate::Ignored;
        }
        state.restarts = 0;

        let mut interim = String::new();
        for fragment in &fragments {
            if fragment.is_final {
                append_final(&mut state.output.final_text, &fragment.text);
            } else {
                interim.push_str(&fragment.text);
            }
        }
        state.output.interim_text = interim.trim().to_string();

        debug!(
            final_len = state.output.final_text.len(),
            interim_len = state.output.interim_text.len(),
            "transcript updated"
        );
        let output = state.output.clone();
        self.publish(&output);
        CaptureUpdate::Transcript(output)
    }

    fn handle_error(&self, kind: CaptureErrorKind) -> CaptureUpdate {
        if kind == CaptureErrorKind::NoSpeech {
            debug!("no-speech reported, ignoring");
            return CaptureUpdate::Ignored;
        }
        {
            let mut state = lock(&self.state);
            state.last_error = Some(kind);
            if !state.on {
                return CaptureUpdate::Ignored;
            }
        }
        if kind.is_recoverable() {
            warn!(error = %kind, "recoverable capture error");
            return CaptureUpdate::Warning(kind);
        }

        warn!(error = %kind, "capture disabled until the user retries");
        self.stop();
        CaptureUpdate::Stopped(StopReason::Fatal(kind))
    }

    /// The device ended while capture is on: restart it with backoff. A restart that
    /// fails with a recoverable error counts as another drop against `max_restarts`.
    async fn handle_end(&self) -> CaptureUpdate {
        loop {
            let attempt = {
                let mut state = lock(&self.state);
                if !state.on {
                    return CaptureUpdate::Ignored;
                }
                state.restarts += 1;
                state.restarts
            };

            if attempt > self.config.max_restarts {
                warn!(
                    restarts = attempt - 1,
                    "recognition keeps dropping, turning capture off"
                );
                self.stop();
                return CaptureUpdate::Stopped(StopReason::RestartLimit {
                    restarts: attempt - 1,
                });
            }

            tokio::time::sleep(self.config.restart_backoff * attempt).await;
            if !self.is_capturing() {
                return CaptureUpdate::Ignored;
            }

            let started = lock(&self.device).start(self.events_tx.clone());
            let e = match started {
                Ok(()) => {
                    info!(attempt, "recognition restarted");
                    return CaptureUpdate::Restarted { attempt };
                }
                Err(e) => e,
            };
            let kind = e.capture_kind();
            warn!(attempt, error = %e, "recognition restart failed");
            lock(&self.state).last_error = Some(kind);
            if !kind.is_recoverable() {
                self.stop();
                return CaptureUpdate::Stopped(StopReason::Fatal(kind));
            }
        }
    }
}
