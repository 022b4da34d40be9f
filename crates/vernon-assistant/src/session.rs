//! One chat session: the surface the presentation layer talks to.

use crate::error::AssistantResult;
use crate::parts::SessionParts;
use crate::voice_loop::{run_voice_loop, VoiceChannels};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use vernon_core::{ConversationState, SharedConversation, VernonConfig};
use vernon_pipeline::{MessagePipeline, ProcessingResult, Services};
use vernon_voice::{
    BargeIn, CaptureConfig, CaptureErrorKind, InterruptionCoordinator, SilenceConfig,
    SilenceDetector, SpeechCaptureController, SpeechOutput, StopReason, VoiceOptions,
};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// User-facing text for a capture failure that turned listening off.
pub fn stop_notice(reason: StopReason) -> String {
    match reason {
        StopReason::Fatal(CaptureErrorKind::PermissionDenied) => {
            "Microphone access was denied. Allow it and turn listening back on.".to_string()
        }
        StopReason::Fatal(CaptureErrorKind::DeviceUnavailable) => {
            "No microphone is available, so I can only read typed messages.".to_string()
        }
        StopReason::Fatal(CaptureErrorKind::Network) => {
            "Speech recognition can't reach the network right now.".to_string()
        }
        StopReason::Fatal(_) => "Voice input stopped unexpectedly. Turn listening back on to retry."
            .to_string(),
        StopReason::RestartLimit { restarts } => format!(
            "Voice input kept dropping ({} restarts), so I turned listening off.",
            restarts
        ),
    }
}

/// Shared between the session handle and its voice loop.
pub(crate) struct SessionInner {
    pub(crate) conversation: SharedConversation,
    pub(crate) pipeline: MessagePipeline,
    pub(crate) capture: SpeechCaptureController,
    pub(crate) silence: Arc<SilenceDetector>,
    pub(crate) output: Arc<SpeechOutput>,
    pub(crate) coordinator: InterruptionCoordinator,
    voice_mode: Arc<AtomicBool>,
    notice: Mutex<Option<String>>,
}

impl SessionInner {
    /// Run the pipeline and, in voice mode, speak the reply without waiting for playback.
    pub(crate) async fn respond(&self, text: &str) -> ProcessingResult {
        let result = self.pipeline.process(text).await;
        if let Some(reply) = result.response.clone() {
            if self.voice_mode.load(Ordering::SeqCst) {
                let output = Arc::clone(&self.output);
                tokio::spawn(async move {
                    let outcome = output.speak(&reply).await;
                    debug!(?outcome, "reply playback finished");
                });
            }
        }
        result
    }

    pub(crate) fn stop_listening(&self) {
        self.capture.stop();
        self.silence.stop();
    }

    pub(crate) fn set_notice(&self, notice: String) {
        warn!(%notice, "voice input disabled");
        *lock(&self.notice) = Some(notice);
    }
}

pub struct VernonSession {
    inner: Arc<SessionInner>,
    channels: Mutex<Option<VoiceChannels>>,
    voice_task: Mutex<Option<JoinHandle<()>>>,
}

impl VernonSession {
    pub fn new(config: &VernonConfig, parts: SessionParts) -> AssistantResult<Self> {
        let conversation = SharedConversation::new();

        let services = Services::new(
            parts.generators,
            parts.search,
            parts.directory,
            parts.bookings,
            &config.pipeline,
        )?;
        let pipeline = MessagePipeline::new(&config.pipeline, services, conversation.clone())?;

        let capture = SpeechCaptureController::new(
            parts.recognizer,
            CaptureConfig {
                max_restarts: config.voice.max_restarts,
                ..CaptureConfig::default()
            },
            conversation.clone(),
        );
        let (silence, silence_rx) = SilenceDetector::new(SilenceConfig {
            threshold: config.voice.silence_threshold(),
        });
        let silence = Arc::new(silence);
        let output = Arc::new(SpeechOutput::new(
            parts.speech,
            parts.sink,
            VoiceOptions {
                voice: config.voice.voice.clone(),
                rate: config.voice.rate,
            },
            config.voice.max_sentences,
            conversation.clone(),
        ));
        let voice_mode = Arc::new(AtomicBool::new(config.voice.voice_mode));
        let coordinator = InterruptionCoordinator::new(
            Arc::clone(&output),
            Arc::clone(&silence),
            config.voice.barge_in_min_chars,
            Arc::clone(&voice_mode),
        )
        .with_callback(Arc::new(|barge_in: &BargeIn| {
            info!(
                playback_id = barge_in.playback_id,
                interim = %barge_in.interim,
                "[Vernon stopped to listen]"
            );
        }));

        let channels = capture.take_events().map(|device| VoiceChannels {
            device,
            silence: silence_rx,
        });

        Ok(Self {
            inner: Arc::new(SessionInner {
                conversation,
                pipeline,
                capture,
                silence,
                output,
                coordinator,
                voice_mode,
                notice: Mutex::new(None),
            }),
            channels: Mutex::new(channels),
            voice_task: Mutex::new(None),
        })
    }

    /// Session with providers chosen from `config`.
    pub fn from_config(config: &VernonConfig) -> AssistantResult<Self> {
        Self::new(config, SessionParts::from_config(config)?)
    }

    /// Answer a typed (or finalized spoken) message.
    pub async fn send_message(&self, text: &str) -> ProcessingResult {
        self.inner.respond(text).await
    }

    /// Flip capture on or off; returns whether the session is now listening.
    pub fn toggle_listening(&self) -> AssistantResult<bool> {
        if self.inner.capture.is_capturing() {
            self.inner.stop_listening();
            return Ok(false);
        }
        self.start_listening()?;
        Ok(true)
    }

    pub fn start_listening(&self) -> AssistantResult<()> {
        self.ensure_voice_loop();
        if let Err(e) = self.inner.capture.start() {
            self.inner
                .set_notice(stop_notice(StopReason::Fatal(e.capture_kind())));
            return Err(e.into());
        }
        *lock(&self.inner.notice) = None;
        self.inner.silence.start();
        Ok(())
    }

    pub fn stop_listening(&self) {
        self.inner.stop_listening();
    }

    /// Silence the assistant and stop listening. Safe to call at any time, any number of times.
    pub fn stop(&self) {
        self.inner.output.stop();
        self.inner.stop_listening();
    }

    pub fn is_listening(&self) -> bool {
        self.inner.capture.is_capturing()
    }

    pub fn voice_mode(&self) -> bool {
        self.inner.voice_mode.load(Ordering::SeqCst)
    }

    /// Turning voice mode off also cuts any reply being spoken.
    pub fn set_voice_mode(&self, on: bool) {
        self.inner.voice_mode.store(on, Ordering::SeqCst);
        if !on {
            self.inner.output.stop();
        }
        info!(voice_mode = on, "voice mode changed");
    }

    /// The pending voice-input notice, if any. Each notice is returned once.
    pub fn take_notice(&self) -> Option<String> {
        lock(&self.inner.notice).take()
    }

    pub fn snapshot(&self) -> ConversationState {
        self.inner.conversation.snapshot()
    }

    /// Bumped on every conversation change.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.conversation.subscribe()
    }

    pub fn conversation(&self) -> &SharedConversation {
        &self.inner.conversation
    }

    fn ensure_voice_loop(&self) {
        let mut task = lock(&self.voice_task);
        if task.is_some() {
            return;
        }
        let Some(channels) = lock(&self.channels).take() else {
            return;
        };
        *task = Some(tokio::spawn(run_voice_loop(Arc::clone(&self.inner), channels)));
        debug!("voice loop started");
    }
}

impl Drop for VernonSession {
    fn drop(&mut self) {
        if let Some(task) = lock(&self.voice_task).take() {
            task.abort();
        }
        self.inner.output.stop();
        self.inner.stop_listening();
    }
}
