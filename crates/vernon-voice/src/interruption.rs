//! **Barge-in**: cancel assistant audio the instant the user starts talking over it.
//!
//! The coordinator is the only component allowed to stop an in-flight `SpeechOutput`
//! from inside a live capture session. An interrupted reply is discarded, never resumed.

use crate::output::SpeechOutput;
use crate::silence::SilenceDetector;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::info;

/// Callback when user speech interrupts playback (e.g. print "[Vernon stopped to listen]").
pub type OnBargeIn = Option<Arc<dyn Fn(&BargeIn) + Send + Sync>>;

/// A completed interruption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BargeIn {
    /// Playback that was cancelled.
    pub playback_id: u64,
    /// Reply text that was being spoken (now discarded).
    pub interrupted_text: String,
    /// Interim transcript that triggered the interruption.
    pub interim: String,
}

pub struct InterruptionCoordinator {
    output: Arc<SpeechOutput>,
    silence: Arc<SilenceDetector>,
    min_chars: usize,
    voice_mode: Arc<AtomicBool>,
    last_interrupted: Mutex<Option<u64>>,
    on_barge_in: OnBargeIn,
}

impl InterruptionCoordinator {
    pub fn new(
        output: Arc<SpeechOutput>,
        silence: Arc<SilenceDetector>,
        min_chars: usize,
        voice_mode: Arc<AtomicBool>,
    ) -> Self {
        Self {
            output,
            silence,
            min_chars,
            voice_mode,
            last_interrupted: Mutex::new(None),
            on_barge_in: None,
        }
    }

    pub fn with_callback(mut self, callback: Arc<dyn Fn(&BargeIn) + Send + Sync>) -> Self {
        self.on_barge_in = Some(callback);
        self
    }

    pub fn voice_mode(&self) -> bool {
        self.voice_mode.load(Ordering::SeqCst)
    }

    /// Feed the latest interim transcript. Returns the interruption if one happened.
    ///
    /// Fires when audio is playing, voice mode is on and the interim text is longer than
    /// `min_chars` characters. Capture then owns the floor: the silence detector is put
    /// back into `Active` with the interim text.
    pub fn observe_interim(&self, interim: &str) -> Option<BargeIn> {
        let interim = interim.trim();
        if interim.chars().count() <= self.min_chars || !self.voice_mode() {
            return None;
        }
        if !self.output.is_speaking() {
            return None;
        }
        let playback_id = self.output.current_playback_id()?;
        {
            let mut last = self
                .last_interrupted
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if *last == Some(playback_id) {
                return None;
            }
            *last = Some(playback_id);
        }

        let interrupted_text = self.output.current_text().unwrap_or_default();
        self.output.stop();
        self.silence.speech_detected(interim);
        info!(playback_id, chars = interim.len(), "Barge-in: transitioning to listening");

        let barge_in = BargeIn {
            playback_id,
            interrupted_text,
            interim: interim.to_string(),
        };
        if let Some(ref cb) = self.on_barge_in {
            cb(&barge_in);
        }
        Some(barge_in)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VoiceResult;
    use crate::output::{AudioSink, CancelSignal, SpeakOutcome, SpeechProvider, VoiceOptions};
    use crate::silence::{SilenceConfig, SilencePhase};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use vernon_core::{Named, ProviderChain, SharedConversation};

    struct Tts;

    impl Named for Tts {
        fn name(&self) -> &str {
            "tts"
        }
    }

    #[async_trait]
    impl SpeechProvider for Tts {
        async fn synthesize(&self, text: &str, _o: &VoiceOptions) -> VoiceResult<Option<Vec<u8>>> {
            Ok(Some(text.as_bytes().to_vec()))
        }
    }

    /// Each sentence plays for 2.5s of virtual time.
    #[derive(Default)]
    struct ClockSink {
        played: Mutex<Vec<String>>,
        halts: AtomicUsize,
    }

    #[async_trait]
    impl AudioSink for ClockSink {
        async fn play(&self, audio: Vec<u8>, mut cancel: CancelSignal) -> VoiceResult<()> {
            self.played
                .lock()
                .unwrap()
                .push(String::from_utf8_lossy(&audio).into_owned());
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(2500)) => {}
                _ = cancel.cancelled() => {}
            }
            Ok(())
        }

        fn halt(&self) {
            self.halts.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Rig {
        output: Arc<SpeechOutput>,
        silence: Arc<SilenceDetector>,
        sink: Arc<ClockSink>,
        coordinator: InterruptionCoordinator,
        convo: SharedConversation,
    }

    fn rig(voice_mode: bool) -> Rig {
        let convo = SharedConversation::new();
        let sink = Arc::new(ClockSink::default());
        let output = Arc::new(SpeechOutput::new(
            ProviderChain::new(vec![Arc::new(Tts) as Arc<dyn SpeechProvider>]),
            sink.clone(),
            VoiceOptions::default(),
            20,
            convo.clone(),
        ));
        let (silence, _rx) = SilenceDetector::new(SilenceConfig::default());
        let silence = Arc::new(silence);
        let coordinator = InterruptionCoordinator::new(
            Arc::clone(&output),
            Arc::clone(&silence),
            3,
            Arc::new(AtomicBool::new(voice_mode)),
        );
        Rig {
            output,
            silence,
            sink,
            coordinator,
            convo,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn barge_in_cancels_before_second_sentence() {
        let r = rig(true);
        r.silence.start();
        let reply = "Ball & Chain has live salsa tonight. Doors open at eight. Cover is ten dollars.";
        let speaking = tokio::spawn({
            let output = Arc::clone(&r.output);
            async move { output.speak(reply).await }
        });

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(r.convo.is_speaking());
        // Still inside the first sentence; short noise does not interrupt.
        assert!(r.coordinator.observe_interim("uh").is_none());

        tokio::time::sleep(Duration::from_secs(1)).await;
        let barge = r.coordinator.observe_interim("wait a").unwrap();
        assert!(barge.interrupted_text.starts_with("Ball & Chain"));

        let outcome = speaking.await.unwrap();
        assert_eq!(outcome, SpeakOutcome::Interrupted { segments_played: 1 });
        assert_eq!(r.sink.played.lock().unwrap().len(), 1);
        assert!(!r.output.is_speaking());
        assert!(!r.convo.is_speaking());
        assert_eq!(r.silence.phase(), SilencePhase::Active);
    }

    #[tokio::test(start_paused = true)]
    async fn interruption_is_one_way_per_playback() {
        let r = rig(true);
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let coordinator = r.coordinator.with_callback(Arc::new(move |_: &BargeIn| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        let speaking = tokio::spawn({
            let output = Arc::clone(&r.output);
            async move { output.speak("One. Two. Three.").await }
        });
        tokio::task::yield_now().await;

        assert!(coordinator.observe_interim("hold on").is_some());
        assert!(coordinator.observe_interim("hold on please").is_none());
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(matches!(speaking.await.unwrap(), SpeakOutcome::Interrupted { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn text_mode_never_interrupts() {
        let r = rig(false);
        let speaking = tokio::spawn({
            let output = Arc::clone(&r.output);
            async move { output.speak("One. Two.").await }
        });
        tokio::task::yield_now().await;

        assert!(r.coordinator.observe_interim("stop talking").is_none());
        assert!(matches!(speaking.await.unwrap(), SpeakOutcome::Completed { segments: 2, .. }));
    }

    #[test]
    fn nothing_playing_means_no_barge_in() {
        let r = rig(true);
        assert!(r.coordinator.observe_interim("hello there").is_none());
        assert_eq!(r.sink.halts.load(Ordering::SeqCst), 0);
    }
}
