//! Session-level flows with a scripted microphone, echo TTS and a timed speaker.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use vernon_assistant::{NoMicrophone, SessionParts, VernonSession};
use vernon_core::{
    Named, ProviderChain, SearchOptions, SearchProvider, SearchResult, SimulatedBookings,
    StaticVenueDirectory, TextGenerator, VernonConfig, VernonError, VernonResult,
};
use vernon_pipeline::MockGenerator;
use vernon_voice::{
    AudioSink, CancelSignal, DeviceEvent, RecognitionDevice, SpeechProvider, TranscriptFragment,
    VoiceOptions, VoiceResult,
};

type Feed = Arc<Mutex<Option<mpsc::UnboundedSender<DeviceEvent>>>>;

/// Hands its event sender to the test on start.
#[derive(Default)]
struct ScriptedMic {
    feed: Feed,
}

impl RecognitionDevice for ScriptedMic {
    fn start(&mut self, events: mpsc::UnboundedSender<DeviceEvent>) -> VoiceResult<()> {
        *self.feed.lock().unwrap() = Some(events);
        Ok(())
    }

    fn stop(&mut self) {}
}

struct DownSearch;

impl Named for DownSearch {
    fn name(&self) -> &str {
        "down"
    }
}

#[async_trait]
impl SearchProvider for DownSearch {
    async fn search(&self, _query: &str, _options: &SearchOptions) -> VernonResult<SearchResult> {
        Err(VernonError::provider("down", "timeout"))
    }
}

struct EchoTts;

impl Named for EchoTts {
    fn name(&self) -> &str {
        "echo"
    }
}

#[async_trait]
impl SpeechProvider for EchoTts {
    async fn synthesize(&self, text: &str, _o: &VoiceOptions) -> VoiceResult<Option<Vec<u8>>> {
        Ok(Some(text.as_bytes().to_vec()))
    }
}

/// Each clip plays for `clip`; counts clips started.
struct CountingSink {
    clip: Duration,
    plays: AtomicUsize,
}

impl CountingSink {
    fn new(clip: Duration) -> Arc<Self> {
        Arc::new(Self {
            clip,
            plays: AtomicUsize::new(0),
        })
    }

    fn plays(&self) -> usize {
        self.plays.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AudioSink for CountingSink {
    async fn play(&self, _audio: Vec<u8>, mut cancel: CancelSignal) -> VoiceResult<()> {
        self.plays.fetch_add(1, Ordering::SeqCst);
        tokio::select! {
            _ = tokio::time::sleep(self.clip) => {}
            _ = cancel.cancelled() => {}
        }
        Ok(())
    }

    fn halt(&self) {}
}

fn parts(recognizer: Box<dyn RecognitionDevice>, sink: Arc<CountingSink>) -> SessionParts {
    SessionParts {
        generators: ProviderChain::new(vec![Arc::new(MockGenerator) as Arc<dyn TextGenerator>]),
        search: ProviderChain::new(vec![Arc::new(DownSearch) as Arc<dyn SearchProvider>]),
        directory: Arc::new(StaticVenueDirectory::with_sample_data()),
        bookings: Arc::new(SimulatedBookings::new()),
        recognizer,
        speech: ProviderChain::new(vec![Arc::new(EchoTts) as Arc<dyn SpeechProvider>]),
        sink,
    }
}

fn voice_config() -> VernonConfig {
    let mut config = VernonConfig::default();
    config.voice.voice_mode = true;
    config
}

#[tokio::test]
async fn typed_booking_in_text_mode() {
    let sink = CountingSink::new(Duration::from_millis(10));
    let session = VernonSession::new(
        &VernonConfig::default(),
        parts(Box::new(ScriptedMic::default()), sink.clone()),
    )
    .unwrap();

    let result = session
        .send_message("book a table for 4 at 7pm at the steakhouse")
        .await;
    assert!(result.success);

    let snap = session.snapshot();
    assert_eq!(snap.messages.len(), 2);
    assert!(snap.messages[1].text.contains("table for 4"));
    assert!(!snap.is_busy);
    tokio::task::yield_now().await;
    assert_eq!(sink.plays(), 0);
}

#[tokio::test(start_paused = true)]
async fn spoken_question_is_answered_after_silence() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let mic = ScriptedMic::default();
    let feed = mic.feed.clone();
    let sink = CountingSink::new(Duration::from_millis(500));
    let session = VernonSession::new(&voice_config(), parts(Box::new(mic), sink.clone())).unwrap();

    assert!(session.toggle_listening().unwrap());
    assert!(session.snapshot().is_capturing);
    let tx = feed.lock().unwrap().clone().unwrap();

    tx.send(DeviceEvent::Result(vec![TranscriptFragment::interim("what's happening")]))
        .unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(session.snapshot().interim_text, "what's happening");
    tx.send(DeviceEvent::Result(vec![TranscriptFragment::final_text(
        "what's happening in Miami tonight",
    )]))
    .unwrap();

    // Still inside the quiet countdown: nothing sent yet.
    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert!(session.snapshot().messages.is_empty());

    tokio::time::sleep(Duration::from_secs(2)).await;
    let snap = session.snapshot();
    assert_eq!(snap.messages.len(), 2);
    assert_eq!(snap.messages[0].text, "what's happening in Miami tonight");
    assert!(snap.messages[1].text.contains("Miami"));
    assert!(snap.final_text.is_empty());
    assert!(sink.plays() >= 1);
}

#[tokio::test(start_paused = true)]
async fn talking_over_the_reply_cuts_it_off() {
    let mic = ScriptedMic::default();
    let feed = mic.feed.clone();
    let sink = CountingSink::new(Duration::from_secs(1));
    let session = VernonSession::new(&voice_config(), parts(Box::new(mic), sink.clone())).unwrap();
    session.start_listening().unwrap();
    let tx = feed.lock().unwrap().clone().unwrap();

    session.send_message("what's happening in Miami tonight").await;
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(session.snapshot().is_speaking);
    assert_eq!(sink.plays(), 1);

    tx.send(DeviceEvent::Result(vec![TranscriptFragment::interim("hold on")]))
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!session.snapshot().is_speaking);

    // The second sentence would have started at 1s.
    tokio::time::sleep(Duration::from_millis(900)).await;
    assert_eq!(sink.plays(), 1);

    // Still listening to the interruption: no quiet countdown runs on it.
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(session.snapshot().messages.len(), 2);

    // Once the recognizer finalizes "hold on", silence hands it to the pipeline.
    tx.send(DeviceEvent::Result(vec![TranscriptFragment::final_text("hold on")]))
        .unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;
    let snap = session.snapshot();
    assert_eq!(snap.messages.len(), 4);
    assert_eq!(snap.messages[2].text, "hold on");
}

#[tokio::test]
async fn missing_microphone_is_reported_once() {
    let session = VernonSession::new(
        &voice_config(),
        parts(Box::new(NoMicrophone), CountingSink::new(Duration::ZERO)),
    )
    .unwrap();

    assert!(session.toggle_listening().is_err());
    assert!(!session.is_listening());
    let notice = session.take_notice().unwrap();
    assert!(notice.contains("No microphone"));
    assert!(session.take_notice().is_none());

    // Typing still works.
    let result = session.send_message("tell me a joke").await;
    assert!(result.response.unwrap().starts_with("[Mock reply]"));
}

#[tokio::test]
async fn toggle_listening_flips_state() {
    let session = VernonSession::new(
        &VernonConfig::default(),
        parts(Box::new(ScriptedMic::default()), CountingSink::new(Duration::ZERO)),
    )
    .unwrap();

    assert!(session.toggle_listening().unwrap());
    assert!(session.snapshot().is_capturing);
    assert!(!session.toggle_listening().unwrap());
    assert!(!session.snapshot().is_capturing);
}

#[tokio::test(start_paused = true)]
async fn stop_is_always_safe() {
    let sink = CountingSink::new(Duration::from_secs(5));
    let session = VernonSession::new(
        &voice_config(),
        parts(Box::new(ScriptedMic::default()), sink.clone()),
    )
    .unwrap();

    session.stop();
    session.stop();

    session.send_message("tell me a joke").await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(session.snapshot().is_speaking);

    session.stop();
    assert!(!session.snapshot().is_speaking);
    session.stop();
    assert!(!session.snapshot().is_speaking);
    assert!(!session.snapshot().is_capturing);
}

#[tokio::test(start_paused = true)]
async fn voice_mode_off_cuts_playback() {
    let sink = CountingSink::new(Duration::from_secs(5));
    let session = VernonSession::new(
        &voice_config(),
        parts(Box::new(ScriptedMic::default()), sink.clone()),
    )
    .unwrap();

    session.send_message("tell me a joke").await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(session.snapshot().is_speaking);

    session.set_voice_mode(false);
    assert!(!session.voice_mode());
    assert!(!session.snapshot().is_speaking);

    session.send_message("tell me another").await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(sink.plays(), 1);
}
