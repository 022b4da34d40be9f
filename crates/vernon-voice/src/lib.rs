//! vernon-voice: the voice-interaction layer around the message pipeline.
//!
//! - [`SpeechCaptureController`]: recognizer ownership, restart-on-drop, transcript accumulation
//! - [`SilenceDetector`]: debounced end-of-utterance detection
//! - [`SpeechOutput`]: TTS provider chain, dedupe and the single playback handle
//! - [`InterruptionCoordinator`]: barge-in
//!
//! Hardware backends (`RodioSink`, `MicRecognizer`) are behind the `device` feature.

pub mod capture;
#[cfg(feature = "device")]
pub mod device;
pub mod error;
pub mod interruption;
pub mod output;
pub mod providers;
pub mod silence;

pub use capture::{
    CaptureConfig, CaptureOutput, CaptureUpdate, DeviceEvent, RecognitionDevice,
    SpeechCaptureController, StopReason, TranscriptFragment,
};
#[cfg(feature = "device")]
pub use device::{MicConfig, MicRecognizer, RodioSink};
pub use error::{CaptureErrorKind, VoiceError, VoiceResult};
pub use interruption::{BargeIn, InterruptionCoordinator, OnBargeIn};
pub use output::{
    split_sentences, AudioSink, CancelSignal, SpeakOutcome, SpeechOutput, SpeechPlaybackHandle,
    SpeechProvider, VoiceOptions,
};
pub use providers::{pcm_f32_to_wav, CloudStt, CloudTts, CommandTts, NullSink};
pub use silence::{SilenceConfig, SilenceDetector, SilenceEvent, SilencePhase};
