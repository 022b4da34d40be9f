//! The collaborators a session is assembled from, and how config picks them.

use crate::error::AssistantResult;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;
use vernon_core::{
    BookingService, ProviderChain, SearchProvider, SimulatedBookings, StaticVenueDirectory,
    TextGenerator, VenueDirectory, VernonConfig,
};
use vernon_pipeline::{build_generators, build_search_providers};
use vernon_voice::{
    AudioSink, CloudTts, CommandTts, DeviceEvent, NullSink, RecognitionDevice, SpeechProvider,
    VoiceError, VoiceResult,
};

pub struct SessionParts {
    pub generators: ProviderChain<dyn TextGenerator>,
    pub search: ProviderChain<dyn SearchProvider>,
    pub directory: Arc<dyn VenueDirectory>,
    pub bookings: Arc<dyn BookingService>,
    pub recognizer: Box<dyn RecognitionDevice>,
    pub speech: ProviderChain<dyn SpeechProvider>,
    pub sink: Arc<dyn AudioSink>,
}

impl SessionParts {
    /// Providers from config: keyed HTTP endpoints, on-device TTS, and hardware
    /// capture/playback when built with the `device` feature.
    pub fn from_config(config: &VernonConfig) -> AssistantResult<Self> {
        let timeout = config.pipeline.provider_timeout();
        let generators = build_generators(&config.providers, &config.assistant_name, timeout)?;
        let search = build_search_providers(&config.providers, timeout)?;

        let mut speech: Vec<Arc<dyn SpeechProvider>> = Vec::new();
        if let Some(endpoint) = &config.providers.tts {
            if let Some(cloud) = CloudTts::from_endpoint(endpoint)? {
                speech.push(Arc::new(cloud));
            }
        }
        speech.push(Arc::new(CommandTts::new(
            config.voice.device_tts_command.clone(),
            config.voice.device_tts_args.clone(),
        )));

        info!(
            generators = ?generators.names(),
            search = ?search.names(),
            "session providers ready"
        );

        Ok(Self {
            generators,
            search,
            directory: Arc::new(StaticVenueDirectory::with_sample_data()),
            bookings: Arc::new(SimulatedBookings::new()),
            recognizer: recognizer(config)?,
            speech: ProviderChain::new(speech).with_timeout(timeout),
            sink: sink(),
        })
    }
}

/// Recognizer stand-in when no microphone backend is available.
#[derive(Debug, Default)]
pub struct NoMicrophone;

impl RecognitionDevice for NoMicrophone {
    fn start(&mut self, _events: mpsc::UnboundedSender<DeviceEvent>) -> VoiceResult<()> {
        Err(VoiceError::DeviceUnavailable(
            "no microphone backend (build with the `device` feature and set an STT key)".to_string(),
        ))
    }

    fn stop(&mut self) {}
}

#[cfg(feature = "device")]
fn recognizer(config: &VernonConfig) -> AssistantResult<Box<dyn RecognitionDevice>> {
    use vernon_voice::{CloudStt, MicConfig, MicRecognizer};

    let stt = match &config.providers.stt {
        Some(endpoint) => CloudStt::from_endpoint(endpoint)?,
        None => None,
    };
    let Some(stt) = stt else {
        return Ok(Box::new(NoMicrophone));
    };
    Ok(Box::new(MicRecognizer::new(MicConfig::default(), stt)?))
}

#[cfg(not(feature = "device"))]
fn recognizer(_config: &VernonConfig) -> AssistantResult<Box<dyn RecognitionDevice>> {
    Ok(Box::new(NoMicrophone))
}

#[cfg(feature = "device")]
fn sink() -> Arc<dyn AudioSink> {
    match vernon_voice::RodioSink::new() {
        Ok(sink) => Arc::new(sink),
        Err(e) => {
            tracing::warn!(error = %e, "no audio output, replies stay text only");
            Arc::new(NullSink)
        }
    }
}

#[cfg(not(feature = "device"))]
fn sink() -> Arc<dyn AudioSink> {
    Arc::new(NullSink)
}
