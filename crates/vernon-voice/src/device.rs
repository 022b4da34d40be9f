//! Hardware backends (feature `device`): speaker playback through rodio and microphone
//! recognition through cpal + WebRTC VAD + remote transcription.
//!
//! Neither `cpal::Stream` nor `rodio::OutputStream` is `Send` on every platform, so each
//! lives on a dedicated thread for as long as the backend is alive.

use crate::capture::{DeviceEvent, RecognitionDevice, TranscriptFragment};
use crate::error::{CaptureErrorKind, VoiceError, VoiceResult};
use crate::output::{AudioSink, CancelSignal};
use crate::providers::{pcm_f32_to_wav, CloudStt};
use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use rodio::{OutputStream, Sink, Source};
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc as std_mpsc, Arc};
use std::thread;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use webrtc_vad::{SampleRate, Vad, VadMode};

/// Plays audio on the default output device.
pub struct RodioSink {
    sink: Arc<Sink>,
    /// Dropping this ends the thread that owns the output stream.
    _keepalive: std_mpsc::Sender<()>,
}

impl RodioSink {
    pub fn new() -> VoiceResult<Self> {
        let (ready_tx, ready_rx) = std_mpsc::channel::<VoiceResult<Arc<Sink>>>();
        let (keepalive, shutdown) = std_mpsc::channel::<()>();
        thread::spawn(move || {
            let (_stream, handle) = match OutputStream::try_default() {
                Ok(pair) => pair,
                Err(e) => {
                    let _ = ready_tx.send(Err(VoiceError::Playback(e.to_string())));
                    return;
                }
            };
            match Sink::try_new(&handle) {
                Ok(sink) => {
                    let _ = ready_tx.send(Ok(Arc::new(sink)));
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(VoiceError::Playback(e.to_string())));
                    return;
                }
            }
            // Blocks until the RodioSink is dropped.
            let _ = shutdown.recv();
        });

        let sink = ready_rx
            .recv()
            .map_err(|_| VoiceError::Playback("audio output thread exited".to_string()))??;
        info!("RodioSink: sink ready for TTS playback");
        Ok(Self {
            sink,
            _keepalive: keepalive,
        })
    }
}

#[async_trait]
impl AudioSink for RodioSink {
    async fn play(&self, audio: Vec<u8>, mut cancel: CancelSignal) -> VoiceResult<()> {
        if audio.is_empty() {
            return Ok(());
        }
        let source = rodio::Decoder::new(Cursor::new(audio))
            .map_err(|e| VoiceError::Playback(format!("Decode failed: {}", e)))?;
        self.sink.append(source.convert_samples::<f32>());
        self.sink.play();

        while !self.sink.empty() {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(40)) => {}
                _ = cancel.cancelled() => {
                    self.sink.stop();
                    break;
                }
            }
        }
        Ok(())
    }

    fn halt(&self) {
        self.sink.stop();
    }
}

#[derive(Debug, Clone)]
pub struct MicConfig {
    /// 8000, 16000, 32000 or 48000 Hz (WebRTC VAD constraint)
    pub sample_rate: u32,
    /// 30ms frames at 16kHz
    pub chunk_size: usize,
    /// Silence after speech that ends a phrase (default: 800ms)
    pub gap: Duration,
    /// Shorter speech bursts are dropped as noise (default: 200ms)
    pub min_speech: Duration,
    /// How much new speech triggers another interim transcription (default: 1s)
    pub interim_every: Duration,
}

impl Default for MicConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            chunk_size: 480,
            gap: Duration::from_millis(800),
            min_speech: Duration::from_millis(200),
            interim_every: Duration::from_secs(1),
        }
    }
}

impl MicConfig {
    fn frames(&self, d: Duration) -> usize {
        let frame_ms = (self.chunk_size as u64 * 1000) / self.sample_rate.max(1) as u64;
        (d.as_millis() as u64 / frame_ms.max(1)) as usize
    }
}

fn sample_rate(hz: u32) -> VoiceResult<SampleRate> {
    match hz {
        8000 => Ok(SampleRate::Rate8kHz),
        16000 => Ok(SampleRate::Rate16kHz),
        32000 => Ok(SampleRate::Rate32kHz),
        48000 => Ok(SampleRate::Rate48kHz),
        other => Err(VoiceError::Config(format!(
            "WebRTC VAD only supports 8000, 16000, 32000, or 48000 Hz, got {}",
            other
        ))),
    }
}

/// Microphone recognizer: interim fragments while speech continues, a final fragment at
/// each gap.
pub struct MicRecognizer {
    config: MicConfig,
    stt: Arc<CloudStt>,
    running: Option<Arc<AtomicBool>>,
}

impl MicRecognizer {
    pub fn new(config: MicConfig, stt: CloudStt) -> VoiceResult<Self> {
        sample_rate(config.sample_rate)?;
        Ok(Self {
            config,
            stt: Arc::new(stt),
            running: None,
        })
    }
}

impl RecognitionDevice for MicRecognizer {
    fn start(&mut self, events: mpsc::UnboundedSender<DeviceEvent>) -> VoiceResult<()> {
        self.stop();
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| VoiceError::Config("microphone capture needs a Tokio runtime".into()))?;

        let running = Arc::new(AtomicBool::new(true));
        let (ready_tx, ready_rx) = std_mpsc::channel::<VoiceResult<()>>();
        let config = self.config.clone();
        let stt = Arc::clone(&self.stt);
        let flag = Arc::clone(&running);

        thread::spawn(move || {
            let (chunk_tx, chunk_rx) = std_mpsc::channel::<Vec<f32>>();
            let stream = match open_input(&config, chunk_tx) {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            let _ = ready_tx.send(Ok(()));
            run_vad_loop(&config, &flag, chunk_rx, &events, &runtime, &stt);
            drop(stream);
            // Unexpected end while still running lets the controller restart us.
            if flag.load(Ordering::SeqCst) {
                let _ = events.send(DeviceEvent::End);
            }
        });

        ready_rx
            .recv()
            .map_err(|_| VoiceError::DeviceUnavailable("capture thread exited".into()))??;
        self.running = Some(running);
        info!("MicRecognizer: listening");
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(flag) = self.running.take() {
            flag.store(false, Ordering::SeqCst);
            debug!("MicRecognizer: stop requested");
        }
    }
}

impl Drop for MicRecognizer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn open_input(config: &MicConfig, chunk_tx: std_mpsc::Sender<Vec<f32>>) -> VoiceResult<cpal::Stream> {
    let device = cpal::default_host()
        .default_input_device()
        .ok_or_else(|| VoiceError::DeviceUnavailable("No input device available".to_string()))?;
    info!(
        "Using input device: {}",
        device.name().unwrap_or_else(|_| "Unknown".to_string())
    );
    let stream_config = cpal::StreamConfig {
        channels: 1,
        sample_rate: cpal::SampleRate(config.sample_rate),
        buffer_size: cpal::BufferSize::Fixed(config.chunk_size as u32),
    };

    let chunk_size = config.chunk_size;
    let mut buffer = Vec::with_capacity(chunk_size);
    let stream = device
        .build_input_stream(
            &stream_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                for &sample in data {
                    buffer.push(sample);
                    if buffer.len() >= chunk_size {
                        if chunk_tx.send(std::mem::take(&mut buffer)).is_err() {
                            return;
                        }
                        buffer.reserve(chunk_size);
                    }
                }
            },
            move |err| warn!("Audio stream error: {}", err),
            None,
        )
        .map_err(|e| match e {
            // Host refused the stream (e.g. microphone access denied).
            cpal::BuildStreamError::BackendSpecific { .. } => {
                VoiceError::PermissionDenied(e.to_string())
            }
            other => VoiceError::DeviceUnavailable(other.to_string()),
        })?;
    stream
        .play()
        .map_err(|e| VoiceError::DeviceUnavailable(e.to_string()))?;
    Ok(stream)
}

fn run_vad_loop(
    config: &MicConfig,
    running: &AtomicBool,
    chunks: std_mpsc::Receiver<Vec<f32>>,
    events: &mpsc::UnboundedSender<DeviceEvent>,
    runtime: &tokio::runtime::Handle,
    stt: &CloudStt,
) {
    let rate = match sample_rate(config.sample_rate) {
        Ok(rate) => rate,
        Err(e) => {
            error!("VAD init failed: {}", e);
            return;
        }
    };
    let mut vad = Vad::new();
    vad.set_mode(VadMode::Aggressive);
    vad.set_sample_rate(rate);
    let gap_frames = config.frames(config.gap);
    let min_speech_frames = config.frames(config.min_speech);
    let interim_frames = config.frames(config.interim_every).max(1);

    let mut phrase: Vec<f32> = Vec::new();
    let mut speech_frames = 0usize;
    let mut silent_frames = 0usize;
    let mut since_interim = 0usize;

    let transcribe = |samples: &[f32]| -> Option<String> {
        let wav = pcm_f32_to_wav(samples, config.sample_rate);
        match runtime.block_on(stt.transcribe(wav)) {
            Ok(text) if !text.is_empty() => Some(text),
            Ok(_) => None,
            Err(e) => {
                warn!("transcription failed: {}", e);
                let _ = events.send(DeviceEvent::Error(e.capture_kind()));
                None
            }
        }
    };

    while running.load(Ordering::SeqCst) {
        let chunk = match chunks.recv_timeout(Duration::from_millis(250)) {
            Ok(chunk) => chunk,
            Err(std_mpsc::RecvTimeoutError::Timeout) => continue,
            Err(std_mpsc::RecvTimeoutError::Disconnected) => break,
        };
        if chunk.len() != config.chunk_size {
            continue;
        }
        let pcm: Vec<i16> = chunk
            .iter()
            .map(|&s| (s.clamp(-1.0, 1.0) * 32767.0) as i16)
            .collect();
        let is_speech = vad.is_voice_segment(&pcm).unwrap_or(false);

        if is_speech {
            phrase.extend_from_slice(&chunk);
            speech_frames += 1;
            silent_frames = 0;
            since_interim += 1;
            if since_interim >= interim_frames {
                since_interim = 0;
                if let Some(text) = transcribe(&phrase) {
                    let _ = events.send(DeviceEvent::Result(vec![TranscriptFragment::interim(text)]));
                }
            }
            continue;
        }

        if phrase.is_empty() {
            continue;
        }
        phrase.extend_from_slice(&chunk);
        silent_frames += 1;
        if silent_frames < gap_frames {
            continue;
        }

        if speech_frames >= min_speech_frames {
            match transcribe(&phrase) {
                Some(text) => {
                    let _ = events.send(DeviceEvent::Result(vec![TranscriptFragment::final_text(text)]));
                }
                None => {
                    let _ = events.send(DeviceEvent::Error(CaptureErrorKind::NoSpeech));
                }
            }
        }
        phrase.clear();
        speech_frames = 0;
        silent_frames = 0;
        since_interim = 0;
    }
}
