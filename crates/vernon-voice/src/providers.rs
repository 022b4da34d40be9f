//! Speech synthesis providers and the audio sinks that play their output.
//!
//! - [`CloudTts`]: OpenAI-compatible `/audio/speech` (OpenAI, OpenRouter, ...).
//! - [`CommandTts`]: on-device synthesis through a local command such as `espeak-ng --stdout`.
//! - [`CloudStt`]: OpenAI-compatible `/audio/transcriptions`, used by the microphone recognizer.
//! - [`NullSink`]: discards audio; used when no output device is compiled in.

use crate::error::{VoiceError, VoiceResult};
use crate::output::{AudioSink, CancelSignal, SpeechProvider, VoiceOptions};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use vernon_core::{EndpointConfig, Named};

/// Cloud TTS over an OpenAI-compatible API.
#[derive(Debug, Clone)]
pub struct CloudTts {
    name: String,
    /// Base URL without trailing slash (e.g. https://api.openai.com/v1).
    base_url: String,
    api_key: String,
    /// tts-1 (fast) or tts-1-hd.
    model: String,
    client: reqwest::Client,
}

impl CloudTts {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> VoiceResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| VoiceError::Tts(e.to_string()))?;
        Ok(Self {
            name: name.into(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            client,
        })
    }

    /// Build from an endpoint entry. `Ok(None)` when its API key env var is unset.
    pub fn from_endpoint(endpoint: &EndpointConfig) -> VoiceResult<Option<Self>> {
        let Some(api_key) = endpoint.api_key() else {
            info!(provider = %endpoint.name, key = %endpoint.api_key_env, "no API key, cloud TTS disabled");
            return Ok(None);
        };
        Self::new(&endpoint.name, &endpoint.base_url, api_key, &endpoint.model).map(Some)
    }

    fn speech_url(&self) -> String {
        format!("{}/audio/speech", self.base_url.trim_end_matches('/'))
    }
}

impl Named for CloudTts {
    fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl SpeechProvider for CloudTts {
    async fn synthesize(&self, text: &str, options: &VoiceOptions) -> VoiceResult<Option<Vec<u8>>> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }
        let body = serde_json::json!({
            "model": self.model,
            "input": text,
            "voice": options.voice,
            "speed": options.rate,
        });
        let res = self
            .client
            .post(self.speech_url())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(VoiceError::Tts(format!("TTS API error {}: {}", status, body)));
        }
        let bytes = res.bytes().await?;
        debug!(provider = %self.name, bytes = bytes.len(), "cloud TTS audio received");
        Ok(Some(bytes.to_vec()))
    }
}

/// On-device TTS: pipes text to a local command and reads WAV from its stdout.
#[derive(Debug, Clone)]
pub struct CommandTts {
    program: String,
    args: Vec<String>,
}

impl CommandTts {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// `espeak-ng --stdout`, reading text from stdin.
    pub fn espeak() -> Self {
        Self::new("espeak-ng", vec!["--stdout".to_string()])
    }

    /// espeak speed is words per minute around a 175 wpm default.
    fn rate_args(&self, options: &VoiceOptions) -> Vec<String> {
        if self.program.contains("espeak") && (options.rate - 1.0).abs() > f32::EPSILON {
            let wpm = (175.0 * options.rate).round().clamp(80.0, 450.0) as u32;
            vec!["-s".to_string(), wpm.to_string()]
        } else {
            Vec::new()
        }
    }
}

impl Named for CommandTts {
    fn name(&self) -> &str {
        &self.program
    }
}

#[async_trait]
impl SpeechProvider for CommandTts {
    async fn synthesize(&self, text: &str, options: &VoiceOptions) -> VoiceResult<Option<Vec<u8>>> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }
        let mut child = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .args(self.rate_args(options))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| VoiceError::Tts(format!("{} unavailable: {}", self.program, e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(text.as_bytes()).await?;
            stdin.shutdown().await?;
        }
        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(VoiceError::Tts(format!(
                "{} exited with {}",
                self.program, output.status
            )));
        }
        Ok(Some(output.stdout).filter(|audio| !audio.is_empty()))
    }
}

/// Encode f32 PCM (mono) as 16-bit WAV for upload.
pub fn pcm_f32_to_wav(samples: &[f32], sample_rate: u32) -> Vec<u8> {
    let data_len = (samples.len() * 2) as u32;
    let mut buf = Vec::with_capacity(44 + samples.len() * 2);
    buf.extend_from_slice(b"RIFF");
    buf.extend_from_slice(&(36 + data_len).to_le_bytes());
    buf.extend_from_slice(b"WAVE");
    buf.extend_from_slice(b"fmt ");
    buf.extend_from_slice(&16u32.to_le_bytes());
    buf.extend_from_slice(&1u16.to_le_bytes()); // PCM
    buf.extend_from_slice(&1u16.to_le_bytes()); // mono
    buf.extend_from_slice(&sample_rate.to_le_bytes());
    buf.extend_from_slice(&(sample_rate * 2).to_le_bytes());
    buf.extend_from_slice(&2u16.to_le_bytes());
    buf.extend_from_slice(&16u16.to_le_bytes());
    buf.extend_from_slice(b"data");
    buf.extend_from_slice(&data_len.to_le_bytes());
    for &s in samples {
        let sample = (s.clamp(-1.0, 1.0) * 32767.0).round() as i16;
        buf.extend_from_slice(&sample.to_le_bytes());
    }
    buf
}

/// Remote transcription over an OpenAI-compatible API (Whisper, gpt-4o-transcribe, ...).
#[derive(Debug, Clone)]
pub struct CloudStt {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl CloudStt {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> VoiceResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| VoiceError::Stt(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            client,
        })
    }

    /// `Ok(None)` when the endpoint's API key env var is unset.
    pub fn from_endpoint(endpoint: &EndpointConfig) -> VoiceResult<Option<Self>> {
        match endpoint.api_key() {
            Some(key) => Self::new(&endpoint.base_url, key, &endpoint.model).map(Some),
            None => Ok(None),
        }
    }

    /// Transcribe 16-bit WAV bytes. Empty string when nothing was recognized.
    pub async fn transcribe(&self, wav: Vec<u8>) -> VoiceResult<String> {
        let url = format!("{}/audio/transcriptions", self.base_url.trim_end_matches('/'));
        let part = reqwest::multipart::Part::bytes(wav)
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .map_err(|e| VoiceError::Stt(e.to_string()))?;
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", self.model.clone());
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(VoiceError::Stt(format!("STT API error {}: {}", status, body)));
        }
        let json: serde_json::Value = res.json().await?;
        Ok(json
            .get("text")
            .and_then(|t| t.as_str())
            .unwrap_or("")
            .trim()
            .to_string())
    }
}

/// Sink that drops audio immediately.
#[derive(Debug, Default)]
pub struct NullSink;

#[async_trait]
impl AudioSink for NullSink {
    async fn play(&self, audio: Vec<u8>, _cancel: CancelSignal) -> VoiceResult<()> {
        debug!(bytes = audio.len(), "NullSink: discarding audio");
        Ok(())
    }

    fn halt(&self) {}
}
