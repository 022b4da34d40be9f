//! Vernon configuration.
//!
//! Precedence: built-in defaults < TOML file (`VERNON_CONFIG`, default `config/vernon.toml`)
//! < environment (`VERNON__SECTION__KEY`). A `.env` file is loaded first when present.
//!
//! | Env | Default | Description |
//! |-----|---------|-------------|
//! | VERNON__PIPELINE__MAX_INPUT_CHARS | 5000 | Longer input is rejected before any processor runs. |
//! | VERNON__PIPELINE__BUSY_POLICY | queue | `queue` or `drop` an utterance that arrives while busy. |
//! | VERNON__VOICE__SILENCE_MS | 1200 | Quiet time before an utterance is finalized. |
//! | VERNON__VOICE__MAX_RESTARTS | 5 | Recognition auto-restarts before capture is forced off. |
//! | VERNON__PROVIDERS__LLM_MODE | mock | `mock` or `live`. |

use crate::error::VernonResult;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

const DEFAULT_CONFIG_PATH: &str = "config/vernon";

/// Top-level configuration for one assistant session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VernonConfig {
    /// Display name of the assistant (used in prompts).
    pub assistant_name: String,
    pub pipeline: PipelineConfig,
    pub voice: VoiceSettings,
    pub providers: ProvidersConfig,
}

impl Default for VernonConfig {
    fn default() -> Self {
        Self {
            assistant_name: "Vernon".to_string(),
            pipeline: PipelineConfig::default(),
            voice: VoiceSettings::default(),
            providers: ProvidersConfig::default(),
        }
    }
}

impl VernonConfig {
    /// Load from `.env`, the optional TOML file and `VERNON__*` environment variables.
    pub fn load() -> VernonResult<Self> {
        if let Err(e) = dotenvy::dotenv() {
            tracing::debug!(error = %e, ".env not loaded, using process environment");
        }
        let config_path =
            std::env::var("VERNON_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

        let builder = config::Config::builder()
            .set_default("assistant_name", "Vernon")?
            .set_default("pipeline.max_input_chars", 5000_i64)?
            .set_default("voice.silence_ms", 1200_i64)?;

        let with_toml = format!("{}.toml", config_path);
        let builder = if Path::new(&config_path).is_file() {
            builder.add_source(config::File::from(Path::new(&config_path)))
        } else if Path::new(&with_toml).is_file() {
            builder.add_source(config::File::from(Path::new(&with_toml)))
        } else {
            builder
        };

        let built = builder
            .add_source(
                config::Environment::with_prefix("VERNON")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(built.try_deserialize()?)
    }

    /// Parse a TOML document on top of the defaults (no environment, no `.env`).
    pub fn from_toml_str(toml: &str) -> VernonResult<Self> {
        let built = config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()?;
        Ok(built.try_deserialize()?)
    }
}

/// What to do with an utterance that arrives while a pipeline run is in flight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusyPolicy {
    /// Wait behind the running utterance (FIFO).
    #[default]
    Queue,
    /// Reject immediately.
    Drop,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub max_input_chars: usize,
    /// Most-recent-N messages handed to processors as prior context.
    pub history_window: usize,
    /// Provider text shorter than this counts as a failed strategy.
    pub min_result_chars: usize,
    pub busy_policy: BusyPolicy,
    pub provider_timeout_ms: u64,
    /// Venues per page when rendering directory results.
    pub page_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_input_chars: 5000,
            history_window: 10,
            min_result_chars: 100,
            busy_policy: BusyPolicy::Queue,
            provider_timeout_ms: 15_000,
            page_size: 5,
        }
    }
}

impl PipelineConfig {
    pub fn provider_timeout(&self) -> Duration {
        Duration::from_millis(self.provider_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceSettings {
    /// Quiet countdown before `SilenceDetected` fires.
    pub silence_ms: u64,
    /// Consecutive recognition restarts allowed before capture is forced off.
    pub max_restarts: u32,
    /// Interim transcripts must be longer than this to barge in.
    pub barge_in_min_chars: usize,
    /// Replies with this many sentences or more are spoken as one unit.
    pub max_sentences: usize,
    /// Whether replies are spoken.
    pub voice_mode: bool,
    pub voice: String,
    pub rate: f32,
    /// On-device synthesis command; must write WAV to stdout.
    pub device_tts_command: String,
    pub device_tts_args: Vec<String>,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            silence_ms: 1200,
            max_restarts: 5,
            barge_in_min_chars: 3,
            max_sentences: 20,
            voice_mode: false,
            voice: "nova".to_string(),
            rate: 1.0,
            device_tts_command: "espeak-ng".to_string(),
            device_tts_args: vec!["--stdout".to_string()],
        }
    }
}

impl VoiceSettings {
    pub fn silence_threshold(&self) -> Duration {
        Duration::from_millis(self.silence_ms)
    }
}

/// Mode for text generation: deterministic mock or live HTTP providers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmMode {
    #[default]
    Mock,
    Live,
}

/// One OpenAI-compatible HTTP endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub name: String,
    /// Base URL without trailing slash (e.g. https://openrouter.ai/api/v1).
    pub base_url: String,
    pub model: String,
    /// Name of the environment variable that holds the bearer key.
    pub api_key_env: String,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

impl EndpointConfig {
    pub fn new(name: &str, base_url: &str, model: &str, api_key_env: &str) -> Self {
        Self {
            name: name.to_string(),
            base_url: base_url.to_string(),
            model: model.to_string(),
            api_key_env: api_key_env.to_string(),
            temperature: None,
            max_tokens: None,
        }
    }

    /// Resolved API key; `None` when the variable is unset or blank.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub llm_mode: LlmMode,
    /// Text-generation providers in fallback order.
    pub generators: Vec<EndpointConfig>,
    /// Search providers in fallback order; the first is the "general" provider.
    pub search: Vec<EndpointConfig>,
    pub tts: Option<EndpointConfig>,
    pub stt: Option<EndpointConfig>,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            llm_mode: LlmMode::Mock,
            generators: vec![
                EndpointConfig::new(
                    "openrouter",
                    "https://openrouter.ai/api/v1",
                    "meta-llama/llama-3.3-70b-instruct",
                    "OPENROUTER_API_KEY",
                ),
                EndpointConfig::new(
                    "openai",
                    "https://api.openai.com/v1",
                    "gpt-4o-mini",
                    "OPENAI_API_KEY",
                ),
            ],
            search: vec![
                EndpointConfig::new(
                    "perplexity",
                    "https://api.perplexity.ai",
                    "sonar",
                    "PERPLEXITY_API_KEY",
                ),
                EndpointConfig::new(
                    "openrouter-search",
                    "https://openrouter.ai/api/v1",
                    "perplexity/sonar",
                    "OPENROUTER_API_KEY",
                ),
            ],
            tts: Some(EndpointConfig::new(
                "openai-tts",
                "https://api.openai.com/v1",
                "tts-1",
                "OPENAI_API_KEY",
            )),
            stt: Some(EndpointConfig::new(
                "openai-stt",
                "https://api.openai.com/v1",
                "whisper-1",
                "OPENAI_API_KEY",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = VernonConfig::default();
        assert_eq!(c.pipeline.max_input_chars, 5000);
        assert_eq!(c.pipeline.min_result_chars, 100);
        assert_eq!(c.voice.silence_ms, 1200);
        assert_eq!(c.voice.max_restarts, 5);
        assert_eq!(c.voice.barge_in_min_chars, 3);
        assert_eq!(c.providers.llm_mode, LlmMode::Mock);
    }

    #[test]
    fn toml_overrides_only_named_keys() {
        let c = VernonConfig::from_toml_str(
            r#"
            [pipeline]
            busy_policy = "drop"
            history_window = 4

            [voice]
            silence_ms = 900
            "#,
        )
        .unwrap();
        assert_eq!(c.pipeline.busy_policy, BusyPolicy::Drop);
        assert_eq!(c.pipeline.history_window, 4);
        assert_eq!(c.pipeline.max_input_chars, 5000);
        assert_eq!(c.voice.silence_threshold(), Duration::from_millis(900));
        assert_eq!(c.assistant_name, "Vernon");
    }

    #[test]
    fn blank_api_key_is_none() {
        let endpoint = EndpointConfig::new("x", "http://localhost", "m", "VERNON_TEST_UNSET_KEY_ENV");
        assert!(endpoint.api_key().is_none());
    }
}
