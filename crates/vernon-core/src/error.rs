//! Error types shared by the Vernon crates

use thiserror::Error;

/// Result type alias for core and pipeline operations
pub type VernonResult<T> = Result<T, VernonError>;

/// Errors that can occur while answering an utterance
#[derive(Error, Debug)]
pub enum VernonError {
    #[error("Input rejected: {0}")]
    Validation(String),

    #[error("Provider {provider} failed: {message}")]
    Provider { provider: String, message: String },

    #[error("Provider {provider} returned an unusable result ({len} chars)")]
    ShortResult { provider: String, len: usize },

    #[error("Provider {provider} timed out after {timeout_ms}ms")]
    Timeout { provider: String, timeout_ms: u64 },

    #[error("All {attempted} providers failed")]
    ChainExhausted { attempted: usize },

    #[error("Booking error: {0}")]
    Booking(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Pipeline busy, utterance dropped")]
    Busy,
}

impl VernonError {
    /// Shorthand for a provider failure.
    pub fn provider(provider: impl Into<String>, message: impl ToString) -> Self {
        VernonError::Provider {
            provider: provider.into(),
            message: message.to_string(),
        }
    }

    /// Recoverable provider errors are converted into "try the next option" and never shown raw.
    pub fn is_recoverable_provider(&self) -> bool {
        matches!(
            self,
            VernonError::Provider { .. }
                | VernonError::ShortResult { .. }
                | VernonError::Timeout { .. }
                | VernonError::ChainExhausted { .. }
        )
    }
}

impl From<config::ConfigError> for VernonError {
    fn from(err: config::ConfigError) -> Self {
        VernonError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_errors_are_recoverable() {
        assert!(VernonError::provider("sonar", "503").is_recoverable_provider());
        assert!(VernonError::Timeout {
            provider: "sonar".into(),
            timeout_ms: 10
        }
        .is_recoverable_provider());
        assert!(!VernonError::Validation("empty".into()).is_recoverable_provider());
    }
}
