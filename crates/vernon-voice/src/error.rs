//! Error types for the Vernon voice layer

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for voice operations
pub type VoiceResult<T> = Result<T, VoiceError>;

/// Errors that can occur in capture, synthesis or playback
#[derive(Error, Debug)]
pub enum VoiceError {
    #[error("Microphone permission denied: {0}")]
    PermissionDenied(String),

    #[error("Audio device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("No speech detected")]
    NoSpeech,

    #[error("Audio playback error: {0}")]
    Playback(String),

    #[error("TTS error: {0}")]
    Tts(String),

    #[error("STT error: {0}")]
    Stt(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl VoiceError {
    /// Where this error falls in the capture taxonomy.
    pub fn capture_kind(&self) -> CaptureErrorKind {
        match self {
            VoiceError::PermissionDenied(_) => CaptureErrorKind::PermissionDenied,
            VoiceError::DeviceUnavailable(_) => CaptureErrorKind::DeviceUnavailable,
            VoiceError::Network(_) => CaptureErrorKind::Network,
            VoiceError::NoSpeech => CaptureErrorKind::NoSpeech,
            _ => CaptureErrorKind::Unknown,
        }
    }
}

impl From<reqwest::Error> for VoiceError {
    fn from(err: reqwest::Error) -> Self {
        VoiceError::Network(err.to_string())
    }
}

/// Capture error taxonomy surfaced to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CaptureErrorKind {
    PermissionDenied,
    /// Non-terminal; ignored.
    NoSpeech,
    Network,
    DeviceUnavailable,
    Unknown,
}

impl CaptureErrorKind {
    /// Recoverable without user action.
    pub fn is_recoverable(self) -> bool {
        !matches!(
            self,
            CaptureErrorKind::PermissionDenied | CaptureErrorKind::DeviceUnavailable
        )
    }
}

impl std::fmt::Display for CaptureErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CaptureErrorKind::PermissionDenied => "permission-denied",
            CaptureErrorKind::NoSpeech => "no-speech",
            CaptureErrorKind::Network => "network",
            CaptureErrorKind::DeviceUnavailable => "device-unavailable",
            CaptureErrorKind::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_permission_and_device_need_the_user() {
        assert!(!CaptureErrorKind::PermissionDenied.is_recoverable());
        assert!(!CaptureErrorKind::DeviceUnavailable.is_recoverable());
        assert!(CaptureErrorKind::Network.is_recoverable());
        assert!(CaptureErrorKind::NoSpeech.is_recoverable());
        assert!(CaptureErrorKind::Unknown.is_recoverable());
    }

    #[test]
    fn errors_map_to_taxonomy() {
        assert_eq!(
            VoiceError::PermissionDenied("denied".into()).capture_kind(),
            CaptureErrorKind::PermissionDenied
        );
        assert_eq!(
            VoiceError::Playback("x".into()).capture_kind(),
            CaptureErrorKind::Unknown
        );
        assert_eq!(CaptureErrorKind::NoSpeech.to_string(), "no-speech");
    }
}
