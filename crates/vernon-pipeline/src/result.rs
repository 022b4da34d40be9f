use serde::{Deserialize, Serialize};

const BUSY: &str = "busy";

/// Outcome of one processor (or middleware short-circuit).
///
/// `handled = false` means "not mine". `handled = true, success = false` means the
/// processor owns the utterance but failed; the pipeline does not fall through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub success: bool,
    pub handled: bool,
    pub response: Option<String>,
    pub error: Option<String>,
}

impl ProcessingResult {
    pub fn reply(text: impl Into<String>) -> Self {
        Self {
            success: true,
            handled: true,
            response: Some(text.into()),
            error: None,
        }
    }

    /// Owned but failed; `response` is what the user sees instead.
    pub fn failed(error: impl Into<String>, response: impl Into<String>) -> Self {
        Self {
            success: false,
            handled: true,
            response: Some(response.into()),
            error: Some(error.into()),
        }
    }

    /// Rejected before any processor ran; no reply is produced.
    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            success: false,
            handled: true,
            response: None,
            error: Some(error.into()),
        }
    }

    /// Turned away because another run holds the pipeline; nothing enters the transcript.
    pub fn busy(response: impl Into<String>) -> Self {
        Self::failed(BUSY, response)
    }

    pub fn is_busy(&self) -> bool {
        self.error.as_deref() == Some(BUSY)
    }

    pub fn not_handled() -> Self {
        Self {
            success: false,
            handled: false,
            response: None,
            error: None,
        }
    }
}
