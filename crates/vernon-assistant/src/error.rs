//! Session-level errors

use thiserror::Error;
use vernon_core::VernonError;
use vernon_voice::VoiceError;

pub type AssistantResult<T> = Result<T, AssistantError>;

#[derive(Error, Debug)]
pub enum AssistantError {
    #[error(transparent)]
    Core(#[from] VernonError),

    #[error(transparent)]
    Voice(#[from] VoiceError),
}
