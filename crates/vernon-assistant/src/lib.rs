//! vernon-assistant: the session the presentation layer drives.
//!
//! ```text
//! send_message(text) ──────────────────────────────┐
//!                                                  ▼
//! mic ─► capture ─► barge-in check ─► silence ─► pipeline ─► reply (+ speech in voice mode)
//! ```
//!
//! `toggle_listening`, `stop` and `snapshot` complete the surface. No network ports or
//! files are owned here; front-ends (see `add-ons/vernon-console`) sit on top.

pub mod error;
pub mod parts;
pub mod session;
mod voice_loop;

pub use error::{AssistantError, AssistantResult};
pub use parts::{NoMicrophone, SessionParts};
pub use session::{stop_notice, VernonSession};
