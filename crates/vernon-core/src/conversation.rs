//! Conversation model: utterances, the per-session state and its shared handle.
//!
//! Utterances are immutable once created. The transcript only grows, except that a
//! placeholder may be replaced in place (same id, same position) by its final text.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use uuid::Uuid;

/// Who produced an utterance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    User,
    Assistant,
}

/// One turn of user or assistant text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Utterance {
    pub id: Uuid,
    pub text: String,
    pub origin: Origin,
    pub created_at: DateTime<Utc>,
}

impl Utterance {
    pub fn new(origin: Origin, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
            origin,
            created_at: Utc::now(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Origin::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Origin::Assistant, text)
    }
}

/// Mutable session-scoped record. One exists per open chat session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationState {
    pub messages: Vec<Utterance>,
    pub is_capturing: bool,
    pub is_busy: bool,
    pub is_speaking: bool,
    pub interim_text: String,
    pub final_text: String,
}

/// Cheap, cloneable handle to the session's [`ConversationState`].
///
/// Every mutation bumps a revision counter observers can `subscribe` to.
#[derive(Debug, Clone)]
pub struct SharedConversation {
    state: Arc<Mutex<ConversationState>>,
    revision: Arc<watch::Sender<u64>>,
}

impl Default for SharedConversation {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedConversation {
    pub fn new() -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            state: Arc::new(Mutex::new(ConversationState::default())),
            revision: Arc::new(revision),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ConversationState> {
        // A poisoned lock only means a panicking writer; the state itself is still coherent.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn update<R>(&self, f: impl FnOnce(&mut ConversationState) -> R) -> R {
        let out = f(&mut self.lock());
        self.revision.send_modify(|r| *r = r.wrapping_add(1));
        out
    }

    /// Read-only copy for rendering.
    pub fn snapshot(&self) -> ConversationState {
        self.lock().clone()
    }

    /// Receiver that changes on every mutation.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    pub fn append(&self, utterance: Utterance) -> Uuid {
        let id = utterance.id;
        self.update(|s| s.messages.push(utterance));
        id
    }

    /// Swap the text of the message with `id`, keeping its identity and position.
    /// Returns false if no such message exists.
    pub fn replace(&self, id: Uuid, text: impl Into<String>) -> bool {
        let text = text.into();
        self.update(|s| match s.messages.iter_mut().find(|m| m.id == id) {
            Some(existing) => {
                *existing = Utterance {
                    id,
                    text,
                    origin: existing.origin,
                    created_at: Utc::now(),
                };
                true
            }
            None => false,
        })
    }

    /// Most recent `n` messages, oldest first.
    pub fn recent(&self, n: usize) -> Vec<Utterance> {
        let state = self.lock();
        let start = state.messages.len().saturating_sub(n);
        state.messages[start..].to_vec()
    }

    pub fn message_count(&self) -> usize {
        self.lock().messages.len()
    }

    pub fn set_busy(&self, busy: bool) {
        self.update(|s| s.is_busy = busy);
    }

    pub fn set_capturing(&self, capturing: bool) {
        self.update(|s| s.is_capturing = capturing);
    }

    pub fn set_speaking(&self, speaking: bool) {
        self.update(|s| s.is_speaking = speaking);
    }

    pub fn set_transcript(&self, final_text: &str, interim_text: &str) {
        self.update(|s| {
            s.final_text.clear();
            s.final_text.push_str(final_text);
            s.interim_text.clear();
            s.interim_text.push_str(interim_text);
        });
    }

    pub fn clear_transcript(&self) {
        self.set_transcript("", "");
    }

    pub fn is_busy(&self) -> bool {
        self.lock().is_busy
    }

    pub fn is_capturing(&self) -> bool {
        self.lock().is_capturing
    }

    pub fn is_speaking(&self) -> bool {
        self.lock().is_speaking
    }
}
