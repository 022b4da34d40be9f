//! Per-utterance context handed through middleware and processors.

use crate::pagination::{PageDirective, SharedPagination};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, OnceLock};
use uuid::Uuid;
use vernon_core::{SharedConversation, Utterance};

/// The single assistant message a pipeline run may produce.
///
/// A placeholder ("working on it") and the final reply occupy the same message: the
/// final text replaces the placeholder by id instead of appending a second one.
#[derive(Debug)]
pub struct ReplyHandle {
    conversation: SharedConversation,
    message: Mutex<Option<Uuid>>,
}

impl ReplyHandle {
    fn new(conversation: SharedConversation) -> Self {
        Self {
            conversation,
            message: Mutex::new(None),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<Uuid>> {
        self.message
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self, text: &str) -> Uuid {
        let mut slot = self.slot();
        if let Some(id) = *slot {
            if self.conversation.replace(id, text) {
                return id;
            }
        }
        let id = self.conversation.append(Utterance::assistant(text));
        *slot = Some(id);
        id
    }

    /// Show interim text now; the final reply will overwrite it.
    pub fn placeholder(&self, text: &str) -> Uuid {
        self.write(text)
    }

    /// Write the final reply.
    pub(crate) fn deliver(&self, text: &str) -> Uuid {
        self.write(text)
    }

    pub fn message_id(&self) -> Option<Uuid> {
        *self.slot()
    }
}

pub struct PipelineContext {
    /// The user's utterance. It enters the transcript once the run holds the busy gate.
    pub utterance: Utterance,
    /// Pagination directive found in this utterance, parsed once.
    pub directive: Option<PageDirective>,
    recent: OnceLock<Vec<Utterance>>,
    history_window: usize,
    pagination: SharedPagination,
    reply: ReplyHandle,
    conversation: SharedConversation,
    accepted: AtomicBool,
}

impl PipelineContext {
    pub fn new(
        text: &str,
        conversation: SharedConversation,
        pagination: SharedPagination,
        history_window: usize,
        directive: Option<PageDirective>,
    ) -> Self {
        Self {
            utterance: Utterance::user(text),
            directive,
            recent: OnceLock::new(),
            history_window,
            pagination,
            reply: ReplyHandle::new(conversation.clone()),
            conversation,
            accepted: AtomicBool::new(false),
        }
    }

    pub fn text(&self) -> &str {
        &self.utterance.text
    }

    /// Messages before this utterance, oldest first, as of [`Self::accept`].
    pub fn recent(&self) -> &[Utterance] {
        self.recent.get().map(Vec::as_slice).unwrap_or(&[])
    }

    /// Current page for `category` (after this utterance's directive was merged).
    pub fn page(&self, category: &str) -> u32 {
        self.pagination.page(category)
    }

    pub fn pagination(&self) -> &SharedPagination {
        &self.pagination
    }

    pub fn pages(&self) -> HashMap<String, u32> {
        self.pagination.snapshot()
    }

    pub fn reply(&self) -> &ReplyHandle {
        &self.reply
    }

    pub fn conversation(&self) -> &SharedConversation {
        &self.conversation
    }

    /// The run owns the pipeline: snapshot the history window, record the user utterance
    /// and merge pagination. Runs once.
    pub(crate) fn accept(&self) {
        if self.accepted.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.recent.set(self.conversation.recent(self.history_window));
        self.conversation.append(self.utterance.clone());
        if let Some(directive) = &self.directive {
            self.pagination.apply(directive);
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.accepted.load(Ordering::SeqCst)
    }
}
