//! Observable chat state: the message log, the pending-reply flag, the
//! detected language, the live transcript and suggestion visibility.

use std::time::Instant;
use voice_tutor_types::{Message, MessageRole, SpokenLanguage};

#[derive(Debug)]
pub struct Conversation {
    messages: Vec<Message>,
    pending_since: Option<Instant>,
    language: SpokenLanguage,
    live_transcript: String,
    show_suggestions: bool,
    dropped_envelopes: u64,
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

impl Conversation {
    pub fn new() -> Self {
        Self {
            messages: Vec::new(),
            pending_since: None,
            language: SpokenLanguage::default(),
            live_transcript: String::new(),
            show_suggestions: true,
            dropped_envelopes: 0,
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn find(&self, message_id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id() == message_id)
    }

    /// Appends a message. The log is append-only.
    pub fn append(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn is_pending(&self) -> bool {
        self.pending_since.is_some()
    }

    pub fn pending_since(&self) -> Option<Instant> {
        self.pending_since
    }

    pub fn begin_pending(&mut self, now: Instant) {
        self.pending_since = Some(now);
    }

    /// Clears the pending flag, returning whether it was set.
    pub fn clear_pending(&mut self) -> bool {
        self.pending_since.take().is_some()
    }

    pub fn language(&self) -> SpokenLanguage {
        self.language
    }

    /// Returns true when the language actually changed.
    pub fn set_language(&mut self, language: SpokenLanguage) -> bool {
        let changed = self.language != language;
        self.language = language;
        changed
    }

    pub fn live_transcript(&self) -> &str {
        &self.live_transcript
    }

    pub fn set_live_transcript(&mut self, transcript: &str) {
        self.live_transcript = transcript.to_string();
    }

    pub fn show_suggestions(&self) -> bool {
        self.show_suggestions
    }

    pub fn hide_suggestions(&mut self) {
        self.show_suggestions = false;
    }

    /// Contextual suggestions are offered only right after an assistant turn.
    pub fn awaiting_learner(&self) -> bool {
        self.last()
            .is_some_and(|m| m.role() == MessageRole::Assistant)
    }

    pub fn dropped_envelopes(&self) -> u64 {
        self.dropped_envelopes
    }

    pub(crate) fn record_dropped(&mut self) {
        self.dropped_envelopes += 1;
    }
}
