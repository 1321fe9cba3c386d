//! Inbound protocol dispatch.
//!
//! Parses gateway frames into [`ServerEvent`]s and applies them to the chat
//! state, returning the view updates they caused. Frames that cannot be
//! parsed are logged, counted and otherwise ignored.

use crate::conversation::Conversation;
use crate::playback::RealtimePlayer;
use crate::view::ViewEvent;
use voice_tutor_types::{ArchitectureMode, Message, ServerEvent, SpokenLanguage};

pub struct Dispatcher {
    mode: ArchitectureMode,
    origin: String,
}

impl Dispatcher {
    pub fn new(mode: ArchitectureMode, origin: &str) -> Self {
        Self {
            mode,
            origin: origin.trim_end_matches('/').to_string(),
        }
    }

    pub fn mode(&self) -> ArchitectureMode {
        self.mode
    }

    /// Parses one frame, `None` for unknown types and malformed JSON.
    pub fn parse(raw: &str) -> Option<ServerEvent> {
        match serde_json::from_str::<ServerEvent>(raw) {
            Ok(event) => Some(event),
            Err(e) => {
                tracing::warn!("ignoring unrecognized frame: {} ({})", preview(raw), e);
                None
            }
        }
    }

    pub fn dispatch(
        &self,
        raw: &str,
        conversation: &mut Conversation,
        player: &mut RealtimePlayer,
    ) -> Vec<ViewEvent> {
        match Self::parse(raw) {
            Some(event) => self.apply(event, conversation, player),
            None => {
                conversation.record_dropped();
                Vec::new()
            }
        }
    }

    pub fn apply(
        &self,
        event: ServerEvent,
        conversation: &mut Conversation,
        player: &mut RealtimePlayer,
    ) -> Vec<ViewEvent> {
        tracing::debug!("received {} in {} mode", event.kind(), self.mode);
        if !belongs_to(&event, self.mode) {
            tracing::debug!("{} is not a {} envelope, applying anyway", event.kind(), self.mode);
        }

        let mut updates = Vec::new();
        match event {
            ServerEvent::Final(event) => {
                let message = Message::builder()
                    .with_role(voice_tutor_types::MessageRole::Assistant)
                    .with_text(event.text())
                    .with_audio_url(event.audio_url().map(|path| self.resolve(path)))
                    .build();
                append(conversation, message, &mut updates);
                clear_pending(conversation, &mut updates);
                let language = SpokenLanguage::detect(event.text());
                if conversation.set_language(language) {
                    tracing::info!("assistant switched to {}", language);
                    updates.push(ViewEvent::Language(language));
                }
            }
            ServerEvent::Transcription(event) => {
                append(conversation, Message::user(event.text()), &mut updates);
                conversation.set_live_transcript(event.text());
                updates.push(ViewEvent::LiveTranscript(event.text().to_string()));
            }
            ServerEvent::Transcript(event) => {
                append(conversation, Message::assistant(event.text()), &mut updates);
                clear_pending(conversation, &mut updates);
            }
            ServerEvent::Audio(event) => match player.play_chunk(event.audio()) {
                Ok(samples) => updates.push(ViewEvent::AssistantAudio { samples }),
                Err(e) => tracing::warn!("dropping assistant audio: {}", e),
            },
            ServerEvent::Connected(event) => {
                tracing::info!("gateway ready: {}", event.message().unwrap_or("connected"));
                if let Some(message) = event.message() {
                    updates.push(ViewEvent::Notice(message.to_string()));
                }
            }
            ServerEvent::Error(event) => {
                tracing::warn!("gateway error: {}", event.message());
                let text = format!("Error: {}", event.message());
                append(conversation, Message::assistant(&text), &mut updates);
            }
        }
        updates
    }

    /// Resolves a server-relative audio path against the backend origin.
    pub fn resolve(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        if path.starts_with('/') {
            format!("{}{}", self.origin, path)
        } else {
            format!("{}/{}", self.origin, path)
        }
    }
}

fn belongs_to(event: &ServerEvent, mode: ArchitectureMode) -> bool {
    match event {
        ServerEvent::Final(_) | ServerEvent::Transcription(_) => mode == ArchitectureMode::Chained,
        ServerEvent::Transcript(_) | ServerEvent::Audio(_) | ServerEvent::Connected(_) => {
            mode == ArchitectureMode::Realtime
        }
        ServerEvent::Error(_) => true,
    }
}

fn append(conversation: &mut Conversation, message: Message, updates: &mut Vec<ViewEvent>) {
    conversation.append(message.clone());
    updates.push(ViewEvent::MessageAppended(message));
}

fn clear_pending(conversation: &mut Conversation, updates: &mut Vec<ViewEvent>) {
    if conversation.clear_pending() {
        updates.push(ViewEvent::Processing(false));
    }
}

fn preview(raw: &str) -> String {
    const MAX: usize = 80;
    match raw.char_indices().nth(MAX) {
        Some((index, _)) => format!("{}...", &raw[..index]),
        None => raw.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::tests::{FakeContext, Recorder};
    use std::time::Instant;
    use voice_tutor_types::MessageRole;

    fn chained() -> (Dispatcher, Conversation, RealtimePlayer) {
        (
            Dispatcher::new(ArchitectureMode::Chained, "https://api.example.com/"),
            Conversation::new(),
            RealtimePlayer::new(),
        )
    }

    #[test]
    fn test_unknown_and_malformed_frames_are_swallowed() {
        let (dispatcher, mut conversation, mut player) = chained();

        for raw in [
            r#"{"type":"mystery","text":"x"}"#,
            r#"{"text":"no type"}"#,
            "not json at all",
            r#"{"type":"final"}"#,
        ] {
            let updates = dispatcher.dispatch(raw, &mut conversation, &mut player);
            assert!(updates.is_empty());
        }
        assert!(conversation.messages().is_empty());
        assert_eq!(conversation.dropped_envelopes(), 4);
    }

    #[test]
    fn test_hindi_final_appends_and_switches_language() {
        let (dispatcher, mut conversation, mut player) = chained();
        conversation.begin_pending(Instant::now());

        let updates = dispatcher.dispatch(
            r#"{"type":"final","text":"नमस्ते","audio_url":"/audio/x.mp3"}"#,
            &mut conversation,
            &mut player,
        );

        let message = conversation.last().unwrap();
        assert_eq!(message.role(), MessageRole::Assistant);
        assert_eq!(message.text(), "नमस्ते");
        assert_eq!(message.audio_url(), Some("https://api.example.com/audio/x.mp3"));
        assert!(!conversation.is_pending());
        assert_eq!(conversation.language(), SpokenLanguage::Hindi);
        assert_eq!(
            &updates[1..],
            &[
                ViewEvent::Processing(false),
                ViewEvent::Language(SpokenLanguage::Hindi)
            ]
        );
    }

    #[test]
    fn test_processing_clears_once_per_reply() {
        let (dispatcher, mut conversation, mut player) = chained();
        conversation.begin_pending(Instant::now());

        let first = dispatcher.dispatch(r#"{"type":"final","text":"a"}"#, &mut conversation, &mut player);
        let second = dispatcher.dispatch(r#"{"type":"final","text":"b"}"#, &mut conversation, &mut player);

        let cleared = |updates: &[ViewEvent]| {
            updates
                .iter()
                .filter(|u| **u == ViewEvent::Processing(false))
                .count()
        };
        assert_eq!(cleared(&first), 1);
        assert_eq!(cleared(&second), 0);
        assert_eq!(conversation.messages().len(), 2);
    }

    #[test]
    fn test_transcription_echo_is_user_turn() {
        let (dispatcher, mut conversation, mut player) = chained();
        conversation.begin_pending(Instant::now());

        dispatcher.dispatch(
            r#"{"type":"transcription","text":"what are the fees"}"#,
            &mut conversation,
            &mut player,
        );

        assert_eq!(conversation.last().unwrap().role(), MessageRole::User);
        assert_eq!(conversation.live_transcript(), "what are the fees");
        assert!(conversation.is_pending(), "only a reply clears pending");
    }

    #[test]
    fn test_error_frame_becomes_assistant_message() {
        let (dispatcher, mut conversation, mut player) = chained();
        dispatcher.dispatch(r#"{"type":"error","message":"boom"}"#, &mut conversation, &mut player);
        assert_eq!(conversation.last().unwrap().text(), "Error: boom");
    }

    #[test]
    fn test_realtime_audio_frames_play_in_order() {
        let dispatcher = Dispatcher::new(ArchitectureMode::Realtime, "http://localhost:8000");
        let mut conversation = Conversation::new();
        let mut player = RealtimePlayer::new();
        let recorder = Recorder::default();
        player.attach(Box::new(FakeContext {
            recorder: recorder.clone(),
        }));

        for len in 1..=5 {
            let audio = voice_tutor_utils::audio::encode_i16(&vec![7; len]);
            let raw = serde_json::json!({"type": "audio", "audio": audio}).to_string();
            let updates = dispatcher.dispatch(&raw, &mut conversation, &mut player);
            assert_eq!(updates, vec![ViewEvent::AssistantAudio { samples: len }]);
        }

        assert_eq!(
            recorder.entries(),
            vec!["buffer 1", "buffer 2", "buffer 3", "buffer 4", "buffer 5"]
        );
        assert!(conversation.messages().is_empty());
    }

    #[test]
    fn test_audio_without_context_is_dropped() {
        let dispatcher = Dispatcher::new(ArchitectureMode::Realtime, "http://localhost:8000");
        let mut conversation = Conversation::new();
        let mut player = RealtimePlayer::new();

        let updates = dispatcher.dispatch(r#"{"type":"audio","audio":"AAAA"}"#, &mut conversation, &mut player);
        assert!(updates.is_empty());
    }

    #[test]
    fn test_resolve_keeps_absolute_urls() {
        let dispatcher = Dispatcher::new(ArchitectureMode::Chained, "http://localhost:8000");
        assert_eq!(dispatcher.resolve("https://cdn/a.mp3"), "https://cdn/a.mp3");
        assert_eq!(dispatcher.resolve("audio/a.mp3"), "http://localhost:8000/audio/a.mp3");
    }
}
