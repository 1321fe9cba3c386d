use crate::playback::PlaybackState;
use tokio::sync::mpsc;
use voice_tutor_types::session::Suggestion;
use voice_tutor_types::{ConnectionState, Message, SpokenLanguage};

/// What the chat view needs to redraw. Emitted in the order state changed.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewEvent {
    MessageAppended(Message),
    Processing(bool),
    Connection(ConnectionState),
    Language(SpokenLanguage),
    /// Running speech-recognition text, empty when capture stops
    LiveTranscript(String),
    Recording(bool),
    Playback(PlaybackState),
    /// Realtime assistant speech was scheduled for output
    AssistantAudio { samples: usize },
    Suggestions(Vec<Suggestion>),
    /// Blocking notice the learner has to acknowledge
    Alert(String),
    Notice(String),
}

pub type ViewTx = mpsc::UnboundedSender<ViewEvent>;
pub type ViewRx = mpsc::UnboundedReceiver<ViewEvent>;

pub fn channel() -> (ViewTx, ViewRx) {
    mpsc::unbounded_channel()
}
