use crate::audio::Base64EncodedAudioBytes;

/// `final` event
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FinalEvent {
    text: String,

    /// Path of the synthesized reply relative to the backend origin
    #[serde(default)]
    audio_url: Option<String>,
}

impl FinalEvent {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
            audio_url: None,
        }
    }

    pub fn with_audio_url(mut self, audio_url: &str) -> Self {
        self.audio_url = Some(audio_url.to_string());
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn audio_url(&self) -> Option<&str> {
        self.audio_url.as_deref()
    }
}

/// `transcription` event
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TranscriptionEvent {
    text: String,
}

impl TranscriptionEvent {
    pub fn text(&self) -> &str {
        &self.text
    }
}

/// `transcript` event
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TranscriptEvent {
    text: String,
}

impl TranscriptEvent {
    pub fn text(&self) -> &str {
        &self.text
    }
}

/// `audio` event
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AudioDeltaEvent {
    audio: Base64EncodedAudioBytes,
}

impl AudioDeltaEvent {
    pub fn new(audio: Base64EncodedAudioBytes) -> Self {
        Self { audio }
    }

    pub fn audio(&self) -> &str {
        &self.audio
    }
}

/// `connected` event
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ConnectedEvent {
    #[serde(default)]
    message: Option<String>,
}

impl ConnectedEvent {
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

/// `error` event
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ErrorEvent {
    message: String,
}

impl ErrorEvent {
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}
