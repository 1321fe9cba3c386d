use chrono::{DateTime, Utc};

/// One conversation turn as rendered to the learner.
///
/// Messages are append-only: once built they are never mutated, so the type
/// only exposes getters.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct Message {
    /// Locally generated identifier, unique within the process
    id: String,

    /// The role of the message sender: "user" or "assistant"
    role: MessageRole,

    /// The text of the turn
    text: String,

    /// Absolute URL of the synthesized reply, chained mode only
    #[serde(skip_serializing_if = "Option::is_none")]
    audio_url: Option<String>,

    created_at: DateTime<Utc>,
}

impl Message {
    pub fn builder() -> MessageBuilder {
        MessageBuilder::new()
    }

    pub fn user(text: &str) -> Self {
        Self::builder().with_role(MessageRole::User).with_text(text).build()
    }

    pub fn assistant(text: &str) -> Self {
        Self::builder()
            .with_role(MessageRole::Assistant)
            .with_text(text)
            .build()
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn role(&self) -> MessageRole {
        self.role
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn audio_url(&self) -> Option<&str> {
        self.audio_url.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

pub struct MessageBuilder {
    message: Message,
}

impl Default for MessageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageBuilder {
    pub fn new() -> Self {
        Self {
            message: Message {
                id: uuid::Uuid::new_v4().to_string(),
                role: MessageRole::User,
                text: String::new(),
                audio_url: None,
                created_at: Utc::now(),
            },
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.message.id = id.to_string();
        self
    }

    pub fn with_role(mut self, role: MessageRole) -> Self {
        self.message.role = role;
        self
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.message.text = text.to_string();
        self
    }

    pub fn with_audio_url(mut self, audio_url: Option<String>) -> Self {
        self.message.audio_url = audio_url;
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.message.created_at = created_at;
        self
    }

    pub fn build(self) -> Message {
        self.message
    }
}

#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub enum MessageRole {
    #[serde(rename = "user")]
    User,
    #[serde(rename = "assistant")]
    Assistant,
}

/// A past turn as stored by the session service.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct ConversationTurn {
    pub role: MessageRole,
    pub text: String,
    #[serde(default)]
    pub audio_file: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
}
