use voice_tutor_types::ConnectionState;

/// Errors surfaced by the chat client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Missing required lead fields: {}", .0.join(", "))]
    InvalidLead(Vec<&'static str>),
    /// The session service answered with an error; carries its `detail` text.
    #[error("{0}")]
    Service(String),
    #[error("Session not found")]
    NotFound,
    #[error("Session expired")]
    SessionExpired,
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Invalid URL: {0}")]
    Url(String),
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("Channel is {0}, not connected")]
    NotConnected(ConnectionState),
    #[error("Already connected")]
    AlreadyConnected,
    #[error("A response is still pending")]
    ResponsePending,
    #[error("Another input is active")]
    InputBusy,
    #[error("Outbound channel closed")]
    ChannelClosed,
    #[error("Chat session already ran")]
    AlreadyRunning,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Playback(#[from] PlaybackError),
}

/// Failures of the speech or microphone capture capability.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CaptureError {
    #[error("Speech recognition is not supported here. Please type your message.")]
    Unavailable,
    #[error("Microphone access denied. Please allow microphone access or type your message.")]
    PermissionDenied,
    #[error("Could not start capture: {0}")]
    Failed(String),
}

/// Failures of the audio output capability.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlaybackError {
    #[error("Audio output unavailable: {0}")]
    Unavailable(String),
    #[error("Audio playback failed: {0}")]
    Failed(String),
    #[error("Invalid audio payload: {0}")]
    Decode(String),
}

pub type Result<T> = std::result::Result<T, ClientError>;
