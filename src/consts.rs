pub const BACKEND_ORIGIN: &str = "BACKEND_ORIGIN";
pub const CHANNEL_CAPACITY: &str = "CHANNEL_CAPACITY";
pub const SESSION_CACHE_PATH: &str = "SESSION_CACHE_PATH";
pub const SESSION_TTL_HOURS: &str = "SESSION_TTL_HOURS";
pub const TRANSCRIPTION_POLL_INTERVAL_MS: &str = "TRANSCRIPTION_POLL_INTERVAL_MS";
pub const TRANSCRIPTION_POLL_ATTEMPTS: &str = "TRANSCRIPTION_POLL_ATTEMPTS";
pub const RESPONSE_TIMEOUT_SECS: &str = "RESPONSE_TIMEOUT_SECS";

pub const DEFAULT_BACKEND_ORIGIN: &str = "http://localhost:8000";
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;
pub const DEFAULT_SESSION_CACHE_PATH: &str = ".voice-tutor/session.json";
pub const DEFAULT_SESSION_TTL_HOURS: i64 = 24;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_POLL_ATTEMPTS: u32 = 30;

pub const SESSION_ID_QUERY: &str = "session_id";

/// Transcriptions starting with this are service placeholders, not speech.
pub const TRANSCRIPTION_PLACEHOLDER_PREFIX: char = '(';
