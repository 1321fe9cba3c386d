//! Session service HTTP client.
//!
//! Everything outside the gateway socket goes through [`SessionService`]:
//! session creation and lookup, backend config, suggestions, transcripts and
//! the audio-upload transcription path.

use crate::consts::TRANSCRIPTION_PLACEHOLDER_PREFIX;
use crate::error::{ClientError, Result};
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode, Url};
use serde_json::Value;
use std::time::Duration;
use voice_tutor_types::LeadForm;
use voice_tutor_types::session::{BackendConfig, CreatedSession, Session, Suggestion};

#[cfg_attr(test, automock)]
#[async_trait]
pub trait SessionService: Send + Sync {
    async fn create_session(&self, form: &LeadForm) -> Result<CreatedSession>;

    /// `ClientError::NotFound` when the service does not know the id.
    async fn fetch_session(&self, session_id: &str) -> Result<Session>;

    async fn fetch_config(&self) -> Result<BackendConfig>;

    async fn fetch_suggestions(&self, grade: &str, intent: &str) -> Result<Vec<Suggestion>>;

    /// Plain-text transcript of the whole session.
    async fn fetch_transcript(&self, session_id: &str) -> Result<String>;

    /// Uploads a recording and returns the server-side filename to poll.
    async fn upload_audio(&self, audio: Vec<u8>, filename: &str, user_id: &str) -> Result<String>;

    /// `None` while the transcription is still being produced.
    async fn fetch_transcription(&self, filename: &str) -> Result<Option<String>>;
}

pub struct HttpSessionService {
    client: Client,
    origin: Url,
}

impl HttpSessionService {
    pub fn new(origin: &str) -> Result<Self> {
        let origin = Url::parse(origin).map_err(|e| ClientError::Url(format!("{}: {}", origin, e)))?;
        Ok(Self {
            client: Client::new(),
            origin,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.origin.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::Url(format!("{} cannot be a base", self.origin)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

/// Reads a `{ok, detail, ...}` JSON body, turning failures into errors that
/// carry the service's `detail` text.
async fn read_json(response: reqwest::Response, fallback: &str) -> Result<Value> {
    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        return Err(ClientError::NotFound);
    }
    let body: Value = response.json().await.unwrap_or_default();
    let ok = body.get("ok").and_then(Value::as_bool).unwrap_or(false);
    if !status.is_success() || !ok {
        let detail = detail_text(&body).unwrap_or_else(|| fallback.to_string());
        tracing::warn!("session service returned {}: {}", status, detail);
        return Err(ClientError::Service(detail));
    }
    Ok(body)
}

fn detail_text(body: &Value) -> Option<String> {
    match body.get("detail")? {
        Value::String(detail) => Some(detail.clone()),
        // Validation errors arrive as a list of {loc, msg} objects.
        Value::Array(items) => {
            let messages: Vec<&str> = items
                .iter()
                .filter_map(|item| item.get("msg").and_then(Value::as_str))
                .collect();
            (!messages.is_empty()).then(|| messages.join("; "))
        }
        _ => None,
    }
}

#[async_trait]
impl SessionService for HttpSessionService {
    async fn create_session(&self, form: &LeadForm) -> Result<CreatedSession> {
        let url = self.endpoint(&["sessions"])?;
        let response = self.client.post(url).json(form).send().await?;
        let body = read_json(response, "Failed to create session").await?;
        let created: CreatedSession = serde_json::from_value(body)?;
        tracing::info!("created session {}", created.session_id);
        Ok(created)
    }

    async fn fetch_session(&self, session_id: &str) -> Result<Session> {
        let url = self.endpoint(&["sessions", session_id])?;
        let response = self.client.get(url).send().await?;
        let mut body = read_json(response, "Failed to load session").await?;
        let session = body
            .get_mut("session")
            .map(Value::take)
            .ok_or_else(|| ClientError::Service("Session payload missing".to_string()))?;
        Ok(serde_json::from_value(session)?)
    }

    async fn fetch_config(&self) -> Result<BackendConfig> {
        let url = self.endpoint(&["config"])?;
        let config = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json::<BackendConfig>()
            .await?;
        Ok(config)
    }

    async fn fetch_suggestions(&self, grade: &str, intent: &str) -> Result<Vec<Suggestion>> {
        let url = self.endpoint(&["suggestions", grade, intent])?;
        let response = self.client.get(url).send().await?;
        let mut body = read_json(response, "Failed to load suggestions").await?;
        let suggestions = body
            .get_mut("suggestions")
            .map(Value::take)
            .unwrap_or(Value::Array(Vec::new()));
        Ok(serde_json::from_value(suggestions)?)
    }

    async fn fetch_transcript(&self, session_id: &str) -> Result<String> {
        let url = self.endpoint(&["sessions", session_id, "transcript"])?;
        let response = self.client.get(url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(ClientError::NotFound);
        }
        Ok(response.error_for_status()?.text().await?)
    }

    async fn upload_audio(&self, audio: Vec<u8>, filename: &str, user_id: &str) -> Result<String> {
        let url = self.endpoint(&["upload_audio"])?;
        let size = audio.len();
        let form = Form::new()
            .part("file", Part::bytes(audio).file_name(filename.to_string()))
            .text("user_id", user_id.to_string());
        let response = self.client.post(url).multipart(form).send().await?;
        let body = read_json(response, "Upload failed").await?;
        let stored = body
            .get("filename")
            .and_then(Value::as_str)
            .ok_or_else(|| ClientError::Service("Upload failed".to_string()))?;
        tracing::info!("uploaded {} bytes as {}", size, stored);
        Ok(stored.to_string())
    }

    async fn fetch_transcription(&self, filename: &str) -> Result<Option<String>> {
        let url = self.endpoint(&["transcription", filename])?;
        let body: Value = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        if !body.get("ok").and_then(Value::as_bool).unwrap_or(false) {
            return Ok(None);
        }
        Ok(body
            .get("transcription")
            .and_then(Value::as_str)
            .map(str::to_string))
    }
}

/// Whether a polled transcription is real speech rather than a placeholder.
pub fn is_usable_transcription(text: &str) -> bool {
    let text = text.trim();
    !text.is_empty() && !text.starts_with(TRANSCRIPTION_PLACEHOLDER_PREFIX)
}

/// Polls for the transcription of an uploaded file.
///
/// Waits `interval` before every attempt and gives up after `attempts`,
/// returning `Ok(None)`. A request error ends polling immediately.
pub async fn poll_transcription(
    service: &dyn SessionService,
    filename: &str,
    interval: Duration,
    attempts: u32,
) -> Result<Option<String>> {
    for attempt in 1..=attempts {
        tokio::time::sleep(interval).await;
        match service.fetch_transcription(filename).await? {
            Some(text) if is_usable_transcription(&text) => {
                return Ok(Some(text.trim().to_string()));
            }
            Some(text) => tracing::debug!("placeholder transcription for {}: {}", filename, text),
            None => tracing::debug!("transcription of {} not ready ({}/{})", filename, attempt, attempts),
        }
    }
    tracing::warn!("gave up on transcription of {} after {} attempts", filename, attempts);
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::Sequence;

    #[test]
    fn test_endpoint_encodes_segments() {
        let service = HttpSessionService::new("http://localhost:8000").unwrap();
        let url = service.endpoint(&["suggestions", "Grade 10", "Fees"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8000/suggestions/Grade%2010/Fees");

        let url = service.endpoint(&["sessions", "a/b", "transcript"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8000/sessions/a%2Fb/transcript");
    }

    #[test]
    fn test_detail_text_variants() {
        let body = serde_json::json!({"detail": "Invalid email"});
        assert_eq!(detail_text(&body).as_deref(), Some("Invalid email"));

        let body = serde_json::json!({"detail": [{"loc": ["body", "email"], "msg": "field required"}]});
        assert_eq!(detail_text(&body).as_deref(), Some("field required"));

        assert_eq!(detail_text(&serde_json::json!({"ok": false})), None);
    }

    #[test]
    fn test_placeholder_transcriptions_are_unusable() {
        assert!(is_usable_transcription("what are the fees"));
        assert!(!is_usable_transcription("(no speech detected)"));
        assert!(!is_usable_transcription("   "));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_skips_placeholders_until_ready() {
        let mut service = MockSessionService::new();
        let mut seq = Sequence::new();
        service
            .expect_fetch_transcription()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(None));
        service
            .expect_fetch_transcription()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(Some("(processing)".to_string())));
        service
            .expect_fetch_transcription()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(Some(" when can I enroll ".to_string())));

        let text = poll_transcription(&service, "rec.webm", Duration::from_secs(1), 30)
            .await
            .unwrap();
        assert_eq!(text.as_deref(), Some("when can I enroll"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_gives_up_after_attempts() {
        let mut service = MockSessionService::new();
        service
            .expect_fetch_transcription()
            .times(3)
            .returning(|_| Ok(None));

        let text = poll_transcription(&service, "rec.webm", Duration::from_secs(1), 3)
            .await
            .unwrap();
        assert_eq!(text, None);
    }
}
