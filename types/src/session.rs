use crate::content::message::ConversationTurn;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// The session record held by the session service.
///
/// Read-only once created. Only `session_id` is guaranteed; the rest of the
/// fields are filled in by `GET /sessions/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    session_id: String,
    #[serde(default)]
    grade: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    mobile: String,
    #[serde(default)]
    intent: Intent,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
    /// Hard expiry, when the service provides one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    detected_language: Option<String>,
    #[serde(default)]
    conversation: Vec<ConversationTurn>,
}

impl Session {
    pub fn new(session_id: &str, form: &LeadForm) -> Self {
        Self {
            session_id: session_id.to_string(),
            grade: form.grade.clone(),
            name: form.name.clone(),
            email: form.email.clone(),
            mobile: form.mobile.clone(),
            intent: form.intent.clone(),
            created_at: None,
            updated_at: None,
            expires_at: None,
            detected_language: None,
            conversation: Vec::new(),
        }
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    pub fn with_expires_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn grade(&self) -> &str {
        &self.grade
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn mobile(&self) -> &str {
        &self.mobile
    }

    pub fn intent(&self) -> &Intent {
        &self.intent
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    pub fn detected_language(&self) -> Option<&str> {
        self.detected_language.as_deref()
    }

    pub fn conversation(&self) -> &[ConversationTurn] {
        &self.conversation
    }

    /// The instant after which this session must not be entered.
    ///
    /// An explicit `expires_at` wins; otherwise the expiry is derived from
    /// `created_at` and the client's session lifetime.
    pub fn expires_at(&self, ttl: Duration) -> Option<DateTime<Utc>> {
        self.expires_at
            .or_else(|| self.created_at.map(|created| created + ttl))
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        self.expires_at(ttl).is_some_and(|expiry| now >= expiry)
    }
}

/// Response body of `POST /sessions`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreatedSession {
    pub session_id: String,
    #[serde(default)]
    pub grade: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// The lead-capture form submitted to start a session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LeadForm {
    pub name: String,
    pub email: String,
    pub mobile: String,
    pub intent: Intent,
    pub grade: String,
}

impl LeadForm {
    pub fn builder() -> LeadFormBuilder {
        LeadFormBuilder::new()
    }

    /// Names of the required fields that are blank.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.name.trim().is_empty() {
            missing.push("name");
        }
        if self.email.trim().is_empty() {
            missing.push("email");
        }
        if self.mobile.trim().is_empty() {
            missing.push("mobile");
        }
        if self.intent.as_str().trim().is_empty() {
            missing.push("intent");
        }
        if self.grade.trim().is_empty() {
            missing.push("grade");
        }
        missing
    }
}

pub struct LeadFormBuilder {
    form: LeadForm,
}

impl Default for LeadFormBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl LeadFormBuilder {
    pub fn new() -> Self {
        Self {
            form: LeadForm {
                name: String::new(),
                email: String::new(),
                mobile: String::new(),
                intent: Intent::Admission,
                grade: String::new(),
            },
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.form.name = name.to_string();
        self
    }

    pub fn with_email(mut self, email: &str) -> Self {
        self.form.email = email.to_string();
        self
    }

    pub fn with_mobile(mut self, mobile: &str) -> Self {
        self.form.mobile = mobile.to_string();
        self
    }

    pub fn with_intent(mut self, intent: Intent) -> Self {
        self.form.intent = intent;
        self
    }

    pub fn with_grade(mut self, grade: &str) -> Self {
        self.form.grade = grade.to_string();
        self
    }

    pub fn build(self) -> LeadForm {
        self.form
    }
}

/// What the learner is looking for.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Intent {
    #[default]
    Admission,
    Fees,
    Demo,
    Syllabus,
    Other,
    Custom(String),
}

impl Intent {
    pub fn as_str(&self) -> &str {
        match self {
            Intent::Admission => "Admission",
            Intent::Fees => "Fees",
            Intent::Demo => "Demo",
            Intent::Syllabus => "Syllabus",
            Intent::Other => "Other",
            Intent::Custom(s) => s,
        }
    }
}

impl From<&str> for Intent {
    fn from(s: &str) -> Self {
        match s {
            "Admission" => Intent::Admission,
            "Fees" => Intent::Fees,
            "Demo" => Intent::Demo,
            "Syllabus" => Intent::Syllabus,
            "Other" => Intent::Other,
            _ => Intent::Custom(s.to_string()),
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Intent {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Intent {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Intent::from(s.as_str()))
    }
}

/// Selects which gateway endpoint and envelope vocabulary a session uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchitectureMode {
    /// Request, full response, one audio file per reply
    #[default]
    Chained,
    /// Duplex PCM streaming
    Realtime,
}

impl ArchitectureMode {
    /// Gateway path for this mode.
    pub fn endpoint(&self) -> &'static str {
        match self {
            ArchitectureMode::Chained => "/ws",
            ArchitectureMode::Realtime => "/ws/realtime",
        }
    }

    /// Parses the `architecture` value of `GET /config`, `None` when unrecognized.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "chained" => Some(ArchitectureMode::Chained),
            "realtime" => Some(ArchitectureMode::Realtime),
            _ => None,
        }
    }
}

impl fmt::Display for ArchitectureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArchitectureMode::Chained => f.write_str("chained"),
            ArchitectureMode::Realtime => f.write_str("realtime"),
        }
    }
}

/// Response body of `GET /config`. Only `architecture` drives the client.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BackendConfig {
    #[serde(default)]
    pub architecture: Option<String>,
    #[serde(default)]
    pub stt_provider: Option<String>,
    #[serde(default)]
    pub llm_provider: Option<String>,
    #[serde(default)]
    pub tts_provider: Option<String>,
    #[serde(default)]
    pub realtime_voice: Option<String>,
}

impl BackendConfig {
    /// The architecture mode, falling back to chained for unknown values.
    pub fn architecture_mode(&self) -> ArchitectureMode {
        self.architecture
            .as_deref()
            .and_then(ArchitectureMode::parse)
            .unwrap_or_default()
    }
}

/// A quick-reply suggestion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Suggestion {
    pub text: String,
    #[serde(default)]
    pub emoji: String,
}

impl Suggestion {
    pub fn new(text: &str, emoji: &str) -> Self {
        Self {
            text: text.to_string(),
            emoji: emoji.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form() -> LeadForm {
        LeadForm::builder()
            .with_name("Asha")
            .with_email("a@x.com")
            .with_mobile("9999999999")
            .with_intent(Intent::Admission)
            .with_grade("Grade 5")
            .build()
    }

    #[test]
    fn test_missing_fields() {
        assert!(form().missing_fields().is_empty());

        let mut blank = form();
        blank.email = "  ".to_string();
        blank.grade = String::new();
        assert_eq!(blank.missing_fields(), vec!["email", "grade"]);
    }

    #[test]
    fn test_intent_serializes_as_plain_string() {
        let json = serde_json::to_value(form()).unwrap();
        assert_eq!(json["intent"], "Admission");

        let intent: Intent = serde_json::from_str("\"Scholarship\"").unwrap();
        assert_eq!(intent, Intent::Custom("Scholarship".to_string()));
    }

    #[test]
    fn test_expiry_derived_from_created_at() {
        let created = DateTime::parse_from_rfc3339("2026-01-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let session = Session::new("s-1", &form()).with_created_at(created);
        let ttl = Duration::hours(24);

        assert!(!session.is_expired_at(created + Duration::hours(23), ttl));
        assert!(session.is_expired_at(created + Duration::hours(24), ttl));
    }

    #[test]
    fn test_explicit_expiry_wins() {
        let created = Utc::now();
        let session = Session::new("s-1", &form())
            .with_created_at(created)
            .with_expires_at(created + Duration::minutes(5));
        assert!(session.is_expired_at(created + Duration::minutes(6), Duration::hours(24)));
    }

    #[test]
    fn test_session_record_from_service() {
        let json = r#"{
            "session_id": "abc",
            "grade": "Grade 5",
            "name": "Asha",
            "email": "a@x.com",
            "mobile": "9999999999",
            "intent": "Fees",
            "created_at": "2026-03-01T08:30:00.123456Z",
            "updated_at": "2026-03-01T08:31:00Z",
            "detected_language": null,
            "conversation": [{"role": "user", "text": "hi", "audio_file": null, "timestamp": "2026-03-01T08:30:10Z", "language": null}]
        }"#;
        let session: Session = serde_json::from_str(json).unwrap();
        assert_eq!(session.intent(), &Intent::Fees);
        assert_eq!(session.conversation().len(), 1);
        assert!(session.created_at().is_some());
    }

    #[test]
    fn test_architecture_fallback() {
        let config = BackendConfig {
            architecture: Some("streaming".to_string()),
            ..Default::default()
        };
        assert_eq!(config.architecture_mode(), ArchitectureMode::Chained);
        assert_eq!(ArchitectureMode::Realtime.endpoint(), "/ws/realtime");
    }
}
