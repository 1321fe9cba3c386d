//! Session bootstrap: lead capture, the local session cache, and resuming a
//! cached session.

use crate::consts::SESSION_ID_QUERY;
use crate::error::{ClientError, Result};
use crate::service::SessionService;
use chrono::{DateTime, Utc};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use voice_tutor_types::{LeadForm, Session};

/// What the cache remembers about the last session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedSession {
    pub session_id: String,
    pub expires_at: DateTime<Utc>,
}

impl CachedSession {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

pub struct SessionCache {
    path: PathBuf,
}

impl SessionCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the cached record. Unreadable or malformed records are removed.
    pub async fn load(&self) -> Option<CachedSession> {
        let contents = match fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!("failed to read session cache {}: {}", self.path.display(), e);
                return None;
            }
        };
        match serde_json::from_str(&contents) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!("discarding malformed session cache: {}", e);
                self.clear().await;
                None
            }
        }
    }

    pub async fn store(&self, record: &CachedSession) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        fs::write(&self.path, serde_json::to_string_pretty(record)?).await?;
        Ok(())
    }

    pub async fn clear(&self) {
        match fs::remove_file(&self.path).await {
            Ok(()) => tracing::debug!("cleared session cache"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("failed to clear session cache: {}", e),
        }
    }
}

const ROUTE_BASE: &str = "route:/chat";

/// Where the client navigates after a successful lead submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRoute {
    pub session_id: String,
}

impl ChatRoute {
    /// The chat path with the session id form-encoded into its query.
    pub fn path(&self) -> String {
        match Url::parse_with_params(ROUTE_BASE, &[(SESSION_ID_QUERY, self.session_id.as_str())]) {
            Ok(url) => format!("{}?{}", url.path(), url.query().unwrap_or_default()),
            Err(e) => {
                tracing::error!("failed to build chat route: {}", e);
                "/chat".to_string()
            }
        }
    }
}

#[derive(Debug)]
pub enum Entry {
    Chat(Session),
    /// Present lead capture, with the error text when resuming failed.
    LeadCapture { reason: Option<String> },
}

pub struct SessionBootstrap {
    service: Arc<dyn SessionService>,
    cache: SessionCache,
    ttl: chrono::Duration,
}

impl SessionBootstrap {
    pub fn new(service: Arc<dyn SessionService>, cache: SessionCache, ttl: chrono::Duration) -> Self {
        Self {
            service,
            cache,
            ttl,
        }
    }

    pub fn cache(&self) -> &SessionCache {
        &self.cache
    }

    /// Validates and submits the lead form, caching the new session.
    ///
    /// The service's error text is passed through unchanged; nothing is
    /// retried.
    pub async fn submit(&self, form: &LeadForm) -> Result<ChatRoute> {
        self.submit_at(form, Utc::now()).await
    }

    pub async fn submit_at(&self, form: &LeadForm, now: DateTime<Utc>) -> Result<ChatRoute> {
        let missing = form.missing_fields();
        if !missing.is_empty() {
            return Err(ClientError::InvalidLead(missing));
        }
        let created = self.service.create_session(form).await?;
        let record = CachedSession {
            session_id: created.session_id.clone(),
            expires_at: created.expires_at.unwrap_or(now + self.ttl),
        };
        if let Err(e) = self.cache.store(&record).await {
            tracing::warn!("failed to cache session {}: {}", record.session_id, e);
        }
        Ok(ChatRoute {
            session_id: created.session_id,
        })
    }

    /// Decides the entry view from the cached session.
    pub async fn resume(&self) -> Entry {
        self.resume_at(Utc::now()).await
    }

    pub async fn resume_at(&self, now: DateTime<Utc>) -> Entry {
        let Some(record) = self.cache.load().await else {
            return Entry::LeadCapture { reason: None };
        };
        if record.is_expired_at(now) {
            tracing::info!("cached session {} expired at {}", record.session_id, record.expires_at);
            self.cache.clear().await;
            return Entry::LeadCapture { reason: None };
        }
        match self.open_at(&record.session_id, now).await {
            Ok(session) => Entry::Chat(session),
            Err(e) => {
                self.cache.clear().await;
                Entry::LeadCapture {
                    reason: Some(e.to_string()),
                }
            }
        }
    }

    /// Loads a session for the chat view, refusing expired ones.
    pub async fn open(&self, session_id: &str) -> Result<Session> {
        self.open_at(session_id, Utc::now()).await
    }

    pub async fn open_at(&self, session_id: &str, now: DateTime<Utc>) -> Result<Session> {
        if session_id.trim().is_empty() {
            return Err(ClientError::Service(
                "No session ID provided. Please start from the home page.".to_string(),
            ));
        }
        let session = self.service.fetch_session(session_id).await?;
        if session.is_expired_at(now, self.ttl) {
            tracing::info!("session {} has expired", session_id);
            self.cache.clear().await;
            return Err(ClientError::SessionExpired);
        }
        Ok(session)
    }
}
