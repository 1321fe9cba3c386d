use crate::consts::SESSION_ID_QUERY;
use crate::error::ClientError;
use reqwest::Url;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use voice_tutor_types::ArchitectureMode;

/// Builds the gateway URL for a session: the HTTP origin with its scheme
/// upgraded (`http` to `ws`, `https` to `wss`), the mode's endpoint, and the
/// session id as a query parameter.
pub fn gateway_url(origin: &str, mode: ArchitectureMode, session_id: &str) -> Result<Url, ClientError> {
    let mut url = Url::parse(origin).map_err(|e| ClientError::Url(format!("{origin}: {e}")))?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(ClientError::Url(format!("unsupported scheme {other}"))),
    };
    url.set_scheme(scheme)
        .map_err(|_| ClientError::Url(format!("cannot upgrade {origin} to {scheme}")))?;

    let base = url.path().trim_end_matches('/').to_string();
    url.set_path(&format!("{}{}", base, mode.endpoint()));
    url.query_pairs_mut()
        .clear()
        .append_pair(SESSION_ID_QUERY, session_id);
    Ok(url)
}

pub fn build_request(url: &Url) -> tokio_tungstenite::tungstenite::Result<Request> {
    url.as_str().into_client_request()
}
