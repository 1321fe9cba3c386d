pub mod client;
pub mod server;

use client::*;
use server::*;

/// Envelopes the client writes to the gateway.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "text")]
    Text(TextEvent),
    #[serde(rename = "audio")]
    Audio(AudioAppendEvent),
    /// Marks the end of a realtime recording. Carries no payload.
    #[serde(rename = "audio_commit")]
    AudioCommit,
}

impl ClientEvent {
    pub fn text(text: &str) -> Self {
        ClientEvent::Text(TextEvent::new(text))
    }

    pub fn audio(audio: crate::audio::Base64EncodedAudioBytes) -> Self {
        ClientEvent::Audio(AudioAppendEvent::new(audio))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ClientEvent::Text(_) => "text",
            ClientEvent::Audio(_) => "audio",
            ClientEvent::AudioCommit => "audio_commit",
        }
    }
}

/// Envelopes the gateway pushes to the client.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// Chained mode: complete assistant reply, optionally with synthesized audio
    #[serde(rename = "final")]
    Final(FinalEvent),
    /// Chained mode: echo of the learner's recognized speech
    #[serde(rename = "transcription")]
    Transcription(TranscriptionEvent),
    /// Realtime mode: transcript of the assistant's spoken reply
    #[serde(rename = "transcript")]
    Transcript(TranscriptEvent),
    /// Realtime mode: a chunk of assistant speech
    #[serde(rename = "audio")]
    Audio(AudioDeltaEvent),
    #[serde(rename = "connected")]
    Connected(ConnectedEvent),
    #[serde(rename = "error")]
    Error(ErrorEvent),
}

impl ServerEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            ServerEvent::Final(_) => "final",
            ServerEvent::Transcription(_) => "transcription",
            ServerEvent::Transcript(_) => "transcript",
            ServerEvent::Audio(_) => "audio",
            ServerEvent::Connected(_) => "connected",
            ServerEvent::Error(_) => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_commit_has_no_payload() {
        let json = serde_json::to_value(ClientEvent::AudioCommit).unwrap();
        assert_eq!(json, serde_json::json!({"type": "audio_commit"}));
    }

    #[test]
    fn test_text_event_wire_shape() {
        let json = serde_json::to_value(ClientEvent::text("What are the fees?")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "text", "text": "What are the fees?"})
        );
    }

    #[test]
    fn test_final_without_audio_url() {
        let event: ServerEvent =
            serde_json::from_str(r#"{"type":"final","text":"Hello","audio_url":null}"#).unwrap();
        match event {
            ServerEvent::Final(data) => {
                assert_eq!(data.text(), "Hello");
                assert!(data.audio_url().is_none());
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_connected_message_is_optional() {
        let event: ServerEvent = serde_json::from_str(r#"{"type":"connected"}"#).unwrap();
        assert_eq!(event.kind(), "connected");
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let result = serde_json::from_str::<ServerEvent>(r#"{"type":"response.done"}"#);
        assert!(result.is_err());
    }
}
