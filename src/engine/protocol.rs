//! Wire protocol for the realtime translation engine.
//!
//! All traffic is JSON text frames tagged by a `type` field; audio payloads
//! travel base64-encoded inside the JSON envelope. Both directions are
//! modeled as closed enums so an unhandled kind is a visible gap in a
//! `match`, not a silent default branch.

use base64::Engine;
use serde::{Deserialize, Serialize};

// ── Commands (relay → engine) ──────────────────────────────────────

/// Message sent to the translation engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum EngineCommand {
    /// Set the translation instruction for this channel.
    #[serde(rename = "system_message.create")]
    SystemMessage { content: String },

    /// Forward one chunk of input audio (base64 PCM).
    #[serde(rename = "input_audio_buffer.append")]
    AppendAudio { audio: String },

    /// Mark end of the current utterance.
    #[serde(rename = "input_audio_buffer.commit")]
    Commit,

    /// Request the translated response for the committed utterance.
    #[serde(rename = "response.create")]
    CreateResponse,

    /// Reset the input buffer after a completed response.
    #[serde(rename = "input_audio_buffer.clear")]
    ClearBuffer,
}

impl EngineCommand {
    /// Wrap raw PCM bytes as an append command.
    pub fn append_pcm(pcm: &[u8]) -> Self {
        Self::AppendAudio {
            audio: base64::engine::general_purpose::STANDARD.encode(pcm),
        }
    }

    /// Serialize to the JSON text frame sent over the wire.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

// ── Events (engine → relay) ────────────────────────────────────────

/// Message received from the translation engine.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type")]
pub enum EngineEvent {
    /// Acknowledges a commit; gates `response.create`.
    #[serde(rename = "input_audio_buffer.committed")]
    Committed,

    /// Streamed translated audio, base64 payload.
    #[serde(rename = "response.audio.delta")]
    AudioDelta { delta: String },

    /// Streamed caption text.
    #[serde(rename = "response.text.delta")]
    TextDelta { delta: String },

    /// Response stream complete.
    #[serde(rename = "response.done")]
    Done,

    /// Heartbeat, ignored.
    #[serde(rename = "ping")]
    Ping,

    /// Engine-side error report.
    #[serde(rename = "error")]
    Error {
        #[serde(default)]
        error: ErrorDetail,
    },
}

/// Body of an engine `error` event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ErrorDetail {
    #[serde(default)]
    pub message: String,
}

impl EngineEvent {
    /// Decode the base64 audio payload of an `AudioDelta`.
    pub fn decode_audio(delta: &str) -> Result<Vec<u8>, ProtocolError> {
        base64::engine::general_purpose::STANDARD
            .decode(delta)
            .map_err(|e| ProtocolError::BadAudioPayload(e.to_string()))
    }
}

// ── Decode ────────────────────────────────────────────────────────

/// Failure to interpret an engine frame. Always recoverable: the frame is
/// logged and dropped, channel state is unaffected.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed engine payload: {0}")]
    Malformed(String),

    #[error("unrecognized engine event kind `{0}`")]
    Unrecognized(String),

    #[error("undecodable audio payload: {0}")]
    BadAudioPayload(String),
}

/// Decode one engine text frame into an [`EngineEvent`].
///
/// Distinguishes an unknown-but-well-formed event kind (logged at debug,
/// per-protocol forward compatibility) from a genuinely malformed payload.
pub fn decode_event(text: &str) -> Result<EngineEvent, ProtocolError> {
    match serde_json::from_str::<EngineEvent>(text) {
        Ok(event) => Ok(event),
        Err(primary) => {
            let value: serde_json::Value = serde_json::from_str(text)
                .map_err(|e| ProtocolError::Malformed(e.to_string()))?;
            match value.get("type").and_then(|v| v.as_str()) {
                Some(kind) => Err(ProtocolError::Unrecognized(kind.to_string())),
                None => Err(ProtocolError::Malformed(primary.to_string())),
            }
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_message_wire_format() {
        let cmd = EngineCommand::SystemMessage {
            content: "translate English speech to Spanish speech and text".into(),
        };
        let json: serde_json::Value = serde_json::from_str(&cmd.to_json().unwrap()).unwrap();
        assert_eq!(json["type"], "system_message.create");
        assert!(json["content"].as_str().unwrap().contains("Spanish"));
    }

    #[test]
    fn append_encodes_base64() {
        let cmd = EngineCommand::append_pcm(&[0x41, 0x42, 0x43]);
        let json: serde_json::Value = serde_json::from_str(&cmd.to_json().unwrap()).unwrap();
        assert_eq!(json["type"], "input_audio_buffer.append");
        assert_eq!(json["audio"], "QUJD");
    }

    #[test]
    fn bare_commands_carry_only_type() {
        for (cmd, tag) in [
            (EngineCommand::Commit, "input_audio_buffer.commit"),
            (EngineCommand::CreateResponse, "response.create"),
            (EngineCommand::ClearBuffer, "input_audio_buffer.clear"),
        ] {
            let json: serde_json::Value = serde_json::from_str(&cmd.to_json().unwrap()).unwrap();
            assert_eq!(json["type"], tag);
            assert_eq!(json.as_object().unwrap().len(), 1);
        }
    }

    #[test]
    fn every_command_encodes() {
        let commands = [
            EngineCommand::SystemMessage { content: "en->es".into() },
            EngineCommand::append_pcm(&[0x01]),
            EngineCommand::Commit,
            EngineCommand::CreateResponse,
            EngineCommand::ClearBuffer,
        ];
        for cmd in commands {
            assert!(cmd.to_json().is_ok());
        }
    }

    #[test]
    fn decode_committed() {
        let event = decode_event(r#"{"type":"input_audio_buffer.committed"}"#).unwrap();
        assert_eq!(event, EngineEvent::Committed);
    }

    #[test]
    fn decode_committed_with_extra_fields() {
        let event =
            decode_event(r#"{"type":"input_audio_buffer.committed","event_id":"ev_1"}"#).unwrap();
        assert_eq!(event, EngineEvent::Committed);
    }

    #[test]
    fn decode_audio_delta_roundtrips_bytes() {
        let event = decode_event(r#"{"type":"response.audio.delta","delta":"QUJD"}"#).unwrap();
        let EngineEvent::AudioDelta { delta } = event else {
            panic!("expected AudioDelta");
        };
        assert_eq!(EngineEvent::decode_audio(&delta).unwrap(), vec![0x41, 0x42, 0x43]);
    }

    #[test]
    fn decode_text_delta() {
        let event = decode_event(r#"{"type":"response.text.delta","delta":"hola"}"#).unwrap();
        assert_eq!(
            event,
            EngineEvent::TextDelta {
                delta: "hola".into()
            }
        );
    }

    #[test]
    fn decode_error_event() {
        let event =
            decode_event(r#"{"type":"error","error":{"message":"rate limited"}}"#).unwrap();
        let EngineEvent::Error { error } = event else {
            panic!("expected Error");
        };
        assert_eq!(error.message, "rate limited");
    }

    #[test]
    fn unknown_kind_is_unrecognized_not_malformed() {
        let err = decode_event(r#"{"type":"session.shiny_new_event"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::Unrecognized(kind) if kind == "session.shiny_new_event"));
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(matches!(
            decode_event("not json at all"),
            Err(ProtocolError::Malformed(_))
        ));
        assert!(matches!(
            decode_event(r#"{"no_type_field":true}"#),
            Err(ProtocolError::Malformed(_))
        ));
    }

    #[test]
    fn bad_base64_audio_is_rejected() {
        assert!(matches!(
            EngineEvent::decode_audio("@@@not-base64@@@"),
            Err(ProtocolError::BadAudioPayload(_))
        ));
    }
}
