use crate::asr::RecognitionResult;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `connection_status` once the client socket is registered
pub const STATUS_CONNECTED: &str = "connected";

/// `service_status` once the recognition session is running
pub const STATUS_BACKEND_CONNECTED: &str = "funasr_connected";

/// `service_status` when the recognition backend cannot be reached
pub const STATUS_BACKEND_FAILED: &str = "funasr_failed";

/// Close code sent when the backend is unreachable (RFC 6455 "internal error")
pub const CLOSE_BACKEND_UNAVAILABLE: u16 = 1011;
pub const CLOSE_BACKEND_UNAVAILABLE_REASON: &str = "recognition backend unavailable";

/// Close code sent when the session dies mid-stream
pub const CLOSE_SERVICE_ERROR: u16 = 1011;
pub const CLOSE_SERVICE_ERROR_REASON: &str = "recognition service error";

/// Close code for a session replaced by a newer connection with the same id
pub const CLOSE_REPLACED: u16 = 1000;
pub const CLOSE_REPLACED_REASON: &str = "replaced by a new connection";

/// Close code used when the server shuts down
pub const CLOSE_GOING_AWAY: u16 = 1001;
pub const CLOSE_GOING_AWAY_REASON: &str = "server shutting down";

/// JSON messages sent to the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    ConnectionStatus { status: String, message: String },
    ServiceStatus { status: String, message: String },
    Transcription { data: TranscriptionData },
    Error { message: String, timestamp: String },
}

/// Payload of a `transcription` message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionData {
    pub text: String,
    pub timestamp: Value,
    pub confidence: f32,
    pub is_final: bool,
    pub mode: String,
}

impl ClientMessage {
    pub fn connection_established() -> Self {
        ClientMessage::ConnectionStatus {
            status: STATUS_CONNECTED.to_string(),
            message: "Audio stream connection established".to_string(),
        }
    }

    pub fn backend_connected() -> Self {
        ClientMessage::ServiceStatus {
            status: STATUS_BACKEND_CONNECTED.to_string(),
            message: "Speech recognition service connected".to_string(),
        }
    }

    pub fn backend_failed() -> Self {
        ClientMessage::ServiceStatus {
            status: STATUS_BACKEND_FAILED.to_string(),
            message: "Failed to connect to speech recognition service".to_string(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ClientMessage::Error {
            message: message.into(),
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    /// Transcription message for `result`, or `None` if the forwarding
    /// policy suppresses it.
    ///
    /// Only the corrected final pass (`2pass-offline`) reaches the client;
    /// interim partials are dropped so clients never render unstable text.
    pub fn transcription(result: &RecognitionResult) -> Option<Self> {
        if !result.is_final_two_pass() {
            return None;
        }

        let timestamp = if result.timestamp.is_null() {
            Value::String(Utc::now().to_rfc3339())
        } else {
            result.timestamp.clone()
        };

        Some(ClientMessage::Transcription {
            data: TranscriptionData {
                text: result.text.clone(),
                timestamp,
                confidence: result.confidence,
                is_final: result.is_final,
                mode: result.mode.clone(),
            },
        })
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
