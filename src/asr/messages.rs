use crate::error::{BridgeError, BridgeResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Mode marker of the corrected final result in two-pass recognition
pub const FINAL_TWO_PASS_MODE: &str = "2pass-offline";

/// Backends do not report a confidence score; this is what clients see
pub const DEFAULT_CONFIDENCE: f32 = 0.9;

/// Handshake sent once at the start of a recognition session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Handshake {
    pub mode: String,
    pub chunk_size: Vec<u32>,
    pub chunk_interval: u32,
    pub wav_name: String,
    pub is_speaking: bool,
    /// JSON-encoded phrase → weight table, a literal payload, or empty
    pub hotwords: String,
    pub itn: bool,
    pub audio_fs: u32,
}

/// Marks the end of the audio stream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndOfSpeech {
    pub is_speaking: bool,
}

impl Default for EndOfSpeech {
    fn default() -> Self {
        Self { is_speaking: false }
    }
}

/// Result frame as sent by the backend; only `text` is reliably present
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BackendFrame {
    pub text: String,
    pub wav_name: String,
    /// String or list of word timings depending on the backend build
    pub timestamp: Value,
    pub is_final: bool,
    pub mode: Option<String>,
}

/// Normalized recognition result handed to the session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecognitionResult {
    pub text: String,
    pub wav_name: String,
    pub timestamp: Value,
    pub is_final: bool,
    pub mode: String,
    pub confidence: f32,
    pub raw: Value,
}

impl RecognitionResult {
    /// Decode one backend frame, filling `mode` with `default_mode` when absent.
    pub fn decode(payload: &str, default_mode: &str) -> BridgeResult<Self> {
        let raw: Value = serde_json::from_str(payload)
            .map_err(|e| BridgeError::BackendProtocol(format!("invalid JSON: {e}")))?;
        if !raw.is_object() {
            return Err(BridgeError::BackendProtocol("expected a JSON object".to_string()));
        }
        let frame: BackendFrame = serde_json::from_value(raw.clone())
            .map_err(|e| BridgeError::BackendProtocol(format!("unexpected result frame: {e}")))?;

        Ok(Self {
            text: frame.text,
            wav_name: frame.wav_name,
            timestamp: frame.timestamp,
            is_final: frame.is_final,
            mode: frame.mode.unwrap_or_else(|| default_mode.to_string()),
            confidence: DEFAULT_CONFIDENCE,
            raw,
        })
    }

    /// Empty or whitespace-only text carries nothing worth forwarding
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }

    pub fn is_final_two_pass(&self) -> bool {
        self.mode == FINAL_TWO_PASS_MODE
    }
}

/// Events emitted by a recognition link onto its session's channel
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    /// A decoded, non-empty recognition result
    Result(RecognitionResult),
    /// A transport-level failure
    Error(String),
    /// The backend closed the connection
    Closed,
}
