use super::hotwords::HotwordSource;
use crate::error::{BridgeError, BridgeResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use url::Url;

/// Recognition mode requested in the handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum RecognitionMode {
    /// Streaming partials only
    #[serde(rename = "online")]
    Online,
    /// Whole-utterance recognition only
    #[serde(rename = "offline")]
    Offline,
    /// Fast partials followed by a corrected final result per utterance
    #[default]
    #[serde(rename = "2pass")]
    TwoPass,
}

impl RecognitionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecognitionMode::Online => "online",
            RecognitionMode::Offline => "offline",
            RecognitionMode::TwoPass => "2pass",
        }
    }
}

impl fmt::Display for RecognitionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static configuration of one recognition link
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Backend host name or address
    pub host: String,

    /// Backend port
    pub port: u16,

    /// Connect with `wss://` instead of `ws://`
    pub use_ssl: bool,

    /// Accept any server certificate on `wss://` (self-signed FunASR deployments)
    pub insecure_skip_verify: bool,

    /// Websocket subprotocol requested during the upgrade (FunASR servers expect "binary")
    pub subprotocol: Option<String>,

    /// Upper bound on connection establishment
    pub connect_timeout_ms: u64,

    /// Chunk sizing triple (lookback, chunk, lookahead) in 60ms units
    pub chunk_size: Vec<u32>,

    /// Chunk interval sent to the backend
    pub chunk_interval: u32,

    /// Hotword file path or literal hotword string
    pub hotwords: HotwordSource,

    /// Inverse text normalization
    pub itn: bool,

    /// Recognition mode
    pub mode: RecognitionMode,

    /// Audio sample rate in Hz
    pub sample_rate: u32,

    /// Number of audio channels
    pub channels: u16,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 10096,
            use_ssl: false,
            insecure_skip_verify: false,
            subprotocol: Some("binary".to_string()),
            connect_timeout_ms: 5000,
            chunk_size: vec![5, 10, 5],
            chunk_interval: 10,
            hotwords: HotwordSource::None,
            itn: true,
            mode: RecognitionMode::TwoPass,
            sample_rate: 16000, // Mono 16kHz s16le from the browser
            channels: 1,
        }
    }
}

impl LinkConfig {
    /// Config pointing at a plain-websocket backend on `host:port`
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// Websocket URL of the backend
    pub fn endpoint(&self) -> BridgeResult<Url> {
        let scheme = if self.use_ssl { "wss" } else { "ws" };
        Url::parse(&format!("{}://{}:{}", scheme, self.host, self.port)).map_err(|e| {
            BridgeError::Configuration(format!(
                "Invalid backend address {}:{}: {e}",
                self.host, self.port
            ))
        })
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}
