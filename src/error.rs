//! Error types for the session bridge

use thiserror::Error;

/// Failures surfaced by the recognition link and the session layer
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The recognition backend could not be reached
    #[error("Recognition backend unavailable: {0}")]
    BackendUnavailable(String),

    /// The backend sent a frame we could not decode
    #[error("Backend protocol error: {0}")]
    BackendProtocol(String),

    /// Writing a handshake or audio frame to the backend failed
    #[error("Failed to send to recognition backend: {0}")]
    BackendSendFailure(String),

    /// Operation requires an open backend connection
    #[error("Not connected to recognition backend")]
    NotConnected,

    /// The client went away
    #[error("Client disconnected")]
    ClientDisconnected,

    /// Invalid or unusable configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A handshake or client message could not be encoded
    #[error("Failed to encode message: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type BridgeResult<T> = Result<T, BridgeError>;
