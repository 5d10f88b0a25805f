//! Client session management
//!
//! This module bridges client websocket connections to recognition links:
//! - `SessionRegistry` owns the client id → socket and client id → link maps
//! - `Session` is the per-connection control loop
//! - `ClientMessage` is the JSON protocol spoken to the client

mod messages;
mod orchestrator;
mod registry;

pub use messages::{
    ClientMessage, TranscriptionData, CLOSE_BACKEND_UNAVAILABLE, CLOSE_BACKEND_UNAVAILABLE_REASON,
    CLOSE_GOING_AWAY, CLOSE_REPLACED, CLOSE_SERVICE_ERROR, STATUS_BACKEND_CONNECTED,
    STATUS_BACKEND_FAILED, STATUS_CONNECTED,
};
pub use orchestrator::{session_label, CloseReason, InboundFrame, Session, SessionReport, SessionState};
pub use registry::{ClientHandle, Outbound, SessionRegistry, SessionToken};
