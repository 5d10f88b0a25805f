//! HTTP surface of the bridge
//!
//! - GET /ws/voice/stream/:client_id - Websocket: audio in, transcriptions out
//! - GET /voice/health - Session counts
//! - GET /voice/connections - Active client ids
//! - GET /health - Health check

pub mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
