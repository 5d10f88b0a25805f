use super::state::AppState;
use crate::error::BridgeError;
use crate::session::{ClientHandle, InboundFrame, Outbound, Session};
use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use chrono::Utc;
use futures::{future, SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Capabilities advertised by `/voice/health`
const VOICE_FEATURES: [&str; 3] = ["audio_stream", "speech_to_text", "real_time_analysis"];

const CONNECTION_DESCRIPTION: &str = "Single websocket connection handles all voice features";

/// How long queued frames may take to flush after a session ends
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct VoiceHealthResponse {
    pub status: String,
    pub service_type: String,
    pub active_connections: usize,
    pub funasr_sessions: usize,
    pub features: Vec<String>,
    pub timestamp: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConnectionsResponse {
    pub connection_type: String,
    pub active_connections: Vec<String>,
    pub total_count: usize,
    pub description: String,
    pub timestamp: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /ws/voice/stream/:client_id
/// Upgrade to a websocket carrying audio in and transcriptions out
pub async fn voice_stream(
    ws: WebSocketUpgrade,
    Path(client_id): Path<String>,
    State(state): State<AppState>,
) -> Response {
    info!("Voice stream upgrade requested by {}", client_id);
    ws.on_upgrade(move |socket| handle_voice_socket(socket, client_id, state))
}

async fn handle_voice_socket(socket: WebSocket, client_id: String, state: AppState) {
    let (sender, receiver) = socket.split();
    let (handle, outbound) = ClientHandle::channel();

    let mut writer = tokio::spawn(write_outbound(sender, outbound));

    let inbound = receiver.filter_map(|message| {
        future::ready(match message {
            Ok(Message::Binary(data)) => Some(Ok(InboundFrame::Audio(data))),
            Ok(Message::Text(text)) => Some(Ok(InboundFrame::Text(text))),
            Ok(Message::Close(_)) => Some(Ok(InboundFrame::Close)),
            Ok(Message::Ping(_) | Message::Pong(_)) => None,
            Err(e) => {
                debug!("Client socket error: {}", e);
                Some(Err(BridgeError::ClientDisconnected))
            }
        })
    });

    let session = Session::new(
        client_id.clone(),
        handle,
        state.registry.clone(),
        (*state.link_config).clone(),
    );
    let report = session.run(inbound).await;

    debug!(
        "Session {} finished: {:?}, {} chunks / {} bytes forwarded",
        report.client_id, report.reason, report.stats.chunks_sent, report.stats.bytes_sent
    );

    // The session's handle is gone; the writer ends once the queue drains
    if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer).await.is_err() {
        warn!("Writer for {} did not drain in time", client_id);
        writer.abort();
    }
}

/// Drain a client's outbound queue onto its socket
async fn write_outbound(
    mut sender: futures::stream::SplitSink<WebSocket, Message>,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
) {
    while let Some(frame) = outbound.recv().await {
        match frame {
            Outbound::Text(text) => {
                if let Err(e) = sender.send(Message::Text(text)).await {
                    debug!("Client socket write failed: {}", e);
                    break;
                }
            }
            Outbound::Close { code, reason } => {
                let frame = CloseFrame {
                    code,
                    reason: reason.into(),
                };
                if let Err(e) = sender.send(Message::Close(Some(frame))).await {
                    debug!("Client socket close failed: {}", e);
                }
                break;
            }
        }
    }
}

/// GET /voice/health
/// Session counts
pub async fn voice_health(State(state): State<AppState>) -> impl IntoResponse {
    Json(VoiceHealthResponse {
        status: "healthy".to_string(),
        service_type: "unified_websocket".to_string(),
        active_connections: state.registry.active_count().await,
        funasr_sessions: state.registry.link_count().await,
        features: VOICE_FEATURES.iter().map(|f| f.to_string()).collect(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

/// GET /voice/connections
/// Ids of connected clients
pub async fn voice_connections(State(state): State<AppState>) -> impl IntoResponse {
    let active_connections = state.registry.active_clients().await;

    Json(ConnectionsResponse {
        connection_type: "unified_websocket".to_string(),
        total_count: active_connections.len(),
        active_connections,
        description: CONNECTION_DESCRIPTION.to_string(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
