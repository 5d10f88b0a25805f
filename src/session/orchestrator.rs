use super::messages::{
    ClientMessage, CLOSE_BACKEND_UNAVAILABLE, CLOSE_BACKEND_UNAVAILABLE_REASON, CLOSE_SERVICE_ERROR,
    CLOSE_SERVICE_ERROR_REASON,
};
use super::registry::{ClientHandle, SessionRegistry, SessionToken};
use crate::asr::{LinkConfig, LinkEvent, LinkStatsSnapshot, RecognitionLink};
use crate::audio::AudioGate;
use crate::error::BridgeError;
use futures::stream::{Stream, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Lifecycle of a client session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Connecting,
    ClientAccepted,
    LinkEstablishing,
    Streaming,
    Closing,
    Closed,
}

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// The client went away (normal termination)
    ClientDisconnected,
    /// The client socket failed
    ClientError,
    /// The backend could not be reached at session start
    BackendUnavailable,
    /// The handshake could not be delivered
    SessionStartFailed,
    /// Forwarding audio to the backend failed
    BackendSendFailure,
    /// Another session holds this id's recognition link
    LinkInUse,
}

/// A frame received from the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    /// Raw PCM audio
    Audio(Vec<u8>),
    /// Text frame (pings and the like); ignored
    Text(String),
    /// The client sent a close frame
    Close,
}

/// Outcome of a finished session
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub client_id: String,
    pub state: SessionState,
    pub reason: CloseReason,
    /// Every state the session passed through, in order
    pub history: Vec<SessionState>,
    /// Counters of the session's recognition link
    pub stats: LinkStatsSnapshot,
}

/// Per-connection control loop: registers the client, brings up the
/// recognition link, pumps audio downstream and results upstream, and
/// tears everything down when either side goes away.
pub struct Session {
    client_id: String,
    handle: ClientHandle,
    registry: Arc<SessionRegistry>,
    link_config: LinkConfig,
    gate: AudioGate,
    state: SessionState,
    history: Vec<SessionState>,
    token: Option<SessionToken>,
    link: Option<Arc<RecognitionLink>>,
    error_reported: bool,
    cleaned_up: bool,
}

impl Session {
    pub fn new(
        client_id: impl Into<String>,
        handle: ClientHandle,
        registry: Arc<SessionRegistry>,
        link_config: LinkConfig,
    ) -> Self {
        let gate = AudioGate::new(link_config.sample_rate, link_config.channels);

        Self {
            client_id: client_id.into(),
            handle,
            registry,
            link_config,
            gate,
            state: SessionState::Connecting,
            history: vec![SessionState::Connecting],
            token: None,
            link: None,
            error_reported: false,
            cleaned_up: false,
        }
    }

    /// Session label sent to the backend as `wav_name`
    pub fn label(&self) -> String {
        session_label(&self.client_id)
    }

    /// Drive the session until the client leaves or a fatal error occurs.
    pub async fn run<S>(mut self, inbound: S) -> SessionReport
    where
        S: Stream<Item = Result<InboundFrame, BridgeError>>,
    {
        let inbound = std::pin::pin!(inbound);

        let token = self
            .registry
            .open_session(&self.client_id, self.handle.clone())
            .await;
        self.token = Some(token);
        self.transition(SessionState::ClientAccepted);
        self.notify(&ClientMessage::connection_established());

        self.transition(SessionState::LinkEstablishing);
        let link = self
            .registry
            .get_or_create_link(&self.client_id, &self.link_config)
            .await;

        // The link stays with whichever session took its events
        let Some(mut events) = link.take_events().await else {
            error!("Recognition link for {} is already owned by another session", self.client_id);
            self.report_error("Speech recognition session already active");
            self.handle.close(CLOSE_SERVICE_ERROR, CLOSE_SERVICE_ERROR_REASON);
            return self.finish(CloseReason::LinkInUse).await;
        };
        self.link = Some(Arc::clone(&link));

        if let Err(e) = link.connect().await {
            warn!("Recognition backend unavailable for {}: {}", self.client_id, e);
            self.notify(&ClientMessage::backend_failed());
            self.handle
                .close(CLOSE_BACKEND_UNAVAILABLE, CLOSE_BACKEND_UNAVAILABLE_REASON);
            return self.finish(CloseReason::BackendUnavailable).await;
        }

        let label = self.label();
        if let Err(e) = link.start_session(&label).await {
            self.report_error(format!("Speech recognition service error: {e}"));
            self.handle.close(CLOSE_SERVICE_ERROR, CLOSE_SERVICE_ERROR_REASON);
            return self.finish(CloseReason::SessionStartFailed).await;
        }
        self.notify(&ClientMessage::backend_connected());

        self.transition(SessionState::Streaming);
        let reason = self.stream(&link, inbound, &mut events).await;

        if reason == CloseReason::BackendSendFailure {
            self.handle.close(CLOSE_SERVICE_ERROR, CLOSE_SERVICE_ERROR_REASON);
        } else {
            link.end_stream().await;
        }

        self.finish(reason).await
    }

    async fn stream<S>(
        &mut self,
        link: &RecognitionLink,
        mut inbound: std::pin::Pin<&mut S>,
        events: &mut mpsc::UnboundedReceiver<LinkEvent>,
    ) -> CloseReason
    where
        S: Stream<Item = Result<InboundFrame, BridgeError>>,
    {
        loop {
            tokio::select! {
                frame = inbound.next() => match frame {
                    Some(Ok(InboundFrame::Audio(chunk))) => {
                        let Some(chunk) = self.gate.process(chunk) else {
                            continue;
                        };
                        if let Err(e) = link.send_audio_chunk(chunk).await {
                            error!("Abandoning audio pump for {}: {}", self.client_id, e);
                            self.report_error("Speech recognition service failure");
                            return CloseReason::BackendSendFailure;
                        }
                    }
                    Some(Ok(InboundFrame::Text(text))) => {
                        debug!("Ignoring text frame from {}: {}", self.client_id, text);
                    }
                    Some(Ok(InboundFrame::Close)) | None => {
                        info!("Client {} closed the stream", self.client_id);
                        return CloseReason::ClientDisconnected;
                    }
                    Some(Err(e)) => {
                        warn!("Client {} stream failed: {}", self.client_id, e);
                        return CloseReason::ClientError;
                    }
                },
                Some(event) = events.recv() => self.handle_event(event),
            }
        }
    }

    fn handle_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::Result(result) => match ClientMessage::transcription(&result) {
                Some(message) => {
                    info!("Transcription for {}: {}", self.client_id, result.text);
                    self.notify(&message);
                }
                None => debug!(
                    "Suppressing {} result for {}: {}",
                    result.mode, self.client_id, result.text
                ),
            },
            LinkEvent::Error(message) => {
                self.report_error(format!("Speech recognition service error: {message}"));
            }
            LinkEvent::Closed => {
                info!("Recognition backend closed the stream for {}", self.client_id);
            }
        }
    }

    /// Send an `error` message; a session reports at most one.
    fn report_error(&mut self, message: impl Into<String>) {
        let message = message.into();
        if self.error_reported {
            debug!("Suppressing further error for {}: {}", self.client_id, message);
            return;
        }
        self.error_reported = true;
        self.notify(&ClientMessage::error(message));
    }

    fn notify(&self, message: &ClientMessage) {
        if let Err(e) = self.handle.send(message) {
            debug!("Could not notify client {}: {}", self.client_id, e);
        }
    }

    fn transition(&mut self, next: SessionState) {
        debug!("Session {}: {:?} -> {:?}", self.client_id, self.state, next);
        self.state = next;
        self.history.push(next);
    }

    /// Release registry entries and the link. Runs once per session.
    ///
    /// A session that never owned a link only gives up its client entry.
    async fn cleanup(&mut self) {
        if self.cleaned_up {
            return;
        }
        self.cleaned_up = true;

        let Some(token) = self.token.take() else {
            return;
        };
        match self.link.take() {
            Some(link) => {
                self.registry.close_session(&token).await;
                link.disconnect().await;
            }
            None => {
                self.registry.release_client(&token).await;
            }
        }
    }

    async fn finish(mut self, reason: CloseReason) -> SessionReport {
        self.transition(SessionState::Closing);
        let stats = self.link.as_ref().map(|link| link.stats()).unwrap_or_default();
        self.cleanup().await;
        self.transition(SessionState::Closed);

        info!("Session {} closed ({:?})", self.client_id, reason);

        SessionReport {
            client_id: self.client_id,
            state: self.state,
            reason,
            history: self.history,
            stats,
        }
    }
}

/// Backend session label for a client id
pub fn session_label(client_id: &str) -> String {
    format!("session_{client_id}")
}
