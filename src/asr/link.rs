use super::config::LinkConfig;
use super::messages::{EndOfSpeech, Handshake, LinkEvent, RecognitionResult};
use super::stats::{LinkStats, LinkStatsSnapshot};
use super::tls::insecure_connector;
use crate::error::{BridgeError, BridgeResult};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::{connect_async_tls_with_config, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

type BackendStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How long a graceful close may take before the transport is simply dropped
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// One streaming connection to the recognition backend, owned by a single session.
///
/// Results and transport failures are delivered as [`LinkEvent`]s on the
/// channel returned by [`RecognitionLink::take_events`], in the order the
/// backend produced them.
pub struct RecognitionLink {
    /// Client this link belongs to (used for logging)
    client_id: String,

    /// Static configuration
    config: LinkConfig,

    /// Hotword payload, resolved once at construction
    hotwords: String,

    /// Whether the transport is believed to be open
    connected: Arc<AtomicBool>,

    /// Outbound half of the transport
    sink: Mutex<Option<SplitSink<BackendStream, Message>>>,

    /// Inbound half, parked between `connect` and `start_session`
    pending_stream: Mutex<Option<SplitStream<BackendStream>>>,

    /// Handle of the backend receive loop
    receive_task: Mutex<Option<JoinHandle<()>>>,

    /// Event channel towards the owning session
    events_tx: mpsc::UnboundedSender<LinkEvent>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<LinkEvent>>>,

    /// Counters
    stats: Arc<LinkStats>,
}

impl RecognitionLink {
    /// Create a link for `client_id`. Does not connect.
    pub fn new(client_id: impl Into<String>, config: LinkConfig) -> Self {
        let client_id = client_id.into();
        let hotwords = config.hotwords.resolve();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        debug!(
            "Created recognition link for {} ({}:{}, mode={})",
            client_id, config.host, config.port, config.mode
        );

        Self {
            client_id,
            config,
            hotwords,
            connected: Arc::new(AtomicBool::new(false)),
            sink: Mutex::new(None),
            pending_stream: Mutex::new(None),
            receive_task: Mutex::new(None),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            stats: Arc::new(LinkStats::default()),
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Resolved hotword payload carried in the handshake
    pub fn hotwords(&self) -> &str {
        &self.hotwords
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> LinkStatsSnapshot {
        self.stats.snapshot()
    }

    /// Take the event receiver. Only the first call gets it.
    pub async fn take_events(&self) -> Option<mpsc::UnboundedReceiver<LinkEvent>> {
        self.events_rx.lock().await.take()
    }

    /// Open the transport to the backend.
    ///
    /// Any previous connection and its receive loop are discarded first.
    /// No retry: on failure an error event is emitted and the link stays disconnected.
    pub async fn connect(&self) -> BridgeResult<()> {
        self.teardown().await;

        let url = match self.config.endpoint() {
            Ok(url) => url,
            Err(e) => {
                self.emit(LinkEvent::Error(e.to_string()));
                return Err(e);
            }
        };

        info!("Connecting to recognition backend at {} for {}", url, self.client_id);

        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| self.connect_failed(format!("invalid request for {url}: {e}")))?;

        if let Some(protocol) = self.config.subprotocol.as_deref().filter(|p| !p.is_empty()) {
            let value = HeaderValue::from_str(protocol)
                .map_err(|e| self.connect_failed(format!("invalid subprotocol {protocol:?}: {e}")))?;
            request.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, value);
        }

        let connector = if self.config.use_ssl && self.config.insecure_skip_verify {
            warn!("Certificate verification disabled for {}", url);
            Some(insecure_connector().map_err(|e| self.connect_failed(e.to_string()))?)
        } else {
            None
        };

        let connecting = connect_async_tls_with_config(request, None, false, connector);
        let stream = match timeout(self.config.connect_timeout(), connecting).await {
            Ok(Ok((stream, _response))) => stream,
            Ok(Err(e)) => return Err(self.connect_failed(format!("{url}: {e}"))),
            Err(_) => {
                return Err(self.connect_failed(format!(
                    "{url}: timed out after {}ms",
                    self.config.connect_timeout_ms
                )))
            }
        };

        let (sink, stream) = stream.split();
        *self.sink.lock().await = Some(sink);
        *self.pending_stream.lock().await = Some(stream);
        self.connected.store(true, Ordering::SeqCst);

        info!("Connected to recognition backend for {}", self.client_id);

        Ok(())
    }

    /// Send the handshake and start receiving results.
    ///
    /// Connects first if needed.
    pub async fn start_session(&self, label: &str) -> BridgeResult<()> {
        if !self.is_connected() {
            self.connect().await?;
        }

        let payload = serde_json::to_string(&self.handshake(label))?;

        if let Err(e) = self.send_message(Message::text(payload)).await {
            error!("Failed to start recognition session {}: {}", label, e);
            self.connected.store(false, Ordering::SeqCst);
            self.emit(LinkEvent::Error(format!("Failed to start recognition session: {e}")));
            return Err(e);
        }

        match self.pending_stream.lock().await.take() {
            Some(stream) => {
                let task = tokio::spawn(receive_loop(
                    self.client_id.clone(),
                    stream,
                    self.config.mode.to_string(),
                    Arc::clone(&self.connected),
                    self.events_tx.clone(),
                    Arc::clone(&self.stats),
                ));
                if let Some(old) = self.receive_task.lock().await.replace(task) {
                    old.abort();
                }
            }
            None => debug!("Receive loop already running for {}", self.client_id),
        }

        info!("Started recognition session {} ({})", label, self.config.mode);

        Ok(())
    }

    /// Forward one binary audio frame verbatim.
    pub async fn send_audio_chunk(&self, chunk: Vec<u8>) -> BridgeResult<()> {
        let len = chunk.len();

        match self.send_message(Message::binary(chunk)).await {
            Ok(()) => {
                self.stats.record_chunk(len);
                Ok(())
            }
            Err(BridgeError::NotConnected) => {
                warn!("Dropping audio for {}: not connected to recognition backend", self.client_id);
                Err(BridgeError::NotConnected)
            }
            Err(e) => {
                error!("Failed to send audio for {}: {}", self.client_id, e);
                self.connected.store(false, Ordering::SeqCst);
                self.emit(LinkEvent::Error(format!("Failed to send audio: {e}")));
                Err(e)
            }
        }
    }

    /// Tell the backend no more audio follows. Best-effort.
    pub async fn end_stream(&self) {
        if !self.is_connected() {
            return;
        }

        let payload = match serde_json::to_string(&EndOfSpeech::default()) {
            Ok(payload) => payload,
            Err(e) => {
                error!("Failed to encode end-of-speech marker: {}", e);
                return;
            }
        };

        match self.send_message(Message::text(payload)).await {
            Ok(()) => debug!("Audio stream ended for {}", self.client_id),
            Err(e) => warn!("Failed to end audio stream for {}: {}", self.client_id, e),
        }
    }

    /// Close the transport and stop the receive loop. Idempotent.
    pub async fn disconnect(&self) {
        let was_connected = self.connected.swap(false, Ordering::SeqCst);
        self.teardown().await;

        if was_connected {
            info!("Disconnected from recognition backend for {}", self.client_id);
        }
    }

    fn handshake(&self, label: &str) -> Handshake {
        Handshake {
            mode: self.config.mode.to_string(),
            chunk_size: self.config.chunk_size.clone(),
            chunk_interval: self.config.chunk_interval,
            wav_name: label.to_string(),
            is_speaking: true,
            hotwords: self.hotwords.clone(),
            itn: self.config.itn,
            audio_fs: self.config.sample_rate,
        }
    }

    async fn send_message(&self, message: Message) -> BridgeResult<()> {
        if !self.is_connected() {
            return Err(BridgeError::NotConnected);
        }

        let mut sink = self.sink.lock().await;
        let sink = sink.as_mut().ok_or(BridgeError::NotConnected)?;

        sink.send(message)
            .await
            .map_err(|e| BridgeError::BackendSendFailure(e.to_string()))
    }

    async fn teardown(&self) {
        self.connected.store(false, Ordering::SeqCst);

        if let Some(task) = self.receive_task.lock().await.take() {
            task.abort();
        }

        self.pending_stream.lock().await.take();

        let sink = self.sink.lock().await.take();
        if let Some(mut sink) = sink {
            match timeout(CLOSE_TIMEOUT, sink.close()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!("Backend transport close for {}: {}", self.client_id, e),
                Err(_) => debug!("Backend transport close timed out for {}", self.client_id),
            }
        }
    }

    fn connect_failed(&self, reason: String) -> BridgeError {
        error!("Failed to connect to recognition backend for {}: {}", self.client_id, reason);
        self.connected.store(false, Ordering::SeqCst);
        self.emit(LinkEvent::Error(format!("Connection failed: {reason}")));
        BridgeError::BackendUnavailable(reason)
    }

    fn emit(&self, event: LinkEvent) {
        if self.events_tx.send(event).is_err() {
            debug!("Event receiver for {} is gone", self.client_id);
        }
    }
}

impl Drop for RecognitionLink {
    fn drop(&mut self) {
        if let Some(task) = self.receive_task.get_mut().take() {
            task.abort();
        }
    }
}

/// Read backend frames until the transport closes, emitting one event per result.
async fn receive_loop(
    client_id: String,
    mut stream: SplitStream<BackendStream>,
    default_mode: String,
    connected: Arc<AtomicBool>,
    events: mpsc::UnboundedSender<LinkEvent>,
    stats: Arc<LinkStats>,
) {
    debug!("Backend receive loop started for {}", client_id);

    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => {
                handle_frame(&client_id, text.as_str(), &default_mode, &events, &stats)
            }
            Ok(Message::Binary(data)) => match std::str::from_utf8(&data) {
                Ok(text) => handle_frame(&client_id, text, &default_mode, &events, &stats),
                Err(e) => warn!("Discarding non-UTF-8 backend frame for {}: {}", client_id, e),
            },
            Ok(Message::Close(frame)) => {
                debug!("Backend sent close for {}: {:?}", client_id, frame);
                break;
            }
            Ok(_) => {}
            Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => break,
            Err(WsError::Protocol(e)) if is_abrupt_close(&e) => {
                debug!("Backend dropped connection for {}: {}", client_id, e);
                break;
            }
            Err(e) => {
                error!("Failed to receive from recognition backend for {}: {}", client_id, e);
                connected.store(false, Ordering::SeqCst);
                let _ = events.send(LinkEvent::Error(format!("Failed to receive results: {e}")));
                return;
            }
        }
    }

    connected.store(false, Ordering::SeqCst);
    info!("Recognition backend closed the connection for {}", client_id);
    let _ = events.send(LinkEvent::Closed);
}

fn is_abrupt_close(e: &tokio_tungstenite::tungstenite::error::ProtocolError) -> bool {
    matches!(
        e,
        tokio_tungstenite::tungstenite::error::ProtocolError::ResetWithoutClosingHandshake
    )
}

fn handle_frame(
    client_id: &str,
    payload: &str,
    default_mode: &str,
    events: &mpsc::UnboundedSender<LinkEvent>,
    stats: &LinkStats,
) {
    let result = match RecognitionResult::decode(payload, default_mode) {
        Ok(result) => result,
        Err(e) => {
            warn!("Discarding malformed backend frame for {}: {}", client_id, e);
            return;
        }
    };

    if result.is_empty() {
        stats.record_dropped();
        return;
    }

    debug!(
        "Recognition result for {} (mode={}, final={}): {}",
        client_id, result.mode, result.is_final, result.text
    );
    stats.record_result();

    if events.send(LinkEvent::Result(result)).is_err() {
        debug!("Event receiver for {} is gone, result discarded", client_id);
    }
}
