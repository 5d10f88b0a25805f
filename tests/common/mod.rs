// Test helpers: a scripted FunASR-style backend and client-side plumbing
// for driving sessions without a real browser.

#![allow(dead_code)]

use funasr_bridge::session::{InboundFrame, Outbound};
use funasr_bridge::{BridgeError, ClientMessage, LinkConfig};
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::Message;

/// What the mock backend does after reading the handshake
#[derive(Debug, Clone)]
pub enum Script {
    /// Send these text frames, then keep reading until the client leaves
    Reply(Vec<String>),
    /// Close the websocket right away
    CloseAfterHandshake,
    /// Write a frame with a reserved opcode, then keep the socket open
    ProtocolGarbage,
}

pub struct MockBackend {
    pub port: u16,
    /// Every frame the bridge sent, handshake first
    pub received: mpsc::UnboundedReceiver<Message>,
}

impl MockBackend {
    pub fn link_config(&self) -> LinkConfig {
        link_config(self.port)
    }

    /// Next text frame from the bridge, parsed as JSON
    pub async fn next_json(&mut self) -> serde_json::Value {
        loop {
            let message = tokio::time::timeout(Duration::from_secs(5), self.received.recv())
                .await
                .expect("backend timed out waiting for a frame")
                .expect("backend connection ended");
            if let Message::Text(text) = message {
                return serde_json::from_str(text.as_str()).expect("bridge sent invalid JSON");
            }
        }
    }
}

/// Link config for a local plain-websocket backend without subprotocol negotiation
pub fn link_config(port: u16) -> LinkConfig {
    LinkConfig {
        subprotocol: None,
        connect_timeout_ms: 2000,
        ..LinkConfig::new("127.0.0.1", port)
    }
}

/// A port nothing listens on
pub async fn refused_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

/// Start a backend accepting a single connection and following `script`
pub async fn spawn_backend(script: Script) -> MockBackend {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (tx, received) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let Ok((stream, _)) = listener.accept().await else {
            return;
        };
        let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
            return;
        };

        // Handshake
        match ws.next().await {
            Some(Ok(message)) => {
                let _ = tx.send(message);
            }
            _ => return,
        }

        match script {
            Script::CloseAfterHandshake => {
                let _ = ws.close(None).await;
                while let Some(Ok(_)) = ws.next().await {}
            }
            Script::ProtocolGarbage => {
                // FIN + opcode 0xF, empty unmasked payload
                let tcp = ws.get_mut();
                if tcp.write_all(&[0x8F, 0x00]).await.is_err() || tcp.flush().await.is_err() {
                    return;
                }
                while let Some(Ok(_)) = ws.next().await {}
            }
            Script::Reply(frames) => {
                for frame in frames {
                    if ws.send(Message::text(frame)).await.is_err() {
                        return;
                    }
                }
                while let Some(Ok(message)) = ws.next().await {
                    if tx.send(message).is_err() {
                        break;
                    }
                }
            }
        }
    });

    MockBackend { port, received }
}

/// Inbound side of a simulated client
pub type ClientFrames = futures::channel::mpsc::UnboundedSender<Result<InboundFrame, BridgeError>>;

pub fn client_frames() -> (
    ClientFrames,
    futures::channel::mpsc::UnboundedReceiver<Result<InboundFrame, BridgeError>>,
) {
    futures::channel::mpsc::unbounded()
}

/// What a simulated client observed
#[derive(Debug, Clone, PartialEq)]
pub enum Observed {
    Message(ClientMessage),
    Close(u16),
}

/// Next frame queued for the client, decoded; `None` once the queue is closed
pub async fn next_observed(outbound: &mut mpsc::UnboundedReceiver<Outbound>) -> Option<Observed> {
    let frame = tokio::time::timeout(Duration::from_secs(5), outbound.recv())
        .await
        .expect("timed out waiting for a client frame")?;

    Some(match frame {
        Outbound::Text(text) => {
            Observed::Message(serde_json::from_str(&text).expect("client frame is not a ClientMessage"))
        }
        Outbound::Close { code, .. } => Observed::Close(code),
    })
}

/// Everything queued for the client until the queue closes
pub async fn drain_observed(outbound: &mut mpsc::UnboundedReceiver<Outbound>) -> Vec<Observed> {
    let mut observed = Vec::new();
    while let Some(frame) = next_observed(outbound).await {
        observed.push(frame);
    }
    observed
}

/// 100ms of 16kHz mono s16le with a non-trivial waveform
pub fn speech_chunk() -> Vec<u8> {
    (0..1600i16)
        .map(|i| (i % 64) * 200)
        .flat_map(|sample| sample.to_le_bytes())
        .collect()
}

pub async fn send_frames(frames: &ClientFrames, count: usize) {
    for _ in 0..count {
        frames
            .unbounded_send(Ok(InboundFrame::Audio(speech_chunk())))
            .expect("session stopped reading");
    }
}
