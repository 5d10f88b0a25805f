use super::messages::{ClientMessage, CLOSE_GOING_AWAY, CLOSE_GOING_AWAY_REASON, CLOSE_REPLACED, CLOSE_REPLACED_REASON};
use crate::asr::{LinkConfig, RecognitionLink};
use crate::error::{BridgeError, BridgeResult};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Frames queued for a client socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// A JSON text frame
    Text(String),
    /// Close the socket with the given code and reason
    Close { code: u16, reason: String },
}

/// Sending side of a client connection.
///
/// Frames go through a queue drained by the socket's writer task, so sends
/// never block and per-client order is preserved.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    tx: mpsc::UnboundedSender<Outbound>,
}

impl ClientHandle {
    /// A handle plus the queue its frames arrive on
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn send(&self, message: &ClientMessage) -> BridgeResult<()> {
        let json = message.to_json()?;
        self.send_text(json)
    }

    pub fn send_text(&self, text: String) -> BridgeResult<()> {
        self.tx
            .send(Outbound::Text(text))
            .map_err(|_| BridgeError::ClientDisconnected)
    }

    /// Ask the writer to close the socket. No-op if it is already gone.
    pub fn close(&self, code: u16, reason: impl Into<String>) {
        let _ = self.tx.send(Outbound::Close {
            code,
            reason: reason.into(),
        });
    }
}

/// Proof of ownership of a client id's registry entries, returned by
/// [`SessionRegistry::open_session`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionToken {
    client_id: String,
    id: Uuid,
}

impl SessionToken {
    pub fn id(&self) -> Uuid {
        self.id
    }
}

struct ClientEntry {
    handle: ClientHandle,
    /// Set when registered through `open_session`
    token: Option<Uuid>,
}

#[derive(Default)]
struct Registry {
    clients: HashMap<String, ClientEntry>,
    links: HashMap<String, Arc<RecognitionLink>>,
}

/// Active client connections and their recognition links, keyed by client id.
///
/// Both maps sit behind one lock so registration and removal are atomic
/// per key. Links are always disconnected outside the lock.
#[derive(Default)]
pub struct SessionRegistry {
    inner: RwLock<Registry>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handle` under `client_id`, overwriting any previous handle.
    pub async fn connect(&self, client_id: &str, handle: ClientHandle) {
        let mut inner = self.inner.write().await;
        inner.clients.insert(
            client_id.to_string(),
            ClientEntry {
                handle,
                token: None,
            },
        );
        info!("Client {} connected", client_id);
    }

    /// Remove the client and tear down its recognition link, if any.
    pub async fn disconnect(&self, client_id: &str) {
        let link = {
            let mut inner = self.inner.write().await;
            inner.clients.remove(client_id);
            inner.links.remove(client_id)
        };

        if let Some(link) = link {
            link.disconnect().await;
        }

        info!("Client {} disconnected", client_id);
    }

    /// Register a new session for `client_id`, replacing any session already
    /// registered under that id (its socket is closed and its link torn down).
    pub async fn open_session(&self, client_id: &str, handle: ClientHandle) -> SessionToken {
        let token = SessionToken {
            client_id: client_id.to_string(),
            id: Uuid::new_v4(),
        };

        let (previous, stale_link) = {
            let mut inner = self.inner.write().await;
            let previous = inner.clients.insert(
                client_id.to_string(),
                ClientEntry {
                    handle,
                    token: Some(token.id),
                },
            );
            (previous, inner.links.remove(client_id))
        };

        if let Some(previous) = previous {
            warn!("Client {} reconnected, replacing previous session", client_id);
            previous.handle.close(CLOSE_REPLACED, CLOSE_REPLACED_REASON);
        }
        if let Some(link) = stale_link {
            link.disconnect().await;
        }

        info!("Client {} connected (session {})", client_id, token.id);

        token
    }

    /// Remove the entries owned by `token`.
    ///
    /// Entries already taken over by a newer session are left alone.
    /// Returns whether anything was removed.
    pub async fn close_session(&self, token: &SessionToken) -> bool {
        let link = {
            let mut inner = self.inner.write().await;
            let owned = inner
                .clients
                .get(&token.client_id)
                .is_some_and(|entry| entry.token == Some(token.id));
            if !owned {
                debug!(
                    "Session {} for {} no longer owns its registry entries",
                    token.id, token.client_id
                );
                return false;
            }
            inner.clients.remove(&token.client_id);
            inner.links.remove(&token.client_id)
        };

        if let Some(link) = link {
            link.disconnect().await;
        }

        info!("Client {} disconnected (session {})", token.client_id, token.id);

        true
    }

    /// Remove the client entry owned by `token`, leaving any link in place.
    ///
    /// Returns whether the entry was removed.
    pub async fn release_client(&self, token: &SessionToken) -> bool {
        let mut inner = self.inner.write().await;
        let owned = inner
            .clients
            .get(&token.client_id)
            .is_some_and(|entry| entry.token == Some(token.id));
        if !owned {
            return false;
        }
        inner.clients.remove(&token.client_id);
        info!("Client {} released (session {})", token.client_id, token.id);

        true
    }

    /// The link registered for `client_id`, created (unconnected) from
    /// `config` if there is none yet.
    pub async fn get_or_create_link(&self, client_id: &str, config: &LinkConfig) -> Arc<RecognitionLink> {
        if let Some(link) = self.get_link(client_id).await {
            return link;
        }

        // Built outside the lock: construction reads the hotword file
        let candidate = Arc::new(RecognitionLink::new(client_id, config.clone()));

        let mut inner = self.inner.write().await;
        let link = inner
            .links
            .entry(client_id.to_string())
            .or_insert_with(|| {
                debug!("Registered recognition link for {}", client_id);
                candidate
            });
        Arc::clone(link)
    }

    pub async fn get_link(&self, client_id: &str) -> Option<Arc<RecognitionLink>> {
        self.inner.read().await.links.get(client_id).cloned()
    }

    /// Best-effort send; returns whether the message was queued.
    pub async fn send_to_client(&self, client_id: &str, message: &ClientMessage) -> bool {
        let handle = {
            let inner = self.inner.read().await;
            match inner.clients.get(client_id) {
                Some(entry) => entry.handle.clone(),
                None => {
                    debug!("Client {} is gone, dropping message", client_id);
                    return false;
                }
            }
        };

        match handle.send(message) {
            Ok(()) => true,
            Err(e) => {
                debug!("Failed to send to client {}: {}", client_id, e);
                false
            }
        }
    }

    /// Send to every registered client; returns how many sends were queued.
    pub async fn broadcast(&self, message: &ClientMessage) -> usize {
        let json = match message.to_json() {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to encode broadcast message: {}", e);
                return 0;
            }
        };

        let handles: Vec<(String, ClientHandle)> = {
            let inner = self.inner.read().await;
            inner
                .clients
                .iter()
                .map(|(id, entry)| (id.clone(), entry.handle.clone()))
                .collect()
        };

        let mut delivered = 0;
        for (client_id, handle) in handles {
            match handle.send_text(json.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => debug!("Broadcast to {} failed: {}", client_id, e),
            }
        }

        delivered
    }

    pub async fn has_client(&self, client_id: &str) -> bool {
        self.inner.read().await.clients.contains_key(client_id)
    }

    pub async fn has_link(&self, client_id: &str) -> bool {
        self.inner.read().await.links.contains_key(client_id)
    }

    /// Number of registered client connections
    pub async fn active_count(&self) -> usize {
        self.inner.read().await.clients.len()
    }

    /// Number of registered recognition links
    pub async fn link_count(&self) -> usize {
        self.inner.read().await.links.len()
    }

    /// Registered client ids, sorted
    pub async fn active_clients(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.inner.read().await.clients.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Close every client socket and disconnect every link.
    pub async fn shutdown(&self) {
        let (clients, links) = {
            let mut inner = self.inner.write().await;
            (
                std::mem::take(&mut inner.clients),
                std::mem::take(&mut inner.links),
            )
        };

        info!(
            "Shutting down {} client sessions and {} recognition links",
            clients.len(),
            links.len()
        );

        for entry in clients.into_values() {
            entry.handle.close(CLOSE_GOING_AWAY, CLOSE_GOING_AWAY_REASON);
        }
        for link in links.into_values() {
            link.disconnect().await;
        }
    }
}
