use crate::asr::LinkConfig;
use crate::session::SessionRegistry;
use std::sync::Arc;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Active client sessions and their recognition links
    pub registry: Arc<SessionRegistry>,

    /// Backend settings every new recognition link starts from
    pub link_config: Arc<LinkConfig>,

    /// Origins allowed by CORS (empty = any)
    pub allowed_origins: Vec<String>,
}

impl AppState {
    pub fn new(link_config: LinkConfig) -> Self {
        Self {
            registry: Arc::new(SessionRegistry::new()),
            link_config: Arc::new(link_config),
            allowed_origins: Vec::new(),
        }
    }

    pub fn with_allowed_origins(mut self, origins: Vec<String>) -> Self {
        self.allowed_origins = origins;
        self
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(LinkConfig::default())
    }
}
