use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Running counters of a recognition link
#[derive(Debug, Default)]
pub struct LinkStats {
    chunks_sent: AtomicU64,
    bytes_sent: AtomicU64,
    results_received: AtomicU64,
    results_dropped: AtomicU64,
}

impl LinkStats {
    pub fn record_chunk(&self, bytes: usize) {
        self.chunks_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_result(&self) {
        self.results_received.fetch_add(1, Ordering::Relaxed);
    }

    /// A frame decoded fine but carried no text
    pub fn record_dropped(&self) {
        self.results_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> LinkStatsSnapshot {
        LinkStatsSnapshot {
            chunks_sent: self.chunks_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            results_received: self.results_received.load(Ordering::Relaxed),
            results_dropped: self.results_dropped.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`LinkStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkStatsSnapshot {
    /// Audio frames forwarded to the backend
    pub chunks_sent: u64,

    /// Audio bytes forwarded to the backend
    pub bytes_sent: u64,

    /// Non-empty results emitted to the session
    pub results_received: u64,

    /// Results discarded because their text was empty
    pub results_dropped: u64,
}
