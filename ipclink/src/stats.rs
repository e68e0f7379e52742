//! Per-connection statistics.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Snapshot of one connection's counters.
///
/// Counters are advisory: they are updated by the worker without holding
/// queue locks, so a snapshot can trail the queues by a few messages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    /// Peers currently attached (0 or 1 for single-peer modes).
    pub peers_connected: usize,
    /// Messages handed to the transport.
    pub messages_sent: u64,
    /// Messages queued inbound from the transport.
    pub messages_received: u64,
    /// Messages lost to queue eviction or transport failure.
    pub messages_dropped: u64,
}

/// Live counters behind a connection's stats snapshot.
pub(crate) struct Metrics {
    peers: AtomicUsize,
    sent: AtomicU64,
    received: AtomicU64,
    dropped: AtomicU64,
}

impl Metrics {
    pub(crate) fn new() -> Self {
        Self {
            peers: AtomicUsize::new(0),
            sent: AtomicU64::new(0),
            received: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    pub(crate) fn record_sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn peer_attached(&self) {
        self.peers.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn peer_detached(&self) {
        self.peers.fetch_sub(1, Ordering::Relaxed);
    }

    /// Set the attached-peer count directly (fan-out modes track a set).
    pub(crate) fn set_peers(&self, count: usize) {
        self.peers.store(count, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> ConnectionStats {
        ConnectionStats {
            peers_connected: self.peers.load(Ordering::Relaxed),
            messages_sent: self.sent.load(Ordering::Relaxed),
            messages_received: self.received.load(Ordering::Relaxed),
            messages_dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}
