//! Observability counters for the pricing engine
//!
//! Tracks update admission outcomes, snapshot computation, broadcast
//! delivery, and transport health. All counters are lock-free atomics so the
//! hot ingestion and publish paths never contend on observability.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Core metrics for the pricing engine.
#[derive(Debug, Default)]
pub struct ServiceMetrics {
    /// Updates admitted by the store (rate, weights, or external snapshot).
    pub updates_applied: AtomicU64,
    /// Updates dropped as stale (version <= stored version).
    pub updates_stale: AtomicU64,
    /// Inbound messages dropped as malformed.
    pub events_malformed: AtomicU64,
    /// Snapshots recomputed locally.
    pub snapshots_computed: AtomicU64,
    /// Externally-computed snapshots installed.
    pub snapshots_installed: AtomicU64,
    /// Change events published to subscribers.
    pub broadcasts_sent: AtomicU64,
    /// Keepalive events delivered to idle subscribers.
    pub keepalives_sent: AtomicU64,
    /// Subscribers pruned for full or closed outboxes.
    pub subscribers_pruned: AtomicU64,
    /// Transport-level failures observed by the consumer loop.
    pub transport_errors: AtomicU64,
}

impl ServiceMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_applied(&self) {
        self.updates_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stale(&self) {
        self.updates_stale.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_malformed(&self) {
        self.events_malformed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_snapshot_computed(&self) {
        self.snapshots_computed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_snapshot_installed(&self) {
        self.snapshots_installed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_broadcast(&self) {
        self.broadcasts_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_keepalives(&self, count: u64) {
        self.keepalives_sent.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_pruned(&self) {
        self.subscribers_pruned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_transport_error(&self) {
        self.transport_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time view of all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            updates_applied: self.updates_applied.load(Ordering::Relaxed),
            updates_stale: self.updates_stale.load(Ordering::Relaxed),
            events_malformed: self.events_malformed.load(Ordering::Relaxed),
            snapshots_computed: self.snapshots_computed.load(Ordering::Relaxed),
            snapshots_installed: self.snapshots_installed.load(Ordering::Relaxed),
            broadcasts_sent: self.broadcasts_sent.load(Ordering::Relaxed),
            keepalives_sent: self.keepalives_sent.load(Ordering::Relaxed),
            subscribers_pruned: self.subscribers_pruned.load(Ordering::Relaxed),
            transport_errors: self.transport_errors.load(Ordering::Relaxed),
        }
    }
}

/// Serializable counter snapshot for health/stats surfaces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub updates_applied: u64,
    pub updates_stale: u64,
    pub events_malformed: u64,
    pub snapshots_computed: u64,
    pub snapshots_installed: u64,
    pub broadcasts_sent: u64,
    pub keepalives_sent: u64,
    pub subscribers_pruned: u64,
    pub transport_errors: u64,
}
