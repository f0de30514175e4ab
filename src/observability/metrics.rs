//! Router counters
//!
//! - Counters only, monotonic
//! - Reset only on process start
//! - Relaxed atomics; shared between the router task and its handles

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Operational counters of one client instance
#[derive(Debug, Default)]
pub struct RouterMetrics {
    /// Queries accepted for sending
    queries_submitted: AtomicU64,
    /// Queries sent to the master connection
    routed_master: AtomicU64,
    /// Queries sent to the replica connection
    routed_replica: AtomicU64,
    /// Queries refused by the registry or the channel
    queries_rejected: AtomicU64,
    /// Probe queries sent (master timestamp and replica watermark)
    probes_issued: AtomicU64,
    /// Replica probe retries scheduled
    probes_rescheduled: AtomicU64,
    /// Times the replica was proven caught up
    replica_recoveries: AtomicU64,
    /// Stale write signals recovered on master
    stale_writes_recovered: AtomicU64,
}

impl RouterMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_submitted(&self) {
        self.queries_submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_routed_master(&self) {
        self.routed_master.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_routed_replica(&self) {
        self.routed_replica.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_rejected(&self) {
        self.queries_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_probes_issued(&self) {
        self.probes_issued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_probes_rescheduled(&self) {
        self.probes_rescheduled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_replica_recoveries(&self) {
        self.replica_recoveries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_stale_writes(&self) {
        self.stale_writes_recovered.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of all counters
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            queries_submitted: self.queries_submitted.load(Ordering::Relaxed),
            routed_master: self.routed_master.load(Ordering::Relaxed),
            routed_replica: self.routed_replica.load(Ordering::Relaxed),
            queries_rejected: self.queries_rejected.load(Ordering::Relaxed),
            probes_issued: self.probes_issued.load(Ordering::Relaxed),
            probes_rescheduled: self.probes_rescheduled.load(Ordering::Relaxed),
            replica_recoveries: self.replica_recoveries.load(Ordering::Relaxed),
            stale_writes_recovered: self.stale_writes_recovered.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of [`RouterMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub queries_submitted: u64,
    pub routed_master: u64,
    pub routed_replica: u64,
    pub queries_rejected: u64,
    pub probes_issued: u64,
    pub probes_rescheduled: u64,
    pub replica_recoveries: u64,
    pub stale_writes_recovered: u64,
}
