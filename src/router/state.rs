//! Consistency state of one client instance
//!
//! `last_write_time` set means a write happened that the replica may not
//! reflect yet; every query is pinned to master until it is cleared.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::protocol::QueryId;

/// Time of the newest write the replica has to catch up with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "at")]
pub enum WriteMark {
    /// Write suspected, master timestamp not known yet. Later than any
    /// watermark.
    Sentinel,
    /// Master timestamp of the write
    At(DateTime<Utc>),
}

impl WriteMark {
    /// Whether a replica at `watermark` already shows this write.
    pub fn is_visible_at(&self, watermark: DateTime<Utc>) -> bool {
        match self {
            WriteMark::Sentinel => false,
            WriteMark::At(ts) => watermark > *ts,
        }
    }
}

impl fmt::Display for WriteMark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteMark::Sentinel => f.write_str("pending"),
            WriteMark::At(ts) => write!(f, "{}", ts.to_rfc3339()),
        }
    }
}

/// Position in the write visibility protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsistencyPhase {
    /// No pending write
    Clean,
    /// Write happened, replica not proven caught up, nothing in flight
    AwaitingVisibility,
    /// A timestamp or watermark probe is in flight or scheduled
    Probing,
}

/// Write tracking shared by the watcher and stale read recovery
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsistencyState {
    last_write_time: Option<WriteMark>,
    write_counter: u64,
    pending_probe_id: Option<QueryId>,
}

impl ConsistencyState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_write_time(&self) -> Option<WriteMark> {
        self.last_write_time
    }

    pub fn write_counter(&self) -> u64 {
        self.write_counter
    }

    pub fn pending_probe_id(&self) -> Option<&QueryId> {
        self.pending_probe_id.as_ref()
    }

    /// Whether queries must currently be pinned to master.
    pub fn is_write_pending(&self) -> bool {
        self.last_write_time.is_some()
    }

    /// Set the sentinel if no write is pending. Returns true if it was set.
    pub fn pin_if_clean(&mut self) -> bool {
        if self.last_write_time.is_some() {
            return false;
        }
        self.last_write_time = Some(WriteMark::Sentinel);
        true
    }

    /// Set the sentinel unconditionally.
    pub fn pin(&mut self) {
        self.last_write_time = Some(WriteMark::Sentinel);
    }

    /// Undo a sentinel nothing has built on yet.
    pub fn unpin(&mut self) {
        if self.last_write_time == Some(WriteMark::Sentinel) && self.write_counter == 0 {
            self.last_write_time = None;
        }
    }

    /// Put back a mark saved before a pin whose query never left.
    pub fn restore_write_mark(&mut self, mark: Option<WriteMark>) {
        self.last_write_time = mark;
    }

    /// Record the master timestamp of a write.
    ///
    /// Replaces the sentinel; a real timestamp never moves backwards.
    pub fn observe_write(&mut self, at: DateTime<Utc>) {
        self.last_write_time = match self.last_write_time {
            Some(WriteMark::At(current)) if current >= at => Some(WriteMark::At(current)),
            _ => Some(WriteMark::At(at)),
        };
    }

    /// Count one completed master write and return the new counter.
    pub fn next_write(&mut self) -> u64 {
        self.write_counter += 1;
        self.write_counter
    }

    pub fn set_pending_probe(&mut self, id: Option<QueryId>) {
        self.pending_probe_id = id;
    }

    /// Replica proven caught up.
    pub fn reset(&mut self) {
        self.last_write_time = None;
        self.write_counter = 0;
    }
}

/// Read-only view of the consistency state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsistencySnapshot {
    pub phase: ConsistencyPhase,
    pub last_write_time: Option<WriteMark>,
    pub write_counter: u64,
    pub pending_probe_id: Option<QueryId>,
}
