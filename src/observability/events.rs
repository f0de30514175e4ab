//! Lifecycle events of the consistency router
//!
//! Events are explicit and typed. Each maps to a stable SCREAMING_SNAKE
//! name that appears as the `event` field of the log line.

use std::fmt;

/// Observable events in the router
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Connections
    /// Connection established (or re-established)
    ConnectionOpened,
    /// Connection dropped
    ConnectionClosed,
    /// Transport reported an error
    ConnectionError,

    // Routing
    /// Query sent to the replica
    QueryRoutedReplica,
    /// Query sent to the master
    QueryRoutedMaster,
    /// Query could not be sent
    QueryRejected,

    // Consistency protocol
    /// A write became known; reads are pinned to master
    WriteObserved,
    /// Master reported the timestamp of a write
    WriteTimestamped,
    /// Replica watermark probe sent
    ProbeIssued,
    /// Replica watermark probe will be retried
    ProbeRescheduled,
    /// Replica caught up; reads go back to the replica
    ReplicaRecovered,
    /// Replica refused a write; query moved to master
    StaleWriteRecovered,

    // Buffering
    /// Row arrived outside any row-set
    RowDropped,

    // Lifecycle
    /// Client shutting down
    ShutdownStart,
    /// Client stopped
    ShutdownComplete,
    /// Configuration loaded
    ConfigLoaded,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ConnectionOpened => "CONNECTION_OPENED",
            Event::ConnectionClosed => "CONNECTION_CLOSED",
            Event::ConnectionError => "CONNECTION_ERROR",

            Event::QueryRoutedReplica => "QUERY_ROUTED_REPLICA",
            Event::QueryRoutedMaster => "QUERY_ROUTED_MASTER",
            Event::QueryRejected => "QUERY_REJECTED",

            Event::WriteObserved => "WRITE_OBSERVED",
            Event::WriteTimestamped => "WRITE_TIMESTAMPED",
            Event::ProbeIssued => "PROBE_ISSUED",
            Event::ProbeRescheduled => "PROBE_RESCHEDULED",
            Event::ReplicaRecovered => "REPLICA_RECOVERED",
            Event::StaleWriteRecovered => "STALE_WRITE_RECOVERED",

            Event::RowDropped => "ROW_DROPPED",

            Event::ShutdownStart => "SHUTDOWN_START",
            Event::ShutdownComplete => "SHUTDOWN_COMPLETE",
            Event::ConfigLoaded => "CONFIG_LOADED",
        }
    }

    /// Severity the event is logged at
    pub fn severity(&self) -> Severity {
        match self {
            Event::ConnectionError | Event::QueryRejected | Event::RowDropped => Severity::Warn,
            Event::QueryRoutedReplica
            | Event::QueryRoutedMaster
            | Event::ProbeIssued
            | Event::ProbeRescheduled => Severity::Debug,
            _ => Severity::Info,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Log severity of an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Debug,
    Info,
    Warn,
}
