//! Query identifiers and the reserved probe ids

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Query id of the replica watermark probe
pub const REPLICA_PROBE_ID: &str = "replica_replication_time";

/// Prefix of the per-write master timestamp probe ids
pub const WRITE_PROBE_PREFIX: &str = "write_replication_time";

/// Globally unique query identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryId(String);

/// Which reserved probe, if any, a query id names
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeKind {
    /// Replica watermark probe
    Replica,
    /// Master timestamp probe for the write with this counter value
    WriteTimestamp(u64),
}

impl QueryId {
    /// Wrap a caller supplied id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh random id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// The replica watermark probe id.
    pub fn replica_probe() -> Self {
        Self(REPLICA_PROBE_ID.to_string())
    }

    /// The master timestamp probe id for write number `counter`.
    pub fn write_probe(counter: u64) -> Self {
        Self(format!("{}{}", WRITE_PROBE_PREFIX, counter))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Classify this id as one of the reserved probe ids.
    pub fn probe_kind(&self) -> Option<ProbeKind> {
        if self.0 == REPLICA_PROBE_ID {
            return Some(ProbeKind::Replica);
        }
        self.0
            .strip_prefix(WRITE_PROBE_PREFIX)
            .and_then(|n| n.parse::<u64>().ok())
            .map(ProbeKind::WriteTimestamp)
    }

    /// Whether this id is reserved for a probe.
    pub fn is_probe(&self) -> bool {
        self.probe_kind().is_some()
    }
}

impl fmt::Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for QueryId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for QueryId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_unique() {
        assert_ne!(QueryId::generate(), QueryId::generate());
    }

    #[test]
    fn test_probe_kinds() {
        assert_eq!(QueryId::replica_probe().probe_kind(), Some(ProbeKind::Replica));
        assert_eq!(
            QueryId::write_probe(3).probe_kind(),
            Some(ProbeKind::WriteTimestamp(3))
        );
        assert_eq!(QueryId::write_probe(12).as_str(), "write_replication_time12");
        assert_eq!(QueryId::new("user-query").probe_kind(), None);
        assert_eq!(QueryId::new("write_replication_timeX").probe_kind(), None);
    }
}
