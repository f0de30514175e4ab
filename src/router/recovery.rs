//! Stale write recovery
//!
//! The replica answers `error { error: "replicawrite" }` when it was handed
//! a query that turned out to be a write. The query is moved to master once,
//! with its original template and data, and reads stay pinned until the
//! write is visible on the replica.

use tracing::warn;

use super::watcher::ConsistencyWatcher;
use crate::observability::{log_event, Event};
use crate::protocol::{QueryId, QueryRequest};
use crate::registry::PendingQueryRegistry;

/// Turns a stale write signal into the master resubmission
pub struct StaleReadRecovery;

impl StaleReadRecovery {
    /// Reclassify `query_id` as Write, pin the consistency state and build
    /// the request to resend on master.
    ///
    /// The registry entry is retired so the resubmission can register under
    /// the same id. Returns `None` when the query is not live, which makes a
    /// repeated signal for an already moved query a no-op.
    pub fn recover(
        registry: &mut PendingQueryRegistry,
        watcher: &mut ConsistencyWatcher,
        query_id: &QueryId,
        master_connection: &str,
    ) -> Option<QueryRequest> {
        if registry.mark_write(query_id).is_err() {
            warn!(query_id = %query_id, "stale write signal for untracked query");
            return None;
        }
        let query = registry.retire(query_id)?;
        watcher.on_stale_write();

        log_event(Event::StaleWriteRecovered, &[("query_id", query_id.as_str())]);

        let mut request = QueryRequest::new(
            query.template_name,
            master_connection,
            query.data,
            query.id,
        );
        request.is_write = true;
        Some(request)
    }
}
