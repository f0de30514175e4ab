//! Query routing and inbound dispatch
//!
//! [`QueryRouter`] owns every piece of per-client state. It is not shared:
//! the client actor calls into it one event at a time.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::errors::{RouterError, RouterResult};
use super::events::{EventSink, RouterEvent};
use super::recovery::StaleReadRecovery;
use super::scheduler::{ProbeFired, ProbeScheduler};
use super::state::ConsistencySnapshot;
use super::watcher::{ConsistencyWatcher, ProbeRequest, WatermarkOutcome};
use crate::channel::{ChannelEvent, ChannelEventKind, ConnectionManager, ConnectionRole};
use crate::observability::{log_event, Event, RouterMetrics};
use crate::protocol::{parse_frame, InboundMessage, ProbeKind, QueryId, QueryRequest};
use crate::registry::{PendingQueryRegistry, Query, RegistryError};

/// Template used for both watermark probes
pub const DEFAULT_PROBE_TEMPLATE: &str = "get_replication_time.mustache";

/// Server side connection names and the probe template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterSettings {
    /// Connection name for queries served by the replica
    pub replica_connection: String,
    /// Connection name substituted when a query is pinned to master
    pub master_connection: String,
    pub probe_template: String,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            replica_connection: "replica".to_string(),
            master_connection: "master".to_string(),
            probe_template: DEFAULT_PROBE_TEMPLATE.to_string(),
        }
    }
}

/// A query as submitted by the caller
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySpec {
    pub template: String,
    /// Defaults to the replica connection name
    pub connection_name: Option<String>,
    pub data: Value,
    /// Generated when absent
    pub query_id: Option<QueryId>,
    /// Caller knows this query writes
    pub force_write: bool,
}

impl QuerySpec {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            connection_name: None,
            data: Value::Object(Map::new()),
            query_id: None,
            force_write: false,
        }
    }

    pub fn connection(mut self, name: impl Into<String>) -> Self {
        self.connection_name = Some(name.into());
        self
    }

    pub fn data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    pub fn id(mut self, id: impl Into<QueryId>) -> Self {
        self.query_id = Some(id.into());
        self
    }

    pub fn write(mut self) -> Self {
        self.force_write = true;
        self
    }
}

/// Routes queries between replica and master and keeps reads consistent
/// with earlier writes
pub struct QueryRouter<S: EventSink> {
    settings: RouterSettings,
    connections: ConnectionManager,
    registry: PendingQueryRegistry,
    watcher: ConsistencyWatcher,
    scheduler: Box<dyn ProbeScheduler>,
    sink: S,
    metrics: Arc<RouterMetrics>,
}

impl<S: EventSink> QueryRouter<S> {
    pub fn new(
        settings: RouterSettings,
        connections: ConnectionManager,
        scheduler: Box<dyn ProbeScheduler>,
        sink: S,
    ) -> Self {
        Self {
            settings,
            connections,
            registry: PendingQueryRegistry::new(),
            watcher: ConsistencyWatcher::new(),
            scheduler,
            sink,
            metrics: Arc::new(RouterMetrics::new()),
        }
    }

    /// Share counters with another owner, e.g. a client handle.
    pub fn with_metrics(mut self, metrics: Arc<RouterMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn settings(&self) -> &RouterSettings {
        &self.settings
    }

    pub fn connections(&self) -> &ConnectionManager {
        &self.connections
    }

    pub fn registry(&self) -> &PendingQueryRegistry {
        &self.registry
    }

    pub fn consistency(&self) -> ConsistencySnapshot {
        self.watcher.snapshot()
    }

    pub fn metrics(&self) -> Arc<RouterMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Submit a query.
    ///
    /// The target connection is chosen now and never revisited: master
    /// while any write may be invisible on the replica, replica otherwise.
    pub fn submit(&mut self, spec: QuerySpec) -> RouterResult<QueryId> {
        let query_id = spec.query_id.unwrap_or_else(QueryId::generate);
        if self.registry.contains(&query_id) {
            self.metrics.increment_rejected();
            return Err(RegistryError::DuplicateQueryId(query_id).into());
        }

        let connection_name = spec
            .connection_name
            .unwrap_or_else(|| self.settings.replica_connection.clone());
        let mut request = QueryRequest::new(spec.template, connection_name, spec.data, query_id.clone());

        let pinned = spec.force_write && self.watcher.pin_for_forced_write();
        // Labelled Write even behind a pending write, so its own end
        // still asks master for a timestamp
        request.is_write = spec.force_write;
        self.metrics.increment_submitted();

        let role = self.route(&request.query_id);
        if let Err(e) = self.dispatch(request, role) {
            if pinned {
                self.watcher.unpin();
            }
            return Err(e);
        }
        Ok(query_id)
    }

    /// Feed one transport notification.
    pub fn handle_channel_event(&mut self, event: ChannelEvent) {
        let role = event.role;
        match event.kind {
            ChannelEventKind::Opened => {
                self.connections.on_open(role);
                log_event(Event::ConnectionOpened, &[("role", role.as_str())]);
                self.sink.emit(RouterEvent::Open { role });
            }
            ChannelEventKind::Closed => {
                self.connections.on_close(role);
                log_event(Event::ConnectionClosed, &[("role", role.as_str())]);
                self.sink.emit(RouterEvent::Close { role });
            }
            ChannelEventKind::Error(reason) => {
                self.connections.on_error(role, &reason);
                log_event(Event::ConnectionError, &[("role", role.as_str()), ("error", reason.as_str())]);
                self.sink.emit(RouterEvent::Error {
                    role: Some(role),
                    query_id: None,
                    error: reason,
                });
            }
            ChannelEventKind::Message(text) => match parse_frame(&text) {
                Ok(Some(message)) => self.handle_message(role, message),
                Ok(None) => {}
                Err(e) => warn!(role = %role, error = %e, "dropping undecodable frame"),
            },
        }
    }

    /// Dispatch one decoded message received on `role`.
    pub fn handle_message(&mut self, role: ConnectionRole, message: InboundMessage) {
        if self.is_superseded(role, &message) {
            debug!(role = %role, kind = ?message.kind(), "dropping message for query moved to another connection");
            return;
        }

        if message.is_replica_write() {
            let query_id = message.query_id().cloned();
            self.recover_stale_write(role, query_id);
            return;
        }

        match message {
            InboundMessage::BeginQuery { query_id } => {
                self.watcher.on_begin_query(&mut self.registry, &query_id);
                if !query_id.is_probe() {
                    self.sink.emit(RouterEvent::BeginQuery { query_id });
                }
            }
            InboundMessage::Row { query_id, columns } => match query_id.probe_kind() {
                Some(ProbeKind::Replica) => {
                    let outcome =
                        self.watcher
                            .on_replica_watermark(&self.registry, &columns, self.scheduler.as_mut());
                    match outcome {
                        WatermarkOutcome::Recovered => self.metrics.increment_replica_recoveries(),
                        WatermarkOutcome::Rescheduled => self.metrics.increment_probes_rescheduled(),
                        WatermarkOutcome::Ignored => {}
                    }
                }
                Some(ProbeKind::WriteTimestamp(counter)) => {
                    if let Some(probe) = self.watcher.on_write_timestamp(counter, &columns) {
                        self.send_probe(probe);
                    }
                }
                None => self.sink.emit(RouterEvent::Row { query_id, columns }),
            },
            InboundMessage::BeginRowSet { query_id } => {
                if !query_id.is_probe() {
                    self.sink.emit(RouterEvent::BeginRowSet { query_id });
                }
            }
            InboundMessage::EndRowSet { query_id } => {
                if !query_id.is_probe() {
                    self.sink.emit(RouterEvent::EndRowSet { query_id });
                }
            }
            InboundMessage::EndQuery { query_id } => self.end_query(query_id),
            InboundMessage::Error { query_id, error } => {
                warn!(role = %role, query_id = ?query_id, error = %error, "server reported error");
                self.sink.emit(RouterEvent::Error {
                    role: None,
                    query_id,
                    error,
                });
            }
            InboundMessage::ReplicaMasterWrite { query_id } => {
                self.watcher.on_master_write(&mut self.registry, &query_id);
            }
            InboundMessage::Data(value) => self.sink.emit(RouterEvent::Data(value)),
            InboundMessage::Unknown { kind } => {
                debug!(role = %role, kind = %kind, "ignoring unknown message kind");
            }
        }
    }

    /// A probe retry timer fired.
    pub fn on_probe_timer(&mut self, fired: ProbeFired) {
        if let Some(probe) = self.watcher.on_probe_timer(fired.generation) {
            self.send_probe(probe);
        }
    }

    /// Cancel any scheduled probe and close both connections.
    pub fn shutdown(&mut self) {
        log_event(Event::ShutdownStart, &[("pending", self.registry.len().to_string().as_str())]);
        self.watcher.cancel();
        self.connections.close_all();
        log_event(Event::ShutdownComplete, &[]);
    }

    fn route(&self, query_id: &QueryId) -> ConnectionRole {
        let pinned = self.watcher.state().is_write_pending()
            && self.connections.has_write()
            && query_id.probe_kind() != Some(ProbeKind::Replica);
        if pinned {
            ConnectionRole::Write
        } else {
            ConnectionRole::Read
        }
    }

    /// Register and send. On a send failure the registry entry is removed
    /// again.
    fn dispatch(&mut self, mut request: QueryRequest, role: ConnectionRole) -> RouterResult<()> {
        if role == ConnectionRole::Write {
            request.connection_name = self.settings.master_connection.clone();
        }
        let payload = request.encode()?;

        let sent = match self.registry.register(Query::from_request(&request).routed_to(role)) {
            Ok(()) => {
                let force_close = request.close_on_end.unwrap_or(false);
                let sent = self.connections.send(role, payload, force_close);
                if sent.is_err() {
                    self.registry.retire(&request.query_id);
                }
                sent.map_err(RouterError::from)
            }
            Err(e) => Err(RouterError::from(e)),
        };

        if let Err(e) = sent {
            self.metrics.increment_rejected();
            let reason = e.to_string();
            log_event(
                Event::QueryRejected,
                &[
                    ("query_id", request.query_id.as_str()),
                    ("role", role.as_str()),
                    ("error", reason.as_str()),
                ],
            );
            return Err(e);
        }

        let event = match role {
            ConnectionRole::Write => {
                self.metrics.increment_routed_master();
                Event::QueryRoutedMaster
            }
            ConnectionRole::Read => {
                self.metrics.increment_routed_replica();
                Event::QueryRoutedReplica
            }
        };
        log_event(
            event,
            &[
                ("query_id", request.query_id.as_str()),
                ("template", request.template_name.as_str()),
                ("connection", request.connection_name.as_str()),
            ],
        );
        self.sink.emit(RouterEvent::Send { role, request });
        Ok(())
    }

    /// A message for a live query that arrives on a connection other than
    /// the one the query is currently routed to belongs to an earlier
    /// attempt.
    fn is_superseded(&self, role: ConnectionRole, message: &InboundMessage) -> bool {
        message
            .query_id()
            .and_then(|id| self.registry.lookup(id).ok())
            .is_some_and(|query| query.sent_on != role)
    }

    fn end_query(&mut self, query_id: QueryId) {
        let probe = match self.registry.retire(&query_id) {
            Some(query) => self
                .watcher
                .on_end_query(&query, self.connections.has_write(), self.scheduler.as_mut()),
            None => {
                debug!(query_id = %query_id, "end-of-query for untracked query");
                None
            }
        };

        if !query_id.is_probe() {
            self.sink.emit(RouterEvent::EndQuery { query_id });
        }
        if let Some(probe) = probe {
            self.send_probe(probe);
        }
    }

    fn recover_stale_write(&mut self, role: ConnectionRole, query_id: Option<QueryId>) {
        let Some(query_id) = query_id else {
            warn!(role = %role, "stale write signal without a query id");
            return;
        };
        if !self.connections.has_write() {
            warn!(query_id = %query_id, "stale write signal but no master connection");
            self.sink.emit(RouterEvent::Error {
                role: None,
                query_id: Some(query_id),
                error: crate::protocol::REPLICA_WRITE_ERROR.to_string(),
            });
            return;
        }

        let previous = self.watcher.state().last_write_time();
        let Some(request) = StaleReadRecovery::recover(
            &mut self.registry,
            &mut self.watcher,
            &query_id,
            &self.settings.master_connection,
        ) else {
            return;
        };
        self.sink.emit(RouterEvent::ReplicaWrite {
            query_id: query_id.clone(),
        });

        match self.dispatch(request, ConnectionRole::Write) {
            Ok(()) => self.metrics.increment_stale_writes(),
            Err(e) => {
                // The query is gone from the registry; fail it for its waiter
                warn!(query_id = %query_id, error = %e, "stale write not resubmitted");
                self.watcher.stale_write_failed(previous);
                self.sink.emit(RouterEvent::Error {
                    role: None,
                    query_id: Some(query_id),
                    error: e.to_string(),
                });
            }
        }
    }

    fn send_probe(&mut self, probe: ProbeRequest) {
        match probe {
            ProbeRequest::WriteTimestamp(counter) => {
                let id = QueryId::write_probe(counter);
                let request = self.probe_request(id.clone(), &self.settings.master_connection);
                match self.dispatch(request, ConnectionRole::Write) {
                    Ok(()) => self.probe_issued(&id),
                    Err(e) => {
                        warn!(query_id = %id, error = %e, "write probe not sent");
                        self.watcher.write_probe_failed(counter);
                    }
                }
            }
            ProbeRequest::ReplicaWatermark => {
                let id = QueryId::replica_probe();
                if self.registry.retire(&id).is_some() {
                    debug!("replacing unanswered replica probe");
                }
                let request = self.probe_request(id.clone(), &self.settings.replica_connection);
                match self.dispatch(request, ConnectionRole::Read) {
                    Ok(()) => {
                        self.watcher.probe_sent();
                        self.probe_issued(&id);
                    }
                    Err(e) => {
                        warn!(query_id = %id, error = %e, "replica probe not sent");
                        self.watcher.probe_failed(self.scheduler.as_mut());
                    }
                }
            }
        }
    }

    fn probe_request(&self, id: QueryId, connection: &str) -> QueryRequest {
        QueryRequest::new(self.settings.probe_template.as_str(), connection, Value::Null, id)
    }

    fn probe_issued(&self, id: &QueryId) {
        self.metrics.increment_probes_issued();
        log_event(Event::ProbeIssued, &[("query_id", id.as_str())]);
    }
}
