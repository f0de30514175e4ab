//! Shared router harness for integration tests
//!
//! Drives a `QueryRouter` over in-memory transports with a manual probe
//! scheduler, so every test controls message order and timer firing.

#![allow(dead_code)]

use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};

use epistream::channel::{ChannelEvent, ConnectionManager, ConnectionRole, MemoryTransport};
use epistream::router::{
    EventSink, ManualProbeScheduler, ProbeFired, QueryRouter, RouterEvent, RouterSettings,
};

pub const READ: ConnectionRole = ConnectionRole::Read;
pub const WRITE: ConnectionRole = ConnectionRole::Write;

pub struct Harness<S: EventSink> {
    pub router: QueryRouter<S>,
    pub read: MemoryTransport,
    pub write: MemoryTransport,
    pub timers: ManualProbeScheduler,
}

/// Router with both connections open.
pub fn harness() -> Harness<Vec<RouterEvent>> {
    harness_with_sink(Vec::new())
}

pub fn harness_with_sink<S: EventSink>(sink: S) -> Harness<S> {
    let read = MemoryTransport::new(READ);
    let write = MemoryTransport::new(WRITE);
    let timers = ManualProbeScheduler::new();
    let connections = ConnectionManager::new(Box::new(read.clone()), Some(Box::new(write.clone())));
    let router = QueryRouter::new(
        RouterSettings::default(),
        connections,
        Box::new(timers.clone()),
        sink,
    );
    Harness {
        router,
        read,
        write,
        timers,
    }
}

/// Router with only the read connection.
pub fn read_only_harness() -> (QueryRouter<Vec<RouterEvent>>, MemoryTransport, ManualProbeScheduler) {
    let read = MemoryTransport::new(READ);
    let timers = ManualProbeScheduler::new();
    let connections = ConnectionManager::new(Box::new(read.clone()), None);
    let router = QueryRouter::new(
        RouterSettings::default(),
        connections,
        Box::new(timers.clone()),
        Vec::new(),
    );
    (router, read, timers)
}

impl<S: EventSink> Harness<S> {
    pub fn deliver(&mut self, role: ConnectionRole, frame: Value) {
        self.router
            .handle_channel_event(ChannelEvent::message(role, frame.to_string()));
    }

    pub fn begin(&mut self, role: ConnectionRole, id: &str) {
        self.deliver(role, json!({"message": "beginquery", "queryId": id}));
    }

    pub fn end(&mut self, role: ConnectionRole, id: &str) {
        self.deliver(role, json!({"message": "endquery", "queryId": id}));
    }

    pub fn row(&mut self, role: ConnectionRole, id: &str, value: Value) {
        self.deliver(
            role,
            json!({"message": "row", "queryId": id, "columns": [{"value": value}]}),
        );
    }

    /// Master reports the timestamp of write number `n`.
    pub fn write_timestamp(&mut self, n: u64, at: DateTime<Utc>) {
        let id = format!("write_replication_time{}", n);
        self.row(WRITE, &id, json!(at.to_rfc3339()));
        self.end(WRITE, &id);
    }

    /// Replica reports its watermark.
    pub fn replica_watermark(&mut self, at: DateTime<Utc>) {
        self.row(READ, "replica_replication_time", json!(at.to_rfc3339()));
    }

    /// Fire the most recently scheduled probe timer.
    pub fn fire_timer(&mut self) {
        let generation = self
            .timers
            .last()
            .map(|t| t.generation)
            .expect("no probe timer scheduled");
        self.router.on_probe_timer(ProbeFired { generation });
    }

    /// Query ids sent on a connection, in order.
    pub fn sent_ids(&self, role: ConnectionRole) -> Vec<String> {
        let transport = match role {
            ConnectionRole::Read => &self.read,
            ConnectionRole::Write => &self.write,
        };
        transport
            .sent_json()
            .iter()
            .filter_map(|f| f["queryId"].as_str().map(str::to_string))
            .collect()
    }

    pub fn replica_probes_sent(&self) -> usize {
        self.sent_ids(READ)
            .iter()
            .filter(|id| *id == "replica_replication_time")
            .count()
    }
}

pub fn later(at: DateTime<Utc>, millis: i64) -> DateTime<Utc> {
    at + Duration::milliseconds(millis)
}
