//! Stale write recovery tests
//!
//! The replica answers `replicawrite` when it was handed a write. The query
//! is resent to master exactly once with its original template and data.

mod harness;

use chrono::Utc;
use serde_json::json;

use epistream::channel::ChannelEvent;
use epistream::protocol::QueryId;
use epistream::registry::Classification;
use epistream::router::{ConsistencyPhase, QuerySpec, RouterEvent, WriteMark};
use harness::{harness, later, read_only_harness, READ, WRITE};

fn replica_write(id: &str) -> serde_json::Value {
    json!({"message": "error", "queryId": id, "error": "replicawrite"})
}

/// The query moves to master with its template and data intact.
#[test]
fn test_replicawrite_resubmits_to_master() {
    let mut h = harness();
    h.router
        .submit(
            QuerySpec::new("save_user.mustache")
                .connection("users")
                .data(json!({"name": "ada"}))
                .id("q1"),
        )
        .unwrap();

    h.deliver(READ, replica_write("q1"));

    let resent = h.write.sent_json();
    assert_eq!(resent.len(), 1);
    assert_eq!(resent[0]["queryId"], "q1");
    assert_eq!(resent[0]["templateName"], "save_user.mustache");
    assert_eq!(resent[0]["connectionName"], "master");
    assert_eq!(resent[0]["data"], json!({"name": "ada"}));
    assert_eq!(resent[0]["is_write"], true);

    let query = h.router.registry().lookup(&QueryId::new("q1")).unwrap();
    assert_eq!(query.classification, Classification::Write);
    assert_eq!(
        h.router.consistency().last_write_time,
        Some(WriteMark::Sentinel)
    );
    assert!(h
        .router
        .sink()
        .iter()
        .any(|e| matches!(e, RouterEvent::ReplicaWrite { query_id } if query_id.as_str() == "q1")));
    assert_eq!(h.router.metrics().snapshot().stale_writes_recovered, 1);
}

/// Repeated signals and the replica's own end-of-query do not touch the
/// resubmitted query.
#[test]
fn test_recovery_happens_once() {
    let mut h = harness();
    h.router.submit(QuerySpec::new("save.mustache").id("q1")).unwrap();

    h.deliver(READ, replica_write("q1"));
    h.deliver(READ, replica_write("q1"));
    h.end(READ, "q1");

    assert_eq!(h.sent_ids(WRITE), vec!["q1"]);
    assert!(h.router.registry().contains(&QueryId::new("q1")));

    // Master finishes the write and the usual probing starts
    h.begin(WRITE, "q1");
    h.end(WRITE, "q1");
    assert!(!h.router.registry().contains(&QueryId::new("q1")));
    assert_eq!(h.sent_ids(WRITE), vec!["q1", "write_replication_time1"]);

    let ended = h
        .router
        .sink()
        .iter()
        .filter(|e| matches!(e, RouterEvent::EndQuery { .. }))
        .count();
    assert_eq!(ended, 1);
}

/// A stale write while probing puts the sentinel back, so the watermark
/// that would have cleared the earlier write is no longer enough.
#[test]
fn test_stale_write_while_probing_blocks_reset() {
    let mut h = harness();
    let written = Utc::now();

    h.router.submit(QuerySpec::new("save.mustache").id("q1")).unwrap();
    h.router.submit(QuerySpec::new("insert.mustache").id("w1").write()).unwrap();
    h.end(WRITE, "w1");
    h.write_timestamp(1, written);

    h.deliver(READ, replica_write("q1"));
    h.replica_watermark(later(written, 100));

    assert_eq!(h.router.consistency().phase, ConsistencyPhase::Probing);
    assert_eq!(h.timers.scheduled().len(), 1);

    // Master finishes q1; its timestamp becomes the new bar
    h.end(WRITE, "q1");
    h.write_timestamp(2, later(written, 200));
    assert_eq!(
        h.router.consistency().last_write_time,
        Some(WriteMark::At(later(written, 200)))
    );

    h.fire_timer();
    h.replica_watermark(later(written, 300));
    assert_eq!(h.router.consistency().phase, ConsistencyPhase::Clean);
}

/// When master cannot take the resubmission the query fails and reads are
/// not left pinned behind a write that never ran.
#[test]
fn test_failed_resubmission_releases_pin() {
    let mut h = harness();
    h.router.submit(QuerySpec::new("save.mustache").id("q1")).unwrap();
    h.router.handle_channel_event(ChannelEvent::closed(WRITE));

    h.deliver(READ, replica_write("q1"));

    assert!(h.write.sent().is_empty());
    assert!(!h.router.registry().contains(&QueryId::new("q1")));
    assert_eq!(h.router.consistency().last_write_time, None);
    assert_eq!(h.router.consistency().phase, ConsistencyPhase::Clean);
    assert!(h.router.sink().iter().any(|e| matches!(
        e,
        RouterEvent::Error { role: None, query_id: Some(id), .. } if id.as_str() == "q1"
    )));
    assert_eq!(h.router.metrics().snapshot().stale_writes_recovered, 0);

    h.router.handle_channel_event(ChannelEvent::opened(WRITE));
    h.router.submit(QuerySpec::new("select.mustache").id("r1")).unwrap();
    assert_eq!(h.sent_ids(READ), vec!["q1", "r1"]);
}

/// A failed resubmission leaves an earlier write's timestamp in place.
#[test]
fn test_failed_resubmission_keeps_earlier_write() {
    let mut h = harness();
    let written = Utc::now();

    h.router.submit(QuerySpec::new("save.mustache").id("q1")).unwrap();
    h.router.submit(QuerySpec::new("insert.mustache").id("w1").write()).unwrap();
    h.end(WRITE, "w1");
    h.write_timestamp(1, written);

    h.router.handle_channel_event(ChannelEvent::closed(WRITE));
    h.deliver(READ, replica_write("q1"));

    assert_eq!(
        h.router.consistency().last_write_time,
        Some(WriteMark::At(written))
    );
    assert_eq!(h.router.consistency().phase, ConsistencyPhase::Probing);
}

/// Without a master endpoint the signal is surfaced as an error.
#[test]
fn test_replicawrite_without_master_is_reported() {
    let (mut router, read, _timers) = read_only_harness();
    router.submit(QuerySpec::new("save.mustache").id("q1")).unwrap();

    router.handle_channel_event(epistream::channel::ChannelEvent::message(
        READ,
        replica_write("q1").to_string(),
    ));

    assert_eq!(read.sent().len(), 1);
    assert!(router.sink().iter().any(|e| matches!(
        e,
        RouterEvent::Error { query_id: Some(id), error, .. } if id.as_str() == "q1" && error == "replicawrite"
    )));
    assert!(router.registry().contains(&QueryId::new("q1")));
}
