//! Consistency routing tests
//!
//! - Once a write is suspected every query goes to master
//! - The replica is trusted again only after its watermark passes the
//!   newest write and no pending query could still be a write
//! - A replica probe is retried once per timer, never busy-looped

mod harness;

use chrono::Utc;
use serde_json::json;

use epistream::protocol::QueryId;
use epistream::router::{ConsistencyPhase, QuerySpec, WriteMark, PROBE_RETRY_DELAY};
use harness::{harness, later, read_only_harness, READ, WRITE};

// =============================================================================
// Write pins read
// =============================================================================

/// Every query submitted between a write and the reset goes to master.
#[test]
fn test_write_pins_all_queries_until_reset() {
    let mut h = harness();
    let written = Utc::now();

    h.router.submit(QuerySpec::new("insert.mustache").id("w1").write()).unwrap();
    h.router.submit(QuerySpec::new("select.mustache").id("r1")).unwrap();
    h.end(WRITE, "w1");
    h.router.submit(QuerySpec::new("select.mustache").id("r2")).unwrap();

    assert!(h.sent_ids(READ).is_empty());
    assert_eq!(h.sent_ids(WRITE), vec!["w1", "r1", "write_replication_time1", "r2"]);
    for frame in h.write.sent_json() {
        assert_eq!(frame["connectionName"], "master");
    }

    h.begin(WRITE, "r1");
    h.end(WRITE, "r1");
    h.begin(WRITE, "r2");
    h.end(WRITE, "r2");
    h.write_timestamp(1, written);
    h.replica_watermark(later(written, 10));
    assert_eq!(h.router.consistency().phase, ConsistencyPhase::Clean);

    h.router.submit(QuerySpec::new("select.mustache").id("r3")).unwrap();
    assert_eq!(h.sent_ids(READ), vec!["replica_replication_time", "r3"]);
}

/// A write reported by the server pins later reads.
#[test]
fn test_write_revealed_by_master_pins() {
    let mut h = harness();

    h.router.submit(QuerySpec::new("upsert.mustache").id("q1")).unwrap();
    h.deliver(READ, json!({"message": "replicamasterwrite", "queryId": "q1"}));
    h.router.submit(QuerySpec::new("select.mustache").id("q2")).unwrap();

    assert_eq!(h.sent_ids(WRITE), vec!["q2"]);
    assert_eq!(
        h.router.consistency().last_write_time,
        Some(WriteMark::Sentinel)
    );
}

/// The replica probe is exempt from pinning.
#[test]
fn test_replica_probe_goes_to_replica_while_pinned() {
    let mut h = harness();

    h.router.submit(QuerySpec::new("insert.mustache").id("w1").write()).unwrap();
    h.end(WRITE, "w1");
    h.write_timestamp(1, Utc::now());

    assert_eq!(h.sent_ids(READ), vec!["replica_replication_time"]);
    let probe = &h.read.sent_json()[0];
    assert_eq!(probe["connectionName"], "replica");
    assert_eq!(probe["templateName"], "get_replication_time.mustache");
}

// =============================================================================
// Reset
// =============================================================================

/// Watermark strictly past the write resets on the first evaluation.
#[test]
fn test_eventual_reset() {
    let mut h = harness();
    let written = Utc::now();

    h.router.submit(QuerySpec::new("insert.mustache").id("w1").write()).unwrap();
    h.end(WRITE, "w1");
    h.write_timestamp(1, written);
    assert_eq!(h.router.consistency().phase, ConsistencyPhase::Probing);

    h.replica_watermark(later(written, 1));

    let snapshot = h.router.consistency();
    assert_eq!(snapshot.phase, ConsistencyPhase::Clean);
    assert_eq!(snapshot.last_write_time, None);
    assert_eq!(snapshot.write_counter, 0);
    assert!(h.timers.scheduled().is_empty());
    assert_eq!(h.router.metrics().snapshot().replica_recoveries, 1);
}

/// A watermark equal to the write time is not enough.
#[test]
fn test_equal_watermark_does_not_reset() {
    let mut h = harness();
    let written = Utc::now();

    h.router.submit(QuerySpec::new("insert.mustache").id("w1").write()).unwrap();
    h.end(WRITE, "w1");
    h.write_timestamp(1, written);
    h.replica_watermark(written);

    assert_eq!(h.router.consistency().phase, ConsistencyPhase::Probing);
    assert_eq!(h.router.consistency().last_write_time, Some(WriteMark::At(written)));
}

/// An unclassified pending query blocks the reset; the probe is retried.
#[test]
fn test_no_premature_reset_with_unclassified_query() {
    let mut h = harness();
    let written = Utc::now();

    h.router.submit(QuerySpec::new("insert.mustache").id("w1").write()).unwrap();
    h.end(WRITE, "w1");
    h.router.submit(QuerySpec::new("select.mustache").id("r1")).unwrap();
    h.write_timestamp(1, written);
    h.replica_watermark(later(written, 50));

    assert_eq!(h.router.consistency().phase, ConsistencyPhase::Probing);
    assert_eq!(h.timers.scheduled().len(), 1);

    // r1 turns out to be a read
    h.begin(WRITE, "r1");
    h.end(WRITE, "r1");
    h.fire_timer();
    assert_eq!(h.replica_probes_sent(), 2);

    h.replica_watermark(later(written, 60));
    assert_eq!(h.router.consistency().phase, ConsistencyPhase::Clean);
}

/// A second write while probing raises the bar for the reset.
#[test]
fn test_newer_write_moves_last_write_time_forward() {
    let mut h = harness();
    let first = Utc::now();
    let second = later(first, 500);

    h.router.submit(QuerySpec::new("insert.mustache").id("w1").write()).unwrap();
    h.end(WRITE, "w1");
    h.write_timestamp(1, first);

    h.router.submit(QuerySpec::new("insert.mustache").id("w2").write()).unwrap();
    h.end(WRITE, "w2");
    h.write_timestamp(2, second);
    assert_eq!(h.router.consistency().write_counter, 2);

    h.replica_watermark(later(first, 100));
    assert_eq!(h.router.consistency().phase, ConsistencyPhase::Probing);
    assert_eq!(h.router.consistency().last_write_time, Some(WriteMark::At(second)));

    h.fire_timer();
    h.replica_watermark(later(second, 1));
    assert_eq!(h.router.consistency().phase, ConsistencyPhase::Clean);
}

/// A write still running on master holds the reset until its own timestamp
/// has been seen on the replica.
#[test]
fn test_pending_write_holds_probing_until_it_ends() {
    let mut h = harness();
    let written = Utc::now();

    h.router.submit(QuerySpec::new("insert.mustache").id("w1").write()).unwrap();
    h.end(WRITE, "w1");
    h.router.submit(QuerySpec::new("insert.mustache").id("w2").write()).unwrap();
    h.write_timestamp(1, written);

    h.replica_watermark(later(written, 100));
    assert_eq!(h.router.consistency().phase, ConsistencyPhase::Probing);
    assert_eq!(h.timers.scheduled().len(), 1);

    // w2 ended but its timestamp has not arrived yet
    h.begin(WRITE, "w2");
    h.end(WRITE, "w2");
    h.fire_timer();
    h.replica_watermark(later(written, 200));
    assert_eq!(h.router.consistency().phase, ConsistencyPhase::Probing);

    h.write_timestamp(2, later(written, 300));
    h.fire_timer();
    h.replica_watermark(later(written, 301));
    assert_eq!(h.router.consistency().phase, ConsistencyPhase::Clean);
}

/// A forced write behind a pending write is still labelled a write and
/// gets its own timestamp request when it ends.
#[test]
fn test_forced_write_while_pinned_is_labelled_write() {
    let mut h = harness();

    h.router.submit(QuerySpec::new("insert.mustache").id("w1").write()).unwrap();
    h.router.submit(QuerySpec::new("insert.mustache").id("w2").write()).unwrap();

    let frames = h.write.sent_json();
    assert_eq!(frames[1]["queryId"], "w2");
    assert_eq!(frames[1]["is_write"], true);

    h.end(WRITE, "w1");
    h.end(WRITE, "w2");
    assert_eq!(
        h.sent_ids(WRITE),
        vec!["w1", "w2", "write_replication_time1", "write_replication_time2"]
    );
    assert_eq!(h.router.consistency().last_write_time, Some(WriteMark::Sentinel));
}

// =============================================================================
// Probe cadence
// =============================================================================

/// One retry per failed evaluation, after the fixed delay.
#[test]
fn test_probe_cadence() {
    let mut h = harness();
    let written = Utc::now();

    h.router.submit(QuerySpec::new("insert.mustache").id("w1").write()).unwrap();
    h.end(WRITE, "w1");
    h.write_timestamp(1, written);
    h.replica_watermark(later(written, -5));
    // Duplicate answer for the same probe
    h.replica_watermark(later(written, -5));

    let scheduled = h.timers.scheduled();
    assert_eq!(scheduled.len(), 1);
    assert_eq!(scheduled[0].delay, PROBE_RETRY_DELAY);
    assert_eq!(h.replica_probes_sent(), 1);

    h.fire_timer();
    assert_eq!(h.replica_probes_sent(), 2);

    // Stale generation does nothing
    h.router.on_probe_timer(epistream::router::ProbeFired {
        generation: scheduled[0].generation,
    });
    assert_eq!(h.replica_probes_sent(), 2);
}

/// A replica probe that ends without a row is retried.
#[test]
fn test_lost_probe_response_is_retried() {
    let mut h = harness();

    h.router.submit(QuerySpec::new("insert.mustache").id("w1").write()).unwrap();
    h.end(WRITE, "w1");
    h.write_timestamp(1, Utc::now());
    h.end(READ, "replica_replication_time");

    assert_eq!(h.timers.scheduled().len(), 1);
    h.fire_timer();
    assert_eq!(h.replica_probes_sent(), 2);
}

/// Shutdown cancels a scheduled probe.
#[test]
fn test_shutdown_cancels_probe_timer() {
    let mut h = harness();
    let written = Utc::now();

    h.router.submit(QuerySpec::new("insert.mustache").id("w1").write()).unwrap();
    h.end(WRITE, "w1");
    h.write_timestamp(1, written);
    h.replica_watermark(written);

    h.router.shutdown();

    assert!(h.timers.last().unwrap().cancelled);
    assert!(h.read.is_closed());
}

// =============================================================================
// Registry liveness
// =============================================================================

/// Entries exist exactly between submission and end-of-query.
#[test]
fn test_registry_liveness() {
    let mut h = harness();
    let id = QueryId::new("q1");
    assert!(!h.router.registry().contains(&id));

    h.router.submit(QuerySpec::new("select.mustache").id("q1")).unwrap();
    assert!(h.router.registry().contains(&id));

    h.begin(READ, "q1");
    assert!(h.router.registry().contains(&id));

    h.end(READ, "q1");
    assert!(!h.router.registry().contains(&id));

    // Repeated end-of-query is a no-op
    h.end(READ, "q1");
    assert!(h.router.registry().is_empty());
}

/// Probe rows never reach consumers.
#[test]
fn test_probe_traffic_is_not_surfaced() {
    let mut h = harness();
    let written = Utc::now();

    h.router.submit(QuerySpec::new("insert.mustache").id("w1").write()).unwrap();
    h.end(WRITE, "w1");
    h.write_timestamp(1, written);
    h.replica_watermark(later(written, 1));

    let rows = h
        .router
        .sink()
        .iter()
        .filter(|e| e.name() == "row" || e.name() == "endquery")
        .filter_map(|e| e.query_id().map(|id| id.as_str().to_string()))
        .collect::<Vec<_>>();
    assert_eq!(rows, vec!["w1"]);
}

// =============================================================================
// Without a write connection
// =============================================================================

/// With no master endpoint everything goes to the replica and nothing is
/// probed.
#[test]
fn test_read_only_client_never_pins() {
    let (mut router, read, timers) = read_only_harness();

    router.submit(QuerySpec::new("insert.mustache").id("w1").write()).unwrap();
    router.handle_channel_event(epistream::channel::ChannelEvent::message(
        READ,
        json!({"message": "endquery", "queryId": "w1"}).to_string(),
    ));
    router.submit(QuerySpec::new("select.mustache").id("r1")).unwrap();

    let ids: Vec<_> = read
        .sent_json()
        .iter()
        .map(|f| f["queryId"].as_str().unwrap_or_default().to_string())
        .collect();
    assert_eq!(ids, vec!["w1", "r1"]);
    assert!(timers.scheduled().is_empty());
}
