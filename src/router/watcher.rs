//! Write visibility protocol
//!
//! Once a write is known, every query is pinned to master. The watcher
//! decides when that pin can be released:
//!
//! 1. end-of-query of a Write query: ask master for the write's timestamp
//!    (`write_replication_time<N>`)
//! 2. timestamp known: ask the replica for its replication watermark
//!    (`replica_replication_time`)
//! 3. watermark past the newest write and nothing left that could still be
//!    an unseen write: reset to Clean. Otherwise retry the watermark probe
//!    after [`PROBE_RETRY_DELAY`].
//!
//! The watcher never sends anything itself. It returns a [`ProbeRequest`]
//! and the router sends it.

use std::collections::BTreeSet;

use tracing::{debug, warn};

use super::scheduler::{ProbeScheduler, ProbeTimer, PROBE_RETRY_DELAY};
use super::state::{ConsistencyPhase, ConsistencySnapshot, ConsistencyState, WriteMark};
use super::watermark::row_watermark;
use crate::observability::{log_event, Event};
use crate::protocol::{Column, ProbeKind, QueryId};
use crate::registry::{Classification, PendingQueryRegistry, Query};

/// Probe the router has to send on the watcher's behalf
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeRequest {
    /// Master timestamp of write number `n`
    WriteTimestamp(u64),
    /// Replica watermark
    ReplicaWatermark,
}

/// Result of evaluating a replica watermark row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatermarkOutcome {
    /// Replica caught up, state reset to Clean
    Recovered,
    /// Not yet, one retry scheduled
    Rescheduled,
    /// Row did not belong to the in-flight probe
    Ignored,
}

#[derive(Debug)]
enum ReplicaProbe {
    Idle,
    InFlight,
    Scheduled(ProbeTimer),
}

/// Drives the consistency state through Clean / AwaitingVisibility / Probing
#[derive(Debug)]
pub struct ConsistencyWatcher {
    state: ConsistencyState,
    replica_probe: ReplicaProbe,
    /// Write probes whose timestamp has not arrived yet
    awaiting_timestamps: BTreeSet<u64>,
    generation: u64,
}

impl Default for ConsistencyWatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsistencyWatcher {
    pub fn new() -> Self {
        Self {
            state: ConsistencyState::new(),
            replica_probe: ReplicaProbe::Idle,
            awaiting_timestamps: BTreeSet::new(),
            generation: 0,
        }
    }

    pub fn state(&self) -> &ConsistencyState {
        &self.state
    }

    pub fn phase(&self) -> ConsistencyPhase {
        if !self.state.is_write_pending() {
            ConsistencyPhase::Clean
        } else if !matches!(self.replica_probe, ReplicaProbe::Idle) || !self.awaiting_timestamps.is_empty() {
            ConsistencyPhase::Probing
        } else {
            ConsistencyPhase::AwaitingVisibility
        }
    }

    pub fn snapshot(&self) -> ConsistencySnapshot {
        ConsistencySnapshot {
            phase: self.phase(),
            last_write_time: self.state.last_write_time(),
            write_counter: self.state.write_counter(),
            pending_probe_id: self.state.pending_probe_id().cloned(),
        }
    }

    /// A query is submitted with `force_write`. Returns true if this call
    /// pinned reads to master.
    pub fn pin_for_forced_write(&mut self) -> bool {
        let pinned = self.state.pin_if_clean();
        if pinned {
            log_event(Event::WriteObserved, &[("source", "force_write")]);
        }
        pinned
    }

    /// Undo [`Self::pin_for_forced_write`] when the query never left.
    pub fn unpin(&mut self) {
        self.state.unpin();
    }

    /// Begin-of-query: the query is a Read unless already flagged Write.
    pub fn on_begin_query(&mut self, registry: &mut PendingQueryRegistry, query_id: &QueryId) {
        let classification = match registry.classify(query_id, Classification::Read) {
            Ok(classification) => classification,
            Err(e) => {
                debug!(query_id = %query_id, error = %e, "begin-of-query for untracked query");
                return;
            }
        };
        if classification == Classification::Write && self.state.pin_if_clean() {
            log_event(Event::WriteObserved, &[("query_id", query_id.as_str()), ("source", "beginquery")]);
        }
    }

    /// Master reports the query ran as a write.
    pub fn on_master_write(&mut self, registry: &mut PendingQueryRegistry, query_id: &QueryId) {
        if let Err(e) = registry.mark_write(query_id) {
            warn!(query_id = %query_id, error = %e, "master write reported for untracked query");
            return;
        }
        if self.state.pin_if_clean() {
            log_event(Event::WriteObserved, &[("query_id", query_id.as_str()), ("source", "replicamasterwrite")]);
        } else {
            debug!(query_id = %query_id, write_counter = self.state.write_counter(), "additional master write");
        }
    }

    /// Replica refused a write: pin everything until the write is visible.
    pub fn on_stale_write(&mut self) {
        self.state.pin();
    }

    /// The resubmission after a stale write could not be sent, so nothing
    /// will ever replace the sentinel. Put back the earlier mark.
    pub fn stale_write_failed(&mut self, previous: Option<WriteMark>) {
        if self.state.last_write_time() == Some(WriteMark::Sentinel) {
            self.state.restore_write_mark(previous);
        }
    }

    /// End-of-query for a retired registry entry.
    pub fn on_end_query(
        &mut self,
        query: &Query,
        has_write_connection: bool,
        scheduler: &mut dyn ProbeScheduler,
    ) -> Option<ProbeRequest> {
        match query.id.probe_kind() {
            Some(ProbeKind::Replica) => {
                if matches!(self.replica_probe, ReplicaProbe::InFlight) {
                    // Ended without a watermark row
                    warn!(query_id = %query.id, "replica probe ended without a watermark");
                    self.schedule_retry(scheduler);
                }
                None
            }
            Some(ProbeKind::WriteTimestamp(counter)) => {
                if self.awaiting_timestamps.remove(&counter) {
                    warn!(query_id = %query.id, "write probe ended without a timestamp");
                }
                None
            }
            None if query.is_write() && has_write_connection => {
                let counter = self.state.next_write();
                self.awaiting_timestamps.insert(counter);
                Some(ProbeRequest::WriteTimestamp(counter))
            }
            None => None,
        }
    }

    /// The write probe could not be sent.
    pub fn write_probe_failed(&mut self, counter: u64) {
        self.awaiting_timestamps.remove(&counter);
    }

    /// Row of `write_replication_time<counter>`.
    pub fn on_write_timestamp(&mut self, counter: u64, columns: &[Column]) -> Option<ProbeRequest> {
        self.awaiting_timestamps.remove(&counter);

        let Some(at) = row_watermark(columns) else {
            warn!(write_counter = counter, "write probe returned no usable timestamp");
            return None;
        };
        self.state.observe_write(at);
        let counter_str = counter.to_string();
        let at_str = at.to_rfc3339();
        log_event(
            Event::WriteTimestamped,
            &[("write_counter", counter_str.as_str()), ("at", at_str.as_str())],
        );

        match self.replica_probe {
            ReplicaProbe::Idle => Some(ProbeRequest::ReplicaWatermark),
            _ => None,
        }
    }

    /// Row of `replica_replication_time`.
    pub fn on_replica_watermark(
        &mut self,
        registry: &PendingQueryRegistry,
        columns: &[Column],
        scheduler: &mut dyn ProbeScheduler,
    ) -> WatermarkOutcome {
        if !matches!(self.replica_probe, ReplicaProbe::InFlight) {
            debug!("watermark row without an in-flight probe");
            return WatermarkOutcome::Ignored;
        }

        let Some(last_write) = self.state.last_write_time() else {
            self.replica_probe = ReplicaProbe::Idle;
            self.state.set_pending_probe(None);
            return WatermarkOutcome::Ignored;
        };

        let watermark = row_watermark(columns);
        let caught_up = watermark.is_some_and(|w| last_write.is_visible_at(w));
        let ambiguous = registry.has_unclassified()
            || registry.has_pending_writes()
            || !self.awaiting_timestamps.is_empty();

        if caught_up && !ambiguous {
            let counter = self.state.write_counter().to_string();
            self.state.reset();
            self.state.set_pending_probe(None);
            self.replica_probe = ReplicaProbe::Idle;
            log_event(Event::ReplicaRecovered, &[("write_counter", counter.as_str())]);
            return WatermarkOutcome::Recovered;
        }

        debug!(
            watermark = ?watermark,
            last_write = %last_write,
            caught_up,
            ambiguous,
            "replica not yet consistent"
        );
        self.schedule_retry(scheduler);
        WatermarkOutcome::Rescheduled
    }

    /// The replica probe was sent.
    pub fn probe_sent(&mut self) {
        self.replica_probe = ReplicaProbe::InFlight;
        self.state.set_pending_probe(Some(QueryId::replica_probe()));
    }

    /// The replica probe could not be sent; try again later.
    pub fn probe_failed(&mut self, scheduler: &mut dyn ProbeScheduler) {
        self.replica_probe = ReplicaProbe::Idle;
        self.schedule_retry(scheduler);
    }

    /// A retry timer fired. Stale generations are ignored.
    pub fn on_probe_timer(&mut self, generation: u64) -> Option<ProbeRequest> {
        match &self.replica_probe {
            ReplicaProbe::Scheduled(timer) if timer.generation() == generation => {}
            _ => {
                debug!(generation, "ignoring stale probe timer");
                return None;
            }
        }

        self.replica_probe = ReplicaProbe::Idle;
        if self.state.is_write_pending() {
            Some(ProbeRequest::ReplicaWatermark)
        } else {
            self.state.set_pending_probe(None);
            None
        }
    }

    /// Cancel a scheduled retry. Used on teardown.
    pub fn cancel(&mut self) {
        if let ReplicaProbe::Scheduled(timer) = std::mem::replace(&mut self.replica_probe, ReplicaProbe::Idle) {
            debug!(generation = timer.generation(), "cancelling scheduled probe");
            timer.cancel();
        }
        self.state.set_pending_probe(None);
    }

    /// At most one retry is outstanding at a time.
    fn schedule_retry(&mut self, scheduler: &mut dyn ProbeScheduler) {
        if matches!(self.replica_probe, ReplicaProbe::Scheduled(_)) {
            return;
        }
        self.generation += 1;
        let timer = scheduler.schedule(PROBE_RETRY_DELAY, self.generation);
        self.replica_probe = ReplicaProbe::Scheduled(timer);
        self.state.set_pending_probe(Some(QueryId::replica_probe()));

        let generation = self.generation.to_string();
        log_event(Event::ProbeRescheduled, &[("generation", generation.as_str())]);
    }
}
