//! Result buffering
//!
//! [`RowBuffer`] wraps another [`EventSink`] and collects the rows of each
//! query into ordered row-sets while passing every event through unchanged.
//! Results can be read once the query's end-of-query has been seen.

use std::collections::HashMap;

use crate::observability::{log_event, Event};
use crate::protocol::{Column, QueryId};
use crate::router::{EventSink, RouterEvent};

/// One streamed row
pub type Row = Vec<Column>;

/// Rows between two begin-row-set signals, in arrival order
pub type RowSet = Vec<Row>;

#[derive(Debug, Default)]
struct QueryResults {
    row_sets: Vec<RowSet>,
    complete: bool,
}

/// Buffering decorator over an event sink
///
/// Finished results stay buffered until [`RowBuffer::take_results`] removes
/// them; callers that never take their results keep them alive.
#[derive(Debug)]
pub struct RowBuffer<S: EventSink> {
    inner: S,
    results: HashMap<QueryId, QueryResults>,
    dropped_rows: u64,
}

impl<S: EventSink> RowBuffer<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            results: HashMap::new(),
            dropped_rows: 0,
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Buffered row-sets of a finished query.
    pub fn results(&self, query_id: &QueryId) -> Option<&[RowSet]> {
        self.results
            .get(query_id)
            .filter(|r| r.complete)
            .map(|r| r.row_sets.as_slice())
    }

    /// Remove and return the row-sets of a finished query.
    pub fn take_results(&mut self, query_id: &QueryId) -> Option<Vec<RowSet>> {
        if !self.is_complete(query_id) {
            return None;
        }
        self.results.remove(query_id).map(|r| r.row_sets)
    }

    pub fn is_complete(&self, query_id: &QueryId) -> bool {
        self.results.get(query_id).is_some_and(|r| r.complete)
    }

    /// Rows that arrived with no open row-set.
    pub fn dropped_rows(&self) -> u64 {
        self.dropped_rows
    }

    fn record(&mut self, event: &RouterEvent) {
        match event {
            RouterEvent::BeginQuery { query_id } => {
                self.results.insert(query_id.clone(), QueryResults::default());
            }
            RouterEvent::BeginRowSet { query_id } => {
                self.results
                    .entry(query_id.clone())
                    .or_default()
                    .row_sets
                    .push(Vec::new());
            }
            RouterEvent::Row { query_id, columns } => {
                let open = self
                    .results
                    .get_mut(query_id)
                    .filter(|r| !r.complete)
                    .and_then(|r| r.row_sets.last_mut());
                match open {
                    Some(row_set) => row_set.push(columns.clone()),
                    None => {
                        self.dropped_rows += 1;
                        log_event(Event::RowDropped, &[("query_id", query_id.as_str())]);
                    }
                }
            }
            // Nothing to hold for a query that never streamed
            RouterEvent::EndQuery { query_id } => {
                if let Some(results) = self.results.get_mut(query_id) {
                    results.complete = true;
                }
            }
            // The query restarts on master
            RouterEvent::ReplicaWrite { query_id } => {
                self.results.remove(query_id);
            }
            _ => {}
        }
    }
}

impl<S: EventSink> EventSink for RowBuffer<S> {
    fn emit(&mut self, event: RouterEvent) {
        self.record(&event);
        self.inner.emit(event);
    }
}
