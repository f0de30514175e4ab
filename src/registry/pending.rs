//! Mapping of live query ids to their metadata

use std::collections::HashMap;

use super::errors::{RegistryError, RegistryResult};
use super::query::{Classification, Query};
use crate::protocol::QueryId;

/// Registry of queries between submission and end-of-query
///
/// An entry exists iff the query was submitted and its end-of-query signal
/// has not arrived yet.
#[derive(Debug, Default)]
pub struct PendingQueryRegistry {
    queries: HashMap<QueryId, Query>,
}

impl PendingQueryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a query. Fails if the id is already live.
    pub fn register(&mut self, query: Query) -> RegistryResult<()> {
        if self.queries.contains_key(&query.id) {
            return Err(RegistryError::DuplicateQueryId(query.id));
        }
        self.queries.insert(query.id.clone(), query);
        Ok(())
    }

    pub fn lookup(&self, id: &QueryId) -> RegistryResult<&Query> {
        self.queries
            .get(id)
            .ok_or_else(|| RegistryError::NotFound(id.clone()))
    }

    pub fn contains(&self, id: &QueryId) -> bool {
        self.queries.contains_key(id)
    }

    /// Set the classification if the query is still unclassified.
    ///
    /// Returns the classification the query ends up with. A query that
    /// already carries a label keeps it.
    pub fn classify(&mut self, id: &QueryId, kind: Classification) -> RegistryResult<Classification> {
        let query = self
            .queries
            .get_mut(id)
            .ok_or_else(|| RegistryError::NotFound(id.clone()))?;
        if query.is_unclassified() {
            query.classification = kind;
        }
        Ok(query.classification)
    }

    /// Force a query to Write, whatever it was labelled before.
    ///
    /// Returns the previous classification.
    pub fn mark_write(&mut self, id: &QueryId) -> RegistryResult<Classification> {
        let query = self
            .queries
            .get_mut(id)
            .ok_or_else(|| RegistryError::NotFound(id.clone()))?;
        let previous = query.classification;
        query.classification = Classification::Write;
        Ok(previous)
    }

    /// Remove a query. Absent ids are a no-op.
    pub fn retire(&mut self, id: &QueryId) -> Option<Query> {
        self.queries.remove(id)
    }

    /// Whether any non-probe query is still waiting for its label.
    pub fn has_unclassified(&self) -> bool {
        self.queries
            .values()
            .any(|q| q.is_unclassified() && !q.id.is_probe())
    }

    /// Whether any query labelled Write has not ended yet.
    pub fn has_pending_writes(&self) -> bool {
        self.queries.values().any(Query::is_write)
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &QueryId> {
        self.queries.keys()
    }
}
