//! Lookup table between (event id, semantic class) pairs and graph ids.
//!
//! One row is recorded per assembled partition, unique on the
//! (event, class) key. Evaluation results are attached as named score
//! columns aligned with the graph ids.

use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

/// Errors that can occur during entry lookups.
#[derive(Error, Debug)]
pub enum EntryIndexError {
    #[error("no graph for event {event_id} and semantic class {semantic_id}")]
    NotFound { event_id: i64, semantic_id: i64 },

    #[error("no row for graph {graph_id}")]
    GraphNotFound { graph_id: usize },

    #[error("validation error: {0}")]
    Validation(String),
}

/// Result type for entry index operations.
pub type Result<T> = std::result::Result<T, EntryIndexError>;

/// One row of the entry table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryRow {
    pub event_id: i64,
    pub semantic_id: i64,
    pub graph_id: usize,
}

/// Bidirectional (event, class) <-> graph id table with optional metric
/// score columns.
#[derive(Debug, Clone, Default)]
pub struct EntryIndex {
    rows: Vec<EntryRow>,
    by_key: HashMap<(i64, i64), usize>,
    scores: BTreeMap<String, Vec<Option<f64>>>,
}

impl EntryIndex {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one partition. The (event, class) key must be unique.
    pub fn insert(&mut self, event_id: i64, semantic_id: i64, graph_id: usize) -> Result<()> {
        if self.by_key.contains_key(&(event_id, semantic_id)) {
            return Err(EntryIndexError::Validation(format!(
                "duplicate row for event {} and semantic class {}",
                event_id, semantic_id
            )));
        }
        self.by_key.insert((event_id, semantic_id), graph_id);
        self.rows.push(EntryRow {
            event_id,
            semantic_id,
            graph_id,
        });
        Ok(())
    }

    /// Number of recorded rows.
    #[inline]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if no rows have been recorded.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// All rows, in insertion order.
    #[inline]
    pub fn rows(&self) -> &[EntryRow] {
        &self.rows
    }

    /// Graph id of the (event, class) partition.
    pub fn lookup(&self, event_id: i64, semantic_id: i64) -> Result<usize> {
        self.by_key
            .get(&(event_id, semantic_id))
            .copied()
            .ok_or(EntryIndexError::NotFound {
                event_id,
                semantic_id,
            })
    }

    /// (event, class) pair of a graph id.
    ///
    /// More than one matching row is a fatal consistency violation.
    pub fn reverse_lookup(&self, graph_id: usize) -> Result<(i64, i64)> {
        let mut matches = self.rows.iter().filter(|row| row.graph_id == graph_id);
        let row = matches
            .next()
            .ok_or(EntryIndexError::GraphNotFound { graph_id })?;
        if matches.next().is_some() {
            return Err(EntryIndexError::Validation(format!(
                "graph {} appears in more than one row",
                graph_id
            )));
        }
        Ok((row.event_id, row.semantic_id))
    }

    /// Attach a named score column, one optional value per graph id.
    pub fn set_score_column(&mut self, name: &str, values: Vec<Option<f64>>) -> Result<()> {
        if values.len() != self.rows.len() {
            return Err(EntryIndexError::Validation(format!(
                "score column `{}` has {} values for {} rows",
                name,
                values.len(),
                self.rows.len()
            )));
        }
        self.scores.insert(name.to_string(), values);
        Ok(())
    }

    /// Names of the attached score columns.
    pub fn score_columns(&self) -> impl Iterator<Item = &str> {
        self.scores.keys().map(String::as_str)
    }

    /// Score of one graph under one metric, if evaluated.
    pub fn score(&self, name: &str, graph_id: usize) -> Option<f64> {
        self.scores
            .get(name)
            .and_then(|column| column.get(graph_id).copied())
            .flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> EntryIndex {
        let mut index = EntryIndex::new();
        index.insert(0, 1, 0).unwrap();
        index.insert(0, 4, 1).unwrap();
        index.insert(1, 1, 2).unwrap();
        index
    }

    #[test]
    fn test_lookup_round_trip() {
        let index = sample();
        for row in index.rows() {
            let graph_id = index.lookup(row.event_id, row.semantic_id).unwrap();
            assert_eq!(graph_id, row.graph_id);
            assert_eq!(
                index.reverse_lookup(graph_id).unwrap(),
                (row.event_id, row.semantic_id)
            );
        }
    }

    #[test]
    fn test_lookup_miss() {
        let index = sample();
        assert!(matches!(
            index.lookup(7, 1),
            Err(EntryIndexError::NotFound { .. })
        ));
        assert!(matches!(
            index.reverse_lookup(9),
            Err(EntryIndexError::GraphNotFound { .. })
        ));
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let mut index = sample();
        assert!(matches!(
            index.insert(0, 1, 5),
            Err(EntryIndexError::Validation(_))
        ));
    }

    #[test]
    fn test_duplicate_graph_id_detected() {
        let mut index = sample();
        index.insert(2, 2, 0).unwrap();
        assert!(matches!(
            index.reverse_lookup(0),
            Err(EntryIndexError::Validation(_))
        ));
    }

    #[test]
    fn test_score_columns() {
        let mut index = sample();
        index
            .set_score_column("purity", vec![Some(1.0), None, Some(0.5)])
            .unwrap();
        assert_eq!(index.score("purity", 0), Some(1.0));
        assert_eq!(index.score("purity", 1), None);
        assert_eq!(index.score("purity", 2), Some(0.5));
        assert_eq!(index.score_columns().collect::<Vec<_>>(), vec!["purity"]);
        assert!(index.set_score_column("bad", vec![None]).is_err());
    }
}
