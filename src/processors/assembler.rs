//! Partitioning of labeled point clouds into per-(event, class) neighbor
//! graphs.
//!
//! Rows are split first by event id, then by semantic class, in ascending
//! order of both; that ordering is the contract binding graph ids to
//! [`EntryIndex`] rows and must match the evaluator's truth partitioning
//! row for row. Within a partition the input row order is preserved.

use kiddo::{ImmutableKdTree, SquaredEuclidean};
use log::debug;
use thiserror::Error;

use std::collections::BTreeMap;

use crate::config::{GraphConfig, LabelColumns, NeighborMode};
use crate::core::entry_index::{EntryIndex, EntryIndexError};
use crate::core::graph_batch::{GraphBatch, GraphError, GraphItem};

/// Errors that can occur during graph assembly.
#[derive(Error, Debug)]
pub enum AssembleError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Entry(#[from] EntryIndexError),
}

/// Result type for assembly operations.
pub type Result<T> = std::result::Result<T, AssembleError>;

/// One (event, class) partition of the input rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    pub event_id: i64,
    pub semantic_id: i64,
    /// Input rows of the partition, in input order
    pub rows: Vec<usize>,
}

/// Split label rows into (event, class) partitions, ascending by event id
/// then semantic class id.
pub fn partition_rows(labels: &[Vec<i64>], columns: &LabelColumns) -> Result<Vec<Partition>> {
    let mut groups: BTreeMap<(i64, i64), Vec<usize>> = BTreeMap::new();
    for (row, label) in labels.iter().enumerate() {
        let width = label.len();
        if columns.event >= width || columns.semantic >= width {
            return Err(AssembleError::Validation(format!(
                "label row {} has {} columns, need event column {} and semantic column {}",
                row, width, columns.event, columns.semantic
            )));
        }
        let key = (label[columns.event], label[columns.semantic]);
        groups.entry(key).or_default().push(row);
    }

    Ok(groups
        .into_iter()
        .map(|((event_id, semantic_id), rows)| Partition {
            event_id,
            semantic_id,
            rows,
        })
        .collect())
}

/// Connect each point to its `k` nearest points by Euclidean distance.
///
/// Emits directed edges `[i, j]`, neighbors ordered by distance with ties
/// broken by ascending point index. When fewer than `k` other points
/// exist, every other point becomes a neighbor.
pub fn knn_edges(positions: &[[f32; 3]], k: usize) -> Vec<[usize; 2]> {
    let n = positions.len();
    if n < 2 || k == 0 {
        return Vec::new();
    }
    let k = k.min(n - 1);

    let tree: ImmutableKdTree<f32, 3> = ImmutableKdTree::new_from_slice(positions);

    let mut edges = Vec::with_capacity(n * k);
    for (i, pos) in positions.iter().enumerate() {
        // Query one extra neighbor to account for the point itself
        let mut candidates: Vec<(f32, usize)> = tree
            .nearest_n::<SquaredEuclidean>(pos, k + 1)
            .iter()
            .map(|nn| (nn.distance, nn.item as usize))
            .filter(|&(_, j)| j != i)
            .collect();
        candidates.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        candidates.truncate(k);
        for (_, j) in candidates {
            edges.push([i, j]);
        }
    }
    edges
}

/// Connect every ordered pair of points within `radius` of each other.
///
/// Emits directed edges `[i, j]`; the pair set is symmetric since the
/// metric is. Neighbors are ordered by ascending point index.
pub fn radius_edges(positions: &[[f32; 3]], radius: f32) -> Vec<[usize; 2]> {
    let n = positions.len();
    if n < 2 {
        return Vec::new();
    }

    let tree: ImmutableKdTree<f32, 3> = ImmutableKdTree::new_from_slice(positions);
    let radius_sq = radius * radius;

    let mut edges = Vec::new();
    for (i, pos) in positions.iter().enumerate() {
        let mut neighbors: Vec<usize> = tree
            .within::<SquaredEuclidean>(pos, radius_sq)
            .iter()
            .map(|nn| nn.item as usize)
            .filter(|&j| j != i)
            .collect();
        neighbors.sort_unstable();
        for j in neighbors {
            edges.push([i, j]);
        }
    }
    edges
}

/// Binary ground-truth edge labels: 1 iff both endpoints carry the same
/// fragment id.
pub fn edge_truth(edge_index: &[[usize; 2]], fragment_labels: &[i64]) -> Vec<i32> {
    edge_index
        .iter()
        .map(|&[src, dst]| (fragment_labels[src] == fragment_labels[dst]) as i32)
        .collect()
}

/// A freshly assembled graph batch and its entry table.
#[derive(Debug)]
pub struct AssembledBatch {
    pub batch: GraphBatch,
    pub entries: EntryIndex,
}

/// Builds per-partition neighbor graphs out of labeled point clouds.
#[derive(Debug, Clone)]
pub struct GraphAssembler {
    graph: GraphConfig,
    columns: LabelColumns,
}

impl GraphAssembler {
    pub fn new(graph: GraphConfig, columns: LabelColumns) -> Self {
        Self { graph, columns }
    }

    /// Partition the rows, build one neighbor graph per partition and
    /// concatenate everything into a [`GraphBatch`].
    ///
    /// `embeddings`, `positions` and `labels` must agree row for row. In
    /// training mode truth edge labels are attached from the fragment id
    /// column.
    pub fn assemble(
        &self,
        embeddings: &[Vec<f32>],
        positions: &[[f32; 3]],
        labels: &[Vec<i64>],
        training: bool,
    ) -> Result<AssembledBatch> {
        self.graph
            .validate()
            .map_err(|e| AssembleError::Configuration(e.to_string()))?;

        if embeddings.len() != positions.len() || embeddings.len() != labels.len() {
            return Err(AssembleError::Validation(format!(
                "row counts disagree: {} embeddings, {} positions, {} labels",
                embeddings.len(),
                positions.len(),
                labels.len()
            )));
        }

        let partitions = partition_rows(labels, &self.columns)?;

        let mut items = Vec::with_capacity(partitions.len());
        let mut entries = EntryIndex::new();

        for (graph_id, partition) in partitions.iter().enumerate() {
            let pos: Vec<[f32; 3]> = partition.rows.iter().map(|&r| positions[r]).collect();
            let x: Vec<Vec<f32>> = partition
                .rows
                .iter()
                .map(|&r| embeddings[r].clone())
                .collect();

            let edge_index = match self.graph.mode {
                NeighborMode::Knn => knn_edges(&pos, self.graph.k),
                NeighborMode::Radius => radius_edges(&pos, self.graph.radius),
            };

            let truth = if training {
                let fragments = self.fragment_labels(labels, &partition.rows)?;
                Some(edge_truth(&edge_index, &fragments))
            } else {
                None
            };

            entries.insert(partition.event_id, partition.semantic_id, graph_id)?;
            items.push(GraphItem {
                x,
                pos,
                edge_index,
                edge_truth: truth,
                source_rows: partition.rows.iter().map(|&r| r as i64).collect(),
            });
        }

        let batch = GraphBatch::from_items(&items)?;
        debug!(
            "assembled {} graphs ({} nodes, {} edges) from {} rows",
            batch.num_graphs(),
            batch.num_nodes(),
            batch.num_edges(),
            labels.len()
        );

        Ok(AssembledBatch { batch, entries })
    }

    /// Gather the true fragment id of every row in a partition.
    pub(crate) fn fragment_labels(
        &self,
        labels: &[Vec<i64>],
        rows: &[usize],
    ) -> Result<Vec<i64>> {
        rows.iter()
            .map(|&r| {
                labels[r].get(self.columns.cluster).copied().ok_or_else(|| {
                    AssembleError::Validation(format!(
                        "label row {} has no fragment column {}",
                        r, self.columns.cluster
                    ))
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn label_row(event: i64, class: i64, fragment: i64) -> Vec<i64> {
        vec![event, class, fragment]
    }

    #[test]
    fn test_partition_ordering() {
        let labels = vec![
            label_row(1, 4, 0),
            label_row(0, 4, 0),
            label_row(0, 1, 0),
            label_row(1, 1, 0),
            label_row(0, 1, 1),
        ];
        let partitions = partition_rows(&labels, &LabelColumns::default()).unwrap();
        let keys: Vec<(i64, i64)> = partitions
            .iter()
            .map(|p| (p.event_id, p.semantic_id))
            .collect();
        assert_eq!(keys, vec![(0, 1), (0, 4), (1, 1), (1, 4)]);
        // Input row order preserved inside a partition
        assert_eq!(partitions[0].rows, vec![2, 4]);
    }

    #[test]
    fn test_partition_rejects_narrow_rows() {
        let labels = vec![vec![0]];
        assert!(partition_rows(&labels, &LabelColumns::default()).is_err());
    }

    #[test]
    fn test_knn_edges_line() {
        // Four collinear points, k = 1: each connects to its closest
        let pos = vec![
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [2.5, 0.0, 0.0],
            [10.0, 0.0, 0.0],
        ];
        let edges = knn_edges(&pos, 1);
        assert_eq!(edges, vec![[0, 1], [1, 0], [2, 1], [3, 2]]);
    }

    #[test]
    fn test_knn_edges_caps_k() {
        let pos = vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]];
        let edges = knn_edges(&pos, 5);
        assert_eq!(edges, vec![[0, 1], [1, 0]]);
    }

    #[test]
    fn test_knn_tie_break_by_index() {
        // Points 1 and 2 are equidistant from 0; index order wins
        let pos = vec![
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [-1.0, 0.0, 0.0],
            [5.0, 0.0, 0.0],
        ];
        let edges = knn_edges(&pos, 1);
        assert_eq!(edges[0], [0, 1]);
    }

    #[test]
    fn test_radius_edges_symmetric() {
        let pos = vec![
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [100.0, 0.0, 0.0],
        ];
        let edges = radius_edges(&pos, 2.0);
        assert_eq!(edges, vec![[0, 1], [1, 0]]);
    }

    #[test]
    fn test_edge_truth_labels() {
        let edges = vec![[0, 1], [1, 2]];
        let fragments = vec![7, 7, 3];
        assert_eq!(edge_truth(&edges, &fragments), vec![1, 0]);
    }

    #[test]
    fn test_assemble_two_events_two_classes() {
        let mut labels = Vec::new();
        let mut positions = Vec::new();
        for event in 0..2 {
            for class in 0..2 {
                for i in 0..3 {
                    labels.push(label_row(event, class, i));
                    positions.push([i as f32, event as f32 * 50.0, class as f32 * 50.0]);
                }
            }
        }
        let embeddings: Vec<Vec<f32>> = positions
            .iter()
            .map(|p| vec![p[0], p[1], p[2]])
            .collect();

        let assembler = GraphAssembler::new(GraphConfig::default(), LabelColumns::default());
        let assembled = assembler
            .assemble(&embeddings, &positions, &labels, true)
            .unwrap();

        assert_eq!(assembled.batch.num_graphs(), 4);
        assert_eq!(assembled.batch.num_nodes(), 12);
        assert!(assembled.batch.edge_truth().is_some());
        assert_eq!(assembled.entries.lookup(1, 0).unwrap(), 2);
        assert_eq!(assembled.entries.reverse_lookup(3).unwrap(), (1, 1));
        // Nodes of one graph map back to their input rows
        let sub = assembled.batch.get_example(2).unwrap();
        assert_eq!(sub.source_rows, vec![6, 7, 8]);
    }

    #[test]
    fn test_assemble_rejects_row_mismatch() {
        let assembler = GraphAssembler::new(GraphConfig::default(), LabelColumns::default());
        let result = assembler.assemble(
            &[vec![0.0]],
            &[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]],
            &[label_row(0, 0, 0)],
            false,
        );
        assert!(matches!(result, Err(AssembleError::Validation(_))));
    }

    #[test]
    fn test_assemble_rejects_bad_config() {
        let config = GraphConfig {
            mode: NeighborMode::Knn,
            k: 0,
            ..Default::default()
        };
        let assembler = GraphAssembler::new(config, LabelColumns::default());
        let result = assembler.assemble(&[], &[], &[], false);
        assert!(matches!(result, Err(AssembleError::Configuration(_))));
    }
}
