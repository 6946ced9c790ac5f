//! Per-graph scoring of predicted against true fragment labels.
//!
//! The ground truth arrives as an independently ordered labeled point
//! cloud; it is re-partitioned with the exact same (event, class) rule the
//! assembler uses, so truth arrays line up with the assembled graphs row
//! for row. Metric results are attached to the entry table as one named
//! column per metric.

use std::collections::HashSet;

use crate::core::ragged::RaggedIndex;
use crate::processors::assembler::partition_rows;
use crate::processors::clustering::{ClusterEngine, EngineError, Result};

/// A scoring function over one graph's predicted and true labels.
pub trait ClusterMetric {
    /// Column name the scores are stored under.
    fn name(&self) -> &str;

    fn score(&self, pred: &[i32], truth: &[i64]) -> f64;
}

impl ClusterEngine {
    /// Score every non-skipped graph with each metric and attach the
    /// results as score columns on the entry table.
    ///
    /// `truth_labels` must cover the same events and classes as the
    /// assembled batch, in any row order; rows follow the engine's column
    /// layout. Skipped graphs get an empty score.
    pub fn evaluate(
        &mut self,
        truth_labels: &[Vec<i64>],
        metrics: &[&dyn ClusterMetric],
        skip: &HashSet<usize>,
    ) -> Result<()> {
        let node_pred = self
            .node_pred
            .as_ref()
            .ok_or_else(|| {
                EngineError::State("node predictions have not been computed yet".to_string())
            })?
            .clone();

        // Rebuild the true label collection under the assembler's
        // partition ordering. The input row order may differ from the
        // embedding batch, so labels are regrouped from scratch.
        let partitions = partition_rows(truth_labels, &self.config.columns)?;
        let batch = self.batch()?;
        if partitions.len() != batch.num_graphs() {
            return Err(EngineError::Validation(format!(
                "ground truth yields {} partitions for {} graphs",
                partitions.len(),
                batch.num_graphs()
            )));
        }

        let mut truth_data = Vec::with_capacity(truth_labels.len());
        let mut truth_counts = Vec::with_capacity(partitions.len());
        for (graph_id, partition) in partitions.iter().enumerate() {
            // Partition count alone does not guarantee the truth covers
            // the same (event, class) keys as the batch
            let mapped = self
                .entries
                .lookup(partition.event_id, partition.semantic_id)?;
            if mapped != graph_id {
                return Err(EngineError::Validation(format!(
                    "truth partition (event {}, class {}) maps to graph {} but arrived at position {}",
                    partition.event_id, partition.semantic_id, mapped, graph_id
                )));
            }
            let (lo, hi) = batch.node_range(graph_id)?;
            if partition.rows.len() != hi - lo {
                return Err(EngineError::Validation(format!(
                    "graph {}: {} true labels for {} nodes",
                    graph_id,
                    partition.rows.len(),
                    hi - lo
                )));
            }
            let fragments = self.assembler.fragment_labels(truth_labels, &partition.rows)?;
            truth_counts.push(fragments.len() as i64);
            truth_data.extend(fragments);
        }
        let node_truth =
            RaggedIndex::from_counts(truth_data, vec![0; partitions.len()], truth_counts)?;

        let mut columns: Vec<Vec<Option<f64>>> =
            vec![vec![None; batch.num_graphs()]; metrics.len()];
        for graph_id in 0..batch.num_graphs() {
            if skip.contains(&graph_id) {
                continue;
            }
            let (lo, hi) = batch.node_range(graph_id)?;
            let pred = &node_pred[lo..hi];
            let truth = node_truth.entry(graph_id)?;
            for (metric, column) in metrics.iter().zip(&mut columns) {
                column[graph_id] = Some(metric.score(pred, &truth));
            }
        }

        self.node_truth = Some(node_truth);
        for (metric, column) in metrics.iter().zip(columns) {
            self.entries.set_score_column(metric.name(), column)?;
        }
        Ok(())
    }

    /// True fragment labels of one graph, once `evaluate` has run.
    pub fn node_truth(&self, graph_id: usize) -> Result<Vec<i64>> {
        let truth = self.node_truth.as_ref().ok_or_else(|| {
            EngineError::State("ground truth labels have not been built yet".to_string())
        })?;
        Ok(truth.entry(graph_id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ClusterParams, GraphConfig, LabelColumns, NeighborMode, PipelineConfig};

    /// Fraction of node pairs on which predicted and true co-membership
    /// agree.
    struct PairAgreement;

    impl ClusterMetric for PairAgreement {
        fn name(&self) -> &str {
            "pair_agreement"
        }

        fn score(&self, pred: &[i32], truth: &[i64]) -> f64 {
            let n = pred.len();
            if n < 2 {
                return 1.0;
            }
            let mut agree = 0usize;
            let mut total = 0usize;
            for i in 0..n {
                for j in (i + 1)..n {
                    let same_pred = pred[i] >= 0 && pred[i] == pred[j];
                    let same_truth = truth[i] == truth[j];
                    agree += (same_pred == same_truth) as usize;
                    total += 1;
                }
            }
            agree as f64 / total as f64
        }
    }

    fn config() -> PipelineConfig {
        PipelineConfig {
            graph: GraphConfig {
                mode: NeighborMode::Knn,
                k: 2,
                ..Default::default()
            },
            clustering: ClusterParams {
                edge_threshold: 0.5,
                min_points: 2,
                cluster_all: true,
            },
            columns: LabelColumns::default(),
        }
    }

    /// 1 event x 2 classes, 5 points each: a 4-point chain plus a far
    /// singleton.
    fn synthetic_batch() -> (Vec<Vec<f32>>, Vec<[f32; 3]>, Vec<Vec<i64>>) {
        let mut positions = Vec::new();
        let mut labels = Vec::new();
        for class in 0..2i64 {
            let base = class as f32 * 1000.0;
            for i in 0..4 {
                positions.push([base + i as f32 * 0.5, 0.0, 0.0]);
                labels.push(vec![0, class, 0]);
            }
            positions.push([base + 100.0, 0.0, 0.0]);
            labels.push(vec![0, class, 1]);
        }
        let embeddings = positions.iter().map(|p| p.to_vec()).collect();
        (embeddings, positions, labels)
    }

    fn proximity_kernel(src: &[&[f32]], dst: &[&[f32]]) -> Vec<f32> {
        src.iter()
            .zip(dst)
            .map(|(a, b)| {
                let dist_sq: f32 = a.iter().zip(*b).map(|(x, y)| (x - y) * (x - y)).sum();
                (dist_sq < 1.0) as i32 as f32
            })
            .collect()
    }

    fn clustered_engine() -> ClusterEngine {
        let (embeddings, positions, labels) = synthetic_batch();
        let mut engine = ClusterEngine::new(config());
        engine
            .initialize(&embeddings, &positions, &labels, false)
            .unwrap();
        engine.score_edges(&proximity_kernel).unwrap();
        engine.cluster_entries(&HashSet::new()).unwrap();
        engine
    }

    #[test]
    fn test_evaluate_attaches_score_columns() {
        let mut engine = clustered_engine();
        let (_, _, truth) = synthetic_batch();
        engine.evaluate(&truth, &[&PairAgreement], &HashSet::new()).unwrap();

        let entries = engine.entries();
        assert_eq!(
            entries.score_columns().collect::<Vec<_>>(),
            vec!["pair_agreement"]
        );
        // Predictions match the truth exactly on this batch
        assert_eq!(entries.score("pair_agreement", 0), Some(1.0));
        assert_eq!(entries.score("pair_agreement", 1), Some(1.0));
    }

    #[test]
    fn test_evaluate_regroups_reordered_truth_rows() {
        let mut engine = clustered_engine();
        let (_, _, mut truth) = synthetic_batch();
        truth.reverse();
        engine.evaluate(&truth, &[&PairAgreement], &HashSet::new()).unwrap();
        // Rows land back in their (event, class) partitions; within a
        // partition the (reversed) input order is kept
        assert_eq!(engine.node_truth(0).unwrap(), vec![1, 0, 0, 0, 0]);
        assert!(engine.entries().score("pair_agreement", 0).is_some());
    }

    #[test]
    fn test_evaluate_skips_graphs() {
        let mut engine = clustered_engine();
        let (_, _, truth) = synthetic_batch();
        let skip: HashSet<usize> = [0].into_iter().collect();
        engine.evaluate(&truth, &[&PairAgreement], &skip).unwrap();
        assert_eq!(engine.entries().score("pair_agreement", 0), None);
        assert_eq!(engine.entries().score("pair_agreement", 1), Some(1.0));
    }

    #[test]
    fn test_evaluate_requires_predictions() {
        let (embeddings, positions, labels) = synthetic_batch();
        let mut engine = ClusterEngine::new(config());
        engine
            .initialize(&embeddings, &positions, &labels, false)
            .unwrap();
        let result = engine.evaluate(&labels, &[&PairAgreement], &HashSet::new());
        assert!(matches!(result, Err(EngineError::State(_))));
    }

    #[test]
    fn test_evaluate_rejects_mismatched_partition_keys() {
        let mut engine = clustered_engine();
        let (_, _, mut truth) = synthetic_batch();
        // Same partition count and sizes, but the class ids are shifted
        // so the keys no longer match the assembled graphs
        for row in &mut truth {
            row[1] += 1;
        }
        let result = engine.evaluate(&truth, &[&PairAgreement], &HashSet::new());
        assert!(matches!(result, Err(EngineError::Validation(_))));
    }

    #[test]
    fn test_evaluate_rejects_size_mismatch() {
        let mut engine = clustered_engine();
        let (_, _, mut truth) = synthetic_batch();
        truth.push(vec![0, 0, 7]);
        let result = engine.evaluate(&truth, &[&PairAgreement], &HashSet::new());
        assert!(matches!(result, Err(EngineError::Validation(_))));
    }
}
