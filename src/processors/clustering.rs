//! Thresholded connected-component clustering of scored graph batches.
//!
//! Once edge weights are attached, every graph in the batch is clustered
//! independently: low-weight edges are pruned, connected components are
//! computed with a union-find over the local node ids, undersized
//! components are discarded, and surviving components receive canonical
//! labels `0, 1, 2, ...` ordered by their minimum node id. The per-graph
//! loop is parallelized with `rayon`; each graph's labels are scattered
//! into its own disjoint offset range of the batch-wide `node_pred`
//! column, so output is identical to sequential execution.

use log::{debug, warn};
use rayon::prelude::*;
use std::collections::HashSet;
use thiserror::Error;

use crate::config::{ClusterParams, PipelineConfig};
use crate::core::entry_index::{EntryIndex, EntryIndexError};
use crate::core::graph_batch::{GraphBatch, GraphError};
use crate::core::ragged::{RaggedError, RaggedIndex};
use crate::processors::assembler::{AssembleError, GraphAssembler};
use crate::processors::scoring::{attach_edge_weights, EdgeKernel, ScoreError};

/// Errors that can occur while driving the cluster engine.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("state error: {0}")]
    State(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Assemble(#[from] AssembleError),

    #[error(transparent)]
    Score(#[from] ScoreError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Entry(#[from] EntryIndexError),

    #[error(transparent)]
    Ragged(#[from] RaggedError),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Union-find with path compression for component merging.
struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(size: usize) -> Self {
        Self {
            parent: (0..size).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            // Path halving: point x at its grandparent as we walk up
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, x: usize, y: usize) {
        let root_x = self.find(x);
        let root_y = self.find(y);
        if root_x != root_y {
            // Smaller root wins, so a component's root is its minimum node
            let (small, large) = if root_x < root_y {
                (root_x, root_y)
            } else {
                (root_y, root_x)
            };
            self.parent[large] = small;
        }
    }
}

/// Cluster one graph's local node ids into fragment labels.
///
/// Edges with weight `<= threshold` are dropped (the boundary itself is
/// dropped); connected components are computed over the pruned graph,
/// isolated nodes included. Components smaller than `min_points` are left
/// at `-1`. Surviving components are labeled `0..k` in ascending order of
/// their minimum node id, which makes the output contiguous and canonical
/// by construction, independent of edge order.
pub fn cluster_local(
    num_nodes: usize,
    edge_index: &[[usize; 2]],
    weights: &[f32],
    params: &ClusterParams,
) -> Vec<i32> {
    let mut uf = UnionFind::new(num_nodes);
    for (&[src, dst], &w) in edge_index.iter().zip(weights) {
        if w > params.edge_threshold {
            uf.union(src, dst);
        }
    }

    let mut sizes = vec![0usize; num_nodes];
    for i in 0..num_nodes {
        let root = uf.find(i);
        sizes[root] += 1;
    }

    let mut labels = vec![-1i32; num_nodes];
    let mut root_label = vec![-1i32; num_nodes];
    let mut next_label = 0i32;
    for i in 0..num_nodes {
        let root = uf.find(i);
        if sizes[root] < params.min_points {
            continue;
        }
        if root_label[root] < 0 {
            root_label[root] = next_label;
            next_label += 1;
        }
        labels[i] = root_label[root];
    }
    labels
}

/// Stateful clustering engine over a batch of scored subgraphs.
///
/// One pass per batch: `initialize` assembles the neighbor graphs,
/// `score_edges` attaches the kernel weights, `cluster_entries` produces
/// the batch-wide `node_pred` column. Calling a stage before its
/// predecessor is a state error.
pub struct ClusterEngine {
    pub(crate) config: PipelineConfig,
    pub(crate) assembler: GraphAssembler,
    pub(crate) batch: Option<GraphBatch>,
    pub(crate) entries: EntryIndex,
    pub(crate) node_truth: Option<RaggedIndex>,
    pub(crate) node_pred: Option<Vec<i32>>,
}

impl ClusterEngine {
    pub fn new(config: PipelineConfig) -> Self {
        let assembler = GraphAssembler::new(config.graph.clone(), config.columns.clone());
        Self {
            config,
            assembler,
            batch: None,
            entries: EntryIndex::new(),
            node_truth: None,
            node_pred: None,
        }
    }

    /// Column layout and clustering parameters in use.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Assemble per-(event, class) neighbor graphs from a new batch of
    /// embeddings, replacing any previously stored state.
    pub fn initialize(
        &mut self,
        embeddings: &[Vec<f32>],
        positions: &[[f32; 3]],
        labels: &[Vec<i64>],
        training: bool,
    ) -> Result<()> {
        if self.batch.is_some() {
            warn!("replacing a previously assembled graph batch");
        }
        let assembled = self
            .assembler
            .assemble(embeddings, positions, labels, training)?;
        self.batch = Some(assembled.batch);
        self.entries = assembled.entries;
        self.node_truth = None;
        self.node_pred = None;
        Ok(())
    }

    /// The assembled graph batch.
    pub fn batch(&self) -> Result<&GraphBatch> {
        self.batch
            .as_ref()
            .ok_or_else(|| EngineError::State("graph batch has not been assembled yet".to_string()))
    }

    /// The (event, class) -> graph id table of the current batch.
    pub fn entries(&self) -> &EntryIndex {
        &self.entries
    }

    /// Predicted fragment label of every node in the batch.
    pub fn node_pred(&self) -> Result<&[i32]> {
        self.node_pred
            .as_deref()
            .ok_or_else(|| EngineError::State("node predictions have not been computed yet".to_string()))
    }

    /// Score every edge of the batch with an external kernel.
    pub fn score_edges(&mut self, kernel: &dyn EdgeKernel) -> Result<()> {
        let batch = self.batch.as_mut().ok_or_else(|| {
            EngineError::State("graph batch has not been assembled yet".to_string())
        })?;
        attach_edge_weights(batch, kernel)?;
        Ok(())
    }

    /// Cluster a single graph with explicit parameters.
    pub fn cluster_one(&self, graph_id: usize, params: &ClusterParams) -> Result<Vec<i32>> {
        let batch = self.batch()?;
        let sub = batch.get_example(graph_id)?;
        let weights = sub.edge_attr.ok_or_else(|| {
            EngineError::State("edge weights have not been attached yet".to_string())
        })?;
        Ok(cluster_local(
            sub.num_nodes,
            &sub.edge_index,
            &weights,
            params,
        ))
    }

    /// Cluster every graph not in `skip` and assemble the batch-wide
    /// `node_pred` column. Nodes of skipped graphs are left at `-1`.
    ///
    /// Graphs are processed in parallel and scattered sequentially into
    /// disjoint offset ranges, so the output does not depend on the
    /// number of workers.
    pub fn cluster_entries(&mut self, skip: &HashSet<usize>) -> Result<()> {
        let batch = self.batch()?;
        if batch.edge_attr().is_none() {
            return Err(EngineError::State(
                "edge weights have not been attached yet".to_string(),
            ));
        }

        let params = self.config.clustering.clone();
        let entry_list: Vec<usize> = (0..batch.num_graphs())
            .filter(|graph_id| !skip.contains(graph_id))
            .collect();

        let results: Vec<(usize, Vec<i32>)> = entry_list
            .into_par_iter()
            .map(|graph_id| Ok((graph_id, self.cluster_one(graph_id, &params)?)))
            .collect::<Result<_>>()?;

        let mut node_pred = vec![-1i32; batch.num_nodes()];
        for (graph_id, pred) in results {
            let (lo, hi) = batch.node_range(graph_id)?;
            node_pred[lo..hi].copy_from_slice(&pred);
        }

        let orphans = node_pred.iter().filter(|&&label| label < 0).count();
        debug!(
            "clustered {} graphs: {} nodes, {} orphans",
            batch.num_graphs(),
            node_pred.len(),
            orphans
        );

        self.node_pred = Some(node_pred.clone());
        if let Some(batch) = self.batch.as_mut() {
            batch.set_node_pred(node_pred)?;
        }
        Ok(())
    }
}
