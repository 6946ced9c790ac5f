//! Batched graph container.
//!
//! A [`GraphBatch`] concatenates many independently-sized graphs into flat
//! buffers: node features and positions are stacked row-wise, edge
//! endpoint pairs are shifted to global node ids, and per-graph boundaries
//! are tracked with [`RaggedIndex`] bookkeeping so that any single graph
//! can be extracted in O(1) slices. After construction the batch is only
//! ever mutated by attaching new aligned columns (edge weights, node
//! predictions), never by resizing.

use thiserror::Error;

use crate::core::ragged::{RaggedError, RaggedIndex};

/// Errors that can occur while building or slicing a graph batch.
#[derive(Error, Debug)]
pub enum GraphError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("state error: {0}")]
    State(String),

    #[error("graph {index} out of bounds for {num_graphs} graphs")]
    IndexOutOfRange { index: usize, num_graphs: usize },

    #[error(transparent)]
    Ragged(#[from] RaggedError),
}

/// Result type for graph batch operations.
pub type Result<T> = std::result::Result<T, GraphError>;

/// One partition's graph, with entry-local node ids.
#[derive(Debug, Clone)]
pub struct GraphItem {
    /// Node feature rows (n x F)
    pub x: Vec<Vec<f32>>,
    /// Node positions
    pub pos: Vec<[f32; 3]>,
    /// Edge endpoint pairs, local node ids
    pub edge_index: Vec<[usize; 2]>,
    /// Binary ground-truth edge labels, when assembled in training mode
    pub edge_truth: Option<Vec<i32>>,
    /// Original input row of each node
    pub source_rows: Vec<i64>,
}

/// A single graph extracted from a batch, with localized edge endpoints.
#[derive(Debug, Clone)]
pub struct ExtractedGraph {
    pub graph_id: usize,
    pub num_nodes: usize,
    pub x: Vec<Vec<f32>>,
    pub pos: Vec<[f32; 3]>,
    pub edge_index: Vec<[usize; 2]>,
    pub edge_attr: Option<Vec<f32>>,
    pub edge_truth: Option<Vec<i32>>,
    pub node_pred: Option<Vec<i32>>,
    pub source_rows: Vec<i64>,
}

/// Flat concatenation of many variable-size graphs.
#[derive(Debug, Clone)]
pub struct GraphBatch {
    x: Vec<Vec<f32>>,
    pos: Vec<[f32; 3]>,
    edge_index: Vec<[usize; 2]>,
    edge_attr: Option<Vec<f32>>,
    edge_truth: Option<Vec<i32>>,
    node_pred: Option<Vec<i32>>,
    nodes: RaggedIndex,
    edges: RaggedIndex,
    source_rows: RaggedIndex,
}

impl GraphBatch {
    /// Concatenate a list of per-partition graphs into one batch.
    ///
    /// Every item must agree on the feature width, every edge endpoint
    /// must address a node of its own graph, and either all or none of the
    /// items may carry truth edge labels.
    pub fn from_items(items: &[GraphItem]) -> Result<Self> {
        let feature_dim = items
            .iter()
            .flat_map(|item| item.x.first())
            .map(|row| row.len())
            .next()
            .unwrap_or(0);

        let with_truth = items.iter().filter(|item| item.edge_truth.is_some()).count();
        if with_truth != 0 && with_truth != items.len() {
            return Err(GraphError::Validation(format!(
                "{} of {} graphs carry truth edge labels; all or none must",
                with_truth,
                items.len()
            )));
        }

        let total_nodes: usize = items.iter().map(|item| item.x.len()).sum();
        let total_edges: usize = items.iter().map(|item| item.edge_index.len()).sum();

        let mut x = Vec::with_capacity(total_nodes);
        let mut pos = Vec::with_capacity(total_nodes);
        let mut edge_index = Vec::with_capacity(total_edges);
        let mut edge_truth = Vec::with_capacity(if with_truth > 0 { total_edges } else { 0 });
        let mut rows = Vec::with_capacity(total_nodes);

        let mut node_counts = Vec::with_capacity(items.len());
        let mut node_offsets = Vec::with_capacity(items.len());
        let mut edge_counts = Vec::with_capacity(items.len());
        let mut edge_offsets = Vec::with_capacity(items.len());

        for (graph_id, item) in items.iter().enumerate() {
            let n = item.x.len();
            if item.pos.len() != n || item.source_rows.len() != n {
                return Err(GraphError::Validation(format!(
                    "graph {}: {} feature rows, {} positions, {} source rows",
                    graph_id,
                    n,
                    item.pos.len(),
                    item.source_rows.len()
                )));
            }
            for row in &item.x {
                if row.len() != feature_dim {
                    return Err(GraphError::Validation(format!(
                        "graph {}: feature row of width {} in a batch of width {}",
                        graph_id,
                        row.len(),
                        feature_dim
                    )));
                }
            }
            if let Some(truth) = &item.edge_truth {
                if truth.len() != item.edge_index.len() {
                    return Err(GraphError::Validation(format!(
                        "graph {}: {} truth labels for {} edges",
                        graph_id,
                        truth.len(),
                        item.edge_index.len()
                    )));
                }
            }

            let node_offset = x.len();
            for &[src, dst] in &item.edge_index {
                if src >= n || dst >= n {
                    return Err(GraphError::Validation(format!(
                        "graph {}: edge ({}, {}) addresses nodes outside its {} nodes",
                        graph_id, src, dst, n
                    )));
                }
                edge_index.push([src + node_offset, dst + node_offset]);
            }

            node_counts.push(n as i64);
            node_offsets.push(node_offset as i64);
            edge_counts.push(item.edge_index.len() as i64);
            edge_offsets.push((edge_index.len() - item.edge_index.len()) as i64);

            x.extend(item.x.iter().cloned());
            pos.extend_from_slice(&item.pos);
            rows.extend_from_slice(&item.source_rows);
            if let Some(truth) = &item.edge_truth {
                edge_truth.extend_from_slice(truth);
            }
        }

        let nodes = RaggedIndex::from_counts(
            (0..total_nodes as i64).collect(),
            node_offsets,
            node_counts.clone(),
        )?;
        let edges = RaggedIndex::from_counts(
            (0..total_edges as i64).collect(),
            edge_offsets,
            edge_counts,
        )?;
        let source_rows =
            RaggedIndex::from_counts(rows, vec![0; items.len()], node_counts)?;

        Ok(Self {
            x,
            pos,
            edge_index,
            edge_attr: None,
            edge_truth: (with_truth > 0).then_some(edge_truth),
            node_pred: None,
            nodes,
            edges,
            source_rows,
        })
    }

    /// Number of graphs in the batch.
    #[inline]
    pub fn num_graphs(&self) -> usize {
        self.nodes.batch_size()
    }

    /// Total number of nodes across all graphs.
    #[inline]
    pub fn num_nodes(&self) -> usize {
        self.x.len()
    }

    /// Total number of edges across all graphs.
    #[inline]
    pub fn num_edges(&self) -> usize {
        self.edge_index.len()
    }

    /// Width of the node feature rows.
    pub fn feature_dim(&self) -> usize {
        self.x.first().map_or(0, |row| row.len())
    }

    /// Concatenated node feature rows.
    #[inline]
    pub fn x(&self) -> &[Vec<f32>] {
        &self.x
    }

    /// Concatenated node positions.
    #[inline]
    pub fn pos(&self) -> &[[f32; 3]] {
        &self.pos
    }

    /// Concatenated edge endpoint pairs, global node ids.
    #[inline]
    pub fn edge_index(&self) -> &[[usize; 2]] {
        &self.edge_index
    }

    /// Edge weights, once attached by the scorer.
    #[inline]
    pub fn edge_attr(&self) -> Option<&[f32]> {
        self.edge_attr.as_deref()
    }

    /// Ground-truth edge labels, when assembled in training mode.
    #[inline]
    pub fn edge_truth(&self) -> Option<&[i32]> {
        self.edge_truth.as_deref()
    }

    /// Predicted fragment label of every node, once clustered.
    #[inline]
    pub fn node_pred(&self) -> Option<&[i32]> {
        self.node_pred.as_deref()
    }

    /// Graph id of every node, in concatenation order.
    pub fn batch(&self) -> Vec<i64> {
        self.nodes.batch_ids()
    }

    /// Original input row of every node, in concatenation order.
    pub fn source_rows(&self) -> Vec<i64> {
        self.source_rows.full_index()
    }

    /// Global node id range `[start, end)` of one graph.
    pub fn node_range(&self, graph_id: usize) -> Result<(usize, usize)> {
        self.check_graph(graph_id)?;
        let edges = self.nodes.edges();
        Ok((edges[graph_id], edges[graph_id + 1]))
    }

    /// Global edge id range `[start, end)` of one graph.
    pub fn edge_range(&self, graph_id: usize) -> Result<(usize, usize)> {
        self.check_graph(graph_id)?;
        let edges = self.edges.edges();
        Ok((edges[graph_id], edges[graph_id + 1]))
    }

    fn check_graph(&self, graph_id: usize) -> Result<()> {
        if graph_id >= self.num_graphs() {
            return Err(GraphError::IndexOutOfRange {
                index: graph_id,
                num_graphs: self.num_graphs(),
            });
        }
        Ok(())
    }

    /// Extract one graph by its global entry id, with edge endpoints
    /// shifted back to local node ids.
    pub fn get_example(&self, graph_id: usize) -> Result<ExtractedGraph> {
        let (node_lo, node_hi) = self.node_range(graph_id)?;
        let (edge_lo, edge_hi) = self.edge_range(graph_id)?;

        let edge_index = self.edge_index[edge_lo..edge_hi]
            .iter()
            .map(|&[src, dst]| [src - node_lo, dst - node_lo])
            .collect();

        Ok(ExtractedGraph {
            graph_id,
            num_nodes: node_hi - node_lo,
            x: self.x[node_lo..node_hi].to_vec(),
            pos: self.pos[node_lo..node_hi].to_vec(),
            edge_index,
            edge_attr: self.edge_attr.as_ref().map(|w| w[edge_lo..edge_hi].to_vec()),
            edge_truth: self
                .edge_truth
                .as_ref()
                .map(|t| t[edge_lo..edge_hi].to_vec()),
            node_pred: self
                .node_pred
                .as_ref()
                .map(|p| p[node_lo..node_hi].to_vec()),
            source_rows: self.source_rows.entry(graph_id)?,
        })
    }

    /// Attach the edge weight column. Write-once.
    pub fn set_edge_attr(&mut self, weights: Vec<f32>) -> Result<()> {
        if self.edge_attr.is_some() {
            return Err(GraphError::State(
                "edge attributes are already set".to_string(),
            ));
        }
        if weights.len() != self.num_edges() {
            return Err(GraphError::Validation(format!(
                "got {} edge weights for {} edges",
                weights.len(),
                self.num_edges()
            )));
        }
        self.edge_attr = Some(weights);
        Ok(())
    }

    /// Attach (or replace) the node prediction column.
    pub fn set_node_pred(&mut self, pred: Vec<i32>) -> Result<()> {
        if pred.len() != self.num_nodes() {
            return Err(GraphError::Validation(format!(
                "got {} node predictions for {} nodes",
                pred.len(),
                self.num_nodes()
            )));
        }
        self.node_pred = Some(pred);
        Ok(())
    }
}
