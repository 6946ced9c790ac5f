//! Batched graph clustering for 3D detector point clouds.
//!
//! This crate provides tools for:
//! - Ragged-batch index bookkeeping over flat concatenated buffers
//! - Building per-(event, semantic class) neighbor graphs from voxel embeddings
//! - Thresholded connected-component labeling into particle fragments
//! - Per-graph evaluation of predicted against true fragment labels
//!
//! # Example
//!
//! ```no_run
//! use fragment_pipeline::{ClusterEngine, PipelineConfig};
//! use std::collections::HashSet;
//!
//! let config = PipelineConfig::default();
//! let mut engine = ClusterEngine::new(config);
//! # let (embeddings, positions, labels): (Vec<Vec<f32>>, Vec<[f32; 3]>, Vec<Vec<i64>>) =
//! #     (vec![], vec![], vec![]);
//! engine
//!     .initialize(&embeddings, &positions, &labels, false)
//!     .unwrap();
//! engine
//!     .score_edges(&|src: &[&[f32]], _dst: &[&[f32]]| vec![1.0; src.len()])
//!     .unwrap();
//! engine.cluster_entries(&HashSet::new()).unwrap();
//! let node_pred = engine.node_pred().unwrap();
//! ```

pub mod config;
pub mod core;
pub mod processors;

pub use config::{ClusterParams, GraphConfig, LabelColumns, NeighborMode, PipelineConfig};
pub use core::entry_index::EntryIndex;
pub use core::graph_batch::{GraphBatch, GraphItem};
pub use core::ragged::{Backend, RaggedIndex};
pub use processors::clustering::ClusterEngine;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
