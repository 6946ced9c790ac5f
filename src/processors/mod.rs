//! Graph assembly, scoring, clustering and evaluation.

pub mod assembler;
pub mod clustering;
pub mod evaluation;
pub mod scoring;
pub mod strays;

// Re-export key types for convenience
pub use assembler::{partition_rows, AssembleError, AssembledBatch, GraphAssembler};
pub use clustering::{cluster_local, ClusterEngine, EngineError};
pub use evaluation::ClusterMetric;
pub use scoring::{attach_edge_weights, EdgeKernel, ScoreError};
pub use strays::{NearestNeighborAssigner, NoAssigner, StraysAssigner};
