//! Batched data containers.

pub mod entry_index;
pub mod graph_batch;
pub mod ragged;

// Re-export key types for convenience
pub use entry_index::{EntryIndex, EntryIndexError};
pub use graph_batch::{ExtractedGraph, GraphBatch, GraphError, GraphItem};
pub use ragged::{Backend, IndexBuffer, IndexData, RaggedError, RaggedIndex};
