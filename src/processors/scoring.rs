//! Edge scoring adapter.
//!
//! Applies an externally supplied pairwise kernel (a trained bilinear or
//! MLP scorer, opaque to this crate) to the endpoint feature pairs of
//! every edge in a batch, in one vectorized call, and writes the resulting
//! weights back as the `edge_attr` column.

use thiserror::Error;

use crate::core::graph_batch::{GraphBatch, GraphError};

/// Errors that can occur while attaching edge weights.
#[derive(Error, Debug)]
pub enum ScoreError {
    #[error("state error: {0}")]
    State(String),

    #[error("validation error: {0}")]
    Validation(String),
}

/// Result type for scoring operations.
pub type Result<T> = std::result::Result<T, ScoreError>;

/// Pairwise edge-weight kernel.
///
/// `score` receives the source and target endpoint feature rows of every
/// edge in the batch and must return one weight per edge. It is invoked
/// exactly once per batch.
pub trait EdgeKernel {
    fn score(&self, src: &[&[f32]], dst: &[&[f32]]) -> Vec<f32>;
}

impl<F> EdgeKernel for F
where
    F: Fn(&[&[f32]], &[&[f32]]) -> Vec<f32>,
{
    fn score(&self, src: &[&[f32]], dst: &[&[f32]]) -> Vec<f32> {
        self(src, dst)
    }
}

/// Score every edge of the batch and attach the weights as `edge_attr`.
///
/// Edge attributes are write-once; scoring an already scored batch is a
/// state error.
pub fn attach_edge_weights(batch: &mut GraphBatch, kernel: &dyn EdgeKernel) -> Result<()> {
    if batch.edge_attr().is_some() {
        return Err(ScoreError::State(
            "edge attributes are already set".to_string(),
        ));
    }

    let x = batch.x();
    let src: Vec<&[f32]> = batch
        .edge_index()
        .iter()
        .map(|&[s, _]| x[s].as_slice())
        .collect();
    let dst: Vec<&[f32]> = batch
        .edge_index()
        .iter()
        .map(|&[_, d]| x[d].as_slice())
        .collect();

    let weights = kernel.score(&src, &dst);
    if weights.len() != batch.num_edges() {
        return Err(ScoreError::Validation(format!(
            "kernel returned {} weights for {} edges",
            weights.len(),
            batch.num_edges()
        )));
    }

    match batch.set_edge_attr(weights) {
        Ok(()) => Ok(()),
        Err(GraphError::State(msg)) => Err(ScoreError::State(msg)),
        Err(e) => Err(ScoreError::Validation(e.to_string())),
    }
}
