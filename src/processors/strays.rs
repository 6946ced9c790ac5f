//! Orphan-point assignment strategies.
//!
//! Clustering can leave points at `-1` (discarded or never connected).
//! A [`StraysAssigner`] optionally folds those orphans into the surviving
//! fragments after the fact. Kept separate from the cluster engine so
//! strategies can be swapped without touching the clustering pass.

use kiddo::{ImmutableKdTree, SquaredEuclidean};
use std::collections::BTreeMap;

/// Strategy for assigning orphan points to existing fragments.
pub trait StraysAssigner {
    /// Return a label array with (some or all) orphans resolved. Labeled
    /// points are never relabeled.
    fn assign(&self, positions: &[[f32; 3]], labels: &[i32]) -> Vec<i32>;
}

/// Leaves orphans as they are.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAssigner;

impl StraysAssigner for NoAssigner {
    fn assign(&self, _positions: &[[f32; 3]], labels: &[i32]) -> Vec<i32> {
        labels.to_vec()
    }
}

/// Assigns each orphan to the majority fragment among its k nearest
/// labeled points, ties going to the smaller label.
#[derive(Debug, Clone, Copy)]
pub struct NearestNeighborAssigner {
    k: usize,
}

impl NearestNeighborAssigner {
    pub fn new(k: usize) -> Self {
        Self { k: k.max(1) }
    }
}

impl Default for NearestNeighborAssigner {
    fn default() -> Self {
        Self::new(10)
    }
}

impl StraysAssigner for NearestNeighborAssigner {
    fn assign(&self, positions: &[[f32; 3]], labels: &[i32]) -> Vec<i32> {
        let labeled: Vec<usize> = (0..labels.len()).filter(|&i| labels[i] >= 0).collect();
        if labeled.is_empty() {
            // Nothing to vote with
            return labels.to_vec();
        }

        let anchor_pos: Vec<[f32; 3]> = labeled.iter().map(|&i| positions[i]).collect();
        let tree: ImmutableKdTree<f32, 3> = ImmutableKdTree::new_from_slice(&anchor_pos);
        let k = self.k.min(labeled.len());

        let mut out = labels.to_vec();
        for i in 0..labels.len() {
            if labels[i] >= 0 {
                continue;
            }
            let mut votes: BTreeMap<i32, usize> = BTreeMap::new();
            for nn in tree.nearest_n::<SquaredEuclidean>(&positions[i], k) {
                let label = labels[labeled[nn.item as usize]];
                *votes.entry(label).or_insert(0) += 1;
            }
            // BTreeMap iteration is label-ascending, so the first maximum
            // is the smallest winning label
            let mut winner = -1;
            let mut best = 0usize;
            for (&label, &count) in &votes {
                if count > best {
                    winner = label;
                    best = count;
                }
            }
            out[i] = winner;
        }
        out
    }
}
