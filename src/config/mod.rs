//! Configuration types for the fragment clustering pipeline.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur while loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("configuration error: {0}")]
    Configuration(String),
}

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Neighbor-graph construction policy.
///
/// Both policies emit *directed* edges, one per (point, neighbor) pair:
/// `radius` mode is symmetric by construction (the metric is symmetric),
/// `knn` mode is not (j being among i's k nearest does not imply the
/// converse). Consumers must not assume an undirected edge list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NeighborMode {
    /// Connect each point to its k nearest points by Euclidean distance.
    Knn,
    /// Connect every ordered pair of points within a fixed radius.
    Radius,
}

/// Configuration for per-partition neighbor graph construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GraphConfig {
    /// Neighbor rule used to build the initial graph
    #[serde(default = "default_mode")]
    pub mode: NeighborMode,

    /// Number of neighbors per point in knn mode
    #[serde(default = "default_k")]
    pub k: usize,

    /// Neighborhood radius in radius mode
    #[serde(default = "default_radius")]
    pub radius: f32,
}

fn default_mode() -> NeighborMode {
    NeighborMode::Knn
}

fn default_k() -> usize {
    5
}

fn default_radius() -> f32 {
    1.9
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            k: default_k(),
            radius: default_radius(),
        }
    }
}

impl GraphConfig {
    /// Check that the selected neighbor policy is usable.
    pub fn validate(&self) -> Result<()> {
        match self.mode {
            NeighborMode::Knn if self.k == 0 => Err(ConfigError::Configuration(
                "knn mode requires k >= 1".to_string(),
            )),
            NeighborMode::Radius if self.radius <= 0.0 => Err(ConfigError::Configuration(
                format!("radius mode requires a positive radius, got {}", self.radius),
            )),
            _ => Ok(()),
        }
    }
}

/// Parameters controlling thresholded connected-component labeling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClusterParams {
    /// Edge weights <= this value are pruned before component search.
    /// The boundary is exclusive: a weight exactly equal to the threshold
    /// drops the edge.
    #[serde(default)]
    pub edge_threshold: f32,

    /// Components smaller than this are left unlabeled (-1)
    #[serde(default)]
    pub min_points: usize,

    /// Historical switch: when false, points missing from the neighbor
    /// graph keep label -1. The assembled graph covers every point, so
    /// this has no observable effect; orphan recovery is handled by the
    /// decoupled strays assigner instead.
    #[serde(default = "default_cluster_all")]
    pub cluster_all: bool,
}

fn default_cluster_all() -> bool {
    true
}

impl Default for ClusterParams {
    fn default() -> Self {
        Self {
            edge_threshold: 0.0,
            min_points: 0,
            cluster_all: default_cluster_all(),
        }
    }
}

/// Column layout of the per-point label rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LabelColumns {
    /// Column holding the event id
    #[serde(default = "default_event_column")]
    pub event: usize,

    /// Column holding the semantic class id
    #[serde(default = "default_semantic_column")]
    pub semantic: usize,

    /// Column holding the true fragment id (training / evaluation only)
    #[serde(default = "default_cluster_column")]
    pub cluster: usize,
}

fn default_event_column() -> usize {
    0
}

fn default_semantic_column() -> usize {
    1
}

fn default_cluster_column() -> usize {
    2
}

impl Default for LabelColumns {
    fn default() -> Self {
        Self {
            event: default_event_column(),
            semantic: default_semantic_column(),
            cluster: default_cluster_column(),
        }
    }
}

/// Main pipeline configuration combining all sub-configs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    #[serde(default)]
    pub graph: GraphConfig,

    #[serde(default)]
    pub clustering: ClusterParams,

    #[serde(default)]
    pub columns: LabelColumns,
}

impl PipelineConfig {
    /// Load configuration from a YAML file. Unknown keys are rejected.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: PipelineConfig = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a YAML file.
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate all sub-configs.
    pub fn validate(&self) -> Result<()> {
        self.graph.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_graph_config() {
        let config = GraphConfig::default();
        assert_eq!(config.mode, NeighborMode::Knn);
        assert_eq!(config.k, 5);
    }

    #[test]
    fn test_default_pipeline_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.columns.event, 0);
        assert_eq!(config.clustering.min_points, 0);
        assert!(config.clustering.cluster_all);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_k() {
        let config = GraphConfig {
            mode: NeighborMode::Knn,
            k: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_nonpositive_radius() {
        let config = GraphConfig {
            mode: NeighborMode::Radius,
            radius: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let yaml = "graph:\n  mode: knn\n  neighbours: 3\n";
        let parsed: std::result::Result<PipelineConfig, _> = serde_yaml::from_str(yaml);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_mode_round_trip() {
        let yaml = "graph:\n  mode: radius\n  radius: 2.5\n";
        let config: PipelineConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.graph.mode, NeighborMode::Radius);
        assert_eq!(config.graph.radius, 2.5);
    }
}
