//! Clustering of feature vectors into stylistic groups.

mod engine;
pub mod kmeans;
mod silhouette;
mod summary;

pub use engine::{
    standardize, CandidateScore, ClusterAssignment, ClusterConfig, ClusterCount, ClusterEngine,
    ClusterStats, TermWeight,
};
pub use kmeans::{kmeans, KMeansOptions, KMeansResult};
pub use silhouette::silhouette_score;
pub use summary::{ClusterReport, ClusterSummary};
