//! Cluster engine: validation, scaling, k selection, and statistics.

use crate::cluster::kmeans::{kmeans, KMeansOptions, KMeansResult};
use crate::cluster::silhouette::silhouette_score;
use crate::error::{Result, UrbanVizError};
use crate::features::FeatureMatrix;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// How many clusters to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterCount {
    /// Exactly this many, reduced if there are fewer distinct vectors.
    Fixed(usize),
    /// Best silhouette score over `min..=max`.
    Auto { min: usize, max: usize },
}

impl Default for ClusterCount {
    fn default() -> Self {
        Self::Fixed(5)
    }
}

/// Engine configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterConfig {
    pub count: ClusterCount,
    pub seed: u64,
    pub max_iter: usize,
    pub n_init: usize,
    pub tolerance: f64,
    /// Z-score every column before clustering.
    pub standardize: bool,
    /// Terms reported per centroid.
    pub top_terms: usize,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        let km = KMeansOptions::default();
        Self {
            count: ClusterCount::default(),
            seed: km.seed,
            max_iter: km.max_iter,
            n_init: km.n_init,
            tolerance: km.tolerance,
            standardize: true,
            top_terms: 10,
        }
    }
}

impl ClusterConfig {
    pub fn with_count(mut self, count: ClusterCount) -> Self {
        self.count = count;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    fn kmeans_options(&self) -> KMeansOptions {
        KMeansOptions {
            seed: self.seed,
            max_iter: self.max_iter,
            n_init: self.n_init,
            tolerance: self.tolerance,
        }
    }

    fn validate(&self) -> Result<()> {
        match self.count {
            ClusterCount::Fixed(0) => Err(UrbanVizError::InvalidRequest(
                "cluster count must be at least 1".into(),
            )),
            ClusterCount::Auto { min, max } if min < 2 || min > max => {
                Err(UrbanVizError::InvalidRequest(format!(
                    "auto cluster range {min}..={max} is invalid; need 2 <= min <= max"
                )))
            }
            _ => Ok(()),
        }
    }
}

/// A feature name with its centroid weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermWeight {
    pub term: String,
    pub weight: f64,
}

/// One cluster of the assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterStats {
    pub label: usize,
    pub members: Vec<String>,
    /// Mean of the members in the unscaled feature space.
    pub centroid: Vec<f64>,
    pub top_terms: Vec<TermWeight>,
}

impl ClusterStats {
    pub fn size(&self) -> usize {
        self.members.len()
    }
}

/// Silhouette score of one candidate k in auto mode.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CandidateScore {
    pub k: usize,
    pub score: f64,
}

/// Result of a clustering run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterAssignment {
    /// Number of clusters actually produced.
    pub k: usize,
    pub labels: BTreeMap<String, usize>,
    pub clusters: Vec<ClusterStats>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub candidate_scores: Vec<CandidateScore>,
}

impl ClusterAssignment {
    pub fn label_of(&self, id: &str) -> Option<usize> {
        self.labels.get(id).copied()
    }

    pub fn cluster(&self, label: usize) -> Option<&ClusterStats> {
        self.clusters.iter().find(|c| c.label == label)
    }
}

/// Groups feature vectors with seeded k-means.
#[derive(Debug, Clone, Default)]
pub struct ClusterEngine {
    config: ClusterConfig,
}

impl ClusterEngine {
    pub fn new(config: ClusterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    /// Clusters id/vector pairs. Top terms are left empty since the
    /// columns have no names.
    pub fn run(&self, items: &[(String, Vec<f64>)]) -> Result<ClusterAssignment> {
        let ids: Vec<String> = items.iter().map(|(id, _)| id.clone()).collect();
        let rows: Vec<Vec<f64>> = items.iter().map(|(_, v)| v.clone()).collect();
        self.cluster(&ids, &rows, None)
    }

    /// Clusters a feature matrix and reports the heaviest terms per centroid.
    pub fn run_matrix(&self, matrix: &FeatureMatrix) -> Result<ClusterAssignment> {
        self.cluster(&matrix.ids, &matrix.rows, Some(matrix.feature_names.as_slice()))
    }

    fn cluster(
        &self,
        ids: &[String],
        rows: &[Vec<f64>],
        names: Option<&[String]>,
    ) -> Result<ClusterAssignment> {
        self.config.validate()?;
        validate_input(ids, rows, names)?;

        let data = if self.config.standardize {
            standardize(rows)
        } else {
            rows.to_vec()
        };
        let n = data.len();
        let distinct = count_distinct(&data);
        let opts = self.config.kmeans_options();

        let (labels, candidate_scores) = match self.config.count {
            _ if distinct < 2 => {
                tracing::info!(n, "all vectors are identical; using a single cluster");
                (vec![0; n], Vec::new())
            }
            ClusterCount::Fixed(k) => {
                let k = if k > distinct {
                    tracing::warn!(
                        requested = k,
                        distinct,
                        "fewer distinct vectors than requested clusters; reducing k"
                    );
                    distinct
                } else {
                    k
                };
                (kmeans(&data, k, &opts).labels, Vec::new())
            }
            ClusterCount::Auto { .. } if n < 3 => {
                tracing::info!(n, "too few samples to compare cluster counts; using one cluster");
                (vec![0; n], Vec::new())
            }
            ClusterCount::Auto { min, max } => {
                let upper = max.min(n - 1).min(distinct);
                let lower = min.min(upper);
                select_k(&data, lower..=upper, &opts)
            }
        };

        let assignment = build_assignment(
            ids,
            rows,
            &labels,
            names,
            self.config.top_terms,
            candidate_scores,
        );
        tracing::info!(
            k = assignment.k,
            sizes = ?assignment.clusters.iter().map(ClusterStats::size).collect::<Vec<_>>(),
            "clustering complete"
        );
        Ok(assignment)
    }
}

fn validate_input(ids: &[String], rows: &[Vec<f64>], names: Option<&[String]>) -> Result<()> {
    if rows.is_empty() {
        return Err(UrbanVizError::InvalidRequest("no vectors to cluster".into()));
    }

    let expected = names.map_or(rows[0].len(), <[String]>::len);
    for (id, row) in ids.iter().zip(rows) {
        if row.len() != expected {
            return Err(UrbanVizError::DimensionMismatch {
                id: id.clone(),
                expected,
                actual: row.len(),
            });
        }
        if row.iter().any(|v| !v.is_finite()) {
            return Err(UrbanVizError::InvalidRequest(format!(
                "vector for {id} contains a non-finite value"
            )));
        }
    }

    let mut seen = BTreeSet::new();
    for id in ids {
        if !seen.insert(id.as_str()) {
            return Err(UrbanVizError::InvalidRequest(format!("duplicate id {id}")));
        }
    }
    Ok(())
}

/// Z-scores every column with population variance. Constant columns become 0.
pub fn standardize(rows: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let n = rows.len() as f64;
    let dim = rows.first().map_or(0, Vec::len);
    let mut out = rows.to_vec();
    for j in 0..dim {
        let mean = rows.iter().map(|r| r[j]).sum::<f64>() / n;
        let std = (rows.iter().map(|r| (r[j] - mean).powi(2)).sum::<f64>() / n).sqrt();
        for row in &mut out {
            row[j] = if std > 0.0 { (row[j] - mean) / std } else { 0.0 };
        }
    }
    out
}

fn count_distinct(data: &[Vec<f64>]) -> usize {
    data.iter()
        .map(|row| row.iter().map(|v| (v + 0.0).to_bits()).collect::<Vec<u64>>())
        .collect::<BTreeSet<_>>()
        .len()
}

fn select_k(
    data: &[Vec<f64>],
    candidates: std::ops::RangeInclusive<usize>,
    opts: &KMeansOptions,
) -> (Vec<usize>, Vec<CandidateScore>) {
    let mut scores = Vec::new();
    let mut best: Option<(f64, KMeansResult)> = None;

    for k in candidates.clone() {
        let result = kmeans(data, k, opts);
        let Some(score) = silhouette_score(data, &result.labels) else {
            continue;
        };
        tracing::debug!(k, score, "silhouette score");
        scores.push(CandidateScore { k, score });
        if best.as_ref().map_or(true, |(s, _)| score > *s) {
            best = Some((score, result));
        }
    }

    match best {
        Some((score, result)) => {
            tracing::info!(k = result.centroids.len(), score, "selected cluster count");
            (result.labels, scores)
        }
        None => {
            let k = *candidates.start();
            (kmeans(data, k, opts).labels, scores)
        }
    }
}

fn build_assignment(
    ids: &[String],
    rows: &[Vec<f64>],
    labels: &[usize],
    names: Option<&[String]>,
    top_n: usize,
    candidate_scores: Vec<CandidateScore>,
) -> ClusterAssignment {
    let k = labels.iter().max().map_or(0, |m| m + 1);
    let dim = rows[0].len();

    let mut clusters: Vec<ClusterStats> = (0..k)
        .map(|label| ClusterStats {
            label,
            members: Vec::new(),
            centroid: vec![0.0; dim],
            top_terms: Vec::new(),
        })
        .collect();

    for ((id, row), &label) in ids.iter().zip(rows).zip(labels) {
        let stats = &mut clusters[label];
        stats.members.push(id.clone());
        for (c, v) in stats.centroid.iter_mut().zip(row) {
            *c += v;
        }
    }

    for stats in &mut clusters {
        let size = stats.members.len().max(1) as f64;
        stats.centroid.iter_mut().for_each(|c| *c /= size);
        if let Some(names) = names {
            stats.top_terms = top_terms(&stats.centroid, names, top_n);
        }
    }

    ClusterAssignment {
        k,
        labels: ids.iter().cloned().zip(labels.iter().copied()).collect(),
        clusters,
        candidate_scores,
    }
}

/// Highest positive centroid weights, ties broken by name.
fn top_terms(centroid: &[f64], names: &[String], n: usize) -> Vec<TermWeight> {
    let mut terms: Vec<TermWeight> = names
        .iter()
        .zip(centroid)
        .filter(|(_, w)| **w > 0.0)
        .map(|(term, &weight)| TermWeight {
            term: term.clone(),
            weight,
        })
        .collect();
    terms.sort_by(|a, b| {
        b.weight
            .total_cmp(&a.weight)
            .then_with(|| a.term.cmp(&b.term))
    });
    terms.truncate(n);
    terms
}
