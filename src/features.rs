//! Feature extraction from analysis text.
//!
//! Each clustering field gets its own TF-IDF vocabulary, capped at a
//! per-field size and scaled by a per-field weight. The field blocks are
//! concatenated into one dense row per image. Column names are
//! `<field>_<term>` so centroids can be read back as words.
//!
//! The TF-IDF flavour matches the common defaults: lowercase tokens of two or
//! more word characters, raw counts, smoothed idf
//! `ln((1 + n) / (1 + df)) + 1`, and L2-normalized rows.

use crate::error::{Result, UrbanVizError};
use crate::vision::{ImageRecord, StyleField};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

static TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\w\w+\b").expect("valid token regex"));

/// One field's contribution to the feature vector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub field: StyleField,
    pub weight: f64,
    pub max_features: usize,
}

/// Style, futuristic elements and mood dominate; palette and materials
/// contribute at lower weight.
pub const DEFAULT_FIELDS: [FieldSpec; 5] = [
    FieldSpec {
        field: StyleField::ArchitecturalStyle,
        weight: 1.5,
        max_features: 25,
    },
    FieldSpec {
        field: StyleField::FuturisticElements,
        weight: 1.5,
        max_features: 25,
    },
    FieldSpec {
        field: StyleField::Mood,
        weight: 1.2,
        max_features: 15,
    },
    FieldSpec {
        field: StyleField::ColorPalette,
        weight: 0.7,
        max_features: 10,
    },
    FieldSpec {
        field: StyleField::DominantMaterials,
        weight: 0.7,
        max_features: 10,
    },
];

/// Lowercases, turns " and " into commas, and collapses separators.
pub fn clean_text(text: &str) -> String {
    let replaced = text.replace(" and ", ", ");
    let collapsed = replaced.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
        .to_lowercase()
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    TOKEN.find_iter(text).map(|m| m.as_str().to_lowercase())
}

/// TF-IDF over a small corpus.
#[derive(Debug, Clone, Default)]
pub struct TfidfVectorizer {
    max_features: Option<usize>,
}

impl TfidfVectorizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps only the `n` terms with the highest corpus frequency.
    pub fn max_features(mut self, n: usize) -> Self {
        self.max_features = Some(n);
        self
    }

    /// Learns the vocabulary and returns one row per document plus the
    /// alphabetically ordered vocabulary. An empty vocabulary yields
    /// zero-width rows.
    pub fn fit_transform(&self, docs: &[String]) -> (Vec<Vec<f64>>, Vec<String>) {
        let counts: Vec<BTreeMap<String, usize>> = docs
            .iter()
            .map(|doc| {
                let mut tf = BTreeMap::new();
                for token in tokenize(doc) {
                    *tf.entry(token).or_insert(0) += 1;
                }
                tf
            })
            .collect();

        let mut corpus_tf: BTreeMap<&str, usize> = BTreeMap::new();
        let mut df: BTreeMap<&str, usize> = BTreeMap::new();
        for doc in &counts {
            for (term, n) in doc {
                *corpus_tf.entry(term.as_str()).or_insert(0) += n;
                *df.entry(term.as_str()).or_insert(0) += 1;
            }
        }

        let mut vocab: Vec<&str> = corpus_tf.keys().copied().collect();
        if let Some(limit) = self.max_features {
            if vocab.len() > limit {
                // Stable sort keeps alphabetical order among equal counts.
                vocab.sort_by(|a, b| corpus_tf[b].cmp(&corpus_tf[a]));
                vocab.truncate(limit);
                vocab.sort_unstable();
            }
        }

        let n_docs = docs.len() as f64;
        let idf: Vec<f64> = vocab
            .iter()
            .map(|t| ((1.0 + n_docs) / (1.0 + df[t] as f64)).ln() + 1.0)
            .collect();

        let rows = counts
            .iter()
            .map(|doc| {
                let mut row: Vec<f64> = vocab
                    .iter()
                    .zip(&idf)
                    .map(|(t, idf)| doc.get(*t).copied().unwrap_or(0) as f64 * idf)
                    .collect();
                let norm = row.iter().map(|v| v * v).sum::<f64>().sqrt();
                if norm > 0.0 {
                    row.iter_mut().for_each(|v| *v /= norm);
                }
                row
            })
            .collect();

        (rows, vocab.into_iter().map(str::to_string).collect())
    }
}

/// Dense feature rows keyed by image id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureMatrix {
    pub ids: Vec<String>,
    pub rows: Vec<Vec<f64>>,
    pub feature_names: Vec<String>,
}

impl FeatureMatrix {
    /// Number of columns.
    pub fn dimension(&self) -> usize {
        self.feature_names.len()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Id/row pairs, the shape the cluster engine consumes.
    pub fn entries(&self) -> Vec<(String, Vec<f64>)> {
        self.ids.iter().cloned().zip(self.rows.iter().cloned()).collect()
    }
}

/// Builds a [`FeatureMatrix`] from analysis records.
#[derive(Debug, Clone)]
pub struct FeatureBuilder {
    fields: Vec<FieldSpec>,
}

impl Default for FeatureBuilder {
    fn default() -> Self {
        Self {
            fields: DEFAULT_FIELDS.to_vec(),
        }
    }
}

impl FeatureBuilder {
    pub fn new(fields: Vec<FieldSpec>) -> Self {
        Self { fields }
    }

    /// Vectorizes every successfully analyzed record; failed records are skipped.
    pub fn build(&self, records: &[ImageRecord]) -> Result<FeatureMatrix> {
        let usable: Vec<&ImageRecord> = records.iter().filter(|r| r.is_analyzed()).collect();
        let skipped = records.len() - usable.len();
        if skipped > 0 {
            tracing::warn!(skipped, "ignoring records without a valid analysis");
        }
        if usable.is_empty() {
            return Err(UrbanVizError::InvalidRequest(
                "no successfully analyzed images to build features from".into(),
            ));
        }

        let mut seen = BTreeSet::new();
        for record in &usable {
            if !seen.insert(record.id.as_str()) {
                return Err(UrbanVizError::InvalidRequest(format!(
                    "duplicate image id {}",
                    record.id
                )));
            }
        }

        let mut rows = vec![Vec::new(); usable.len()];
        let mut feature_names = Vec::new();

        for entry in &self.fields {
            let docs: Vec<String> = usable
                .iter()
                .filter_map(|r| r.style.as_ref())
                .map(|s| clean_text(s.field(entry.field)))
                .collect();
            let (block, vocab) = TfidfVectorizer::new()
                .max_features(entry.max_features)
                .fit_transform(&docs);
            if vocab.is_empty() {
                tracing::warn!(field = %entry.field, "field has no usable terms");
                continue;
            }

            for (row, part) in rows.iter_mut().zip(block) {
                row.extend(part.into_iter().map(|v| v * entry.weight));
            }
            feature_names.extend(vocab.into_iter().map(|t| format!("{}_{}", entry.field, t)));
        }

        tracing::info!(
            images = usable.len(),
            dimension = feature_names.len(),
            "built feature matrix"
        );

        Ok(FeatureMatrix {
            ids: usable.iter().map(|r| r.id.clone()).collect(),
            rows,
            feature_names,
        })
    }
}
