//! Human-readable cluster summaries, persisted for the prompt step.

use crate::cluster::engine::{CandidateScore, ClusterAssignment, TermWeight};
use crate::error::{Result, UrbanVizError};
use crate::store::{read_json, write_json_atomic};
use crate::vision::{ImageRecord, StyleField};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

const SAMPLE_PATHS: usize = 3;

/// What the members of one cluster have in common.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterSummary {
    pub label: usize,
    pub size: usize,
    pub members: Vec<String>,
    pub common_labels: Vec<String>,
    pub common_styles: Vec<String>,
    pub common_elements: Vec<String>,
    pub common_materials: Vec<String>,
    pub common_moods: Vec<String>,
    pub common_colors: Vec<String>,
    pub sample_paths: Vec<PathBuf>,
    #[serde(default)]
    pub top_terms: Vec<TermWeight>,
}

impl ClusterSummary {
    /// Multi-line description fed to the prompt generator. Empty lists are omitted.
    pub fn describe(&self) -> String {
        let terms: Vec<String> = self
            .top_terms
            .iter()
            .map(|t| strip_field_prefix(&t.term).to_string())
            .collect();

        [
            ("Common Labels", &self.common_labels),
            ("Styles", &self.common_styles),
            ("Key Elements", &self.common_elements),
            ("Materials", &self.common_materials),
            ("Moods", &self.common_moods),
            ("Colors", &self.common_colors),
            ("Distinctive Terms", &terms),
        ]
        .iter()
        .filter(|(_, values)| !values.is_empty())
        .map(|(title, values)| format!("{title}: {}", values.join(", ")))
        .collect::<Vec<_>>()
        .join("\n")
    }
}

fn strip_field_prefix(term: &str) -> &str {
    StyleField::ALL
        .iter()
        .find_map(|f| {
            term.strip_prefix(f.as_str())
                .and_then(|rest| rest.strip_prefix('_'))
        })
        .unwrap_or(term)
}

/// Every cluster of one run, in label order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterReport {
    pub created_at: DateTime<Utc>,
    pub k: usize,
    pub clusters: Vec<ClusterSummary>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub candidate_scores: Vec<CandidateScore>,
}

impl ClusterReport {
    /// Joins an assignment with the analysis records of its members.
    pub fn build(assignment: &ClusterAssignment, records: &[ImageRecord]) -> Self {
        let by_id: HashMap<&str, &ImageRecord> =
            records.iter().map(|r| (r.id.as_str(), r)).collect();

        let clusters = assignment
            .clusters
            .iter()
            .map(|stats| {
                let members: Vec<&ImageRecord> = stats
                    .members
                    .iter()
                    .filter_map(|id| by_id.get(id.as_str()).copied())
                    .collect();
                let collect = |field: StyleField| {
                    dedup(
                        members
                            .iter()
                            .filter_map(|r| r.style.as_ref())
                            .map(|s| s.field(field).trim().to_string()),
                    )
                };

                ClusterSummary {
                    label: stats.label,
                    size: stats.size(),
                    members: stats.members.clone(),
                    common_labels: collect(StyleField::ShortDescriptiveLabel),
                    common_styles: collect(StyleField::ArchitecturalStyle),
                    common_elements: collect(StyleField::FuturisticElements),
                    common_materials: collect(StyleField::DominantMaterials),
                    common_moods: collect(StyleField::Mood),
                    common_colors: collect(StyleField::ColorPalette),
                    sample_paths: members
                        .iter()
                        .take(SAMPLE_PATHS)
                        .map(|r| r.original_path.clone())
                        .collect(),
                    top_terms: stats.top_terms.clone(),
                }
            })
            .collect();

        Self {
            created_at: Utc::now(),
            k: assignment.k,
            clusters,
            candidate_scores: assignment.candidate_scores.clone(),
        }
    }

    pub fn cluster(&self, label: usize) -> Option<&ClusterSummary> {
        self.clusters.iter().find(|c| c.label == label)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        write_json_atomic(path, self)?;
        tracing::info!(path = %path.display(), clusters = self.clusters.len(), "saved cluster report");
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        read_json(path)?.ok_or_else(|| {
            UrbanVizError::InvalidRequest(format!(
                "no cluster results at {}; run the clustering step first",
                path.display()
            ))
        })
    }
}

/// Keeps first occurrences, drops blanks.
fn dedup(values: impl Iterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for v in values {
        if !v.is_empty() && !out.contains(&v) {
            out.push(v);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{ClusterConfig, ClusterCount, ClusterEngine};
    use crate::features::FeatureMatrix;

    fn record(id: &str, style: &str, mood: &str) -> ImageRecord {
        let text = serde_json::json!({
            "architectural_style": style,
            "color_palette": "grey",
            "futuristic_elements": "",
            "dominant_materials": "glass",
            "mood": mood,
            "short_descriptive_label": format!("{style} street"),
        })
        .to_string();
        ImageRecord::from_output(id, PathBuf::from(format!("in/{id}")), None, text)
    }

    fn report() -> ClusterReport {
        let records = vec![
            record("a.jpg", "Gothic", "gloomy"),
            record("b.jpg", "Gothic", "eerie"),
            record("c.jpg", "Gothic", "gloomy"),
            record("d.jpg", "Gothic", "gloomy"),
            record("e.jpg", "Modernist", "bright"),
        ];
        let items = vec![
            ("a.jpg".to_string(), vec![0.0, 0.0]),
            ("b.jpg".to_string(), vec![0.1, 0.0]),
            ("c.jpg".to_string(), vec![0.0, 0.1]),
            ("d.jpg".to_string(), vec![0.1, 0.1]),
            ("e.jpg".to_string(), vec![5.0, 5.0]),
        ];
        let engine = ClusterEngine::new(ClusterConfig::default().with_count(ClusterCount::Fixed(2)));
        ClusterReport::build(&engine.run(&items).unwrap(), &records)
    }

    #[test]
    fn test_summary_lists() {
        let report = report();
        let first = report.cluster(0).unwrap();
        assert_eq!(first.size, 4);
        assert_eq!(first.common_styles, vec!["Gothic"]);
        assert_eq!(first.common_moods, vec!["gloomy", "eerie"]);
        assert!(first.common_elements.is_empty());
        assert_eq!(first.sample_paths.len(), 3);
        assert_eq!(first.sample_paths[0], PathBuf::from("in/a.jpg"));
    }

    #[test]
    fn test_describe_skips_empty_lists() {
        let text = report().cluster(1).unwrap().describe();
        assert_eq!(
            text,
            "Common Labels: Modernist street\nStyles: Modernist\nMaterials: glass\n\
             Moods: bright\nColors: grey"
        );
    }

    #[test]
    fn test_describe_strips_field_prefix() {
        let mut summary = report().cluster(1).unwrap().clone();
        summary.top_terms = vec![TermWeight {
            term: "color_palette_neon".into(),
            weight: 0.4,
        }];
        assert!(summary.describe().ends_with("Distinctive Terms: neon"));
    }

    /// Clusters a matrix with named columns so every summary carries
    /// weighted top terms.
    fn weighted_report() -> ClusterReport {
        let records = vec![
            record("a.jpg", "Gothic", "gloomy"),
            record("b.jpg", "Gothic", "eerie"),
            record("c.jpg", "Gothic", "gloomy"),
            record("d.jpg", "Modernist", "bright"),
            record("e.jpg", "Modernist", "calm"),
        ];
        let third = 1.0 / 3.0;
        let matrix = FeatureMatrix {
            ids: records.iter().map(|r| r.id.clone()).collect(),
            rows: vec![
                vec![third * 1.5, 0.209_814_971_167_439_75, 0.0],
                vec![0.1 + 0.2, 0.0, 0.0],
                vec![0.7_f64.sqrt(), 0.123_456_789_012_345_67, 0.0],
                vec![0.0, 0.0, 2.0_f64.sqrt() / 3.0],
                vec![0.0, 0.0, third * 1.2],
            ],
            feature_names: vec![
                "style_gothic".into(),
                "mood_gloomy".into(),
                "style_modernist".into(),
            ],
        };
        let engine = ClusterEngine::new(ClusterConfig::default().with_count(ClusterCount::Fixed(2)));
        ClusterReport::build(&engine.run_matrix(&matrix).unwrap(), &records)
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cluster_results").join("clusters.json");
        let report = weighted_report();
        assert!(report.clusters.iter().all(|c| !c.top_terms.is_empty()));
        report.save(&path).unwrap();

        let loaded = ClusterReport::load(&path).unwrap();
        assert_eq!(loaded, report);
        for (got, want) in loaded.clusters.iter().zip(&report.clusters) {
            assert_eq!(got.label, want.label);
            assert_eq!(got.members, want.members);
            assert_eq!(got.top_terms.len(), want.top_terms.len());
            for (g, w) in got.top_terms.iter().zip(&want.top_terms) {
                assert_eq!(g.term, w.term);
                assert_eq!(g.weight.to_bits(), w.weight.to_bits(), "{}", g.term);
            }
        }
    }

    #[test]
    fn test_load_missing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ClusterReport::load(&dir.path().join("nope.json")).is_err());
    }
}
