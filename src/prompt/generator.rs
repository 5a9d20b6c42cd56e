//! Cluster report → prompt book, one provider call per cluster.

use crate::cluster::{ClusterReport, ClusterSummary};
use crate::prompt::provider::PromptProvider;
use crate::prompt::types::{ClusterPrompt, PromptBook, PromptStatus};

/// Produces one prompt per cluster.
///
/// Each cluster gets a single provider call. A failure is recorded as a
/// flagged placeholder and the remaining clusters are still processed.
pub struct PromptGenerator<P> {
    provider: P,
}

impl<P: PromptProvider> PromptGenerator<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub async fn generate_one(&self, summary: &ClusterSummary) -> ClusterPrompt {
        match self.provider.generate(summary).await {
            Ok(draft) => ClusterPrompt {
                label: summary.label,
                size: summary.size,
                name: draft.name,
                prompt: draft.prompt,
                status: if self.provider.is_template() {
                    PromptStatus::Template
                } else {
                    PromptStatus::Generated
                },
            },
            Err(e) => {
                tracing::warn!(label = summary.label, "prompt generation failed: {e}");
                ClusterPrompt::failed(summary.label, summary.size, e.to_string())
            }
        }
    }

    pub async fn run(&self, report: &ClusterReport) -> PromptBook {
        let mut book = PromptBook::new();
        let total = report.clusters.len();
        for (i, summary) in report.clusters.iter().enumerate() {
            tracing::info!(
                provider = self.provider.name(),
                "generating prompt for cluster {} ({}/{})",
                summary.label,
                i + 1,
                total
            );
            book.insert(self.generate_one(summary).await);
        }
        book
    }
}
