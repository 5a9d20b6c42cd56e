//! Offline prompt provider.

use crate::cluster::ClusterSummary;
use crate::error::Result;
use crate::prompt::provider::PromptProvider;
use crate::prompt::types::PromptDraft;
use async_trait::async_trait;

/// Fills a fixed sentence template from the summary lists. No network.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplatePromptProvider;

impl TemplatePromptProvider {
    pub fn new() -> Self {
        Self
    }

    fn draft(summary: &ClusterSummary) -> PromptDraft {
        let name = summary
            .common_labels
            .first()
            .or_else(|| summary.common_styles.first())
            .map(|n| title_case(n))
            .unwrap_or_else(|| format!("Cluster {}", summary.label));

        let mut prompt = String::from("Transform this urban street into a speculative future city");
        let parts = [
            (" in a style blending ", &summary.common_styles),
            (", featuring ", &summary.common_elements),
            (", built from ", &summary.common_materials),
            (", with a mood that is ", &summary.common_moods),
            (", rendered in a palette of ", &summary.common_colors),
        ];
        for (lead, values) in parts {
            if !values.is_empty() {
                prompt.push_str(lead);
                prompt.push_str(&values.join("; "));
            }
        }
        prompt.push_str(", highly detailed, photorealistic");

        PromptDraft { name, prompt }
    }
}

fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(c) => c.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[async_trait]
impl PromptProvider for TemplatePromptProvider {
    async fn generate(&self, summary: &ClusterSummary) -> Result<PromptDraft> {
        Ok(Self::draft(summary))
    }

    fn name(&self) -> &str {
        "Template"
    }

    fn is_template(&self) -> bool {
        true
    }
}
