//! Prompt provider trait.

use crate::cluster::ClusterSummary;
use crate::error::Result;
use crate::prompt::types::PromptDraft;
use async_trait::async_trait;

/// Turns a cluster summary into a named image-to-image prompt.
#[async_trait]
pub trait PromptProvider: Send + Sync {
    async fn generate(&self, summary: &ClusterSummary) -> Result<PromptDraft>;

    /// Returns the name of this provider for display.
    fn name(&self) -> &str;

    /// True when prompts come from a fixed template rather than a model.
    fn is_template(&self) -> bool {
        false
    }
}
