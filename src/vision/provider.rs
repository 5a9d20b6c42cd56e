//! Vision provider trait.

use crate::error::Result;
use crate::vision::types::AnalysisRequest;
use async_trait::async_trait;

/// Trait for vision-language models that describe an image.
#[async_trait]
pub trait VisionProvider: Send + Sync {
    /// Sends the image and prompt; returns the model's raw text answer.
    async fn analyze(&self, request: &AnalysisRequest) -> Result<String>;

    /// Returns the name of this provider for display.
    fn name(&self) -> &str;
}
