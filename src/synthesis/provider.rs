//! Synthesis provider trait.

use crate::error::Result;
use crate::synthesis::types::{GeneratedImage, ImageProviderKind, TransformRequest};
use async_trait::async_trait;

/// Trait for image-to-image synthesis providers.
///
/// Implementations make exactly one request per call. Failures are returned
/// as-is; callers decide what to do with them.
#[async_trait]
pub trait ImageProvider: Send + Sync {
    /// Transforms the source image in `request` according to its prompt.
    async fn transform(&self, request: &TransformRequest) -> Result<GeneratedImage>;

    /// Returns the kind of this provider.
    fn kind(&self) -> ImageProviderKind;

    /// Returns the name of this provider for display.
    fn name(&self) -> &str {
        match self.kind() {
            ImageProviderKind::Stability => "Stable Diffusion 3 (Stability AI)",
            ImageProviderKind::OpenAI => "OpenAI (gpt-image edits)",
        }
    }

    /// Model identifier recorded in artifact metadata.
    fn model(&self) -> &str;
}
