//! urbanviz - speculative urban futures from street photographs.
//!
//! The pipeline has five stages, each usable on its own:
//!
//! 1. [`vision`]: describe every photo with a vision-language model.
//! 2. [`features`]: turn the descriptions into weighted TF-IDF vectors.
//! 3. [`cluster`]: group the vectors with seeded k-means.
//! 4. [`prompt`]: write one image-to-image prompt per cluster.
//! 5. [`future`]: transform a photo (local or Street View) with a prompt.
//!
//! Results live in a flat file store described by [`ResultsLayout`].
//!
//! # Quick Start
//!
//! ```no_run
//! use urbanviz::prelude::*;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> urbanviz::Result<()> {
//!     let config = Config::from_env()?;
//!     let provider = StabilityProvider::builder().build()?;
//!     let generator = FutureGenerator::new(provider, config.layout());
//!
//!     let source = SourceImage::from_file("street.jpg")?;
//!     let artifact = generator
//!         .generate(FutureRequest::new(source, DEFAULT_PROMPT))
//!         .await?;
//!     println!("saved {}", artifact.output_image.display());
//!     Ok(())
//! }
//! ```
//!
//! # Features
//!
//! - `cli` (default): the `urbanviz` command-line binary.

mod error;
mod openai;

pub mod cluster;
pub mod config;
pub mod features;
pub mod future;
pub mod prompt;
pub mod store;
pub mod streetview;
pub mod synthesis;
pub mod vision;

pub use config::Config;
pub use error::{Result, UrbanVizError};
pub use store::ResultsLayout;

pub use cluster::{ClusterAssignment, ClusterConfig, ClusterCount, ClusterEngine, ClusterReport};
pub use features::{FeatureBuilder, FeatureMatrix};
pub use future::{FutureGenerator, FutureRequest, GeneratedArtifact, ImageSource, SourceImage};
pub use prompt::{ClusterPrompt, PromptBook, PromptGenerator, PromptProvider, DEFAULT_PROMPT};
pub use streetview::{LocationQuery, StreetViewClient};
pub use synthesis::providers::{OpenAiImageProvider, StabilityProvider};
pub use synthesis::{ImageProvider, TransformParams};
pub use vision::{ImageAnalyzer, ImageRecord, VisionProvider};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::cluster::{ClusterConfig, ClusterCount, ClusterEngine, ClusterReport};
    pub use crate::config::Config;
    pub use crate::error::{Result, UrbanVizError};
    pub use crate::features::FeatureBuilder;
    pub use crate::future::{FutureGenerator, FutureRequest, SourceImage};
    pub use crate::prompt::providers::{OpenAiPromptProvider, TemplatePromptProvider};
    pub use crate::prompt::{PromptBook, PromptGenerator, PromptProvider, DEFAULT_PROMPT};
    pub use crate::store::{Gallery, ResultsLayout};
    pub use crate::streetview::{LocationQuery, StreetViewClient};
    pub use crate::synthesis::providers::{OpenAiImageProvider, StabilityProvider};
    pub use crate::synthesis::{ImageProvider, TransformParams};
    pub use crate::vision::providers::OpenAiVisionProvider;
    pub use crate::vision::{AnalyzeOptions, ImageAnalyzer, VisionProvider};
}
