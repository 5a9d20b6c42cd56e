//! Speculative futures: one source image, one prompt, one saved result.

mod generator;
mod types;

pub use generator::{FutureGenerator, FutureRequest};
pub use types::{GeneratedArtifact, ImageSource, SourceImage};
