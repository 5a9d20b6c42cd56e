//! Image-to-image synthesis module.

mod provider;
pub mod providers;
mod types;

pub use provider::ImageProvider;
pub use types::{
    GeneratedImage, GenerationMetadata, ImageFormat, ImageProviderKind, TransformParams,
    TransformRequest,
};
