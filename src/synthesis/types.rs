//! Image-to-image requests and results.

use crate::error::{Result, UrbanVizError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Encodings the synthesis services accept and return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    #[default]
    Png,
    Jpeg,
    WebP,
}

impl ImageFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::WebP => "webp",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::WebP => "image/webp",
        }
    }

    /// Sniffs the encoding from the leading bytes. Anything other than PNG,
    /// JPEG or WebP is `None`.
    pub fn detect(data: &[u8]) -> Option<Self> {
        match image::guess_format(data).ok()? {
            image::ImageFormat::Png => Some(Self::Png),
            image::ImageFormat::Jpeg => Some(Self::Jpeg),
            image::ImageFormat::WebP => Some(Self::WebP),
            _ => None,
        }
    }
}

/// Which synthesis backend produced an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageProviderKind {
    /// Stability AI, SD3 image-to-image.
    Stability,
    /// OpenAI image edits.
    OpenAI,
}

impl std::fmt::Display for ImageProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Stability => "stability",
            Self::OpenAI => "openai",
        })
    }
}

/// Numeric knobs of an image-to-image transformation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransformParams {
    /// How far the output may drift from the source, 0.0 to 1.0.
    pub strength: f32,
    /// How closely the model follows the prompt (`cfg_scale`).
    pub guidance_scale: f32,
    /// Seed; 0 asks the service to pick one.
    pub seed: u64,
}

impl Default for TransformParams {
    fn default() -> Self {
        Self {
            strength: 0.7,
            guidance_scale: 5.0,
            seed: 0,
        }
    }
}

impl TransformParams {
    /// Rejects values the synthesis services would refuse.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.strength) {
            return Err(UrbanVizError::InvalidRequest(format!(
                "strength must be between 0.0 and 1.0, got {}",
                self.strength
            )));
        }
        if !(1.0..=10.0).contains(&self.guidance_scale) {
            return Err(UrbanVizError::InvalidRequest(format!(
                "guidance scale must be between 1.0 and 10.0, got {}",
                self.guidance_scale
            )));
        }
        Ok(())
    }
}

/// What the service reported about a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationMetadata {
    pub model: Option<String>,
    /// Seed the service actually used, when it says.
    pub seed: Option<u64>,
    pub duration_ms: Option<u64>,
}

/// One source image plus the prompt to apply to it.
#[derive(Debug, Clone)]
pub struct TransformRequest {
    pub prompt: String,
    pub source: Vec<u8>,
    pub params: TransformParams,
    /// Encoding asked of the service, where it lets us choose.
    pub output: ImageFormat,
}

impl TransformRequest {
    pub fn new(prompt: impl Into<String>, source: Vec<u8>) -> Self {
        Self {
            prompt: prompt.into(),
            source,
            params: TransformParams::default(),
            output: ImageFormat::Png,
        }
    }

    pub fn with_params(mut self, params: TransformParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_output(mut self, output: ImageFormat) -> Self {
        self.output = output;
        self
    }

    /// Encoding of the source bytes. Unknown data is sent labelled as PNG
    /// and left for the service to reject.
    pub fn source_format(&self) -> ImageFormat {
        ImageFormat::detect(&self.source).unwrap_or_default()
    }
}

/// Encoded output of a synthesis call.
#[derive(Debug, Clone)]
#[must_use = "a generated image is lost unless it is saved"]
pub struct GeneratedImage {
    pub data: Vec<u8>,
    pub format: ImageFormat,
    pub provider: ImageProviderKind,
    pub metadata: GenerationMetadata,
}

impl GeneratedImage {
    /// Wraps service output, failing with `Decode` if it is not a PNG, JPEG
    /// or WebP image.
    pub fn from_encoded(
        data: Vec<u8>,
        provider: ImageProviderKind,
        metadata: GenerationMetadata,
    ) -> Result<Self> {
        let format = ImageFormat::detect(&data).ok_or_else(|| {
            UrbanVizError::Decode(format!(
                "{provider} returned {} bytes that are not a PNG, JPEG or WebP image",
                data.len()
            ))
        })?;
        Ok(Self {
            data,
            format,
            provider,
            metadata,
        })
    }

    /// Writes the bytes to `path` via a temp file and rename.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        crate::store::write_bytes_atomic(path.as_ref(), &self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_HEAD: [u8; 12] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];
    const JPEG_HEAD: [u8; 12] = [0xFF, 0xD8, 0xFF, 0xE0, 0, 0, 0, 0, 0, 0, 0, 0];
    const WEBP_HEAD: [u8; 12] = *b"RIFF\x00\x00\x00\x00WEBP";

    #[test]
    fn test_detect() {
        assert_eq!(ImageFormat::detect(&PNG_HEAD), Some(ImageFormat::Png));
        assert_eq!(ImageFormat::detect(&JPEG_HEAD), Some(ImageFormat::Jpeg));
        assert_eq!(ImageFormat::detect(&WEBP_HEAD), Some(ImageFormat::WebP));
        assert_eq!(ImageFormat::detect(b"GIF89a......"), None);
        assert_eq!(ImageFormat::detect(b"x"), None);
    }

    #[test]
    fn test_source_format() {
        let req = TransformRequest::new("future", JPEG_HEAD.to_vec());
        assert_eq!(req.source_format(), ImageFormat::Jpeg);
        assert_eq!(req.source_format().extension(), "jpg");

        let req = TransformRequest::new("future", vec![1, 2, 3]);
        assert_eq!(req.source_format().mime_type(), "image/png");
    }

    #[test]
    fn test_params_validation() {
        assert!(TransformParams::default().validate().is_ok());

        let too_strong = TransformParams {
            strength: 1.5,
            ..TransformParams::default()
        };
        assert!(too_strong.validate().is_err());

        let no_guidance = TransformParams {
            guidance_scale: 0.0,
            ..TransformParams::default()
        };
        assert!(no_guidance.validate().is_err());
    }

    #[test]
    fn test_from_encoded_rejects_unknown() {
        let err = GeneratedImage::from_encoded(
            vec![0; 16],
            ImageProviderKind::Stability,
            GenerationMetadata::default(),
        )
        .unwrap_err();
        assert!(matches!(err, UrbanVizError::Decode(ref m) if m.starts_with("stability returned 16 bytes")));
    }

    #[test]
    fn test_save_writes_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let image = GeneratedImage::from_encoded(
            PNG_HEAD.to_vec(),
            ImageProviderKind::OpenAI,
            GenerationMetadata::default(),
        )
        .unwrap();
        let path = dir.path().join("out").join("future.png");
        image.save(&path).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), PNG_HEAD.to_vec());
    }

    #[test]
    fn test_provider_kind_display() {
        assert_eq!(ImageProviderKind::Stability.to_string(), "stability");
        assert_eq!(ImageProviderKind::OpenAI.to_string(), "openai");
    }
}
