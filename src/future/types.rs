//! Source images and generated artifacts.

use crate::error::{Result, UrbanVizError};
use crate::streetview::{StreetViewImage, StreetViewLocation};
use crate::synthesis::{ImageProviderKind, TransformParams};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Where a source image came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ImageSource {
    Local { path: PathBuf },
    StreetView(StreetViewLocation),
}

/// Source image bytes plus provenance.
#[derive(Debug, Clone)]
pub struct SourceImage {
    pub data: Vec<u8>,
    pub source: ImageSource,
    /// File stem used to group outputs.
    pub stem: String,
}

impl SourceImage {
    /// Reads a local image file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(UrbanVizError::InvalidRequest(format!(
                "source image {} does not exist",
                path.display()
            )));
        }
        let data = std::fs::read(path)?;
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "source".to_string());
        Ok(Self {
            data,
            source: ImageSource::Local {
                path: path.to_path_buf(),
            },
            stem,
        })
    }

    /// Wraps a freshly fetched Street View image. It is written to disk by
    /// the generator.
    pub fn from_street_view(image: StreetViewImage) -> Self {
        let file_name = image.file_name();
        let stem = Path::new(&file_name)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or(file_name);
        Self {
            data: image.data,
            source: ImageSource::StreetView(image.location),
            stem,
        }
    }
}

/// One generated future, as recorded in the metadata index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedArtifact {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub source: ImageSource,
    /// Source image on disk.
    pub source_image: PathBuf,
    pub prompt_name: Option<String>,
    pub prompt: String,
    pub params: TransformParams,
    pub provider: ImageProviderKind,
    pub model: Option<String>,
    pub output_image: PathBuf,
    pub duration_ms: Option<u64>,
}
