//! Core types for image analysis.

use crate::error::{Result, UrbanVizError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Structured answer the vision model must return for each image.
///
/// This is the schema boundary: analysis text that does not parse into this
/// shape never reaches the feature builder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StyleAnalysis {
    pub architectural_style: String,
    pub color_palette: String,
    pub futuristic_elements: String,
    pub dominant_materials: String,
    pub mood: String,
    pub short_descriptive_label: String,
}

impl StyleAnalysis {
    /// Parses and validates raw analysis text.
    pub fn parse(text: &str) -> Result<Self> {
        serde_json::from_str(text.trim()).map_err(|e| {
            UrbanVizError::UnexpectedResponse(format!("analysis does not match schema: {e}"))
        })
    }

    /// Returns the text of one field.
    pub fn field(&self, field: StyleField) -> &str {
        match field {
            StyleField::ArchitecturalStyle => &self.architectural_style,
            StyleField::ColorPalette => &self.color_palette,
            StyleField::FuturisticElements => &self.futuristic_elements,
            StyleField::DominantMaterials => &self.dominant_materials,
            StyleField::Mood => &self.mood,
            StyleField::ShortDescriptiveLabel => &self.short_descriptive_label,
        }
    }
}

/// Named fields of [`StyleAnalysis`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StyleField {
    ArchitecturalStyle,
    ColorPalette,
    FuturisticElements,
    DominantMaterials,
    Mood,
    ShortDescriptiveLabel,
}

impl StyleField {
    /// Every field, in schema order.
    pub const ALL: [StyleField; 6] = [
        Self::ArchitecturalStyle,
        Self::ColorPalette,
        Self::FuturisticElements,
        Self::DominantMaterials,
        Self::Mood,
        Self::ShortDescriptiveLabel,
    ];

    /// JSON property name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ArchitecturalStyle => "architectural_style",
            Self::ColorPalette => "color_palette",
            Self::FuturisticElements => "futuristic_elements",
            Self::DominantMaterials => "dominant_materials",
            Self::Mood => "mood",
            Self::ShortDescriptiveLabel => "short_descriptive_label",
        }
    }

    /// Description sent to the model in the JSON schema.
    pub fn description(&self) -> &'static str {
        match self {
            Self::ArchitecturalStyle => "The architectural style of the image",
            Self::ColorPalette => "The color palette of the image",
            Self::FuturisticElements => "The futuristic elements of the image",
            Self::DominantMaterials => "The dominant materials of the architecture in the image",
            Self::Mood => "The overall mood or tone of the image",
            Self::ShortDescriptiveLabel => "A short descriptive label for clustering",
        }
    }
}

impl std::fmt::Display for StyleField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of analyzing one image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AnalysisStatus {
    Analyzed,
    Failed { reason: String },
}

/// Per-image analysis record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageRecord {
    /// Stable identifier, the image path relative to the input directory.
    pub id: String,
    pub original_path: PathBuf,
    /// Resized copy that was sent to the model.
    pub processed_path: Option<PathBuf>,
    /// Raw model output (or the error text on failure).
    pub analysis: String,
    /// Parsed fields, present only when `analysis` matched the schema.
    pub style: Option<StyleAnalysis>,
    pub status: AnalysisStatus,
    pub timestamp: DateTime<Utc>,
}

impl ImageRecord {
    /// Builds a record from raw model output, validating it against the schema.
    ///
    /// Output that fails validation yields a `Failed` record that keeps the
    /// raw text for inspection.
    pub fn from_output(
        id: impl Into<String>,
        original_path: PathBuf,
        processed_path: Option<PathBuf>,
        analysis: String,
    ) -> Self {
        let (style, status) = match StyleAnalysis::parse(&analysis) {
            Ok(style) => (Some(style), AnalysisStatus::Analyzed),
            Err(e) => (
                None,
                AnalysisStatus::Failed {
                    reason: e.to_string(),
                },
            ),
        };
        Self {
            id: id.into(),
            original_path,
            processed_path,
            analysis,
            style,
            status,
            timestamp: Utc::now(),
        }
    }

    /// Builds a failed record.
    pub fn failed(
        id: impl Into<String>,
        original_path: PathBuf,
        processed_path: Option<PathBuf>,
        reason: impl Into<String>,
    ) -> Self {
        let reason = reason.into();
        Self {
            id: id.into(),
            original_path,
            processed_path,
            analysis: reason.clone(),
            style: None,
            status: AnalysisStatus::Failed { reason },
            timestamp: Utc::now(),
        }
    }

    pub fn is_analyzed(&self) -> bool {
        matches!(self.status, AnalysisStatus::Analyzed) && self.style.is_some()
    }
}

/// A request to analyze one image.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    /// Encoded image bytes.
    pub image: Vec<u8>,
    /// MIME type of `image`.
    pub mime_type: String,
    /// Instruction text sent with the image.
    pub prompt: String,
}

impl AnalysisRequest {
    /// Creates a request for a JPEG image.
    pub fn jpeg(image: Vec<u8>, prompt: impl Into<String>) -> Self {
        Self {
            image,
            mime_type: "image/jpeg".into(),
            prompt: prompt.into(),
        }
    }

    /// Returns the image as a data URL.
    pub fn to_data_url(&self) -> String {
        use base64::Engine;
        format!(
            "data:{};base64,{}",
            self.mime_type,
            base64::engine::general_purpose::STANDARD.encode(&self.image)
        )
    }
}
