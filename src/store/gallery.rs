//! Read-side view over generated futures.

use crate::error::Result;
use crate::future::GeneratedArtifact;
use crate::store::{has_image_extension, ArtifactIndex, ResultsLayout};
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Prompt text shown for images that exist on disk but not in the index.
pub const UNLISTED_PROMPT: &str = "Unknown (image found outside metadata)";

/// One image shown in the gallery.
#[derive(Debug, Clone, Serialize)]
pub struct GalleryEntry {
    /// Generated image on disk.
    pub image: PathBuf,
    /// Prompt used, or [`UNLISTED_PROMPT`].
    pub prompt: String,
    /// Full record when the image is indexed.
    pub artifact: Option<GeneratedArtifact>,
    /// False when the indexed image has since been removed from disk.
    pub exists: bool,
}

impl GalleryEntry {
    /// True if this entry came from the artifact index.
    pub fn is_indexed(&self) -> bool {
        self.artifact.is_some()
    }
}

/// Lists generated futures: indexed records first (newest first), then any
/// images in the results directory the index does not know about.
#[derive(Debug, Clone)]
pub struct Gallery {
    index: ArtifactIndex,
    future_dir: PathBuf,
}

impl Gallery {
    pub fn new(layout: &ResultsLayout) -> Self {
        Self {
            index: ArtifactIndex::new(layout.metadata_index()),
            future_dir: layout.future_dir(),
        }
    }

    pub fn entries(&self) -> Result<Vec<GalleryEntry>> {
        let records = match self.index.load() {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(
                    index = %self.index.path().display(),
                    "artifact index unreadable, listing files only: {e}"
                );
                Vec::new()
            }
        };

        let known: HashSet<PathBuf> = records
            .iter()
            .map(|r| normalize(&r.output_image))
            .collect();

        let mut entries: Vec<GalleryEntry> = records
            .into_iter()
            .rev()
            .map(|artifact| GalleryEntry {
                image: artifact.output_image.clone(),
                prompt: artifact.prompt.clone(),
                exists: artifact.output_image.is_file(),
                artifact: Some(artifact),
            })
            .collect();

        let mut unlisted: Vec<PathBuf> = WalkDir::new(&self.future_dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| has_image_extension(p) && !known.contains(&normalize(p)))
            .collect();
        unlisted.sort();

        entries.extend(unlisted.into_iter().map(|image| GalleryEntry {
            image,
            prompt: UNLISTED_PROMPT.to_string(),
            artifact: None,
            exists: true,
        }));

        Ok(entries)
    }
}

fn normalize(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}
