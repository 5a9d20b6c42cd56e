//! Flat file results store.
//!
//! Everything the pipeline produces lives under one root directory in a
//! fixed layout. JSON files are replaced atomically (write to a sibling
//! temp file, then rename) so a reader never sees a half-written index.

mod gallery;
mod index;

pub use gallery::{Gallery, GalleryEntry, UNLISTED_PROMPT};
pub use index::ArtifactIndex;

use crate::error::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// File extensions recognised as images when scanning directories.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "tiff", "webp"];

/// Directory layout of the results store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultsLayout {
    root: PathBuf,
}

impl ResultsLayout {
    /// Creates a layout rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn analysis_dir(&self) -> PathBuf {
        self.root.join("results").join("analysis_results")
    }

    /// Per-image analysis records.
    pub fn analysis_results(&self) -> PathBuf {
        self.analysis_dir().join("analysis_results.json")
    }

    /// Resized copies of the analyzed images.
    pub fn processed_images_dir(&self) -> PathBuf {
        self.root.join("processed_images")
    }

    pub fn cluster_dir(&self) -> PathBuf {
        self.root.join("results").join("cluster_results")
    }

    /// Per-cluster summaries of the latest clustering run.
    pub fn cluster_results(&self) -> PathBuf {
        self.cluster_dir().join("cluster_analysis_results.json")
    }

    pub fn prompt_dir(&self) -> PathBuf {
        self.root.join("results").join("prompt_results")
    }

    /// One prompt per cluster.
    pub fn cluster_prompts(&self) -> PathBuf {
        self.prompt_dir().join("cluster_prompts.json")
    }

    /// Street View source images.
    pub fn streetview_dir(&self) -> PathBuf {
        self.root.join("streetview_images")
    }

    /// Generated futures, one subdirectory per source image.
    pub fn future_dir(&self) -> PathBuf {
        self.root.join("results").join("urban_future")
    }

    /// Output directory for futures derived from the source with this stem.
    pub fn future_output_dir(&self, source_stem: &str) -> PathBuf {
        self.future_dir().join(source_stem)
    }

    /// Append-only artifact index.
    pub fn metadata_index(&self) -> PathBuf {
        self.future_dir().join("urban_future_metadata.json")
    }

    /// Creates every directory of the layout.
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [
            self.analysis_dir(),
            self.processed_images_dir(),
            self.cluster_dir(),
            self.prompt_dir(),
            self.streetview_dir(),
            self.future_dir(),
        ] {
            fs::create_dir_all(&dir)?;
        }
        Ok(())
    }
}

/// Returns true if the path has one of [`IMAGE_EXTENSIONS`].
pub fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Writes bytes to `path` by way of a temp file in the same directory.
pub fn write_bytes_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
    if let Some(dir) = dir {
        fs::create_dir_all(dir)?;
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{file_name}.tmp-{}", std::process::id()));

    let written = (|| -> std::io::Result<()> {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(data)?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    })();

    if let Err(e) = written {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

/// Serializes `value` as pretty JSON and writes it atomically.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_vec_pretty(value)?;
    write_bytes_atomic(path, &json)
}

/// Reads JSON from `path`. A missing or blank file yields `None`.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if text.trim().is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(&text)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_layout_paths() {
        let layout = ResultsLayout::new("/data");
        assert_eq!(
            layout.analysis_results(),
            PathBuf::from("/data/results/analysis_results/analysis_results.json")
        );
        assert_eq!(
            layout.cluster_prompts(),
            PathBuf::from("/data/results/prompt_results/cluster_prompts.json")
        );
        assert_eq!(
            layout.future_output_dir("street_1"),
            PathBuf::from("/data/results/urban_future/street_1")
        );
    }

    #[test]
    fn test_ensure_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let layout = ResultsLayout::new(dir.path());
        layout.ensure_dirs().unwrap();
        assert!(layout.streetview_dir().is_dir());
        assert!(layout.future_dir().is_dir());
    }

    #[test]
    fn test_json_roundtrip_and_no_temp_left() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("data.json");
        let mut value = BTreeMap::new();
        value.insert("cluster_0".to_string(), 6u32);

        write_json_atomic(&path, &value).unwrap();
        let back: BTreeMap<String, u32> = read_json(&path).unwrap().unwrap();
        assert_eq!(back, value);

        let leftovers: Vec<_> = fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".tmp-"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_read_json_missing_and_blank() {
        let dir = tempfile::tempdir().unwrap();
        let missing: Option<Vec<u32>> = read_json(&dir.path().join("nope.json")).unwrap();
        assert!(missing.is_none());

        let blank = dir.path().join("blank.json");
        fs::write(&blank, "  \n").unwrap();
        let blank: Option<Vec<u32>> = read_json(&blank).unwrap();
        assert!(blank.is_none());
    }

    #[test]
    fn test_has_image_extension() {
        assert!(has_image_extension(Path::new("a/b.JPG")));
        assert!(has_image_extension(Path::new("b.webp")));
        assert!(!has_image_extension(Path::new("notes.json")));
        assert!(!has_image_extension(Path::new("noext")));
    }
}
