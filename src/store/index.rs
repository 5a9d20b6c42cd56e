//! Append-only index of generated artifacts.

use crate::error::{Result, UrbanVizError};
use crate::future::GeneratedArtifact;
use crate::store::{read_json, write_json_atomic};
use std::path::{Path, PathBuf};

/// JSON array of [`GeneratedArtifact`] records.
///
/// Records are only ever appended. An artifact is refused unless its output
/// image already exists, so the index never points at a missing file at the
/// time of writing.
#[derive(Debug, Clone)]
pub struct ArtifactIndex {
    path: PathBuf,
}

impl ArtifactIndex {
    /// Opens the index stored at `path`. The file is created on first append.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the index file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads every record. A missing or blank file is an empty index.
    pub fn load(&self) -> Result<Vec<GeneratedArtifact>> {
        Ok(read_json(&self.path)?.unwrap_or_default())
    }

    /// Appends one record and rewrites the index atomically.
    pub fn append(&self, artifact: &GeneratedArtifact) -> Result<()> {
        if !artifact.output_image.is_file() {
            return Err(UrbanVizError::InvalidRequest(format!(
                "refusing to index artifact {}: output image {} does not exist",
                artifact.id,
                artifact.output_image.display()
            )));
        }

        let mut records = self.load()?;
        records.push(artifact.clone());
        write_json_atomic(&self.path, &records)?;

        tracing::debug!(
            id = %artifact.id,
            total = records.len(),
            index = %self.path.display(),
            "indexed artifact"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::future::ImageSource;
    use crate::synthesis::{ImageProviderKind, TransformParams};
    use chrono::Utc;

    fn artifact(output: PathBuf) -> GeneratedArtifact {
        GeneratedArtifact {
            id: "street_1".into(),
            created_at: Utc::now(),
            source: ImageSource::Local {
                path: PathBuf::from("street.jpg"),
            },
            source_image: PathBuf::from("street.jpg"),
            prompt_name: Some("cluster_0".into()),
            prompt: "solarpunk boulevard".into(),
            params: TransformParams::default(),
            provider: ImageProviderKind::Stability,
            model: Some("sd3.5-medium".into()),
            output_image: output,
            duration_ms: Some(1200),
        }
    }

    #[test]
    fn test_append_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("out.png");
        std::fs::write(&image, b"png").unwrap();

        let index = ArtifactIndex::new(dir.path().join("index.json"));
        assert!(index.load().unwrap().is_empty());

        index.append(&artifact(image.clone())).unwrap();
        index.append(&artifact(image)).unwrap();

        let records = index.load().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].prompt, "solarpunk boulevard");
    }

    #[test]
    fn test_append_refuses_missing_image() {
        let dir = tempfile::tempdir().unwrap();
        let index = ArtifactIndex::new(dir.path().join("index.json"));

        let err = index
            .append(&artifact(dir.path().join("missing.png")))
            .unwrap_err();
        assert!(matches!(err, UrbanVizError::InvalidRequest(_)));
        assert!(!index.path().exists());
    }

    #[test]
    fn test_corrupt_index_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.json");
        std::fs::write(&path, "{not json").unwrap();

        let index = ArtifactIndex::new(&path);
        assert!(matches!(index.load(), Err(UrbanVizError::Json(_))));
    }
}
