//! Source image + prompt → saved future + index record.

use crate::error::Result;
use crate::future::types::{GeneratedArtifact, ImageSource, SourceImage};
use crate::store::{ArtifactIndex, ResultsLayout};
use crate::synthesis::{ImageProvider, TransformParams, TransformRequest};
use chrono::Utc;
use std::path::PathBuf;
use std::time::Instant;

/// What to generate.
#[derive(Debug, Clone)]
pub struct FutureRequest {
    pub source: SourceImage,
    /// Name of the cluster prompt, if one was selected.
    pub prompt_name: Option<String>,
    pub prompt: String,
    pub params: TransformParams,
}

impl FutureRequest {
    pub fn new(source: SourceImage, prompt: impl Into<String>) -> Self {
        Self {
            source,
            prompt_name: None,
            prompt: prompt.into(),
            params: TransformParams::default(),
        }
    }

    pub fn with_prompt_name(mut self, name: impl Into<String>) -> Self {
        self.prompt_name = Some(name.into());
        self
    }

    pub fn with_params(mut self, params: TransformParams) -> Self {
        self.params = params;
        self
    }
}

/// Runs one image-to-image transformation and records it.
///
/// The index entry is appended only after the output image is on disk, so
/// a failed call never leaves a record pointing at a missing file.
pub struct FutureGenerator<P> {
    provider: P,
    layout: ResultsLayout,
}

impl<P: ImageProvider> FutureGenerator<P> {
    pub fn new(provider: P, layout: ResultsLayout) -> Self {
        Self { provider, layout }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub async fn generate(&self, request: FutureRequest) -> Result<GeneratedArtifact> {
        request.params.validate()?;
        let FutureRequest {
            source,
            prompt_name,
            prompt,
            params,
        } = request;

        let source_image = match &source.source {
            ImageSource::Local { path } => path.clone(),
            ImageSource::StreetView(_) => {
                let path = self
                    .layout
                    .streetview_dir()
                    .join(format!("{}.jpg", source.stem));
                crate::store::write_bytes_atomic(&path, &source.data)?;
                path
            }
        };

        tracing::info!(
            provider = self.provider.name(),
            source = %source_image.display(),
            strength = params.strength,
            "generating urban future"
        );
        let started = Instant::now();
        let transform = TransformRequest::new(prompt.clone(), source.data).with_params(params);
        let image = self.provider.transform(&transform).await?;
        let duration_ms = image
            .metadata
            .duration_ms
            .unwrap_or_else(|| started.elapsed().as_millis() as u64);

        let timestamp = Utc::now();
        let ts = timestamp.format("%Y%m%d_%H%M%S").to_string();
        let output_image = self.output_path(&source.stem, &ts, image.format.extension());
        image.save(&output_image)?;

        let id = output_image
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| source.stem.clone());
        let artifact = GeneratedArtifact {
            id,
            created_at: timestamp,
            source: source.source,
            source_image,
            prompt_name,
            prompt,
            params,
            provider: self.provider.kind(),
            model: image
                .metadata
                .model
                .clone()
                .or_else(|| Some(self.provider.model().to_string())),
            output_image,
            duration_ms: Some(duration_ms),
        };

        ArtifactIndex::new(self.layout.metadata_index()).append(&artifact)?;
        tracing::info!(
            output = %artifact.output_image.display(),
            duration_ms,
            "saved urban future"
        );
        Ok(artifact)
    }

    /// `urban_future_<stem>_<ts>.<ext>`, with a counter if that name is taken.
    fn output_path(&self, stem: &str, ts: &str, ext: &str) -> PathBuf {
        let dir = self.layout.future_output_dir(stem);
        let base = format!("urban_future_{stem}_{ts}");
        let mut path = dir.join(format!("{base}.{ext}"));
        let mut n = 1;
        while path.exists() {
            path = dir.join(format!("{base}_{n}.{ext}"));
            n += 1;
        }
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UrbanVizError;
    use crate::streetview::{StreetViewImage, StreetViewLocation};
    use crate::synthesis::{GeneratedImage, GenerationMetadata, ImageProviderKind};
    use async_trait::async_trait;
    use std::sync::Mutex;

    const PNG: [u8; 16] = [
        0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0, 1, 2, 3, 4,
    ];

    struct FakeProvider {
        fail: bool,
        seen: Mutex<Vec<String>>,
    }

    impl FakeProvider {
        fn new(fail: bool) -> Self {
            Self {
                fail,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ImageProvider for FakeProvider {
        async fn transform(&self, request: &TransformRequest) -> Result<GeneratedImage> {
            self.seen.lock().unwrap().push(request.prompt.clone());
            if self.fail {
                return Err(UrbanVizError::ContentBlocked("nope".into()));
            }
            GeneratedImage::from_encoded(
                PNG.to_vec(),
                ImageProviderKind::Stability,
                GenerationMetadata {
                    model: Some("sd3.5-medium".into()),
                    seed: Some(7),
                    duration_ms: Some(42),
                },
            )
        }

        fn kind(&self) -> ImageProviderKind {
            ImageProviderKind::Stability
        }

        fn model(&self) -> &str {
            "sd3.5-medium"
        }
    }

    fn local_source(dir: &std::path::Path) -> SourceImage {
        let path = dir.join("market_st.jpg");
        std::fs::write(&path, [0xFF, 0xD8, 0xFF, 0xE0]).unwrap();
        SourceImage::from_file(path).unwrap()
    }

    #[tokio::test]
    async fn test_generate_records_existing_image() {
        let dir = tempfile::tempdir().unwrap();
        let layout = ResultsLayout::new(dir.path());
        let generator = FutureGenerator::new(FakeProvider::new(false), layout.clone());

        let request = FutureRequest::new(local_source(dir.path()), "solar canopies")
            .with_prompt_name("Solar Punk");
        let artifact = generator.generate(request).await.unwrap();

        assert!(artifact.output_image.is_file());
        assert!(artifact.output_image.starts_with(layout.future_output_dir("market_st")));
        let file_name = artifact
            .output_image
            .file_name()
            .unwrap()
            .to_string_lossy()
            .into_owned();
        assert!(file_name.starts_with("urban_future_market_st_"));
        assert!(file_name.ends_with(".png"));
        assert_eq!(artifact.duration_ms, Some(42));
        assert_eq!(artifact.prompt_name.as_deref(), Some("Solar Punk"));

        let index = ArtifactIndex::new(layout.metadata_index()).load().unwrap();
        assert_eq!(index, vec![artifact.clone()]);
        for record in &index {
            assert!(record.output_image.is_file());
        }
    }

    #[tokio::test]
    async fn test_failure_leaves_no_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let layout = ResultsLayout::new(dir.path());
        let generator = FutureGenerator::new(FakeProvider::new(true), layout.clone());

        let err = generator
            .generate(FutureRequest::new(local_source(dir.path()), "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, UrbanVizError::ContentBlocked(_)));
        assert!(!layout.metadata_index().exists());
        assert!(!layout.future_output_dir("market_st").exists());
        assert_eq!(generator.provider().seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_params_skip_provider() {
        let dir = tempfile::tempdir().unwrap();
        let generator =
            FutureGenerator::new(FakeProvider::new(false), ResultsLayout::new(dir.path()));
        let params = TransformParams {
            strength: 1.5,
            ..TransformParams::default()
        };
        let request = FutureRequest::new(local_source(dir.path()), "x").with_params(params);
        assert!(generator.generate(request).await.is_err());
        assert!(generator.provider().seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_street_view_source_is_saved() {
        let dir = tempfile::tempdir().unwrap();
        let layout = ResultsLayout::new(dir.path());
        let generator = FutureGenerator::new(FakeProvider::new(false), layout.clone());

        let source = SourceImage::from_street_view(StreetViewImage {
            data: vec![0xFF, 0xD8, 0xFF, 0xE0, 9, 9],
            location: StreetViewLocation {
                name: "Sydney, Australia".into(),
                latitude: Some(-33.86882),
                longitude: Some(151.209296),
                heading: 33,
                pitch: 0,
            },
        });
        let artifact = generator
            .generate(FutureRequest::new(source, "harbour greenway"))
            .await
            .unwrap();

        assert!(artifact.source_image.starts_with(layout.streetview_dir()));
        assert_eq!(
            std::fs::read(&artifact.source_image).unwrap(),
            vec![0xFF, 0xD8, 0xFF, 0xE0, 9, 9]
        );
        assert!(matches!(artifact.source, ImageSource::StreetView(ref loc) if loc.heading == 33));
    }

    #[test]
    fn test_output_path_avoids_collisions() {
        let dir = tempfile::tempdir().unwrap();
        let layout = ResultsLayout::new(dir.path());
        let generator = FutureGenerator::new(FakeProvider::new(false), layout.clone());

        let first = generator.output_path("a", "20240101_000000", "png");
        std::fs::create_dir_all(first.parent().unwrap()).unwrap();
        std::fs::write(&first, b"x").unwrap();
        let second = generator.output_path("a", "20240101_000000", "png");
        assert_eq!(
            second.file_name().unwrap(),
            "urban_future_a_20240101_000000_1.png"
        );
    }
}
