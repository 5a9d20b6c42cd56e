//! Batch image analysis.

use crate::error::{Result, UrbanVizError};
use crate::store::{read_json, write_json_atomic, ResultsLayout};
use crate::vision::prepare::{encode_jpeg, find_images, prepare_image, save_processed, ResizeOptions};
use crate::vision::provider::VisionProvider;
use crate::vision::types::{AnalysisRequest, ImageRecord};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Instruction sent with every image.
pub const ANALYSIS_PROMPT: &str = "You are an expert at image analysis related to urban design and \
architecture. You are given an image of an urban scene and you need to provide insights on the \
architectural style, color palette, futuristic elements, archetypes, and a short descriptive label \
for clustering. The insights should be converted into the given structure.";

/// Options for a batch analysis run.
#[derive(Debug, Clone)]
pub struct AnalyzeOptions {
    pub input_dir: PathBuf,
    pub recursive: bool,
    pub resize: ResizeOptions,
    pub prompt: String,
    /// Pause between images to stay under provider rate limits.
    pub pause: Duration,
}

impl AnalyzeOptions {
    pub fn new(input_dir: impl Into<PathBuf>) -> Self {
        Self {
            input_dir: input_dir.into(),
            recursive: true,
            resize: ResizeOptions::default(),
            prompt: ANALYSIS_PROMPT.to_string(),
            pause: Duration::from_secs(1),
        }
    }
}

/// Summary of a batch run.
#[derive(Debug, Clone)]
pub struct AnalysisReport {
    pub records: Vec<ImageRecord>,
    pub output: PathBuf,
}

impl AnalysisReport {
    pub fn analyzed(&self) -> usize {
        self.records.iter().filter(|r| r.is_analyzed()).count()
    }

    pub fn failed(&self) -> usize {
        self.records.len() - self.analyzed()
    }
}

/// Runs every image in a directory through a [`VisionProvider`].
///
/// Failures are isolated per image: a bad file or a failed API call becomes
/// a `Failed` record and the batch continues. The results file is rewritten
/// after each image so an interrupted run keeps what it already paid for.
pub struct ImageAnalyzer<P> {
    provider: P,
    layout: ResultsLayout,
}

impl<P: VisionProvider> ImageAnalyzer<P> {
    pub fn new(provider: P, layout: ResultsLayout) -> Self {
        Self { provider, layout }
    }

    pub async fn run(&self, options: &AnalyzeOptions) -> Result<AnalysisReport> {
        let images = find_images(&options.input_dir, options.recursive)?;
        let output = self.layout.analysis_results();
        tracing::info!(count = images.len(), dir = %options.input_dir.display(), "found images");

        let mut records = Vec::with_capacity(images.len());
        for (i, path) in images.iter().enumerate() {
            tracing::info!("processing image {}/{}: {}", i + 1, images.len(), path.display());

            let record = self.analyze_one(path, options).await;
            if let crate::vision::AnalysisStatus::Failed { reason } = &record.status {
                tracing::warn!(image = %path.display(), "analysis failed: {reason}");
            }
            records.push(record);
            write_json_atomic(&output, &records)?;

            if i + 1 < images.len() && !options.pause.is_zero() {
                tokio::time::sleep(options.pause).await;
            }
        }

        let report = AnalysisReport { records, output };
        tracing::info!(
            analyzed = report.analyzed(),
            failed = report.failed(),
            output = %report.output.display(),
            "analysis complete"
        );
        Ok(report)
    }

    /// Analyzes a single image. Never fails; errors become a `Failed` record.
    pub async fn analyze_one(&self, path: &Path, options: &AnalyzeOptions) -> ImageRecord {
        let relative = path
            .strip_prefix(&options.input_dir)
            .unwrap_or(path)
            .to_path_buf();
        let id = relative.to_string_lossy().replace('\\', "/");

        let (jpeg, processed_path) = match self.prepare(path, &relative, options.resize) {
            Ok(prepared) => prepared,
            Err(e) => return ImageRecord::failed(id, path.to_path_buf(), None, e.to_string()),
        };

        let request = AnalysisRequest::jpeg(jpeg, options.prompt.clone());
        match self.provider.analyze(&request).await {
            Ok(text) => {
                ImageRecord::from_output(id, path.to_path_buf(), Some(processed_path), text)
            }
            Err(e) => ImageRecord::failed(
                id,
                path.to_path_buf(),
                Some(processed_path),
                e.to_string(),
            ),
        }
    }

    fn prepare(
        &self,
        path: &Path,
        relative: &Path,
        resize: ResizeOptions,
    ) -> Result<(Vec<u8>, PathBuf)> {
        let img = image::open(path)?;
        let rgb = prepare_image(&img, resize);
        let jpeg = encode_jpeg(&rgb)?;
        let processed = save_processed(
            &self.layout.processed_images_dir(),
            &relative.with_extension("jpg"),
            &jpeg,
        )?;
        Ok((jpeg, processed))
    }
}

/// Loads the analysis records written by [`ImageAnalyzer::run`].
pub fn load_records(path: &Path) -> Result<Vec<ImageRecord>> {
    read_json(path)?.ok_or_else(|| {
        UrbanVizError::InvalidRequest(format!(
            "no analysis results at {}; run the analysis step first",
            path.display()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vision::AnalysisStatus;
    use async_trait::async_trait;
    use image::{Rgb, RgbImage};
    use std::sync::atomic::{AtomicUsize, Ordering};

    const ANSWER: &str = r#"{"architectural_style":"Art Deco","color_palette":"gold",
        "futuristic_elements":"none","dominant_materials":"stone","mood":"glamorous",
        "short_descriptive_label":"deco facade"}"#;

    /// Fails on every second call.
    struct FlakyVision {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl VisionProvider for FlakyVision {
        async fn analyze(&self, request: &AnalysisRequest) -> Result<String> {
            assert_eq!(request.mime_type, "image/jpeg");
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n % 2 == 1 {
                Err(UrbanVizError::Api {
                    status: 500,
                    message: "boom".into(),
                })
            } else {
                Ok(ANSWER.to_string())
            }
        }

        fn name(&self) -> &str {
            "flaky"
        }
    }

    fn write_png(path: &Path) {
        RgbImage::from_pixel(16, 16, Rgb([10, 20, 30]))
            .save(path)
            .unwrap();
    }

    #[tokio::test]
    async fn test_batch_isolates_failures() {
        let input = tempfile::tempdir().unwrap();
        let root = tempfile::tempdir().unwrap();
        write_png(&input.path().join("a.png"));
        write_png(&input.path().join("b.png"));
        write_png(&input.path().join("c.png"));
        std::fs::write(input.path().join("d.jpg"), b"not an image").unwrap();

        let layout = ResultsLayout::new(root.path());
        let analyzer = ImageAnalyzer::new(
            FlakyVision {
                calls: AtomicUsize::new(0),
            },
            layout.clone(),
        );
        let mut options = AnalyzeOptions::new(input.path());
        options.pause = Duration::ZERO;

        let report = analyzer.run(&options).await.unwrap();
        assert_eq!(report.records.len(), 4);
        assert_eq!(report.analyzed(), 2);
        assert_eq!(report.failed(), 2);

        assert!(report.records[0].is_analyzed());
        assert!(matches!(
            report.records[1].status,
            AnalysisStatus::Failed { .. }
        ));
        // Unreadable file fails before any API call.
        assert_eq!(report.records[3].id, "d.jpg");
        assert!(report.records[3].processed_path.is_none());

        let saved = load_records(&layout.analysis_results()).unwrap();
        assert_eq!(saved.len(), 4);
        assert!(layout.processed_images_dir().join("a.jpg").is_file());
    }

    #[test]
    fn test_load_records_missing() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_records(&dir.path().join("none.json")).unwrap_err();
        assert!(matches!(err, UrbanVizError::InvalidRequest(_)));
    }
}
