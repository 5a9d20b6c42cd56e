//! Image analysis module.

mod analyzer;
pub mod prepare;
mod provider;
pub mod providers;
mod types;

pub use analyzer::{load_records, AnalysisReport, AnalyzeOptions, ImageAnalyzer, ANALYSIS_PROMPT};
pub use prepare::ResizeOptions;
pub use provider::VisionProvider;
pub use types::{AnalysisRequest, AnalysisStatus, ImageRecord, StyleAnalysis, StyleField};
