//! Runtime configuration.
//!
//! Credentials and paths are read once, up front, and then handed to each
//! component explicitly. Nothing in the crate reads the environment behind
//! the caller's back except the provider builders' documented fallbacks.

use crate::error::{Result, UrbanVizError};
use crate::store::ResultsLayout;
use std::path::PathBuf;
use std::time::Duration;

/// Default HTTP timeout for every outbound request.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(120);

/// Default model for image analysis and prompt writing.
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";

/// Configuration shared by the pipeline stages.
#[derive(Debug, Clone)]
pub struct Config {
    /// OpenAI key (vision analysis, prompt writing, image edits).
    pub openai_api_key: Option<String>,
    /// Stability AI key (image-to-image synthesis).
    pub stability_api_key: Option<String>,
    /// Google Maps key (Street View Static API).
    pub google_maps_api_key: Option<String>,
    /// Root directory under which all results are stored.
    pub root: PathBuf,
    /// Timeout applied to each HTTP client.
    pub http_timeout: Duration,
    /// Model used for image analysis.
    pub vision_model: String,
    /// Model used for cluster prompt writing.
    pub prompt_model: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            stability_api_key: None,
            google_maps_api_key: None,
            root: PathBuf::from("."),
            http_timeout: DEFAULT_HTTP_TIMEOUT,
            vision_model: DEFAULT_OPENAI_MODEL.to_string(),
            prompt_model: DEFAULT_OPENAI_MODEL.to_string(),
        }
    }
}

impl Config {
    /// Loads `.env` (if present) and reads configuration from the environment.
    pub fn from_env() -> Result<Self> {
        match dotenvy::dotenv() {
            Ok(path) => tracing::debug!(path = %path.display(), "loaded .env"),
            Err(e) if e.not_found() => {}
            Err(e) => {
                return Err(UrbanVizError::InvalidRequest(format!(
                    "failed to read .env: {e}"
                )))
            }
        }

        let mut config = Self {
            openai_api_key: non_empty_var("OPENAI_API_KEY"),
            stability_api_key: non_empty_var("STABILITY_API_KEY"),
            google_maps_api_key: non_empty_var("GOOGLE_MAPS_API_KEY"),
            ..Self::default()
        };

        if let Some(root) = non_empty_var("URBANVIZ_ROOT") {
            config.root = PathBuf::from(root);
        }
        if let Some(secs) = non_empty_var("URBANVIZ_HTTP_TIMEOUT_SECS") {
            let secs = secs.parse::<u64>().map_err(|_| {
                UrbanVizError::InvalidRequest(format!(
                    "URBANVIZ_HTTP_TIMEOUT_SECS must be a whole number of seconds, got {secs:?}"
                ))
            })?;
            config.http_timeout = Duration::from_secs(secs);
        }
        if let Some(model) = non_empty_var("URBANVIZ_VISION_MODEL") {
            config.vision_model = model;
        }
        if let Some(model) = non_empty_var("URBANVIZ_PROMPT_MODEL") {
            config.prompt_model = model;
        }

        Ok(config)
    }

    /// Overrides the results root.
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    /// Returns the on-disk layout rooted at [`Config::root`].
    pub fn layout(&self) -> ResultsLayout {
        ResultsLayout::new(&self.root)
    }

    /// Returns the OpenAI key or an `Auth` error naming the variable.
    pub fn require_openai_key(&self) -> Result<&str> {
        require(self.openai_api_key.as_deref(), "OPENAI_API_KEY")
    }

    /// Returns the Stability key or an `Auth` error naming the variable.
    pub fn require_stability_key(&self) -> Result<&str> {
        require(self.stability_api_key.as_deref(), "STABILITY_API_KEY")
    }

    /// Returns the Google Maps key or an `Auth` error naming the variable.
    pub fn require_google_maps_key(&self) -> Result<&str> {
        require(self.google_maps_api_key.as_deref(), "GOOGLE_MAPS_API_KEY")
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Picks an explicitly supplied key, else the environment variable `var`.
/// A blank key is an error, even when it was given explicitly.
pub(crate) fn explicit_or_env(explicit: Option<String>, var: &str) -> Result<String> {
    explicit
        .or_else(|| std::env::var(var).ok())
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| UrbanVizError::Auth(format!("{var} not set and no API key provided")))
}

fn require<'a>(value: Option<&'a str>, name: &str) -> Result<&'a str> {
    value.ok_or_else(|| UrbanVizError::Auth(format!("{name} not set")))
}
