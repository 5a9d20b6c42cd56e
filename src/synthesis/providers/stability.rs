//! Stability AI image-to-image provider (Stable Diffusion 3).

use super::{failure_parts, source_form};
use crate::config::explicit_or_env;
use crate::error::{classify_http_error, Result, UrbanVizError};
use crate::synthesis::provider::ImageProvider;
use crate::synthesis::types::{
    GeneratedImage, GenerationMetadata, ImageFormat, ImageProviderKind, TransformRequest,
};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::{Duration, Instant};

const SD3_URL: &str = "https://api.stability.ai/v2beta/stable-image/generate/sd3";

/// Stable Diffusion 3 model variants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StabilityModel {
    /// SD 3.5 Large.
    Sd35Large,
    /// SD 3.5 Large Turbo.
    Sd35LargeTurbo,
    /// SD 3.5 Medium.
    #[default]
    Sd35Medium,
}

impl StabilityModel {
    /// Returns the API model identifier string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sd35Large => "sd3.5-large",
            Self::Sd35LargeTurbo => "sd3.5-large-turbo",
            Self::Sd35Medium => "sd3.5-medium",
        }
    }
}

/// Builder for StabilityProvider.
#[derive(Debug, Clone)]
pub struct StabilityProviderBuilder {
    api_key: Option<String>,
    model: StabilityModel,
    timeout: Duration,
}

impl Default for StabilityProviderBuilder {
    fn default() -> Self {
        Self {
            api_key: None,
            model: StabilityModel::default(),
            timeout: crate::config::DEFAULT_HTTP_TIMEOUT,
        }
    }
}

impl StabilityProviderBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the API key. Falls back to `STABILITY_API_KEY` env var.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the model variant.
    pub fn model(mut self, model: StabilityModel) -> Self {
        self.model = model;
        self
    }

    /// Sets the HTTP timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Builds the provider, resolving the API key.
    pub fn build(self) -> Result<StabilityProvider> {
        let api_key = explicit_or_env(self.api_key, "STABILITY_API_KEY")?;

        if !api_key.starts_with("sk-") {
            tracing::warn!("Stability API key does not have the expected sk- prefix");
        }

        Ok(StabilityProvider {
            client: reqwest::Client::builder().timeout(self.timeout).build()?,
            api_key,
            model: self.model,
        })
    }
}

/// Stability AI image-to-image provider.
pub struct StabilityProvider {
    client: reqwest::Client,
    api_key: String,
    model: StabilityModel,
}

impl StabilityProvider {
    /// Creates a new `StabilityProviderBuilder`.
    pub fn builder() -> StabilityProviderBuilder {
        StabilityProviderBuilder::new()
    }

    /// Text fields of the multipart form, in submission order.
    fn form_fields(&self, request: &TransformRequest) -> Vec<(&'static str, String)> {
        let output_format = match request.output {
            ImageFormat::Jpeg => "jpeg",
            ImageFormat::WebP => "webp",
            ImageFormat::Png => "png",
        };
        vec![
            ("mode", "image-to-image".to_string()),
            ("prompt", request.prompt.clone()),
            ("strength", request.params.strength.to_string()),
            ("model", self.model.as_str().to_string()),
            ("cfg_scale", request.params.guidance_scale.to_string()),
            ("seed", request.params.seed.to_string()),
            ("output_format", output_format.to_string()),
        ]
    }

    fn parse_error(
        &self,
        status: u16,
        text: &str,
        headers: &reqwest::header::HeaderMap,
    ) -> UrbanVizError {
        let detail = serde_json::from_str::<StabilityError>(text)
            .ok()
            .and_then(|e| e.detail())
            .unwrap_or_else(|| text.to_string());
        classify_http_error(status, &detail, headers)
    }
}

#[async_trait]
impl ImageProvider for StabilityProvider {
    async fn transform(&self, request: &TransformRequest) -> Result<GeneratedImage> {
        request.params.validate()?;
        if request.prompt.trim().is_empty() {
            return Err(UrbanVizError::InvalidRequest("prompt is empty".into()));
        }

        let start = Instant::now();

        let form = source_form(self.form_fields(request), request, "source")?;

        tracing::debug!(
            model = self.model.as_str(),
            strength = request.params.strength,
            cfg_scale = request.params.guidance_scale,
            "submitting image-to-image request"
        );

        let response = self
            .client
            .post(SD3_URL)
            .bearer_auth(&self.api_key)
            .header(reqwest::header::ACCEPT, "image/*")
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            let (status, headers, body) = failure_parts(response).await;
            return Err(self.parse_error(status, &body, &headers));
        }

        let finish_reason = response
            .headers()
            .get("finish-reason")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        if finish_reason.as_deref() == Some("CONTENT_FILTERED") {
            return Err(UrbanVizError::ContentBlocked(
                "Stability content filter rejected the output".into(),
            ));
        }
        let seed = response
            .headers()
            .get("seed")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());

        let data = response.bytes().await?.to_vec();
        if data.is_empty() {
            return Err(UrbanVizError::UnexpectedResponse(
                "Stability response contained no image data".into(),
            ));
        }

        GeneratedImage::from_encoded(
            data,
            ImageProviderKind::Stability,
            GenerationMetadata {
                model: Some(self.model.as_str().to_string()),
                seed,
                duration_ms: Some(start.elapsed().as_millis() as u64),
            },
        )
    }

    fn kind(&self) -> ImageProviderKind {
        ImageProviderKind::Stability
    }

    fn model(&self) -> &str {
        self.model.as_str()
    }
}

#[derive(Debug, Deserialize)]
struct StabilityError {
    #[serde(default)]
    errors: Vec<String>,
    #[serde(default)]
    message: Option<String>,
}

impl StabilityError {
    fn detail(self) -> Option<String> {
        if !self.errors.is_empty() {
            Some(self.errors.join("; "))
        } else {
            self.message
        }
    }
}
