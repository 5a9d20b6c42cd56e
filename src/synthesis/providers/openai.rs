//! OpenAI image edits (`/v1/images/edits`).

use super::{failure_parts, source_form};
use crate::error::{classify_http_error, Result, UrbanVizError};
use crate::openai::resolve_api_key;
use crate::synthesis::provider::ImageProvider;
use crate::synthesis::types::{
    GeneratedImage, GenerationMetadata, ImageProviderKind, TransformRequest,
};
use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use std::time::{Duration, Instant};

const EDITS_URL: &str = "https://api.openai.com/v1/images/edits";
const DEFAULT_MODEL: &str = "gpt-image-1";

/// Builder for OpenAiImageProvider.
#[derive(Debug, Clone)]
pub struct OpenAiImageProviderBuilder {
    api_key: Option<String>,
    model: String,
    quality: Option<String>,
    timeout: Duration,
}

impl Default for OpenAiImageProviderBuilder {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            quality: None,
            timeout: crate::config::DEFAULT_HTTP_TIMEOUT,
        }
    }
}

impl OpenAiImageProviderBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the API key. Falls back to `OPENAI_API_KEY` env var.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the image model (default: `gpt-image-1`).
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sets the quality: "low", "medium" or "high". The service picks when unset.
    pub fn quality(mut self, quality: impl Into<String>) -> Self {
        self.quality = Some(quality.into());
        self
    }

    /// Sets the HTTP timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Builds the provider, resolving the API key.
    pub fn build(self) -> Result<OpenAiImageProvider> {
        Ok(OpenAiImageProvider {
            api_key: resolve_api_key(self.api_key)?,
            client: reqwest::Client::builder().timeout(self.timeout).build()?,
            model: self.model,
            quality: self.quality,
        })
    }
}

/// Urban futures through OpenAI image edits.
///
/// Edits take only a prompt and an image. Strength and guidance are kept in
/// the artifact record but never sent.
pub struct OpenAiImageProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    quality: Option<String>,
}

impl OpenAiImageProvider {
    /// Creates a new `OpenAiImageProviderBuilder`.
    pub fn builder() -> OpenAiImageProviderBuilder {
        OpenAiImageProviderBuilder::new()
    }

    fn form_fields(&self, request: &TransformRequest) -> Vec<(&'static str, String)> {
        let quality = self.quality.iter().map(|q| ("quality", q.clone()));
        [
            ("model", self.model.clone()),
            ("prompt", request.prompt.clone()),
            ("n", "1".to_string()),
        ]
        .into_iter()
        .chain(quality)
        .collect()
    }

    /// Image bytes from an edit result, inline or behind a URL.
    async fn fetch_payload(&self, image: EditImage) -> Result<Vec<u8>> {
        match image {
            EditImage {
                b64_json: Some(b64),
                ..
            } => base64::engine::general_purpose::STANDARD
                .decode(b64.trim())
                .map_err(|e| UrbanVizError::Decode(e.to_string())),
            EditImage { url: Some(url), .. } => {
                tracing::debug!(%url, "downloading edited image");
                let response = self.client.get(&url).send().await?;
                if !response.status().is_success() {
                    return Err(UrbanVizError::Api {
                        status: response.status().as_u16(),
                        message: "edited image URL could not be downloaded".into(),
                    });
                }
                Ok(response.bytes().await?.to_vec())
            }
            _ => Err(UrbanVizError::UnexpectedResponse(
                "edit result carried neither b64_json nor url".into(),
            )),
        }
    }
}

#[async_trait]
impl ImageProvider for OpenAiImageProvider {
    async fn transform(&self, request: &TransformRequest) -> Result<GeneratedImage> {
        tracing::debug!(
            model = %self.model,
            strength = request.params.strength,
            cfg_scale = request.params.guidance_scale,
            "image edits ignore strength and guidance scale"
        );
        let started = Instant::now();
        let form = source_form(self.form_fields(request), request, "image")?;

        let response = self
            .client
            .post(EDITS_URL)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;
        if !response.status().is_success() {
            let (status, headers, body) = failure_parts(response).await;
            return Err(classify_http_error(status, &body, &headers));
        }

        let edit: EditResponse = response.json().await?;
        let image = edit.data.into_iter().next().ok_or_else(|| {
            UrbanVizError::UnexpectedResponse("edit response held no images".into())
        })?;
        let data = self.fetch_payload(image).await?;

        GeneratedImage::from_encoded(
            data,
            ImageProviderKind::OpenAI,
            GenerationMetadata {
                model: Some(self.model.clone()),
                seed: None,
                duration_ms: Some(started.elapsed().as_millis() as u64),
            },
        )
    }

    fn kind(&self) -> ImageProviderKind {
        ImageProviderKind::OpenAI
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[derive(Debug, Deserialize)]
struct EditResponse {
    #[serde(default)]
    data: Vec<EditImage>,
}

#[derive(Debug, Default, Deserialize)]
struct EditImage {
    #[serde(default)]
    b64_json: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> OpenAiImageProvider {
        OpenAiImageProvider::builder()
            .api_key("sk-test")
            .build()
            .unwrap()
    }

    #[test]
    fn test_builder_defaults() {
        let provider = provider();
        assert_eq!(provider.model(), "gpt-image-1");
        assert_eq!(provider.kind(), ImageProviderKind::OpenAI);
    }

    #[test]
    fn test_form_fields_skip_strength() {
        let provider = OpenAiImageProvider::builder()
            .api_key("sk-test")
            .quality("high")
            .build()
            .unwrap();
        let request = TransformRequest::new("vertical gardens", vec![0; 4]);
        let fields = provider.form_fields(&request);
        assert_eq!(fields[0], ("model", "gpt-image-1".to_string()));
        assert_eq!(fields.last(), Some(&("quality", "high".to_string())));
        assert!(fields.contains(&("prompt", "vertical gardens".to_string())));
        assert!(!fields.iter().any(|(n, _)| *n == "strength"));
    }

    #[test]
    fn test_form_fields_without_quality() {
        let request = TransformRequest::new("x", vec![]);
        assert_eq!(provider().form_fields(&request).len(), 3);
    }

    #[tokio::test]
    async fn test_inline_payload_decodes() {
        let image = EditImage {
            b64_json: Some("AQID\n".into()),
            url: None,
        };
        assert_eq!(provider().fetch_payload(image).await.unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_empty_payload_is_unexpected() {
        let err = provider()
            .fetch_payload(EditImage::default())
            .await
            .unwrap_err();
        assert!(matches!(err, UrbanVizError::UnexpectedResponse(_)));
    }

    #[test]
    fn test_response_ignores_extra_fields() {
        let json = r#"{"created": 1, "data": [{"url": "https://example.com/a.png", "revised_prompt": "x"}]}"#;
        let resp: EditResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.data[0].url.as_deref(), Some("https://example.com/a.png"));
        assert!(resp.data[0].b64_json.is_none());
    }
}
