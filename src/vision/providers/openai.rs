//! OpenAI vision provider (Responses API with structured output).

use crate::error::Result;
use crate::openai::{
    resolve_api_key, string_object_schema, InputContent, InputMessage, ResponsesClient,
    ResponsesRequest, TextConfig,
};
use crate::vision::provider::VisionProvider;
use crate::vision::types::{AnalysisRequest, StyleField};
use async_trait::async_trait;
use std::time::Duration;

/// Builder for OpenAiVisionProvider.
#[derive(Debug, Clone)]
pub struct OpenAiVisionProviderBuilder {
    api_key: Option<String>,
    model: String,
    detail: String,
    max_output_tokens: u32,
    timeout: Duration,
}

impl Default for OpenAiVisionProviderBuilder {
    fn default() -> Self {
        Self {
            api_key: None,
            model: crate::config::DEFAULT_OPENAI_MODEL.to_string(),
            detail: "low".to_string(),
            max_output_tokens: 300,
            timeout: crate::config::DEFAULT_HTTP_TIMEOUT,
        }
    }
}

impl OpenAiVisionProviderBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the API key. Falls back to `OPENAI_API_KEY` env var.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the vision-capable model.
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sets the image detail level ("low", "high", "auto").
    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = detail.into();
        self
    }

    /// Caps the length of the model's answer.
    pub fn max_output_tokens(mut self, tokens: u32) -> Self {
        self.max_output_tokens = tokens;
        self
    }

    /// Sets the HTTP timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Builds the provider, resolving the API key.
    pub fn build(self) -> Result<OpenAiVisionProvider> {
        let api_key = resolve_api_key(self.api_key)?;
        let client = reqwest::Client::builder().timeout(self.timeout).build()?;
        Ok(OpenAiVisionProvider {
            responses: ResponsesClient::new(client, api_key),
            model: self.model,
            detail: self.detail,
            max_output_tokens: self.max_output_tokens,
        })
    }
}

/// Describes urban photographs with an OpenAI vision model.
///
/// The model is constrained to the [`StyleAnalysis`](crate::vision::StyleAnalysis)
/// JSON schema; the raw JSON text is returned for the caller to validate.
pub struct OpenAiVisionProvider {
    responses: ResponsesClient,
    model: String,
    detail: String,
    max_output_tokens: u32,
}

impl OpenAiVisionProvider {
    /// Creates a new `OpenAiVisionProviderBuilder`.
    pub fn builder() -> OpenAiVisionProviderBuilder {
        OpenAiVisionProviderBuilder::new()
    }

    fn build_request(&self, request: &AnalysisRequest) -> ResponsesRequest {
        let properties: Vec<(&str, &str)> = StyleField::ALL
            .iter()
            .map(|f| (f.as_str(), f.description()))
            .collect();

        ResponsesRequest {
            model: self.model.clone(),
            instructions: None,
            input: vec![InputMessage::user(vec![
                InputContent::InputText {
                    text: request.prompt.clone(),
                },
                InputContent::InputImage {
                    image_url: request.to_data_url(),
                    detail: self.detail.clone(),
                },
            ])],
            text: TextConfig::json_schema("image_analysis", string_object_schema(&properties)),
            max_output_tokens: Some(self.max_output_tokens),
        }
    }
}

#[async_trait]
impl VisionProvider for OpenAiVisionProvider {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<String> {
        let body = self.build_request(request);
        tracing::debug!(
            model = %self.model,
            bytes = request.image.len(),
            "requesting image analysis"
        );
        self.responses.create(&body).await
    }

    fn name(&self) -> &str {
        "OpenAI (vision)"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UrbanVizError;

    fn provider() -> OpenAiVisionProvider {
        OpenAiVisionProviderBuilder::new()
            .api_key("sk-test")
            .build()
            .unwrap()
    }

    #[test]
    fn test_builder_with_explicit_key() {
        assert!(OpenAiVisionProviderBuilder::new()
            .api_key("sk-test")
            .build()
            .is_ok());
    }

    #[test]
    fn test_builder_blank_key_fails() {
        let result = OpenAiVisionProviderBuilder::new().api_key("").build();
        assert!(matches!(result, Err(UrbanVizError::Auth(_))));
    }

    #[test]
    fn test_request_carries_schema_and_image() {
        let req = AnalysisRequest::jpeg(vec![0xFF, 0xD8, 0xFF], "analyze this street");
        let body = serde_json::to_value(provider().build_request(&req)).unwrap();

        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["max_output_tokens"], 300);
        assert_eq!(body["input"][0]["content"][0]["text"], "analyze this street");
        assert_eq!(
            body["input"][0]["content"][1]["image_url"],
            "data:image/jpeg;base64,/9j/"
        );

        let schema = &body["text"]["format"]["schema"];
        assert_eq!(body["text"]["format"]["name"], "image_analysis");
        assert_eq!(schema["required"].as_array().unwrap().len(), 6);
        assert_eq!(
            schema["properties"]["dominant_materials"]["type"],
            "string"
        );
    }

    #[test]
    fn test_detail_override() {
        let provider = OpenAiVisionProviderBuilder::new()
            .api_key("sk-test")
            .detail("high")
            .model("gpt-4.1")
            .build()
            .unwrap();
        let req = AnalysisRequest::jpeg(vec![1], "x");
        let body = serde_json::to_value(provider.build_request(&req)).unwrap();
        assert_eq!(body["input"][0]["content"][1]["detail"], "high");
        assert_eq!(body["model"], "gpt-4.1");
    }
}
