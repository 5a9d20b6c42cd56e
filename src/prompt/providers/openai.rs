//! OpenAI prompt provider (Responses API with structured output).

use crate::cluster::ClusterSummary;
use crate::error::Result;
use crate::openai::{
    resolve_api_key, string_object_schema, InputContent, InputMessage, ResponsesClient,
    ResponsesRequest, TextConfig,
};
use crate::prompt::provider::PromptProvider;
use crate::prompt::types::PromptDraft;
use async_trait::async_trait;
use std::time::Duration;

const INSTRUCTIONS: &str = "You are an expert at creating prompts for Stable Diffusion img2img. \
Based on the cluster analysis of urban design images provided, create a detailed prompt that \
captures the essence of the cluster's aesthetic and can be used to transform real urban \
photographs. Focus on architectural elements, mood, lighting, and style. The prompt should be \
detailed but concise. Come up with a name for the cluster.";

/// Builder for OpenAiPromptProvider.
#[derive(Debug, Clone)]
pub struct OpenAiPromptProviderBuilder {
    api_key: Option<String>,
    model: String,
    timeout: Duration,
}

impl Default for OpenAiPromptProviderBuilder {
    fn default() -> Self {
        Self {
            api_key: None,
            model: crate::config::DEFAULT_OPENAI_MODEL.to_string(),
            timeout: crate::config::DEFAULT_HTTP_TIMEOUT,
        }
    }
}

impl OpenAiPromptProviderBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the API key. Falls back to `OPENAI_API_KEY` env var.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the text model that writes the prompts.
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sets the HTTP timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Builds the provider, resolving the API key.
    pub fn build(self) -> Result<OpenAiPromptProvider> {
        let api_key = resolve_api_key(self.api_key)?;
        let client = reqwest::Client::builder().timeout(self.timeout).build()?;
        Ok(OpenAiPromptProvider {
            responses: ResponsesClient::new(client, api_key),
            model: self.model,
        })
    }
}

/// Writes cluster prompts with an OpenAI text model.
pub struct OpenAiPromptProvider {
    responses: ResponsesClient,
    model: String,
}

impl OpenAiPromptProvider {
    /// Creates a new `OpenAiPromptProviderBuilder`.
    pub fn builder() -> OpenAiPromptProviderBuilder {
        OpenAiPromptProviderBuilder::new()
    }

    fn build_request(&self, summary: &ClusterSummary) -> ResponsesRequest {
        let user = format!(
            "Based on this cluster analysis of urban design images, create a Stable Diffusion \
             img2img prompt:\n\n{}\n\nCreate a prompt that will help transform a real urban \
             photograph to match this aesthetic.",
            summary.describe()
        );
        let schema = string_object_schema(&[
            ("name", "The name of the cluster"),
            ("prompt", "The Stable Diffusion img2img prompt"),
        ]);

        ResponsesRequest {
            model: self.model.clone(),
            instructions: Some(INSTRUCTIONS.to_string()),
            input: vec![InputMessage::user(vec![InputContent::InputText { text: user }])],
            text: TextConfig::json_schema("cluster_prompts", schema),
            max_output_tokens: None,
        }
    }
}

#[async_trait]
impl PromptProvider for OpenAiPromptProvider {
    async fn generate(&self, summary: &ClusterSummary) -> Result<PromptDraft> {
        let body = self.build_request(summary);
        tracing::debug!(model = %self.model, label = summary.label, "requesting cluster prompt");
        let text = self.responses.create(&body).await?;
        PromptDraft::parse(&text)
    }

    fn name(&self) -> &str {
        "OpenAI (prompts)"
    }
}
