//! OpenAI Responses API wire types, shared by the vision and prompt providers.

use crate::error::{classify_http_error, Result, UrbanVizError};
use serde::{Deserialize, Serialize};

const RESPONSES_URL: &str = "https://api.openai.com/v1/responses";

#[derive(Debug, Serialize)]
pub(crate) struct ResponsesRequest {
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    pub input: Vec<InputMessage>,
    pub text: TextConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
pub(crate) struct InputMessage {
    pub role: &'static str,
    pub content: Vec<InputContent>,
}

impl InputMessage {
    pub fn user(content: Vec<InputContent>) -> Self {
        Self {
            role: "user",
            content,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum InputContent {
    InputText { text: String },
    InputImage { image_url: String, detail: String },
}

#[derive(Debug, Serialize)]
pub(crate) struct TextConfig {
    pub format: JsonSchemaFormat,
}

/// Structured-output format: the model must answer with JSON matching `schema`.
#[derive(Debug, Serialize)]
pub(crate) struct JsonSchemaFormat {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub name: String,
    pub schema: serde_json::Value,
    pub strict: bool,
}

impl TextConfig {
    pub fn json_schema(name: impl Into<String>, schema: serde_json::Value) -> Self {
        Self {
            format: JsonSchemaFormat {
                kind: "json_schema",
                name: name.into(),
                schema,
                strict: true,
            },
        }
    }
}

/// Builds a strict object schema where every listed property is a required string.
pub(crate) fn string_object_schema(properties: &[(&str, &str)]) -> serde_json::Value {
    let props: serde_json::Map<String, serde_json::Value> = properties
        .iter()
        .map(|(name, description)| {
            (
                name.to_string(),
                serde_json::json!({ "type": "string", "description": description }),
            )
        })
        .collect();
    let required: Vec<&str> = properties.iter().map(|(name, _)| *name).collect();
    serde_json::json!({
        "type": "object",
        "properties": props,
        "required": required,
        "additionalProperties": false,
    })
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResponsesResponse {
    #[serde(default)]
    pub output: Vec<OutputItem>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub(crate) enum OutputItem {
    #[serde(rename = "message")]
    Message {
        #[serde(default)]
        content: Vec<OutputContent>,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub(crate) enum OutputContent {
    #[serde(rename = "output_text")]
    OutputText { text: String },
    #[serde(rename = "refusal")]
    Refusal { refusal: String },
    #[serde(other)]
    Other,
}

impl ResponsesResponse {
    /// Concatenates every `output_text` part, the way the SDKs' `output_text` does.
    pub fn output_text(self) -> Result<String> {
        let mut text = String::new();
        for item in self.output {
            let OutputItem::Message { content } = item else {
                continue;
            };
            for part in content {
                match part {
                    OutputContent::OutputText { text: t } => text.push_str(&t),
                    OutputContent::Refusal { refusal } => {
                        return Err(UrbanVizError::ContentBlocked(refusal))
                    }
                    OutputContent::Other => {}
                }
            }
        }

        if text.trim().is_empty() {
            let status = self.status.unwrap_or_else(|| "unknown".into());
            return Err(UrbanVizError::UnexpectedResponse(format!(
                "response contained no output text (status: {status})"
            )));
        }
        Ok(text)
    }
}

/// Thin client for `POST /v1/responses`.
#[derive(Clone)]
pub(crate) struct ResponsesClient {
    client: reqwest::Client,
    api_key: String,
}

impl ResponsesClient {
    pub fn new(client: reqwest::Client, api_key: String) -> Self {
        Self { client, api_key }
    }

    /// Sends one request and returns its output text. No retries.
    pub async fn create(&self, body: &ResponsesRequest) -> Result<String> {
        tracing::debug!(model = %body.model, "POST {RESPONSES_URL}");

        let response = self
            .client
            .post(RESPONSES_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let text = response.text().await.unwrap_or_default();
            return Err(classify_http_error(status.as_u16(), &text, &headers));
        }

        let parsed: ResponsesResponse = response.json().await?;
        parsed.output_text()
    }
}

/// Resolves an OpenAI key from an explicit value or `OPENAI_API_KEY`.
pub(crate) fn resolve_api_key(explicit: Option<String>) -> Result<String> {
    let key = crate::config::explicit_or_env(explicit, "OPENAI_API_KEY")?;
    if !key.starts_with("sk-") && !key.starts_with("OPENAI-") {
        tracing::warn!("OpenAI API key does not have the expected format");
    }
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let req = ResponsesRequest {
            model: "gpt-4o".into(),
            instructions: None,
            input: vec![InputMessage::user(vec![
                InputContent::InputText {
                    text: "describe".into(),
                },
                InputContent::InputImage {
                    image_url: "data:image/jpeg;base64,AAAA".into(),
                    detail: "low".into(),
                },
            ])],
            text: TextConfig::json_schema("image_analysis", string_object_schema(&[("mood", "m")])),
            max_output_tokens: Some(300),
        };
        let json = serde_json::to_value(&req).unwrap();

        assert!(json.get("instructions").is_none());
        assert_eq!(json["input"][0]["role"], "user");
        assert_eq!(json["input"][0]["content"][0]["type"], "input_text");
        assert_eq!(json["input"][0]["content"][1]["type"], "input_image");
        assert_eq!(json["input"][0]["content"][1]["detail"], "low");
        assert_eq!(json["text"]["format"]["type"], "json_schema");
        assert_eq!(json["text"]["format"]["strict"], true);
        assert_eq!(json["text"]["format"]["schema"]["required"][0], "mood");
        assert_eq!(
            json["text"]["format"]["schema"]["additionalProperties"],
            false
        );
    }

    #[test]
    fn test_output_text_concatenates_messages() {
        let json = r#"{
            "status": "completed",
            "output": [
                {"type": "reasoning", "summary": []},
                {"type": "message", "role": "assistant", "content": [
                    {"type": "output_text", "text": "{\"a\":", "annotations": []},
                    {"type": "output_text", "text": "1}", "annotations": []}
                ]}
            ]
        }"#;
        let resp: ResponsesResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.output_text().unwrap(), "{\"a\":1}");
    }

    #[test]
    fn test_output_text_refusal() {
        let json = r#"{"output": [{"type": "message", "content": [
            {"type": "refusal", "refusal": "I can't help with that."}
        ]}]}"#;
        let resp: ResponsesResponse = serde_json::from_str(json).unwrap();
        assert!(matches!(
            resp.output_text(),
            Err(UrbanVizError::ContentBlocked(_))
        ));
    }

    #[test]
    fn test_output_text_empty() {
        let json = r#"{"status": "incomplete", "output": []}"#;
        let resp: ResponsesResponse = serde_json::from_str(json).unwrap();
        let err = resp.output_text().unwrap_err();
        assert!(err.to_string().contains("incomplete"));
    }
}
