//! Error types for the analysis, clustering and generation pipeline.

use std::time::Duration;

/// Longest slice of an upstream error body kept in an error message.
const MAX_ERROR_MESSAGE_LEN: usize = 500;

/// Errors that can occur anywhere in the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum UrbanVizError {
    /// API key missing or invalid.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Rate limit exceeded. Reported, never retried.
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    /// Content was blocked by safety filters.
    #[error("content blocked: {0}")]
    ContentBlocked(String),

    /// Invalid request parameters or configuration.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Feature vectors of different lengths were handed to the cluster engine.
    #[error("dimension mismatch for {id}: expected {expected}, got {actual}")]
    DimensionMismatch {
        id: String,
        expected: usize,
        actual: usize,
    },

    /// The API answered, but not with something we can use.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Street View has no imagery for the requested location.
    #[error("no Street View imagery: {0}")]
    NoImagery(String),

    /// Network or HTTP error. The request URL is stripped, since query
    /// strings can carry API keys.
    #[error("network error: {0}")]
    Network(#[source] reqwest::Error),

    /// Failed to decode base64 data.
    #[error("failed to decode: {0}")]
    Decode(String),

    /// Image decoding or encoding failed.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// I/O error (e.g., saving file).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl UrbanVizError {
    /// Returns true if the error came from a remote service rather than local state.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            Self::Auth(_)
                | Self::Api { .. }
                | Self::RateLimited { .. }
                | Self::ContentBlocked(_)
                | Self::UnexpectedResponse(_)
                | Self::NoImagery(_)
                | Self::Network(_)
        )
    }
}

impl From<reqwest::Error> for UrbanVizError {
    fn from(e: reqwest::Error) -> Self {
        Self::Network(e.without_url())
    }
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, UrbanVizError>;

/// Redacts bearer tokens and API keys from an upstream error body and
/// truncates it to a readable length.
pub(crate) fn sanitize_error_message(text: &str) -> String {
    let redacted = text
        .split_whitespace()
        .map(|word| {
            let trimmed = word.trim_matches(|c: char| !c.is_alphanumeric() && c != '-' && c != '_');
            if trimmed.starts_with("sk-") || trimmed.starts_with("AIza") {
                word.replace(trimmed, "[REDACTED]")
            } else {
                word.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" ");

    if redacted.chars().count() > MAX_ERROR_MESSAGE_LEN {
        let truncated: String = redacted.chars().take(MAX_ERROR_MESSAGE_LEN).collect();
        format!("{truncated}...")
    } else {
        redacted
    }
}

/// Reads a `Retry-After` header expressed in whole seconds.
pub(crate) fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
}

/// Maps a non-success HTTP status and body to the closest error kind.
pub(crate) fn classify_http_error(
    status: u16,
    text: &str,
    headers: &reqwest::header::HeaderMap,
) -> UrbanVizError {
    let text = sanitize_error_message(text);
    match status {
        401 | 403 => UrbanVizError::Auth(text),
        413 => UrbanVizError::InvalidRequest("payload too large; reduce image size".into()),
        429 => UrbanVizError::RateLimited {
            retry_after: parse_retry_after(headers).map(Duration::from_secs),
        },
        _ => {
            let lower = text.to_lowercase();
            if lower.contains("content_moderation")
                || lower.contains("content_policy")
                || lower.contains("safety")
            {
                UrbanVizError::ContentBlocked(text)
            } else {
                UrbanVizError::Api {
                    status,
                    message: text,
                }
            }
        }
    }
}
