//! Image-to-image synthesis providers.

mod openai;
mod stability;

pub use openai::{OpenAiImageProvider, OpenAiImageProviderBuilder};
pub use stability::{StabilityModel, StabilityProvider, StabilityProviderBuilder};

use crate::error::{Result, UrbanVizError};
use crate::synthesis::types::TransformRequest;
use reqwest::multipart::{Form, Part};

/// Text fields in order, then the source image as the `image` part.
fn source_form(
    fields: Vec<(&'static str, String)>,
    request: &TransformRequest,
    file_stem: &str,
) -> Result<Form> {
    let format = request.source_format();
    let image = Part::bytes(request.source.clone())
        .file_name(format!("{file_stem}.{}", format.extension()))
        .mime_str(format.mime_type())
        .map_err(|e| UrbanVizError::InvalidRequest(e.to_string()))?;

    Ok(fields
        .into_iter()
        .fold(Form::new(), |form, (name, value)| form.text(name, value))
        .part("image", image))
}

/// Status, headers and body of a failed response, for error classification.
async fn failure_parts(response: reqwest::Response) -> (u16, reqwest::header::HeaderMap, String) {
    let status = response.status().as_u16();
    let headers = response.headers().clone();
    let body = response.text().await.unwrap_or_default();
    (status, headers, body)
}
