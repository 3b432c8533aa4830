use std::{fmt, future::Future, pin::Pin, time::Duration};

use log::debug;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;

mod error;
pub use error::{GENERIC_FAILURE, GenerationError};

use crate::params::{AspectRatio, GenerationParams, Resolution};

pub const DEFAULT_HOST: &str = "https://generativelanguage.googleapis.com";
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60 * 3);

//
// ===== wire types =====
//

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RequestBody {
    pub contents: Vec<Content>,
    pub generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Tool>>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Content {
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum Part {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineImage,
    },
}

/// A mime type plus base64 payload, used for reference images going out and
/// generated images coming back.
#[derive(Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InlineImage {
    pub mime_type: String,
    pub data: String,
}

// payloads run into megabytes, keep them out of debug logs
impl fmt::Debug for InlineImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InlineImage")
            .field("mime_type", &self.mime_type)
            .field("data", &format_args!("<{} base64 chars>", self.data.len()))
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_modalities: Vec<String>,
    pub image_config: ImageConfig,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ImageConfig {
    pub aspect_ratio: AspectRatio,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_size: Option<Resolution>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    pub google_search: GoogleSearch,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GoogleSearch {}

//
// ===== request / response mapping =====
//

/// Builds the `generateContent` body. `reference_images` must already be
/// base64 encoded and stay in the order the user attached them.
pub fn build_request(params: &GenerationParams, reference_images: Vec<InlineImage>) -> RequestBody {
    let mut parts = Vec::with_capacity(reference_images.len() + 1);
    parts.push(Part::Text {
        text: params.prompt.clone(),
    });
    parts.extend(
        reference_images
            .into_iter()
            .map(|inline_data| Part::InlineData { inline_data }),
    );

    RequestBody {
        contents: vec![Content { parts }],
        generation_config: GenerationConfig {
            response_modalities: vec!["image".into()],
            image_config: ImageConfig {
                aspect_ratio: params.aspect_ratio,
                image_size: params.effective_resolution(),
            },
        },
        tools: params.effective_search().then(|| {
            vec![Tool {
                google_search: GoogleSearch {},
            }]
        }),
    }
}

/// Pulls the image parts out of a `generateContent` response, in the order
/// they were received.
pub fn parse_response(response: Value) -> Result<Vec<InlineImage>, GenerationError> {
    let parts = response
        .get("candidates")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(Value::as_array)
        .ok_or(GenerationError::MalformedResponse)?;

    // anything that isn't a complete image part is skipped, whatever its shape
    let images: Vec<InlineImage> = parts
        .iter()
        .filter_map(|p| p.get("inlineData").or_else(|| p.get("inline_data")))
        .filter_map(|d| {
            let mime_type = d
                .get("mimeType")
                .or_else(|| d.get("mime_type"))
                .and_then(Value::as_str)?;
            let data = d.get("data").and_then(Value::as_str)?;
            mime_type.starts_with("image/").then(|| InlineImage {
                mime_type: mime_type.to_string(),
                data: data.to_string(),
            })
        })
        .collect();

    if images.is_empty() {
        return Err(GenerationError::NoImageReturned);
    }
    Ok(images)
}

/// The request URL without the key query, safe to show and log.
pub fn endpoint_preview(endpoint_override: &str, model_id: &str) -> String {
    let trimmed = endpoint_override.trim();
    let host = if trimmed.is_empty() {
        DEFAULT_HOST
    } else {
        trimmed.trim_end_matches('/')
    };
    format!("{host}/v1beta/models/{model_id}:generateContent")
}

pub fn resolve_url(endpoint_override: &str, model_id: &str, api_key: &str) -> String {
    format!(
        "{}?key={api_key}",
        endpoint_preview(endpoint_override, model_id)
    )
}

//
// ===== transport =====
//

pub type TransportFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Value, GenerationError>> + Send + 'a>>;

/// Posts a request body and hands back the decoded success payload.
pub trait Transport {
    fn post_json<'a>(&'a self, url: &'a str, body: &'a RequestBody) -> TransportFuture<'a>;
}

#[derive(Clone, Default)]
pub struct GeminiClient {
    client: Client,
}

impl GeminiClient {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }
}

impl Transport for GeminiClient {
    fn post_json<'a>(&'a self, url: &'a str, body: &'a RequestBody) -> TransportFuture<'a> {
        Box::pin(async move {
            debug!("request body: {body:#?}");
            let resp = self
                .client
                .post(url)
                .timeout(REQUEST_TIMEOUT)
                .json(body)
                .send()
                .await?;

            let status = resp.status();
            let text = resp.text().await?;
            if !status.is_success() {
                debug!("generateContent failed with {status}: {text}");
                return Err(GenerationError::from_error_body(status.as_u16(), &text));
            }

            serde_json::from_str(&text).map_err(|_| GenerationError::MalformedResponse)
        })
    }
}
