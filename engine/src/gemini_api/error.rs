use serde::Deserialize;
use thiserror::Error;

/// Used when a failed response carries no readable `error.message`.
pub const GENERIC_FAILURE: &str = "Generation failed";

/// Everything that can end a generation attempt, plus the upload notice.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Please enter an API key")]
    MissingApiKey,

    #[error("Please enter a prompt")]
    MissingPrompt,

    #[error("At most {max} reference images can be attached")]
    UploadLimitExceeded { max: usize },

    #[error("Unexpected API response format")]
    MalformedResponse,

    #[error("No image data found in the response")]
    NoImageReturned,

    /// Non-success status, message taken from the server's error payload.
    #[error("{message}")]
    HttpError { status: u16, message: String },

    /// Built through `From`, which drops the url and with it the key.
    #[error("Request failed: {0}")]
    Transport(reqwest::Error),

    #[error("Failed to encode reference image: {0}")]
    Encoding(String),

    #[error("{name} is not a supported image file")]
    InvalidAttachment { name: String },
}

impl From<reqwest::Error> for GenerationError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.without_url())
    }
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

impl GenerationError {
    pub fn from_error_body(status: u16, body: &str) -> Self {
        let message = serde_json::from_str::<ErrorEnvelope>(body)
            .ok()
            .and_then(|e| e.error.message)
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| GENERIC_FAILURE.to_string());
        Self::HttpError { status, message }
    }
}
