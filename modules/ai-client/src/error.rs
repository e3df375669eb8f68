use thiserror::Error;

#[derive(Debug, Error)]
pub enum AiClientError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Model API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// Rate-limit or billing failure. Callers treat this as terminal for
    /// the whole run; every other variant is recoverable per call.
    #[error("Model quota exhausted (status {status}): {message}")]
    QuotaExhausted { status: u16, message: String },

    #[error("Malformed model response: {0}")]
    Malformed(String),
}

impl AiClientError {
    /// Classify a non-success HTTP status from the completion API.
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            402 | 429 => AiClientError::QuotaExhausted { status, message },
            _ => AiClientError::Api { status, message },
        }
    }
}

impl From<reqwest::Error> for AiClientError {
    fn from(err: reqwest::Error) -> Self {
        AiClientError::Network(err.to_string())
    }
}
