use thiserror::Error;
use tracing::{debug, error, warn};

#[derive(Debug, Error)]
pub enum PreviewError {
    #[error("Failed to parse URL: {0}")]
    UrlParseError(#[from] url::ParseError),

    #[error("Failed to fetch preview: {0}")]
    FetchError(String),

    #[error("Preview not found: {0}")]
    NotFound(String),

    #[error("Client error ({status}): {message}")]
    ClientError { status: u16, message: String },

    #[error("Server error ({status}): {message}")]
    ServerError { status: u16, message: String },

    #[error("Request timeout: {0}")]
    TimeoutError(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Request cancelled")]
    Cancelled,
}

impl PreviewError {
    /// Cancellation is an expected outcome of superseded requests, never a user-facing failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, PreviewError::Cancelled)
    }

    pub fn log(&self) {
        match self {
            PreviewError::UrlParseError(e) => {
                warn!(error = %e, "URL parsing failed");
            }
            PreviewError::FetchError(e) => {
                error!(error = %e, "Preview fetch failed");
            }
            PreviewError::NotFound(e) => {
                warn!(error = %e, "Preview not found");
            }
            PreviewError::ClientError { status, message } => {
                warn!(status = %status, error = %message, "Preview request rejected");
            }
            PreviewError::ServerError { status, message } => {
                error!(status = %status, error = %message, "Preview service error");
            }
            PreviewError::TimeoutError(e) => {
                warn!(error = %e, "Request timed out");
            }
            PreviewError::InvalidResponse(e) => {
                error!(error = %e, "Preview response could not be decoded");
            }
            PreviewError::InvalidInput(e) => {
                warn!(error = %e, "Invalid input");
            }
            PreviewError::InvalidConfiguration(e) => {
                error!(error = %e, "Invalid configuration");
            }
            PreviewError::Cancelled => {
                debug!("Preview request cancelled");
            }
        }
    }

    pub(crate) fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            PreviewError::TimeoutError(e.to_string())
        } else if e.is_decode() {
            PreviewError::InvalidResponse(e.to_string())
        } else {
            PreviewError::FetchError(e.to_string())
        }
    }

    pub(crate) fn from_status(status: u16, message: String) -> Self {
        match status {
            404 => PreviewError::NotFound(message),
            400..=499 => PreviewError::ClientError { status, message },
            _ => PreviewError::ServerError { status, message },
        }
    }
}
