//! Error types for the Coral client.

use thiserror::Error;

/// Errors that can occur when talking to a Coral server.
#[derive(Error, Debug)]
pub enum CoralError {
    /// The server answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Api {
        /// The HTTP status code.
        status: u16,
        /// The raw response body.
        body: String,
    },

    /// An HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A URL parsing error.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// A WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(Box<tokio_tungstenite::tungstenite::Error>),

    /// The response was invalid or malformed.
    #[error("Failed to parse response: {0}")]
    InvalidResponse(String),

    /// The session socket is not open.
    #[error("WebSocket not connected")]
    NotConnected,
}

impl CoralError {
    /// Create a new API error.
    pub fn api(status: u16, body: impl Into<String>) -> Self {
        Self::Api {
            status,
            body: body.into(),
        }
    }

    /// Get the HTTP status code, if this is an API error.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for CoralError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(Box::new(err))
    }
}

/// Result type alias for Coral operations.
pub type Result<T> = std::result::Result<T, CoralError>;

#[cfg(test)]
mod tests {
    use super::CoralError;

    #[test]
    fn api_error_display_carries_status_and_body() {
        let err = CoralError::api(502, "upstream unavailable");
        assert_eq!(err.to_string(), "HTTP 502: upstream unavailable");
        assert_eq!(err.status(), Some(502));
    }

    #[test]
    fn non_api_errors_have_no_status() {
        assert_eq!(CoralError::NotConnected.status(), None);
        assert_eq!(
            CoralError::NotConnected.to_string(),
            "WebSocket not connected"
        );
    }
}
