//! Error type for the Moodle web-services client.

use thiserror::Error;

/// Moodle client error. `Auth`, `NotFound` and `NotImplemented` are their own kinds;
/// the remaining transport, status and schema failures are API errors ([MoodleError::is_api_error]).
#[derive(Debug, Error)]
pub enum MoodleError {
    #[error("Invalid URL: {input}: {reason}")]
    InvalidUrl { input: String, reason: String },

    #[error("Authentication failed: {message}")]
    Auth { message: String },

    #[error("Not found: {message}")]
    NotFound { message: String },

    #[error("Network error: could not reach {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Request timed out: {url}")]
    Timeout { url: String },

    #[error("HTTP {status} from {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Moodle returned {errorcode}: {message}")]
    Remote { errorcode: String, message: String },

    #[error("Unexpected response from {context}: {message}")]
    Schema { context: String, message: String },

    #[error("{operation} is not implemented; nothing was sent to Moodle.")]
    NotImplemented { operation: &'static str },
}

impl MoodleError {
    /// True for transport, HTTP status, Moodle exception, and response-shape failures.
    pub fn is_api_error(&self) -> bool {
        matches!(
            self,
            MoodleError::Network { .. }
                | MoodleError::Timeout { .. }
                | MoodleError::HttpStatus { .. }
                | MoodleError::Remote { .. }
                | MoodleError::Schema { .. }
        )
    }

    /// Short label used when reporting errors on the CLI.
    pub fn kind(&self) -> &'static str {
        match self {
            MoodleError::InvalidUrl { .. } | MoodleError::NotFound { .. } => "not found",
            MoodleError::Auth { .. } => "auth error",
            MoodleError::NotImplemented { .. } => "not implemented",
            _ => "API error",
        }
    }
}
