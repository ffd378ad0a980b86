//! Error types for the AAC companion

use thiserror::Error;

/// Result type alias for AAC companion operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the AAC companion
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Non-success response from the backend
    ///
    /// Rendered as `"<status> <statusText>"`, followed by `" - <body>"` when
    /// the backend sent a body
    #[error("{status} {status_text}{}", body_suffix(.body))]
    Api {
        /// Numeric HTTP status
        status: u16,
        /// Canonical reason phrase for the status
        status_text: String,
        /// Response body, possibly empty
        body: String,
    },

    /// Speech recognition session error
    #[error("{0}")]
    Speech(String),

    /// Audio playback error
    #[error("{0}")]
    Playback(String),

    /// Audio device or decoder error
    #[error("audio error: {0}")]
    Audio(String),

    /// Preference storage error
    #[error("storage error: {0}")]
    Storage(String),

    /// Client-side validation failure
    #[error("{0}")]
    Validation(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP transport error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

fn body_suffix(body: &str) -> String {
    if body.is_empty() {
        String::new()
    } else {
        format!(" - {body}")
    }
}
