//! Error types for the relay.

use thiserror::Error;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum RelayError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Authentication failed: {message}")]
    Auth { message: String },

    #[error("Upstream returned status {status}: {body}")]
    UpstreamStatus { status: u16, body: String },

    #[error("Network error: {message}")]
    Network { message: String },

    #[error("Empty response from upstream")]
    EmptyResponse,

    #[error("Stream processing error: {message}")]
    Stream { message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("{0}")]
    Other(String),
}

impl RelayError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Auth {
            message: msg.into(),
        }
    }

    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network {
            message: msg.into(),
        }
    }

    pub fn stream(msg: impl Into<String>) -> Self {
        Self::Stream {
            message: msg.into(),
        }
    }

    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Whether another attempt may succeed. 5xx statuses, network faults,
    /// and a clean stream that produced no content are transient; auth
    /// failures and other 4xx statuses are not.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::UpstreamStatus { status, .. } => (500..600).contains(status),
            Self::Network { .. } | Self::EmptyResponse | Self::Stream { .. } => true,
            Self::Http(e) => !e.is_builder(),
            _ => false,
        }
    }

    /// The `type` field of the client-facing error envelope.
    #[must_use]
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Auth { .. } => "auth_error",
            Self::UpstreamStatus { .. } | Self::EmptyResponse => "api_error",
            Self::Stream { .. } => "stream_error",
            Self::Network { .. } | Self::Http(_) => "http_error",
            _ => "server_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;
