//! DNS provider error types

use thiserror::Error;

/// DNS provider errors
#[derive(Error, Debug)]
pub enum DnsError {
    #[error("Invalid provider type: {0}")]
    InvalidProviderType(String),

    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("Zone not found: {0}")]
    ZoneNotFound(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("{provider} API returned status {status}: {body}")]
    Status {
        provider: &'static str,
        status: u16,
        body: String,
    },

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Operation not supported: {0}")]
    NotSupported(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
}

impl DnsError {
    /// Maps a non-success provider response onto a typed error.
    pub(crate) fn from_status(provider: &'static str, status: u16, body: String) -> Self {
        match status {
            401 => DnsError::InvalidCredentials(format!("{}: {}", provider, body)),
            403 => DnsError::PermissionDenied(format!("{}: {}", provider, body)),
            _ => DnsError::Status {
                provider,
                status,
                body,
            },
        }
    }
}
