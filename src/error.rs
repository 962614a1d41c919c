//! Crate-wide error type for the resolution engine.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while resolving a media source.
///
/// Provider clients never surface these to the chain: they log and turn them into
/// empty results. The credential rotator and the extraction executor do return them.
#[derive(Error, Debug)]
pub enum ResolverError {
    #[error("No credential files available in {}", .0.display())]
    NoCredentialsAvailable(PathBuf),

    #[error("Extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("External API error: {0}")]
    ExternalApiError(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unable to parse response: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for resolution operations
pub type ResolverResult<T> = Result<T, ResolverError>;
