//! Error types for device scraping.

use thiserror::Error;

use crate::model::Target;

/// Result type alias using [`DeviceError`].
pub type Result<T> = std::result::Result<T, DeviceError>;

/// Errors that abort the scrape of a single device.
#[derive(Error, Debug)]
pub enum DeviceError {
    /// HTTP client could not be built.
    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    /// Connection, timeout or non-success HTTP status.
    #[error("Request to {endpoint} failed: {source}")]
    Request {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    /// Response body is not the expected JSON document.
    #[error("Invalid JSON from {endpoint}: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },

    /// A field the exporter cannot do without is absent.
    #[error("{document} response has no `{field}`")]
    MissingField {
        document: &'static str,
        field: &'static str,
    },
}

/// A [`DeviceError`] tagged with the target it happened on.
#[derive(Error, Debug)]
#[error("Target {target}: {source}")]
pub struct TargetError {
    pub target: Target,
    #[source]
    pub source: DeviceError,
}

impl TargetError {
    pub fn new(target: Target, source: DeviceError) -> Self {
        Self { target, source }
    }
}
