//! Error taxonomy for the harvester.
//!
//! Errors are grouped by how far they reach:
//! - [`HarvestError::Config`] is fatal and raised before the loop starts
//! - fetch-side errors ([`HarvestError::Fetch`], [`HarvestError::Http`],
//!   [`HarvestError::Json`]) end the current date window only
//! - [`HarvestError::Publish`] affects a single delivery to a single sink
//!
//! Invalid and duplicate stories are not errors; the deduplicator reports
//! them as verdicts.

use std::fmt;

use thiserror::Error;

/// Result type alias for harvester operations.
pub type Result<T> = std::result::Result<T, HarvestError>;

#[derive(Error, Debug)]
pub enum HarvestError {
    /// Bad or missing configuration (dates, credentials, page size...)
    #[error("Configuration error: {0}")]
    Config(String),

    /// The search backend answered but the answer was unusable
    #[error("Fetch error: {0}")]
    Fetch(String),

    /// HTTP transport failure talking to the search backend
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON encoding/decoding failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML configuration file could not be parsed
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// I/O on a local output failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A sink refused or failed a delivery
    #[error("Publish error on {sink}: {message}")]
    Publish { sink: String, message: String },
}

impl HarvestError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn fetch(message: impl Into<String>) -> Self {
        Self::Fetch(message.into())
    }

    pub fn publish(sink: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Publish {
            sink: sink.into(),
            message: message.to_string(),
        }
    }
}
