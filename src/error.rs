//! Error types shared by the loader, camera and predict loop.

use thiserror::Error;

/// Errors that can occur while starting or running a classification session.
#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("{0}")]
    InvalidManifest(String),
    #[error("Failed to fetch {what} at {url} (status {status})")]
    Fetch {
        what: &'static str,
        url: String,
        status: u16,
    },
    #[error("Failed to fetch {what} at {url}: {source}")]
    Transport {
        what: &'static str,
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("Model manifest at {url} is not valid JSON: {source}")]
    ManifestParse {
        url: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Invalid model URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("{0}")]
    Camera(String),
    #[error("{0}")]
    Runtime(String),
    #[error("Tensor error: {0}")]
    Tensor(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ClassifierError>;
