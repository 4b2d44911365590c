//! Error types for platform power estimation

use thiserror::Error;

/// Errors raised while building or querying a platform power estimator
#[derive(Error, Debug)]
pub enum PowerModelError {
    /// The model artifact could not be downloaded
    #[error("failed to fetch model artifact from {location}: {reason}")]
    ArtifactFetch { location: String, reason: String },

    /// The model artifact could not be read from disk
    #[error("failed to read model artifact {location}: {source}")]
    ArtifactRead {
        location: String,
        #[source]
        source: std::io::Error,
    },

    /// The artifact checksum did not match the configured value
    #[error("checksum mismatch for {location}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        location: String,
        expected: String,
        actual: String,
    },

    /// The artifact was fetched but is not a usable model
    #[error("invalid model artifact: {0}")]
    InvalidArtifact(String),

    /// The artifact location uses a scheme we cannot load from
    #[error("unsupported artifact source: {0}")]
    UnsupportedSource(String),

    /// The backend failed while running the model
    #[error("inference failed: {0}")]
    Inference(String),

    /// An absolute prediction was requested with no feature row buffered
    #[error("no feature rows buffered for prediction")]
    EmptySampleBuffer,

    /// A feature row did not match the declared feature order
    #[error("feature row has {actual} values, expected {expected}")]
    FeatureWidthMismatch { expected: usize, actual: usize },

    /// The backend was queried before its artifacts were loaded
    #[error("estimator is not ready")]
    NotReady,
}

pub type Result<T> = std::result::Result<T, PowerModelError>;
