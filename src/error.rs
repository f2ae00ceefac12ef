//! Error types for the texturegan library

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for this crate
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the library
#[derive(Error, Debug)]
pub enum Error {
    /// A checkpoint requested for restoration does not exist
    #[error("checkpoint not found: {}", path.display())]
    CheckpointNotFound { path: PathBuf },

    /// Image could not be decoded or encoded
    #[error("image error at {}: {source}", path.display())]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// Image is smaller than the minimum resize bound
    #[error("image {} is {width}x{height}, shorter side must be at least {min}", path.display())]
    ImageTooSmall {
        path: PathBuf,
        width: u32,
        height: u32,
        min: u32,
    },

    /// A sample is missing one of its paired files
    #[error("missing paired file {}", path.display())]
    MissingCounterpart { path: PathBuf },

    /// Dataset split contains no samples
    #[error("dataset split `{split}` under {} is empty", root.display())]
    EmptyDataset { split: String, root: PathBuf },

    /// Unknown feature layer name
    #[error("unknown feature layer `{0}`")]
    UnknownLayer(String),

    /// A loss term produced NaN or infinity
    #[error("non-finite {series} loss ({value}) at step {step}")]
    NonFiniteLoss {
        series: &'static str,
        value: f64,
        step: u64,
    },

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Visualisation sink failure
    #[error("visualisation sink: {0}")]
    Sink(String),

    /// Data loader worker stopped unexpectedly
    #[error("data loader worker disconnected")]
    LoaderDisconnected,

    /// Torch error
    #[error("torch error: {0}")]
    Tch(#[from] tch::TchError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// HTTP error talking to the dashboard
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl Error {
    /// Wrap an image crate error with the offending path
    pub fn image(path: impl Into<PathBuf>, source: image::ImageError) -> Self {
        Error::Image {
            path: path.into(),
            source,
        }
    }
}
