//! Error types for gotcha.
//!
//! [`Error`] is fatal: the run stops and the process exits non-zero.
//! [`RecognitionError`] is recoverable: the [`crate::Solver`] logs it and
//! resolves the captcha to an empty answer.

use std::path::PathBuf;
use thiserror::Error;

/// Fatal errors. These propagate unmodified to the process boundary.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Captcha image not found: '{path}'")]
    InputNotFound { path: PathBuf },

    #[error("Failed to decode captcha image '{path}': {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// The debug image could not be written, so the output codec itself is broken.
    #[error("Failed to write debug image '{path}': {detail}")]
    DebugImageWrite { path: PathBuf, detail: String },

    #[error("Failed to write output file '{path}': {source}")]
    OutputWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to load recognition backend: {0}")]
    BackendLoad(#[source] RecognitionError),

    #[error("Invalid transform recipe '{path}': {detail}")]
    Recipe { path: PathBuf, detail: String },
}

/// A failed recognition attempt.
///
/// Every variant is recovered at the solver boundary. `Load` is the exception
/// when it happens while the backend is built up front, in which case the
/// driver wraps it in [`Error::BackendLoad`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RecognitionError {
    #[error("model artifact '{path}' could not be loaded: {detail}")]
    Load { path: PathBuf, detail: String },

    #[error("could not build input tensor: {0}")]
    Encode(String),

    #[error("model execution failed: {0}")]
    Execution(String),

    #[error("model produced unusable output: {0}")]
    MalformedOutput(String),

    #[error("raster has zero area ({width}x{height})")]
    EmptyRaster { width: u32, height: u32 },

    #[error("backend did not answer within {0:?}")]
    Timeout(std::time::Duration),

    #[error("backend worker exited without an answer")]
    WorkerPanicked,
}

impl RecognitionError {
    /// Short stable name used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            RecognitionError::Load { .. } => "load",
            RecognitionError::Encode(_) => "encode",
            RecognitionError::Execution(_) => "execution",
            RecognitionError::MalformedOutput(_) => "malformed_output",
            RecognitionError::EmptyRaster { .. } => "empty_raster",
            RecognitionError::Timeout(_) => "timeout",
            RecognitionError::WorkerPanicked => "worker_panicked",
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
