use std::time::Duration;

use thiserror::Error;

/// Failures that abort a whole analysis run.
///
/// Per-frame detection misses and a flat motion signal are not errors; they
/// degrade to `None` landmarks / metrics and the fixed-ratio phase fallback.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The video could not be opened, seeked or decoded.
    #[error("failed to decode video: {0}")]
    Decode(String),

    /// A landmark model could not be downloaded or loaded.
    #[error("landmark model unavailable: {0}")]
    ModelUnavailable(String),

    /// The external frame-extraction process exceeded its deadline.
    #[error("frame extraction timed out after {0:?}")]
    ExtractionTimeout(Duration),

    /// Caller-supplied parameters are unusable (empty window, bad handedness, ...).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    pub fn model_unavailable(msg: impl Into<String>) -> Self {
        Self::ModelUnavailable(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Stable code the calling application can persist or branch on.
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::Decode(_) => "decode_error",
            Self::ModelUnavailable(_) => "model_unavailable",
            Self::ExtractionTimeout(_) => "extraction_timeout",
            Self::InvalidInput(_) => "invalid_input",
            Self::Io(_) => "io_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
