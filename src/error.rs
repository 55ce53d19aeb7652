//! Error taxonomy for enrollment and verification
//!
//! Every failure a caller can see is a tagged variant, and every variant
//! maps onto one of three status classes so the surrounding service never
//! has to inspect message strings.

use serde::Serialize;
use std::io;
use thiserror::Error;

use crate::validation::ValidationError;

pub type Result<T, E = VoxgateError> = std::result::Result<T, E>;

/// Status class expected by callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Unknown identity
    NotFound,
    /// Decode, transcode, embedding or validation failure
    BadInput,
    /// Everything else
    Internal,
}

#[derive(Error, Debug)]
pub enum VoxgateError {
    #[error("Unsupported audio: {0}")]
    UnsupportedAudio(String),

    #[error("Transcoder failed: {0}")]
    TranscodeUtility(String),

    #[error("User not enrolled: {0}")]
    NotEnrolled(String),

    #[error(transparent)]
    InvalidInput(#[from] ValidationError),

    #[error("Embedding failed: {0}")]
    Embedding(String),

    #[error("Embedding oracle unavailable: {0}")]
    OracleInit(String),

    #[error("Embedding dimension mismatch: live={live}, stored={stored}")]
    DimensionMismatch { live: usize, stored: usize },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to serialize snapshot: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Resampling failed: {0}")]
    Resample(String),

    #[error("Worker failed: {0}")]
    Worker(String),
}

impl VoxgateError {
    /// Classify the error for status mapping
    pub fn class(&self) -> ErrorClass {
        match self {
            VoxgateError::NotEnrolled(_) => ErrorClass::NotFound,
            VoxgateError::UnsupportedAudio(_)
            | VoxgateError::TranscodeUtility(_)
            | VoxgateError::InvalidInput(_)
            | VoxgateError::Embedding(_) => ErrorClass::BadInput,
            VoxgateError::OracleInit(_)
            | VoxgateError::DimensionMismatch { .. }
            | VoxgateError::Io { .. }
            | VoxgateError::Serialize(_)
            | VoxgateError::Resample(_)
            | VoxgateError::Worker(_) => ErrorClass::Internal,
        }
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            VoxgateError::UnsupportedAudio(_) => "unsupported_audio",
            VoxgateError::TranscodeUtility(_) => "transcode_failed",
            VoxgateError::NotEnrolled(_) => "not_enrolled",
            VoxgateError::InvalidInput(_) => "invalid_input",
            VoxgateError::Embedding(_) => "embedding_failed",
            VoxgateError::OracleInit(_) => "oracle_unavailable",
            VoxgateError::DimensionMismatch { .. } => "dimension_mismatch",
            VoxgateError::Io { .. } => "io_error",
            VoxgateError::Serialize(_) => "store_serialize",
            VoxgateError::Resample(_) => "resample_failed",
            VoxgateError::Worker(_) => "worker_failed",
        }
    }

    pub(crate) fn io(context: impl Into<String>, source: io::Error) -> Self {
        VoxgateError::Io {
            context: context.into(),
            source,
        }
    }
}

/// Serializable error body for the command-line driver
#[derive(Debug, Clone, Serialize)]
pub struct ErrorReport {
    pub class: ErrorClass,
    pub code: String,
    pub message: String,
}

impl From<&VoxgateError> for ErrorReport {
    fn from(error: &VoxgateError) -> Self {
        Self {
            class: error.class(),
            code: error.code().to_string(),
            message: error.to_string(),
        }
    }
}
