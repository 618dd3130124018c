//! Reply codes and the error taxonomy shared by every provider entry point.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result alias used throughout the provider.
pub type ShellResult<T> = Result<T, ShellError>;

/// Definite reply code posted for every provider call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyCode {
    Ok,
    NotFound,
    AlreadyExists,
    NotSupported,
    InvalidParameter,
    ResourceExhausted,
    Failed,
}

/// Provider error.
///
/// One variant per non-`Ok` reply code. The error is `Clone` because the same
/// failure may be posted to a captured receive request and returned to the
/// caller that triggered it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShellError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("not supported: {0}")]
    NotSupported(String),
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),
    #[error("failed: {0}")]
    Failed(String),
}

impl ShellError {
    /// Reply code carried on the wire for this error.
    #[must_use]
    pub const fn code(&self) -> ReplyCode {
        match self {
            Self::NotFound(_) => ReplyCode::NotFound,
            Self::AlreadyExists(_) => ReplyCode::AlreadyExists,
            Self::NotSupported(_) => ReplyCode::NotSupported,
            Self::InvalidParameter(_) => ReplyCode::InvalidParameter,
            Self::ResourceExhausted(_) => ReplyCode::ResourceExhausted,
            Self::Failed(_) => ReplyCode::Failed,
        }
    }
}

/// Errors raised by the payload codecs.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("base64 output exceeds its {bound} byte bound")]
    EncodeOverflow { bound: usize },
    #[error("malformed base64 payload: {0}")]
    Decode(#[from] base64::DecodeSliceError),
    #[error("compressed chunk at offset {offset} is truncated")]
    ChunkTruncated { offset: usize },
    #[error("compressed chunk at offset {offset} overruns the {capacity} byte destination")]
    ChunkOverrun { offset: usize, capacity: usize },
    #[error("block compression failed: {0}")]
    Compress(String),
    #[error("block decompression failed: {0}")]
    Decompress(String),
    #[error("could not reserve {0} bytes")]
    Allocation(usize),
}

impl From<CodecError> for ShellError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Allocation(_) => Self::ResourceExhausted(err.to_string()),
            other => Self::Failed(other.to_string()),
        }
    }
}
