//! Error types for counter acquisition.

use std::io;

use thiserror::Error;

use crate::collector::pdh::PdhStatus;

/// Failure decoding a raw performance-data buffer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("read of {len} bytes at offset {offset} exceeds buffer of {available} bytes")]
    OutOfBounds {
        offset: usize,
        len: usize,
        available: usize,
    },
    #[error("invalid data block signature {0:?}, expected \"PERF\"")]
    BadSignature(String),
    #[error("{what} at offset {offset} has invalid length {length}")]
    BadLength {
        what: &'static str,
        offset: usize,
        length: u32,
    },
    #[error("object at offset {offset} declares {count} instances")]
    BadInstanceCount { offset: usize, count: i32 },
}

/// Failure constructing or collecting a single counter collector.
#[derive(Debug, Error)]
pub enum CollectError {
    #[error("object not found")]
    ObjectNotFound,
    #[error("counter {0:?} not found")]
    CounterNotFound(String),
    #[error("wildcard instance \"*\" is not supported by the query backend, expand instances first")]
    WildcardInstance,
    #[error("wildcard counter \"*\" is not supported by the query backend")]
    WildcardCounter,
    #[error("{0} backend is not available")]
    BackendUnavailable(&'static str),
    #[error("{call} failed: {status}")]
    Pdh {
        call: &'static str,
        status: PdhStatus,
    },
    #[error("failed to add counter {path}: {status}")]
    AddCounter { path: String, status: PdhStatus },
    #[error("failed to read counter info for {path}: {status}")]
    CounterInfo { path: String, status: PdhStatus },
    #[error("{path}: raw counter array still needs more data after re-probing")]
    ProtocolViolation { path: String },
    #[error("collector is closed")]
    Closed,
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("{}", join(.0))]
    Multiple(Vec<CollectError>),
}

impl CollectError {
    /// Collapses a list of errors; a single error is returned as is.
    pub fn from_many(mut errors: Vec<CollectError>) -> Self {
        if errors.len() == 1 {
            errors.remove(0)
        } else {
            CollectError::Multiple(errors)
        }
    }
}

fn join(errors: &[CollectError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// A [`CollectError`] attributed to the performance object it concerns.
#[derive(Debug, Error)]
#[error("{object}: {source}")]
pub struct ObjectError {
    pub object: String,
    #[source]
    pub source: CollectError,
}

impl ObjectError {
    pub fn new(object: impl Into<String>, source: CollectError) -> Self {
        Self {
            object: object.into(),
            source,
        }
    }
}
