use std::any::Any;
use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("nothing found at location {location}")]
    NotFound { location: String },

    #[error("key {key} not found")]
    KeyNotFound { key: String },

    #[error("failed to decode {location} as {format}: {reason}")]
    Decode {
        location: String,
        format: &'static str,
        reason: String,
    },

    #[error("failed to encode record: {0}")]
    Encode(String),

    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("partition {partition} failed in superstep {superstep}: {reason}")]
    PartitionFailure {
        partition: usize,
        superstep: u64,
        reason: String,
    },

    #[error("value of key {key} is {found}, not {expected}")]
    TypeMismatch {
        key: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("memory key {key} was not declared by the program")]
    UndeclaredMemoryKey { key: String },

    #[error("computation was cancelled")]
    Cancelled,

    #[error("computation aborted: {0}")]
    Aborted(String),

    #[error("i/o error at {location}: {source}")]
    Io {
        location: String,
        #[source]
        source: io::Error,
    },
}

impl Error {
    pub(crate) fn io(location: impl ToString, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            return Error::NotFound {
                location: location.to_string(),
            };
        }
        Error::Io {
            location: location.to_string(),
            source,
        }
    }

    pub(crate) fn decode(location: impl ToString, format: &'static str, reason: impl ToString) -> Self {
        Error::Decode {
            location: location.to_string(),
            format,
            reason: reason.to_string(),
        }
    }

    pub(crate) fn configuration(reason: impl Into<String>) -> Self {
        Error::Configuration(reason.into())
    }

    /// A worker thread that panicked instead of returning.
    pub(crate) fn panicked(partition: usize, superstep: u64, panic: Box<dyn Any + Send>) -> Self {
        let reason = if let Some(reason) = panic.downcast_ref::<&str>() {
            format!("worker panicked: {}", reason)
        } else if let Some(reason) = panic.downcast_ref::<String>() {
            format!("worker panicked: {}", reason)
        } else {
            "worker panicked".to_string()
        };
        Error::PartitionFailure {
            partition,
            superstep,
            reason,
        }
    }
}
