//! Error taxonomy for the acquisition pipeline.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::models::Status;

/// Convenience alias used throughout the library.
pub type Result<T, E = PipelineError> = std::result::Result<T, E>;

/// Everything that can go wrong while acquiring an image.
///
/// None of these are fatal to the pipeline: a failing task is reported to its
/// requester and recycled, while the cache and other tasks carry on.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The asset or local file does not exist
    #[error("resource not found: {0}")]
    NotFound(PathBuf),

    /// Reading or writing a file failed
    #[error("I/O error on {path}: {source}")]
    Io {
        /// File involved in the failure
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// The HTTP transport failed before a response was available
    #[error("request to {url} failed: {message}")]
    Transport {
        /// Requested URL
        url: String,
        /// Transport error description
        message: String,
    },

    /// The server answered with a non-success status
    #[error("HTTP {status} from {url}")]
    Status {
        /// Requested URL
        url: String,
        /// Response status code
        status: u16,
    },

    /// The payload grew beyond the configured limit
    #[error("payload exceeds {limit} bytes")]
    TooLarge {
        /// Configured byte limit
        limit: usize,
    },

    /// The payload could not be decoded into pixels
    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),

    /// The task was cancelled while the operation was running
    #[error("operation cancelled")]
    Cancelled,

    /// A load or decode step panicked on a worker thread
    #[error("{stage} step panicked")]
    Panicked {
        /// Pipeline stage that panicked
        stage: &'static str,
    },

    /// A worker thread could not be started
    #[error("failed to spawn {pool} worker: {source}")]
    Spawn {
        /// Name of the pool being built
        pool: &'static str,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// A task was asked to move along an edge the state machine does not have
    #[error("invalid task transition from {from} to {to}")]
    InvalidTransition {
        /// Current state
        from: Status,
        /// Requested state
        to: Status,
    },
}

impl PipelineError {
    /// Wrap an I/O error with the path it happened on, folding
    /// `NotFound` into its own variant.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        let path = path.into();
        if source.kind() == io::ErrorKind::NotFound {
            Self::NotFound(path)
        } else {
            Self::Io { path, source }
        }
    }

    /// Whether the failure happened while decoding rather than downloading.
    pub const fn is_decode(&self) -> bool {
        matches!(self, Self::Decode(_))
    }

    /// Whether the failure is a cooperative cancellation.
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
