use std::io;
use std::path::PathBuf;

use thiserror::Error as ThisError;

use crate::decode::DecodeError;
use crate::fetch::FetchError;
use crate::source::UsageError;

/// Errors that could occur while converting metrics to JSON.
#[derive(Debug, ThisError)]
pub enum Error {
    /// The command line was invalid.
    #[error(transparent)]
    Usage(#[from] UsageError),

    /// The input file could not be opened.
    #[error("error opening file {path:?}: {source}")]
    Open {
        /// File that was requested.
        path: PathBuf,
        /// Underlying failure.
        source: io::Error,
    },

    /// Creating the networking event loop did not succeed.
    #[error("failed to spawn Tokio runtime for fetching metrics: {0}")]
    Runtime(#[source] io::Error),

    /// Fetching from a URL failed.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// The exposition data could not be decoded.
    #[error("error reading metrics: {0}")]
    Decode(#[from] DecodeError),

    /// The acquisition thread could not be started.
    #[error("failed to spawn acquisition thread: {0}")]
    Spawn(#[source] io::Error),

    /// The acquisition thread panicked.
    #[error("acquisition thread panicked")]
    AcquisitionPanicked,

    /// The result could not be encoded as JSON.
    #[error("error marshaling JSON: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The result could not be written out.
    #[error("error writing to stdout: {0}")]
    Write(#[source] io::Error),
}

impl Error {
    /// Whether this error came from invalid command line usage.
    pub fn is_usage(&self) -> bool {
        matches!(self, Error::Usage(_))
    }

    /// Process exit code for this error: `2` for usage errors, `1` otherwise.
    pub fn exit_code(&self) -> i32 {
        if self.is_usage() {
            2
        } else {
            1
        }
    }
}
