//! Error taxonomy for extraction jobs.
//!
//! Fatal errors ([`PipelineError`]) abort a job after cleanup has run.
//! Upload failures are per-frame and live in
//! [`UploadResult`](super::jobs::UploadResult) instead. Cleanup failures
//! ([`CleanupError`]) are only ever recorded.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failure to retrieve the source video.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The locator is not something any fetcher understands.
    #[error("invalid source locator {locator:?}: {reason}")]
    InvalidLocator { locator: String, reason: String },

    /// A local source path does not exist.
    #[error("source not found: {0}")]
    NotFound(String),

    /// The remote answered with a non-success status.
    #[error("source fetch returned HTTP {status}")]
    Status { status: u16 },

    #[error("source fetch timed out")]
    Timeout,

    #[error("network error while fetching source: {0}")]
    Network(String),

    #[error("I/O error while writing source: {0}")]
    Io(#[from] io::Error),
}

impl FetchError {
    /// Whether a later attempt might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Timeout | FetchError::Network(_) => true,
            FetchError::Status { status } => *status >= 500,
            FetchError::InvalidLocator { .. } | FetchError::NotFound(_) | FetchError::Io(_) => {
                false
            }
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else if let Some(status) = err.status() {
            FetchError::Status {
                status: status.as_u16(),
            }
        } else {
            FetchError::Network(err.to_string())
        }
    }
}

/// Failure reported by a frame sampler.
#[derive(Debug, Error)]
pub enum SampleError {
    /// Malformed or unsupported container/codec.
    #[error("failed to decode source: {0}")]
    Decode(String),

    /// The source has a duration but nothing could be extracted from it.
    #[error("no frames extracted from a {duration_secs:.3}s source")]
    EmptyResult { duration_secs: f64 },

    #[error("sampling cancelled")]
    Cancelled,

    #[error("I/O error while sampling: {0}")]
    Io(#[from] io::Error),

    #[error("failed to encode frame: {0}")]
    Image(#[from] image::ImageError),
}

impl From<ffmpeg_next::Error> for SampleError {
    fn from(err: ffmpeg_next::Error) -> Self {
        SampleError::Decode(err.to_string())
    }
}

/// Fatal job error. Any of these ends the job after cleanup.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid job request: {0}")]
    InvalidConfig(String),

    #[error("failed to create job workspace: {0}")]
    Workspace(#[source] io::Error),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("decode failed: {0}")]
    Decode(String),

    #[error("no frames extracted from a {duration_secs:.3}s source")]
    EmptyResult { duration_secs: f64 },

    #[error("job cancelled")]
    Cancelled,
}

impl From<SampleError> for PipelineError {
    fn from(err: SampleError) -> Self {
        match err {
            SampleError::EmptyResult { duration_secs } => PipelineError::EmptyResult { duration_secs },
            SampleError::Cancelled => PipelineError::Cancelled,
            SampleError::Decode(reason) => PipelineError::Decode(reason),
            other => PipelineError::Decode(other.to_string()),
        }
    }
}

/// Cleanup failure. Logged and reported, never fatal.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CleanupError {
    #[error("failed to remove workspace {path:?}: {reason}")]
    Workspace { path: PathBuf, reason: String },

    #[error("failed to delete source {locator}: {reason}")]
    SourceDelete { locator: String, reason: String },
}
