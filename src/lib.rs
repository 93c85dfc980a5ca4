//! SGC client - a CLI for submitting media to an SGC transcription cluster
//!
//! This library wraps the remote SGC API (job submission, status polling,
//! transcript retrieval) and the local glue around it: credential storage,
//! manifest expansion via yt-dlp, and ffmpeg-based audio normalization.

pub mod cli;
pub mod client;
pub mod config;
pub mod output;
pub mod resolver;
pub mod transcoder;
pub mod transcribe;

pub use cli::{Cli, Commands, OutputFormat};
pub use client::{ServiceClient, Transcript};
pub use config::Config;
pub use transcribe::{JobPoller, TranscriptionPipeline};

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, SgcError>;

/// Error taxonomy for the SGC client
#[derive(thiserror::Error, Debug)]
pub enum SgcError {
    /// Missing or rejected credentials
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Malformed input to a submission call
    #[error("invalid request: {0}")]
    Validation(String),

    /// Network or HTTP-level failure talking to the cluster
    #[error("transport error: {0}")]
    Transport(String),

    /// Unknown job or source
    #[error("not found: {0}")]
    NotFound(String),

    /// Transcript retrieval attempted before the job completed
    #[error("transcript not ready for job {0}")]
    NotReady(String),

    /// Status regression or malformed payload from the cluster
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// The cluster reported the job as failed
    #[error("job {0} failed on the cluster")]
    JobFailed(String),

    /// Polling exceeded its wall-clock bound
    #[error("timed out after {0} seconds waiting for job completion")]
    Timeout(u64),

    /// Polling was cancelled; the remote job keeps running
    #[error("polling cancelled by user")]
    Cancelled,

    /// ffmpeg is missing or exited with an error
    #[error("transcoder unavailable: {0}")]
    TranscoderUnavailable(String),

    /// Channel/playlist expansion failed
    #[error("URL resolution failed: {0}")]
    Resolver(String),

    /// Local file I/O failure
    #[error("file operation failed: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for SgcError {
    fn from(e: reqwest::Error) -> Self {
        SgcError::Transport(e.to_string())
    }
}
