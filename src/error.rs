use thiserror::Error;

/// Outcome classification for a single generation request. Cancellation and
/// an empty footage search are reported to the client with fixed messages;
/// everything else carries the underlying cause.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Video generation was cancelled.")]
    Cancelled,

    #[error("No videos found to download.")]
    NoFootage,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
