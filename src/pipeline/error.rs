//! Error taxonomy for the pipeline stages.

use thiserror::Error;

use super::converter::ConversionError;

/// Errors surfaced by the job handlers.
///
/// Validation failures are terminal; everything else is eligible for
/// queue-level retry with backoff.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no usable source URL on track")]
    NoSourceUrls,

    #[error("invalid job payload: {0}")]
    InvalidPayload(String),

    #[error("no source produced audio: {0}")]
    AllSourcesFailed(String),

    #[error("conversion failed: {0}")]
    Conversion(#[from] ConversionError),

    #[error("analysis failed: {0}")]
    Analysis(String),

    #[error("record store write failed: {0}")]
    Storage(String),

    #[error("queue error: {0}")]
    Queue(String),
}

impl PipelineError {
    /// Validation failures fail fast; the rest go back through the queue's
    /// retry budget.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            PipelineError::NoSourceUrls | PipelineError::InvalidPayload(_)
        )
    }
}
