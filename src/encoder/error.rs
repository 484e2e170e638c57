use thiserror::Error;

/// Errors that can occur while clustering histograms.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EncodeError {
    /// A buffer size computation overflowed or an allocation was refused.
    #[error("Out of memory")]
    OutOfMemory,

    /// Inconsistent configuration or mismatched buffer sizes.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(&'static str),

    /// The progress callback requested an abort.
    #[error("Encoding aborted by caller")]
    UserAbort,

    /// Encoding was cancelled via a [`enough::Stop`] token.
    #[error("Encoding cancelled: {0}")]
    Cancelled(enough::StopReason),
}

impl From<enough::StopReason> for EncodeError {
    fn from(reason: enough::StopReason) -> Self {
        Self::Cancelled(reason)
    }
}
