use thiserror::Error;

/// Errors that can occur while running the frame-reconstruction pipeline.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DecodeError {
    /// The bitstream was somehow corrupt, or the alpha plane failed to
    /// decode mid-frame.
    #[error("Corrupt bitstream")]
    BitStreamError,

    /// A buffer size computation overflowed, or a required allocation was
    /// rejected by the configured limits.
    #[error("Out of memory")]
    OutOfMemory,

    /// The output sink rejected the frame during setup.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(&'static str),

    /// Decoding was cancelled via a [`enough::Stop`] token.
    #[error("Decoding cancelled: {0}")]
    Cancelled(enough::StopReason),
}

impl From<enough::StopReason> for DecodeError {
    fn from(reason: enough::StopReason) -> Self {
        Self::Cancelled(reason)
    }
}
