use std::time::Duration;

/// Errors that can occur while reading or writing frames.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// A frame exceeds the configured maximum size.
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// The sink stayed unwritable for longer than the configured wait.
    #[error("sink not writable within {0:?}")]
    WriteTimeout(Duration),

    /// The sink accepted zero bytes; the consumer is gone.
    #[error("connection closed (sink accepted no bytes)")]
    ConnectionClosed,

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FrameError>;
