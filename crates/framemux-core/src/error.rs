use std::path::PathBuf;

/// Errors that can stop or prevent a multiplexer run.
#[derive(Debug, thiserror::Error)]
pub enum MuxError {
    /// The configuration is unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The fallback asset could not be read.
    #[error("failed to load fallback asset {path}: {source}")]
    Fallback {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Writing to the output sink failed past the retry window.
    #[error("output sink failed: {0}")]
    Sink(#[source] framemux_frame::FrameError),

    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] framemux_transport::TransportError),
}

pub type Result<T> = std::result::Result<T, MuxError>;
