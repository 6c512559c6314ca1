use std::io::ErrorKind;
use std::path::PathBuf;

/// Errors that can occur in endpoint transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to create the named FIFO.
    #[error("failed to create fifo {path}: {source}")]
    CreateFifo {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to open the endpoint.
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The path exists but is not a FIFO.
    #[error("existing path is not a fifo: {path}")]
    NotAFifo { path: PathBuf },

    /// The readiness wait itself failed.
    #[error("readiness wait failed: {0}")]
    Poll(std::io::Error),

    /// An I/O error occurred on an open endpoint.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// True when the failure is expected to clear up on its own, e.g. the
    /// path vanished between create and open or no counterpart exists yet.
    pub fn is_transient(&self) -> bool {
        match self {
            TransportError::CreateFifo { source, .. }
            | TransportError::Open { source, .. }
            | TransportError::Poll(source)
            | TransportError::Io(source) => is_transient_io(source),
            TransportError::NotAFifo { .. } => false,
        }
    }
}

/// Classify an I/O error as transient for endpoint open/retry purposes.
pub fn is_transient_io(err: &std::io::Error) -> bool {
    if matches!(
        err.kind(),
        ErrorKind::NotFound | ErrorKind::WouldBlock | ErrorKind::Interrupted
    ) {
        return true;
    }
    #[cfg(unix)]
    if err.raw_os_error() == Some(libc::ENXIO) {
        return true;
    }
    false
}

pub type Result<T> = std::result::Result<T, TransportError>;
