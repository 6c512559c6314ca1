use std::fmt;
use std::io;

use framemux_core::MuxError;
use framemux_frame::FrameError;
use framemux_transport::TransportError;

// Exit codes follow sysexits-style semantics.
pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const HEALTH_CHECK_FAILED: i32 = 30;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::BrokenPipe => FAILURE,
        io::ErrorKind::NotFound => DATA_INVALID,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

/// Transient endpoint failures mean nobody holds the FIFO open for reading.
pub fn transport_error(context: &str, err: TransportError) -> CliError {
    if err.is_transient() {
        return CliError::new(
            TRANSPORT_ERROR,
            format!("{context}: {err} (is a multiplexer running?)"),
        );
    }
    match err {
        TransportError::Open { source, .. }
        | TransportError::CreateFifo { source, .. }
        | TransportError::Poll(source)
        | TransportError::Io(source) => io_error(context, source),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::FrameTooLarge { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        FrameError::WriteTimeout(_) => CliError::new(TIMEOUT, format!("{context}: {err}")),
        FrameError::ConnectionClosed => CliError::new(FAILURE, format!("{context}: {err}")),
    }
}

pub fn mux_error(context: &str, err: MuxError) -> CliError {
    match err {
        MuxError::InvalidConfig(_) => CliError::new(USAGE, format!("{context}: {err}")),
        MuxError::Fallback { .. } => CliError::new(DATA_INVALID, format!("{context}: {err}")),
        MuxError::Sink(_) => CliError::new(FAILURE, format!("{context}: {err}")),
        MuxError::Transport(err) => transport_error(context, err),
    }
}
