use std::fmt;
use std::io::{ErrorKind, Read};
use std::os::fd::{AsFd, BorrowedFd};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use framemux_frame::BoundedBuf;
use framemux_transport::FifoEndpoint;
use tracing::{debug, info, warn};

use crate::input::open_endpoint;

/// Capacity of the control line buffer.
pub const CONTROL_BUFFER_SIZE: usize = 4096;

/// A command accepted on the control endpoint.
///
/// Wire format is one command per newline-terminated line:
/// `select N`, `fallback`, `auto` or `status`. `source N` and `testcard` are
/// accepted as older spellings of `select N` and `fallback`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    /// Forward channel N only.
    Select(usize),
    /// Forward the fallback asset only.
    Fallback,
    /// Forward the highest-index channel with a fresh frame.
    Auto,
    /// Log mode and channel state.
    Status,
}

/// Why a control line was not understood.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseCommandError {
    #[error("empty command")]
    Empty,
    #[error("invalid channel index in {0:?}")]
    InvalidIndex(String),
    #[error("unknown command {0:?}")]
    Unknown(String),
}

impl FromStr for ControlCommand {
    type Err = ParseCommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        if line.is_empty() {
            return Err(ParseCommandError::Empty);
        }

        match line {
            "fallback" | "testcard" => return Ok(ControlCommand::Fallback),
            "auto" => return Ok(ControlCommand::Auto),
            "status" => return Ok(ControlCommand::Status),
            _ => {}
        }

        let (verb, arg) = line
            .split_once(char::is_whitespace)
            .unwrap_or((line, ""));
        match verb {
            "select" | "source" => arg
                .trim()
                .parse::<usize>()
                .map(ControlCommand::Select)
                .map_err(|_| ParseCommandError::InvalidIndex(line.to_string())),
            _ => Err(ParseCommandError::Unknown(line.to_string())),
        }
    }
}

impl fmt::Display for ControlCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlCommand::Select(index) => write!(f, "select {index}"),
            ControlCommand::Fallback => f.write_str("fallback"),
            ControlCommand::Auto => f.write_str("auto"),
            ControlCommand::Status => f.write_str("status"),
        }
    }
}

/// Splits a non-blocking byte stream into text lines.
///
/// An incomplete trailing line is kept until its newline arrives. A line
/// that would overflow the buffer is discarded.
pub struct LineReader<T> {
    inner: T,
    buf: BoundedBuf,
}

impl<T: Read> LineReader<T> {
    pub fn new(inner: T) -> Self {
        Self::with_capacity(inner, CONTROL_BUFFER_SIZE)
    }

    /// A `capacity` of zero is raised to one byte so input always drains.
    pub fn with_capacity(inner: T, capacity: usize) -> Self {
        Self {
            inner,
            buf: BoundedBuf::new(capacity.max(1)),
        }
    }

    /// Read everything currently available and return the complete lines,
    /// without their terminators.
    pub fn read_lines(&mut self) -> std::io::Result<Vec<String>> {
        let mut lines = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            match self.inner.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => self.push(&chunk[..n], &mut lines),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => break,
                Err(err) => {
                    if lines.is_empty() {
                        return Err(err);
                    }
                    warn!(error = %err, "control read failed after partial input");
                    break;
                }
            }
        }
        Ok(lines)
    }

    fn push(&mut self, mut data: &[u8], lines: &mut Vec<String>) {
        while !data.is_empty() {
            let taken = self.buf.append(data);
            data = &data[taken..];
            self.split_lines(lines);
            if self.buf.is_full() {
                warn!(
                    discarded = self.buf.len(),
                    "control line exceeds buffer; discarding"
                );
                self.buf.clear();
            }
        }
    }

    fn split_lines(&mut self, lines: &mut Vec<String>) {
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line = self.buf.split_to(pos + 1);
            lines.push(String::from_utf8_lossy(&line[..pos]).into_owned());
        }
    }

    pub fn get_ref(&self) -> &T {
        &self.inner
    }
}

/// The single operator command endpoint.
pub struct ControlChannel {
    path: PathBuf,
    reader: Option<LineReader<FifoEndpoint>>,
    open_failure: Option<String>,
}

impl ControlChannel {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            reader: None,
            open_failure: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_open(&self) -> bool {
        self.reader.is_some()
    }

    /// Open the endpoint if it is not open yet. Returns whether it is open.
    pub fn ensure_open(&mut self) -> bool {
        if self.reader.is_some() {
            return true;
        }
        match open_endpoint(&self.path, "control", &mut self.open_failure) {
            Some(endpoint) => {
                info!(path = ?self.path, "control channel open");
                self.reader = Some(LineReader::new(endpoint));
                true
            }
            None => false,
        }
    }

    pub fn as_fd(&self) -> Option<BorrowedFd<'_>> {
        self.reader.as_ref().map(|r| r.get_ref().as_fd())
    }

    /// Read pending input and return the commands it contains.
    ///
    /// Blank lines are skipped; malformed lines are logged and dropped.
    pub fn read_commands(&mut self) -> Vec<ControlCommand> {
        let Some(reader) = self.reader.as_mut() else {
            return Vec::new();
        };
        let lines = match reader.read_lines() {
            Ok(lines) => lines,
            Err(err) => {
                warn!(path = ?self.path, error = %err, "control read failed");
                return Vec::new();
            }
        };

        lines
            .iter()
            .filter_map(|line| match line.parse::<ControlCommand>() {
                Ok(command) => {
                    debug!(%command, "control command");
                    Some(command)
                }
                Err(ParseCommandError::Empty) => None,
                Err(err) => {
                    warn!(error = %err, "ignoring control input");
                    None
                }
            })
            .collect()
    }
}

impl fmt::Debug for ControlChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlChannel")
            .field("path", &self.path)
            .field("open", &self.is_open())
            .finish()
    }
}
