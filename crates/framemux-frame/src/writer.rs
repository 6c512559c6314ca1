use std::io::{ErrorKind, Write};
use std::os::fd::AsFd;

use framemux_transport::{wait_writable, TransportError};

use crate::codec::{Frame, FrameConfig};
use crate::error::{FrameError, Result};

/// Writes raw frames back to back to a non-blocking sink.
///
/// Frames carry their own start/end markers, so nothing is added between
/// them. When the sink pushes back, each wait for writability is bounded by
/// [`FrameConfig::write_timeout`]; running out of that budget is an error the
/// caller should treat as a dead consumer.
pub struct FrameWriter<T> {
    inner: T,
    config: FrameConfig,
}

impl<T: Write + AsFd> FrameWriter<T> {
    /// Create a new frame writer with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame writer with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self { inner, config }
    }

    /// Write a complete frame.
    pub fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        self.write_raw(frame.payload.as_ref())
    }

    /// Write raw bytes, waiting out backpressure within the configured bound.
    pub fn write_raw(&mut self, data: &[u8]) -> Result<()> {
        let mut offset = 0usize;
        while offset < data.len() {
            match self.inner.write(&data[offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => self.wait_writable()?,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        self.flush()
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => self.wait_writable()?,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    fn wait_writable(&self) -> Result<()> {
        let timeout = self.config.write_timeout;
        match wait_writable(self.inner.as_fd(), timeout) {
            Ok(true) => Ok(()),
            Ok(false) => Err(FrameError::WriteTimeout(timeout)),
            Err(err) => Err(transport_to_frame_error(err)),
        }
    }
}

fn transport_to_frame_error(err: TransportError) -> FrameError {
    match err {
        TransportError::Io(io) | TransportError::Poll(io) => FrameError::Io(io),
        TransportError::Open { source, .. } | TransportError::CreateFifo { source, .. } => {
            FrameError::Io(source)
        }
        other => FrameError::Io(std::io::Error::other(other.to_string())),
    }
}
