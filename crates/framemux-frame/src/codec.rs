use std::ops::Range;
use std::time::Duration;

use bytes::Bytes;
use tracing::trace;

use crate::error::{FrameError, Result};

/// Start-of-frame marker (JPEG SOI).
pub const START_MARKER: [u8; 2] = [0xFF, 0xD8];

/// End-of-frame marker (JPEG EOI).
pub const END_MARKER: [u8; 2] = [0xFF, 0xD9];

/// Default maximum frame size: 1 MiB.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Default bound on a single wait for the sink to become writable.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_millis(200);

/// One complete, self-delimited frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame bytes, start marker through end marker inclusive.
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// Result of scanning a buffer for frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    /// Span of the newest accepted frame.
    pub frame: Range<usize>,
    /// Offset where unconsumed bytes begin (the end of `frame`).
    pub consumed: usize,
}

/// Find the newest complete frame in `buf`.
///
/// Scans start marker by start marker, pairing each with the nearest
/// following end marker; later frames replace earlier ones. Scanning stops at
/// a start marker with no end marker after it, since that frame is still
/// arriving. Frames longer than `max_frame_size` are skipped over but never
/// returned.
///
/// Returns `None` if no acceptable frame is delimited yet, in which case
/// nothing in `buf` should be consumed.
pub fn extract_latest(buf: &[u8], max_frame_size: usize) -> Option<Extraction> {
    let mut best: Option<Range<usize>> = None;
    let mut pos = 0usize;

    while let Some(start) = find_marker(buf, pos, &START_MARKER) {
        let Some(end_at) = find_marker(buf, start + START_MARKER.len(), &END_MARKER) else {
            break;
        };
        let end = end_at + END_MARKER.len();

        if end - start <= max_frame_size {
            best = Some(start..end);
        } else {
            trace!(size = end - start, max = max_frame_size, "skipping oversized frame");
        }
        pos = end;
    }

    best.map(|frame| Extraction {
        consumed: frame.end,
        frame,
    })
}

/// True if `buf` holds at least one complete frame of any size.
pub fn contains_frame(buf: &[u8]) -> bool {
    extract_latest(buf, usize::MAX).is_some()
}

/// Reject a frame of `size` bytes if it is larger than `max_frame_size`.
pub fn check_frame_size(size: usize, max_frame_size: usize) -> Result<()> {
    if size > max_frame_size {
        return Err(FrameError::FrameTooLarge {
            size,
            max: max_frame_size,
        });
    }
    Ok(())
}

fn find_marker(buf: &[u8], from: usize, marker: &[u8; 2]) -> Option<usize> {
    buf.get(from..)?
        .windows(marker.len())
        .position(|window| window == marker)
        .map(|offset| from + offset)
}

/// Configuration for frame reading and writing.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Largest frame accepted from a producer. Default: 1 MiB.
    pub max_frame_size: usize,
    /// Receive buffer capacity. Default: twice `max_frame_size`.
    pub buffer_capacity: usize,
    /// Bound on each wait for the sink to drain. Default: 200 ms.
    pub write_timeout: Duration,
}

impl FrameConfig {
    /// Configuration for a given maximum frame size, with the receive
    /// buffer sized to hold two such frames.
    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self {
            max_frame_size,
            buffer_capacity: max_frame_size.saturating_mul(2),
            ..Self::default()
        }
    }
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            buffer_capacity: 2 * DEFAULT_MAX_FRAME_SIZE,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }
}
