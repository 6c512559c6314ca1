//! Frame boundary extraction and output for framemux.
//!
//! Producers write compressed images back to back into a byte stream with no
//! length prefix. Each frame is self-delimited:
//! - A 2-byte start marker (`FF D8`, JPEG SOI)
//! - An opaque payload
//! - A 2-byte end marker (`FF D9`, JPEG EOI)
//!
//! Only the newest complete frame in a stream is ever interesting, so the
//! reader drops everything older as soon as a newer frame is delimited.

pub mod buffer;
pub mod codec;
pub mod error;
pub mod reader;
pub mod writer;

pub use buffer::BoundedBuf;
pub use codec::{
    check_frame_size, contains_frame, extract_latest, Extraction, Frame, FrameConfig, DEFAULT_MAX_FRAME_SIZE,
    DEFAULT_WRITE_TIMEOUT, END_MARKER, START_MARKER,
};
pub use error::{FrameError, Result};
pub use reader::{FillStatus, FrameReader};
pub use writer::FrameWriter;
