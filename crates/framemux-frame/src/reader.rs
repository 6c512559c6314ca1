use std::io::{ErrorKind, Read};

use tracing::debug;

use crate::buffer::BoundedBuf;
use crate::codec::{extract_latest, Frame, FrameConfig};
use crate::error::{FrameError, Result};

const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Why [`FrameReader::fill`] stopped reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillStatus {
    /// The source has no more bytes right now.
    Drained,
    /// The receive buffer reached capacity.
    Full,
    /// The source reported end of stream.
    Closed,
}

/// Pulls raw bytes from a non-blocking `Read` source and keeps only the
/// newest complete frame.
///
/// The receive buffer is bounded by [`FrameConfig::buffer_capacity`]; when it
/// fills without a usable frame boundary the oldest half is discarded.
pub struct FrameReader<T> {
    inner: T,
    buf: BoundedBuf,
    config: FrameConfig,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BoundedBuf::new(config.buffer_capacity),
            config,
        }
    }

    /// Drain currently available bytes and return the newest frame they
    /// complete, if any.
    pub fn read_latest(&mut self) -> Result<Option<Frame>> {
        self.fill()?;
        Ok(self.extract_buffered())
    }

    /// Read until the source would block, closes, or the buffer is full.
    pub fn fill(&mut self) -> Result<FillStatus> {
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            let room = self.buf.remaining();
            if room == 0 {
                return Ok(FillStatus::Full);
            }

            let want = room.min(chunk.len());
            match self.inner.read(&mut chunk[..want]) {
                Ok(0) => return Ok(FillStatus::Closed),
                Ok(n) => {
                    self.buf.append(&chunk[..n]);
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => {
                    return Ok(FillStatus::Drained)
                }
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Run extraction over the buffered bytes.
    ///
    /// On success everything up to the end of the returned frame is dropped
    /// from the buffer. Without a frame, a full buffer is compacted.
    pub fn extract_buffered(&mut self) -> Option<Frame> {
        match extract_latest(&self.buf, self.config.max_frame_size) {
            Some(extraction) => {
                let head = self.buf.split_to(extraction.consumed).freeze();
                Some(Frame::new(head.slice(extraction.frame)))
            }
            None => {
                if self.buf.is_full() {
                    let dropped = self.buf.compact();
                    debug!(dropped, "receive buffer full without a frame; compacted");
                }
                None
            }
        }
    }

    /// Number of bytes waiting in the receive buffer.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Write};

    use super::*;
    use crate::codec::{END_MARKER, START_MARKER};

    fn jpeg(body: &[u8]) -> Vec<u8> {
        let mut out = START_MARKER.to_vec();
        out.extend_from_slice(body);
        out.extend_from_slice(&END_MARKER);
        out
    }

    fn small_config(capacity: usize) -> FrameConfig {
        FrameConfig {
            max_frame_size: capacity / 2,
            buffer_capacity: capacity,
            ..FrameConfig::default()
        }
    }

    #[test]
    fn read_single_frame() {
        let mut reader = FrameReader::new(Cursor::new(jpeg(b"hello")));
        let frame = reader.read_latest().unwrap().unwrap();

        assert_eq!(frame.payload.as_ref(), jpeg(b"hello").as_slice());
        assert_eq!(reader.buffered(), 0);
    }

    #[test]
    fn only_newest_of_several_frames_is_kept() {
        let mut wire = jpeg(b"one");
        wire.extend(jpeg(b"two"));
        wire.extend(jpeg(b"three"));

        let mut reader = FrameReader::new(Cursor::new(wire));
        let frame = reader.read_latest().unwrap().unwrap();

        assert_eq!(frame.payload.as_ref(), jpeg(b"three").as_slice());
        assert_eq!(reader.buffered(), 0);
        assert_eq!(reader.read_latest().unwrap(), None);
    }

    #[test]
    fn partial_frame_waits_for_more_bytes() {
        let full = jpeg(b"split across reads");
        let (first, second) = full.split_at(7);

        let (mut tx, rx) = std::os::unix::net::UnixStream::pair().unwrap();
        rx.set_nonblocking(true).unwrap();
        let mut reader = FrameReader::new(rx);

        tx.write_all(first).unwrap();
        assert_eq!(reader.read_latest().unwrap(), None);
        assert_eq!(reader.buffered(), first.len());

        tx.write_all(second).unwrap();
        let frame = reader.read_latest().unwrap().unwrap();
        assert_eq!(frame.payload.as_ref(), full.as_slice());
    }

    #[test]
    fn byte_by_byte_source() {
        let reader = ByteByByteReader {
            bytes: jpeg(b"slow"),
            pos: 0,
        };
        let mut framed = FrameReader::new(reader);
        let frame = framed.read_latest().unwrap().unwrap();
        assert_eq!(frame.payload.as_ref(), jpeg(b"slow").as_slice());
    }

    #[test]
    fn full_buffer_without_boundary_is_compacted() {
        let mut reader = FrameReader::with_config(Cursor::new(vec![0x11; 1000]), small_config(64));

        assert_eq!(reader.fill().unwrap(), FillStatus::Full);
        assert_eq!(reader.extract_buffered(), None);
        assert!(reader.buffered() <= 32);

        // Scanning resumes and a frame arriving later is still found.
        let mut reader = FrameReader::with_config(
            Cursor::new({
                let mut wire = vec![0x11; 100];
                wire.extend(jpeg(b"late"));
                wire
            }),
            small_config(64),
        );
        let mut found = None;
        for _ in 0..16 {
            if let Some(frame) = reader.read_latest().unwrap() {
                found = Some(frame);
                break;
            }
        }
        assert_eq!(found.unwrap().payload.as_ref(), jpeg(b"late").as_slice());
    }

    #[test]
    fn unterminated_start_marker_leaves_buffer_untouched() {
        let mut wire = START_MARKER.to_vec();
        wire.extend_from_slice(b"no end yet");
        let mut reader = FrameReader::new(Cursor::new(wire.clone()));

        assert_eq!(reader.read_latest().unwrap(), None);
        assert_eq!(reader.buffered(), wire.len());
    }

    #[test]
    fn oversized_frame_is_dropped() {
        let mut reader =
            FrameReader::with_config(Cursor::new(jpeg(&[0xAB; 40])), small_config(64));
        assert_eq!(reader.read_latest().unwrap(), None);
    }

    #[test]
    fn would_block_ends_fill_without_error() {
        let reader = WouldBlockAfterData {
            bytes: jpeg(b"ok"),
            done: false,
        };
        let mut framed = FrameReader::new(reader);
        assert_eq!(framed.fill().unwrap(), FillStatus::Drained);
        assert_eq!(framed.extract_buffered().unwrap().len(), 6);
    }

    #[test]
    fn interrupted_read_retries() {
        let reader = InterruptedThenData {
            state: 0,
            bytes: jpeg(b"ok"),
            pos: 0,
        };
        let mut framed = FrameReader::new(reader);
        let frame = framed.read_latest().unwrap().unwrap();
        assert_eq!(frame.payload.as_ref(), jpeg(b"ok").as_slice());
    }

    #[test]
    fn hard_read_error_propagates() {
        let mut framed = FrameReader::new(FailingReader);
        let err = framed.read_latest().unwrap_err();
        assert!(matches!(err, FrameError::Io(e) if e.kind() == ErrorKind::PermissionDenied));
    }

    #[test]
    fn get_ref_tracks_source_position() {
        let wire = jpeg(b"ok");
        let mut reader = FrameReader::new(Cursor::new(wire.clone()));
        assert_eq!(reader.get_ref().position(), 0);

        reader.read_latest().unwrap().unwrap();
        assert_eq!(reader.get_ref().position(), wire.len() as u64);
        assert_eq!(reader.buffered(), 0);
    }

    struct ByteByByteReader {
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for ByteByByteReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.pos >= self.bytes.len() || buf.is_empty() {
                return Ok(0);
            }
            buf[0] = self.bytes[self.pos];
            self.pos += 1;
            Ok(1)
        }
    }

    struct WouldBlockAfterData {
        bytes: Vec<u8>,
        done: bool,
    }

    impl Read for WouldBlockAfterData {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.done {
                return Err(std::io::Error::from(ErrorKind::WouldBlock));
            }
            self.done = true;
            let n = self.bytes.len().min(buf.len());
            buf[..n].copy_from_slice(&self.bytes[..n]);
            Ok(n)
        }
    }

    struct InterruptedThenData {
        state: u8,
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for InterruptedThenData {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.state == 0 {
                self.state = 1;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            if self.pos >= self.bytes.len() {
                return Ok(0);
            }
            let remaining = self.bytes.len() - self.pos;
            let n = remaining.min(buf.len());
            buf[..n].copy_from_slice(&self.bytes[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    struct FailingReader;

    impl Read for FailingReader {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::from(ErrorKind::PermissionDenied))
        }
    }
}
