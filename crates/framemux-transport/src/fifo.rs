use std::ffi::CString;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, RawFd};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::{FileTypeExt, OpenOptionsExt};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Result, TransportError};

/// Permission mode for FIFOs created by framemux (before umask).
pub const DEFAULT_FIFO_MODE: u32 = 0o666;

/// Make sure a FIFO exists at `path`, creating it if missing.
///
/// Idempotent. An existing FIFO is left alone; an existing path of any other
/// type is refused and never removed.
pub fn ensure_fifo(path: impl AsRef<Path>) -> Result<()> {
    ensure_fifo_with_mode(path, DEFAULT_FIFO_MODE)
}

/// Like [`ensure_fifo`] with an explicit creation mode.
pub fn ensure_fifo_with_mode(path: impl AsRef<Path>, mode: u32) -> Result<()> {
    let path = path.as_ref();

    match std::fs::metadata(path) {
        Ok(metadata) if metadata.file_type().is_fifo() => return Ok(()),
        Ok(_) => {
            return Err(TransportError::NotAFifo {
                path: path.to_path_buf(),
            })
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => {
            return Err(TransportError::CreateFifo {
                path: path.to_path_buf(),
                source: err,
            })
        }
    }

    let c_path = CString::new(path.as_os_str().as_bytes()).map_err(|_| {
        TransportError::CreateFifo {
            path: path.to_path_buf(),
            source: std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "path contains an interior nul byte",
            ),
        }
    })?;

    // SAFETY: `c_path` is a valid nul-terminated C string that outlives the call.
    let rc = unsafe { libc::mkfifo(c_path.as_ptr(), mode as libc::mode_t) };
    if rc != 0 {
        let err = std::io::Error::last_os_error();
        // Lost a creation race with another process; the FIFO is there now.
        if err.raw_os_error() == Some(libc::EEXIST) {
            return Ok(());
        }
        return Err(TransportError::CreateFifo {
            path: path.to_path_buf(),
            source: err,
        });
    }

    debug!(?path, "created fifo");
    Ok(())
}

/// An open, non-blocking named FIFO endpoint.
///
/// Readers open the FIFO read-write so the endpoint always holds a write
/// reference of its own: when the last external writer disconnects, the
/// descriptor does not enter a permanent hang-up state.
pub struct FifoEndpoint {
    file: File,
    path: PathBuf,
}

impl FifoEndpoint {
    /// Create the FIFO if needed and open it non-blocking, read-write.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        ensure_fifo(&path)?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(&path)
            .map_err(|e| TransportError::Open {
                path: path.clone(),
                source: e,
            })?;

        // The path may have been swapped between the check and the open.
        let metadata = file.metadata().map_err(|e| TransportError::Open {
            path: path.clone(),
            source: e,
        })?;
        if !metadata.file_type().is_fifo() {
            return Err(TransportError::NotAFifo { path });
        }

        debug!(?path, "opened fifo endpoint");
        Ok(Self { file, path })
    }

    /// Open an existing FIFO write-only, non-blocking.
    ///
    /// Fails with `ENXIO` (transient) when nobody has the FIFO open for reading,
    /// and never creates the path.
    pub fn open_writer(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let metadata = std::fs::metadata(&path).map_err(|e| TransportError::Open {
            path: path.clone(),
            source: e,
        })?;
        if !metadata.file_type().is_fifo() {
            return Err(TransportError::NotAFifo { path });
        }

        let file = OpenOptions::new()
            .write(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(&path)
            .map_err(|e| TransportError::Open {
                path: path.clone(),
                source: e,
            })?;

        debug!(?path, "opened fifo for writing");
        Ok(Self { file, path })
    }

    /// The filesystem path of this endpoint.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Read for FifoEndpoint {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.file.read(buf)
    }
}

impl Write for FifoEndpoint {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.file.flush()
    }
}

impl AsFd for FifoEndpoint {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.file.as_fd()
    }
}

impl AsRawFd for FifoEndpoint {
    fn as_raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}

impl std::fmt::Debug for FifoEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FifoEndpoint")
            .field("path", &self.path)
            .field("fd", &self.file.as_raw_fd())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::ErrorKind;

    fn test_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "framemux-fifo-{tag}-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn ensure_fifo_creates_and_is_idempotent() {
        let dir = test_dir("ensure");
        let path = dir.join("in-0.fifo");

        ensure_fifo(&path).unwrap();
        assert!(std::fs::metadata(&path).unwrap().file_type().is_fifo());

        ensure_fifo(&path).unwrap();
        assert!(std::fs::metadata(&path).unwrap().file_type().is_fifo());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn ensure_fifo_rejects_regular_file() {
        let dir = test_dir("regular");
        let path = dir.join("not-a-fifo");
        std::fs::write(&path, b"regular-file").unwrap();

        let result = ensure_fifo(&path);
        assert!(matches!(result, Err(TransportError::NotAFifo { .. })));
        assert_eq!(std::fs::read(&path).unwrap(), b"regular-file");

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn open_without_counterpart_succeeds() {
        let dir = test_dir("open");
        let path = dir.join("ctl.fifo");

        let mut endpoint = FifoEndpoint::open(&path).unwrap();
        assert_eq!(endpoint.path(), path.as_path());

        let mut buf = [0u8; 16];
        let err = endpoint.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::WouldBlock);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn writer_bytes_reach_endpoint() {
        let dir = test_dir("roundtrip");
        let path = dir.join("in-1.fifo");

        let mut reader = FifoEndpoint::open(&path).unwrap();
        let mut writer = FifoEndpoint::open_writer(&path).unwrap();
        writer.write_all(b"hello").unwrap();

        let mut buf = [0u8; 5];
        reader.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"hello");

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn writer_disconnect_does_not_hang_up_reader() {
        let dir = test_dir("hup");
        let path = dir.join("in-2.fifo");

        let mut reader = FifoEndpoint::open(&path).unwrap();
        {
            let mut writer = FifoEndpoint::open_writer(&path).unwrap();
            writer.write_all(b"x").unwrap();
        }

        let mut buf = [0u8; 4];
        assert_eq!(reader.read(&mut buf).unwrap(), 1);
        let err = reader.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::WouldBlock);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn open_writer_without_reader_is_transient() {
        let dir = test_dir("noreader");
        let path = dir.join("ctl.fifo");
        ensure_fifo(&path).unwrap();

        let err = FifoEndpoint::open_writer(&path).unwrap_err();
        assert!(err.is_transient());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn open_writer_does_not_create_path() {
        let dir = test_dir("nocreate");
        let path = dir.join("missing.fifo");

        let err = FifoEndpoint::open_writer(&path).unwrap_err();
        assert!(matches!(err, TransportError::Open { .. }));
        assert!(!path.exists());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
