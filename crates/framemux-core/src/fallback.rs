use std::path::{Path, PathBuf};

use framemux_frame::{contains_frame, Frame};
use tracing::{info, warn};

use crate::error::{MuxError, Result};

/// The static frame emitted when no live channel qualifies.
///
/// Loaded once; immutable afterwards.
#[derive(Debug, Clone)]
pub struct FallbackAsset {
    frame: Frame,
    path: PathBuf,
}

impl FallbackAsset {
    /// Read the asset from disk.
    ///
    /// The bytes are used as-is. A file without a recognizable frame is still
    /// accepted, with a warning, since the consumer may know better.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let bytes = std::fs::read(&path).map_err(|source| MuxError::Fallback {
            path: path.clone(),
            source,
        })?;

        if !contains_frame(&bytes) {
            warn!(?path, size = bytes.len(), "fallback asset has no start/end markers");
        }
        info!(?path, size = bytes.len(), "loaded fallback asset");

        Ok(Self {
            frame: Frame::new(bytes),
            path,
        })
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.frame.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frame.is_empty()
    }
}
