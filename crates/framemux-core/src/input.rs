use std::os::fd::{AsFd, BorrowedFd};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use framemux_frame::{Frame, FrameConfig, FrameReader};
use framemux_transport::{FifoEndpoint, TransportError};
use tracing::{debug, info, trace, warn};

/// The most recent complete frame seen on a channel.
#[derive(Debug, Clone)]
pub struct LatestFrame {
    pub frame: Frame,
    pub received_at: Instant,
}

impl LatestFrame {
    /// Age of the frame at `now`.
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.received_at)
    }

    /// Non-empty and younger than `stale_timeout` at `now`.
    pub fn is_fresh(&self, now: Instant, stale_timeout: Duration) -> bool {
        !self.frame.is_empty() && self.age(now) < stale_timeout
    }
}

/// One producer's endpoint plus the newest frame it delivered.
///
/// The endpoint is opened lazily by [`ensure_open`](Self::ensure_open) and then
/// kept for the life of the channel.
pub struct InputChannel {
    index: usize,
    path: PathBuf,
    frame_config: FrameConfig,
    reader: Option<FrameReader<FifoEndpoint>>,
    latest: Option<LatestFrame>,
    open_failure: Option<String>,
}

impl InputChannel {
    pub fn new(index: usize, path: impl Into<PathBuf>, frame_config: FrameConfig) -> Self {
        Self {
            index,
            path: path.into(),
            frame_config,
            reader: None,
            latest: None,
            open_failure: None,
        }
    }

    pub fn index(&self) -> usize {
        self.index
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
        let role = format!("input {}", self.index);
        match open_endpoint(&self.path, &role, &mut self.open_failure) {
            Some(endpoint) => {
                info!(channel = self.index, path = ?self.path, "input channel open");
                self.reader = Some(FrameReader::with_config(
                    endpoint,
                    self.frame_config.clone(),
                ));
                true
            }
            None => false,
        }
    }

    /// Descriptor to wait on, if the endpoint is open.
    pub fn as_fd(&self) -> Option<BorrowedFd<'_>> {
        self.reader.as_ref().map(|r| r.get_ref().as_fd())
    }

    /// Drain available bytes and keep the newest complete frame they carry.
    ///
    /// Returns true if the latest frame was replaced. Read errors are logged
    /// and leave the channel open for the next attempt.
    pub fn drain(&mut self, now: Instant) -> bool {
        let Some(reader) = self.reader.as_mut() else {
            return false;
        };
        match reader.read_latest() {
            Ok(Some(frame)) => {
                trace!(channel = self.index, size = frame.len(), "frame received");
                self.store_frame(frame, now);
                true
            }
            Ok(None) => false,
            Err(err) => {
                warn!(channel = self.index, error = %err, "input read failed");
                false
            }
        }
    }

    /// Replace the latest frame wholesale.
    pub fn store_frame(&mut self, frame: Frame, received_at: Instant) {
        self.latest = Some(LatestFrame { frame, received_at });
    }

    pub fn latest(&self) -> Option<&LatestFrame> {
        self.latest.as_ref()
    }

    /// The latest frame if it is still fresh at `now`.
    pub fn fresh_frame(&self, now: Instant, stale_timeout: Duration) -> Option<&Frame> {
        self.latest
            .as_ref()
            .filter(|latest| latest.is_fresh(now, stale_timeout))
            .map(|latest| &latest.frame)
    }
}

impl std::fmt::Debug for InputChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputChannel")
            .field("index", &self.index)
            .field("path", &self.path)
            .field("open", &self.is_open())
            .field("latest_size", &self.latest.as_ref().map(|l| l.frame.len()))
            .finish()
    }
}

/// Try to create and open a FIFO endpoint.
///
/// Transient failures stay at debug level. Other failures are logged as
/// warnings once per distinct error, tracked in `last_failure`, so an
/// endpoint that stays broken does not flood the log on every iteration.
pub(crate) fn open_endpoint(
    path: &Path,
    role: &str,
    last_failure: &mut Option<String>,
) -> Option<FifoEndpoint> {
    match FifoEndpoint::open(path) {
        Ok(endpoint) => {
            *last_failure = None;
            Some(endpoint)
        }
        Err(err) => {
            log_open_failure(path, role, &err, last_failure);
            None
        }
    }
}

fn log_open_failure(
    path: &Path,
    role: &str,
    err: &TransportError,
    last_failure: &mut Option<String>,
) {
    if err.is_transient() {
        debug!(role, ?path, error = %err, "endpoint not available yet");
        return;
    }
    let message = err.to_string();
    if last_failure.as_deref() != Some(message.as_str()) {
        warn!(role, ?path, error = %err, "cannot open endpoint; will retry");
        *last_failure = Some(message);
    }
}
