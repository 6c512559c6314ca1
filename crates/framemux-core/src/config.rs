use std::path::PathBuf;
use std::time::Duration;

use framemux_frame::FrameConfig;

use crate::error::{MuxError, Result};

/// Upper bound on the number of input channels.
pub const MAX_CHANNELS: usize = 8;
pub const DEFAULT_CHANNELS: usize = 2;
pub const DEFAULT_TARGET_FPS: u32 = 10;
pub const DEFAULT_STALE_TIMEOUT: Duration = Duration::from_millis(500);
pub const DEFAULT_INPUT_PREFIX: &str = "/tmp/framemux-";
pub const DEFAULT_INPUT_SUFFIX: &str = ".fifo";
pub const DEFAULT_CONTROL_PATH: &str = "/tmp/framemux-ctl.fifo";
/// Length of the window over which output throughput is reported.
pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_secs(10);

const MAX_TARGET_FPS: u32 = 1000;

/// Startup configuration for a [`Multiplexer`](crate::Multiplexer).
#[derive(Debug, Clone)]
pub struct MuxConfig {
    /// Number of input channels, `1..=MAX_CHANNELS`.
    pub channel_count: usize,
    /// Input endpoints are `<input_prefix><index><input_suffix>`.
    pub input_prefix: String,
    pub input_suffix: String,
    pub control_path: PathBuf,
    /// Static frame emitted when no channel qualifies.
    pub fallback_path: Option<PathBuf>,
    /// Output frames per second.
    pub target_fps: u32,
    /// A channel's frame older than this is skipped by the selector.
    pub stale_timeout: Duration,
    pub frame: FrameConfig,
    pub report_interval: Duration,
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            channel_count: DEFAULT_CHANNELS,
            input_prefix: DEFAULT_INPUT_PREFIX.to_string(),
            input_suffix: DEFAULT_INPUT_SUFFIX.to_string(),
            control_path: PathBuf::from(DEFAULT_CONTROL_PATH),
            fallback_path: None,
            target_fps: DEFAULT_TARGET_FPS,
            stale_timeout: DEFAULT_STALE_TIMEOUT,
            frame: FrameConfig::default(),
            report_interval: DEFAULT_REPORT_INTERVAL,
        }
    }
}

impl MuxConfig {
    /// Endpoint path for input channel `index`.
    pub fn input_path(&self, index: usize) -> PathBuf {
        PathBuf::from(format!(
            "{}{}{}",
            self.input_prefix, index, self.input_suffix
        ))
    }

    /// Endpoint paths for every configured input channel, in index order.
    pub fn input_paths(&self) -> Vec<PathBuf> {
        (0..self.channel_count).map(|i| self.input_path(i)).collect()
    }

    /// Time between pacing ticks.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(1) / self.target_fps.max(1)
    }

    pub fn validate(&self) -> Result<()> {
        if self.channel_count == 0 || self.channel_count > MAX_CHANNELS {
            return Err(MuxError::InvalidConfig(format!(
                "channel count must be between 1 and {MAX_CHANNELS}, got {}",
                self.channel_count
            )));
        }
        if self.target_fps == 0 || self.target_fps > MAX_TARGET_FPS {
            return Err(MuxError::InvalidConfig(format!(
                "target fps must be between 1 and {MAX_TARGET_FPS}, got {}",
                self.target_fps
            )));
        }
        if self.stale_timeout.is_zero() {
            return Err(MuxError::InvalidConfig(
                "stale timeout must be greater than zero".to_string(),
            ));
        }
        if self.frame.max_frame_size < 4 {
            return Err(MuxError::InvalidConfig(format!(
                "max frame size must hold at least both markers, got {}",
                self.frame.max_frame_size
            )));
        }
        if self.frame.buffer_capacity < self.frame.max_frame_size {
            return Err(MuxError::InvalidConfig(format!(
                "receive buffer ({} bytes) smaller than max frame size ({} bytes)",
                self.frame.buffer_capacity, self.frame.max_frame_size
            )));
        }
        if self.report_interval.is_zero() {
            return Err(MuxError::InvalidConfig(
                "report interval must be greater than zero".to_string(),
            ));
        }
        let control = self.control_path.as_path();
        if self.input_paths().iter().any(|p| p.as_path() == control) {
            return Err(MuxError::InvalidConfig(format!(
                "control path {} collides with an input path",
                control.display()
            )));
        }
        Ok(())
    }
}
