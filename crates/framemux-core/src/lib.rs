//! Stream multiplexing for framemux.
//!
//! Owns the N input channels, the control channel, the selection policy and
//! the paced output loop. A single [`Multiplexer`] value holds all state and is
//! driven from one thread; there is nothing to lock.

pub mod cancel;
pub mod config;
pub mod control;
pub mod error;
pub mod fallback;
pub mod input;
pub mod mux;
pub mod pacer;
pub mod selector;

pub use cancel::CancelToken;
pub use config::{
    MuxConfig, DEFAULT_CHANNELS, DEFAULT_CONTROL_PATH, DEFAULT_INPUT_PREFIX,
    DEFAULT_INPUT_SUFFIX, DEFAULT_REPORT_INTERVAL, DEFAULT_STALE_TIMEOUT, DEFAULT_TARGET_FPS,
    MAX_CHANNELS,
};
pub use control::{ControlChannel, ControlCommand, LineReader, ParseCommandError};
pub use error::{MuxError, Result};
pub use fallback::FallbackAsset;
pub use input::{InputChannel, LatestFrame};
pub use mux::Multiplexer;
pub use pacer::{Pacer, Throughput, ThroughputMeter};
pub use selector::{Mode, Selection, Selector, Source};
