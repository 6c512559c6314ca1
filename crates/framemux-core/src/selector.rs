use std::fmt;
use std::time::{Duration, Instant};

use framemux_frame::Frame;
use tracing::{info, warn};

use crate::control::ControlCommand;
use crate::fallback::FallbackAsset;
use crate::input::InputChannel;

/// Which source the selector forwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Highest-index channel with a fresh frame.
    #[default]
    Auto,
    /// One channel only, falling back when it is stale.
    Explicit(usize),
    /// The fallback asset only.
    Fallback,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Auto => f.write_str("auto"),
            Mode::Explicit(index) => write!(f, "explicit({index})"),
            Mode::Fallback => f.write_str("fallback"),
        }
    }
}

/// Where an emitted frame came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Channel(usize),
    Fallback,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Channel(index) => write!(f, "channel {index}"),
            Source::Fallback => f.write_str("fallback"),
        }
    }
}

/// The frame chosen for one tick.
#[derive(Debug, Clone)]
pub struct Selection {
    pub source: Source,
    pub frame: Frame,
}

/// Selection policy state.
///
/// The mode only changes through [`apply`](Self::apply); nothing moves it back
/// to [`Mode::Auto`] on its own.
#[derive(Debug, Clone)]
pub struct Selector {
    mode: Mode,
    stale_timeout: Duration,
    channel_count: usize,
}

impl Selector {
    pub fn new(channel_count: usize, stale_timeout: Duration) -> Self {
        Self {
            mode: Mode::Auto,
            stale_timeout,
            channel_count,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn stale_timeout(&self) -> Duration {
        self.stale_timeout
    }

    /// Apply a control command. Returns true if the mode changed.
    ///
    /// `select N` with `N` out of range is ignored. `status` never changes
    /// the mode; reporting it is up to the caller.
    pub fn apply(&mut self, command: ControlCommand) -> bool {
        let next = match command {
            ControlCommand::Select(index) if index < self.channel_count => Mode::Explicit(index),
            ControlCommand::Select(index) => {
                warn!(
                    index,
                    channels = self.channel_count,
                    "ignoring select of unknown channel"
                );
                return false;
            }
            ControlCommand::Fallback => Mode::Fallback,
            ControlCommand::Auto => Mode::Auto,
            ControlCommand::Status => return false,
        };

        if next == self.mode {
            return false;
        }
        info!(from = %self.mode, to = %next, "selection mode changed");
        self.mode = next;
        true
    }

    /// Pick at most one frame for the tick at `now`.
    ///
    /// An empty fallback asset counts as no fallback.
    pub fn select(
        &self,
        inputs: &[InputChannel],
        fallback: Option<&FallbackAsset>,
        now: Instant,
    ) -> Option<Selection> {
        let live = match self.mode {
            Mode::Explicit(index) => inputs
                .get(index)
                .and_then(|input| self.fresh(input, now)),
            Mode::Auto => inputs
                .iter()
                .rev()
                .find_map(|input| self.fresh(input, now)),
            Mode::Fallback => None,
        };

        live.or_else(|| {
            fallback
                .filter(|asset| !asset.is_empty())
                .map(|asset| Selection {
                    source: Source::Fallback,
                    frame: asset.frame().clone(),
                })
        })
    }

    fn fresh(&self, input: &InputChannel, now: Instant) -> Option<Selection> {
        input
            .fresh_frame(now, self.stale_timeout)
            .map(|frame| Selection {
                source: Source::Channel(input.index()),
                frame: frame.clone(),
            })
    }
}

#[cfg(test)]
mod tests {
    use framemux_frame::FrameConfig;

    use super::*;

    const TIMEOUT: Duration = Duration::from_millis(500);

    fn channels(count: usize) -> Vec<InputChannel> {
        (0..count)
            .map(|i| InputChannel::new(i, format!("/nonexistent/in-{i}"), FrameConfig::default()))
            .collect()
    }

    fn frame(tag: &[u8]) -> Frame {
        let mut bytes = vec![0xFF, 0xD8];
        bytes.extend_from_slice(tag);
        bytes.extend_from_slice(&[0xFF, 0xD9]);
        Frame::new(bytes)
    }

    fn fallback_asset() -> FallbackAsset {
        let path = std::env::temp_dir().join(format!(
            "framemux-selector-card-{}-{:?}.jpg",
            std::process::id(),
            std::thread::current().id()
        ));
        std::fs::write(&path, frame(b"card").payload).unwrap();
        let asset = FallbackAsset::load(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        asset
    }

    #[test]
    fn starts_in_auto() {
        assert_eq!(Selector::new(2, TIMEOUT).mode(), Mode::Auto);
    }

    #[test]
    fn auto_prefers_highest_fresh_index() {
        let now = Instant::now();
        let mut inputs = channels(3);
        inputs[0].store_frame(frame(b"zero"), now);
        inputs[2].store_frame(frame(b"two"), now);

        let selection = Selector::new(3, TIMEOUT).select(&inputs, None, now).unwrap();
        assert_eq!(selection.source, Source::Channel(2));
        assert_eq!(selection.frame, frame(b"two"));
    }

    #[test]
    fn auto_skips_stale_channels() {
        let t0 = Instant::now();
        let mut inputs = channels(3);
        inputs[0].store_frame(frame(b"zero"), t0 + Duration::from_millis(400));
        inputs[2].store_frame(frame(b"two"), t0);

        let now = t0 + Duration::from_millis(600);
        let selection = Selector::new(3, TIMEOUT).select(&inputs, None, now).unwrap();
        assert_eq!(selection.source, Source::Channel(0));
    }

    #[test]
    fn auto_without_live_channels_uses_fallback() {
        let inputs = channels(2);
        let asset = fallback_asset();
        let selection = Selector::new(2, TIMEOUT)
            .select(&inputs, Some(&asset), Instant::now())
            .unwrap();
        assert_eq!(selection.source, Source::Fallback);
        assert_eq!(selection.frame, frame(b"card"));
    }

    #[test]
    fn nothing_available_yields_none() {
        let inputs = channels(2);
        assert!(Selector::new(2, TIMEOUT)
            .select(&inputs, None, Instant::now())
            .is_none());
    }

    #[test]
    fn explicit_ignores_other_fresh_channels() {
        let now = Instant::now();
        let mut inputs = channels(3);
        inputs[0].store_frame(frame(b"zero"), now);
        inputs[2].store_frame(frame(b"two"), now);

        let mut selector = Selector::new(3, TIMEOUT);
        assert!(selector.apply(ControlCommand::Select(0)));
        let selection = selector.select(&inputs, None, now).unwrap();
        assert_eq!(selection.source, Source::Channel(0));
    }

    #[test]
    fn stale_explicit_falls_through_to_fallback() {
        let t0 = Instant::now();
        let mut inputs = channels(2);
        inputs[1].store_frame(frame(b"one"), t0);
        inputs[0].store_frame(frame(b"zero"), t0 + Duration::from_millis(900));

        let mut selector = Selector::new(2, TIMEOUT);
        selector.apply(ControlCommand::Select(1));
        let now = t0 + Duration::from_millis(1000);

        let asset = fallback_asset();
        let selection = selector.select(&inputs, Some(&asset), now).unwrap();
        assert_eq!(selection.source, Source::Fallback);

        assert!(selector.select(&inputs, None, now).is_none());
    }

    #[test]
    fn fallback_mode_ignores_live_channels() {
        let now = Instant::now();
        let mut inputs = channels(2);
        inputs[1].store_frame(frame(b"one"), now);

        let mut selector = Selector::new(2, TIMEOUT);
        selector.apply(ControlCommand::Fallback);
        assert_eq!(selector.mode(), Mode::Fallback);
        assert!(selector.select(&inputs, None, now).is_none());

        let asset = fallback_asset();
        let selection = selector.select(&inputs, Some(&asset), now).unwrap();
        assert_eq!(selection.source, Source::Fallback);
    }

    #[test]
    fn out_of_range_select_keeps_mode() {
        let mut selector = Selector::new(3, TIMEOUT);
        assert!(!selector.apply(ControlCommand::Select(3)));
        assert_eq!(selector.mode(), Mode::Auto);

        assert!(selector.apply(ControlCommand::Select(2)));
        assert!(!selector.apply(ControlCommand::Select(99)));
        assert_eq!(selector.mode(), Mode::Explicit(2));
    }

    #[test]
    fn mode_persists_until_next_command() {
        let mut selector = Selector::new(2, TIMEOUT);
        selector.apply(ControlCommand::Select(1));
        assert!(!selector.apply(ControlCommand::Status));
        assert!(!selector.apply(ControlCommand::Select(1)));
        assert_eq!(selector.mode(), Mode::Explicit(1));

        assert!(selector.apply(ControlCommand::Auto));
        assert_eq!(selector.mode(), Mode::Auto);
    }

    #[test]
    fn display_forms() {
        assert_eq!(Mode::Explicit(3).to_string(), "explicit(3)");
        assert_eq!(Source::Channel(1).to_string(), "channel 1");
        assert_eq!(Source::Fallback.to_string(), "fallback");
    }
}
