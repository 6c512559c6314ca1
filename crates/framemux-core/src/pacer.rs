use std::time::{Duration, Instant};

/// Fixed-rate tick schedule.
///
/// Ticks fall on a grid of `interval` steps starting at construction time,
/// with the first tick due immediately. A loop that falls a whole interval
/// behind is put back on a fresh grid instead of catching up in a burst.
#[derive(Debug, Clone)]
pub struct Pacer {
    interval: Duration,
    next_tick: Instant,
}

impl Pacer {
    pub fn new(interval: Duration, now: Instant) -> Self {
        Self {
            interval,
            next_tick: now,
        }
    }

    /// When the next tick is due.
    pub fn next_tick(&self) -> Instant {
        self.next_tick
    }

    /// Time left before the next tick; zero if it is already due.
    pub fn time_until_tick(&self, now: Instant) -> Duration {
        self.next_tick.saturating_duration_since(now)
    }

    /// Consume the tick if it is due at `now`.
    pub fn poll_tick(&mut self, now: Instant) -> bool {
        if now < self.next_tick {
            return false;
        }
        self.next_tick += self.interval;
        if self.next_tick <= now {
            self.next_tick = now + self.interval;
        }
        true
    }
}

/// Output rate over one completed window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Throughput {
    pub frames: u64,
    pub elapsed: Duration,
    pub fps: f64,
}

/// Counts emitted frames and closes a [`Throughput`] window every `window`.
#[derive(Debug, Clone)]
pub struct ThroughputMeter {
    window: Duration,
    window_start: Instant,
    frames: u64,
}

impl ThroughputMeter {
    pub fn new(window: Duration, now: Instant) -> Self {
        Self {
            window,
            window_start: now,
            frames: 0,
        }
    }

    /// Count one frame emitted at `now`, returning the finished window if
    /// this frame closed it.
    pub fn record(&mut self, now: Instant) -> Option<Throughput> {
        self.frames += 1;
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < self.window {
            return None;
        }

        let report = Throughput {
            frames: self.frames,
            elapsed,
            fps: self.frames as f64 / elapsed.as_secs_f64(),
        };
        self.window_start = now;
        self.frames = 0;
        Some(report)
    }
}
