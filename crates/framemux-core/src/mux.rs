use std::io::Write;
use std::os::fd::{AsFd, BorrowedFd};
use std::time::{Duration, Instant};

use framemux_frame::FrameWriter;
use framemux_transport::{set_nonblocking, wait_readable, NonblockingGuard};
use tracing::{debug, error, info, warn};

use crate::cancel::CancelToken;
use crate::config::MuxConfig;
use crate::control::{ControlChannel, ControlCommand};
use crate::error::{MuxError, Result};
use crate::fallback::FallbackAsset;
use crate::input::InputChannel;
use crate::pacer::{Pacer, ThroughputMeter};
use crate::selector::{Selector, Source};

/// A descriptor in the readiness set.
#[derive(Debug, Clone, Copy)]
enum Slot {
    Input(usize),
    Control,
}

/// The multiplexer context: every channel, the selection state, the fallback
/// asset and the output sink, driven by [`run`](Self::run).
pub struct Multiplexer<W> {
    config: MuxConfig,
    inputs: Vec<InputChannel>,
    control: ControlChannel,
    selector: Selector,
    fallback: Option<FallbackAsset>,
    output: FrameWriter<W>,
    pacer: Pacer,
    meter: ThroughputMeter,
    last_source: Option<Source>,
    _sink_mode: NonblockingGuard,
}

impl<W: Write + AsFd> Multiplexer<W> {
    /// Build a multiplexer writing to `sink`.
    ///
    /// The sink is switched to non-blocking mode until the multiplexer is
    /// dropped, when its original flags come back. A configured fallback asset
    /// that cannot be read is logged and left out; the run continues without
    /// one.
    pub fn new(config: MuxConfig, sink: W) -> Result<Self> {
        config.validate()?;
        let sink_mode = set_nonblocking(sink.as_fd())?;

        let fallback = match &config.fallback_path {
            Some(path) => match FallbackAsset::load(path) {
                Ok(asset) => Some(asset),
                Err(err) => {
                    error!(error = %err, "continuing without fallback asset");
                    None
                }
            },
            None => None,
        };

        let inputs = config
            .input_paths()
            .into_iter()
            .enumerate()
            .map(|(index, path)| InputChannel::new(index, path, config.frame.clone()))
            .collect();
        let now = Instant::now();

        Ok(Self {
            control: ControlChannel::new(&config.control_path),
            selector: Selector::new(config.channel_count, config.stale_timeout),
            output: FrameWriter::with_config(sink, config.frame.clone()),
            pacer: Pacer::new(config.tick_interval(), now),
            meter: ThroughputMeter::new(config.report_interval, now),
            last_source: None,
            _sink_mode: sink_mode,
            inputs,
            fallback,
            config,
        })
    }

    /// Run until `cancel` is set or the sink fails.
    ///
    /// Only a sink failure is returned as an error; every input or control
    /// problem is logged and retried.
    pub fn run(&mut self, cancel: &CancelToken) -> Result<()> {
        info!(
            channels = self.config.channel_count,
            fps = self.config.target_fps,
            stale_timeout_ms = self.config.stale_timeout.as_millis() as u64,
            input_prefix = %self.config.input_prefix,
            input_suffix = %self.config.input_suffix,
            control = ?self.config.control_path,
            fallback = ?self.fallback.as_ref().map(|f| f.path()),
            "multiplexer starting"
        );

        let now = Instant::now();
        self.pacer = Pacer::new(self.config.tick_interval(), now);
        self.meter = ThroughputMeter::new(self.config.report_interval, now);

        while !cancel.is_cancelled() {
            self.turn(cancel)?;
        }

        info!("multiplexer stopped");
        Ok(())
    }

    /// One loop iteration: open what is missing, wait for input until the
    /// next tick, service readable channels, and emit if the tick is due.
    pub fn turn(&mut self, cancel: &CancelToken) -> Result<()> {
        for input in &mut self.inputs {
            input.ensure_open();
        }
        self.control.ensure_open();

        let wait = self.pacer.time_until_tick(Instant::now());
        let ready = self.wait_for_input(wait);
        if cancel.is_cancelled() {
            return Ok(());
        }

        let now = Instant::now();
        for slot in ready {
            match slot {
                Slot::Input(index) => {
                    self.inputs[index].drain(now);
                }
                Slot::Control => self.handle_control(now),
            }
        }

        if self.pacer.poll_tick(now) {
            self.emit(now)?;
        }
        Ok(())
    }

    fn wait_for_input(&self, timeout: Duration) -> Vec<Slot> {
        let mut slots = Vec::with_capacity(self.inputs.len() + 1);
        let mut fds: Vec<BorrowedFd<'_>> = Vec::with_capacity(self.inputs.len() + 1);
        for (index, input) in self.inputs.iter().enumerate() {
            if let Some(fd) = input.as_fd() {
                slots.push(Slot::Input(index));
                fds.push(fd);
            }
        }
        if let Some(fd) = self.control.as_fd() {
            slots.push(Slot::Control);
            fds.push(fd);
        }

        match wait_readable(&fds, timeout) {
            Ok(ready) => slots
                .into_iter()
                .zip(ready)
                .filter_map(|(slot, readable)| readable.then_some(slot))
                .collect(),
            Err(err) => {
                warn!(error = %err, "readiness wait failed");
                std::thread::sleep(timeout);
                Vec::new()
            }
        }
    }

    fn handle_control(&mut self, now: Instant) {
        for command in self.control.read_commands() {
            match command {
                ControlCommand::Status => self.log_status(now),
                other => {
                    self.selector.apply(other);
                }
            }
        }
    }

    fn log_status(&self, now: Instant) {
        info!(
            mode = %self.selector.mode(),
            last_source = ?self.last_source,
            fallback_loaded = self.fallback.is_some(),
            "status"
        );
        for input in &self.inputs {
            let latest = input.latest();
            info!(
                channel = input.index(),
                open = input.is_open(),
                frame_size = latest.map_or(0, |l| l.frame.len()),
                age_ms = ?latest.map(|l| l.age(now).as_millis()),
                fresh = latest.is_some_and(|l| l.is_fresh(now, self.selector.stale_timeout())),
                "channel status"
            );
        }
    }

    fn emit(&mut self, now: Instant) -> Result<()> {
        let Some(selection) = self
            .selector
            .select(&self.inputs, self.fallback.as_ref(), now)
        else {
            if let Some(previous) = self.last_source.take() {
                info!(%previous, "no frame available; output idle");
            }
            return Ok(());
        };

        if self.last_source != Some(selection.source) {
            info!(
                source = %selection.source,
                previous = ?self.last_source,
                size = selection.frame.len(),
                "output source changed"
            );
            self.last_source = Some(selection.source);
        }

        if let Err(err) = self.output.write_frame(&selection.frame) {
            error!(error = %err, "output sink failed");
            return Err(MuxError::Sink(err));
        }

        if let Some(report) = self.meter.record(Instant::now()) {
            info!(
                frames = report.frames,
                elapsed_ms = report.elapsed.as_millis() as u64,
                fps = report.fps,
                "output throughput"
            );
        } else {
            debug!(source = %selection.source, size = selection.frame.len(), "frame emitted");
        }
        Ok(())
    }

    pub fn config(&self) -> &MuxConfig {
        &self.config
    }

    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    pub fn inputs(&self) -> &[InputChannel] {
        &self.inputs
    }

    pub fn control(&self) -> &ControlChannel {
        &self.control
    }

    pub fn fallback(&self) -> Option<&FallbackAsset> {
        self.fallback.as_ref()
    }

    /// Source of the most recently emitted frame.
    pub fn last_source(&self) -> Option<Source> {
        self.last_source
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;
    use std::os::fd::AsRawFd;
    use std::os::unix::net::UnixStream;
    use std::path::{Path, PathBuf};

    use framemux_frame::{FrameConfig, END_MARKER};
    use framemux_transport::FifoEndpoint;

    use super::*;
    use crate::selector::Mode;

    const CARD: &[u8] = b"\xFF\xD8card\xFF\xD9";
    const ONE: &[u8] = b"\xFF\xD8one\xFF\xD9";

    fn test_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "framemux-mux-{tag}-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn config_in(dir: &Path, channels: usize, fps: u32) -> MuxConfig {
        let card = dir.join("card.jpg");
        std::fs::write(&card, CARD).unwrap();
        MuxConfig {
            channel_count: channels,
            input_prefix: format!("{}/in-", dir.display()),
            input_suffix: ".fifo".to_string(),
            control_path: dir.join("ctl.fifo"),
            fallback_path: Some(card),
            target_fps: fps,
            stale_timeout: Duration::from_millis(300),
            frame: FrameConfig::default(),
            report_interval: Duration::from_secs(10),
        }
    }

    fn split_frames(out: &[u8]) -> Vec<Vec<u8>> {
        let mut frames = Vec::new();
        let mut start = 0;
        let mut i = 0;
        while i + 1 < out.len() {
            if out[i..i + 2] == END_MARKER {
                frames.push(out[start..i + 2].to_vec());
                start = i + 2;
                i += 2;
            } else {
                i += 1;
            }
        }
        frames
    }

    fn connect_writer(path: &Path) -> FifoEndpoint {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            match FifoEndpoint::open_writer(path) {
                Ok(writer) => return writer,
                Err(_) if Instant::now() < deadline => {
                    std::thread::sleep(Duration::from_millis(5));
                }
                Err(err) => panic!("could not connect to {}: {err}", path.display()),
            }
        }
    }

    fn spawn_mux(
        mux: Multiplexer<UnixStream>,
        cancel: &CancelToken,
    ) -> std::thread::JoinHandle<(Multiplexer<UnixStream>, Result<()>)> {
        let cancel = cancel.clone();
        std::thread::spawn(move || {
            let mut mux = mux;
            let result = mux.run(&cancel);
            (mux, result)
        })
    }

    #[test]
    fn rejects_invalid_config() {
        let (sink, _peer) = UnixStream::pair().unwrap();
        let config = MuxConfig {
            channel_count: 0,
            ..MuxConfig::default()
        };
        assert!(matches!(
            Multiplexer::new(config, sink),
            Err(MuxError::InvalidConfig(_))
        ));
    }

    #[test]
    fn unreadable_fallback_degrades() {
        let dir = test_dir("nofallback");
        let config = MuxConfig {
            fallback_path: Some(dir.join("missing.jpg")),
            ..config_in(&dir, 1, 10)
        };
        let (sink, _peer) = UnixStream::pair().unwrap();
        let mux = Multiplexer::new(config, sink).unwrap();
        assert!(mux.fallback().is_none());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn cancelled_before_start_emits_nothing() {
        let dir = test_dir("cancelled");
        let (sink, mut peer) = UnixStream::pair().unwrap();
        let mut mux = Multiplexer::new(config_in(&dir, 1, 10), sink).unwrap();

        let cancel = CancelToken::new();
        cancel.cancel();
        mux.run(&cancel).unwrap();
        assert!(mux.last_source().is_none());
        drop(mux);

        let mut out = Vec::new();
        peer.read_to_end(&mut out).unwrap();
        assert!(out.is_empty());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn idle_inputs_emit_one_fallback_per_tick() {
        let dir = test_dir("idle");
        let (sink, mut peer) = UnixStream::pair().unwrap();
        let mux = Multiplexer::new(config_in(&dir, 2, 50), sink).unwrap();

        let cancel = CancelToken::new();
        let handle = spawn_mux(mux, &cancel);
        std::thread::sleep(Duration::from_millis(1000));
        cancel.cancel();
        let (mux, result) = handle.join().unwrap();
        result.unwrap();
        assert_eq!(mux.last_source(), Some(Source::Fallback));
        drop(mux);

        let mut out = Vec::new();
        peer.read_to_end(&mut out).unwrap();
        let frames = split_frames(&out);
        assert!(frames.iter().all(|f| f == CARD));
        // 50 fps for one second.
        assert!(
            (40..=60).contains(&frames.len()),
            "expected about 50 frames, got {}",
            frames.len()
        );
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn control_commands_change_mode() {
        let dir = test_dir("control");
        let (sink, _peer) = UnixStream::pair().unwrap();
        let mut mux = Multiplexer::new(config_in(&dir, 3, 100), sink).unwrap();
        let cancel = CancelToken::new();

        mux.turn(&cancel).unwrap();
        assert!(mux.control().is_open());

        let mut ctl = FifoEndpoint::open_writer(&dir.join("ctl.fifo")).unwrap();
        ctl.write_all(b"select 2\nselect 7\nstatus\n").unwrap();
        for _ in 0..10 {
            mux.turn(&cancel).unwrap();
        }
        assert_eq!(mux.selector().mode(), Mode::Explicit(2));

        ctl.write_all(b"testcard\n").unwrap();
        for _ in 0..10 {
            mux.turn(&cancel).unwrap();
        }
        assert_eq!(mux.selector().mode(), Mode::Fallback);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn live_channel_then_dropout_then_explicit_fallthrough() {
        let dir = test_dir("e2e");
        let config = config_in(&dir, 3, 20);
        let input1 = config.input_path(1);
        let control = config.control_path.clone();
        let (sink, mut peer) = UnixStream::pair().unwrap();
        let mux = Multiplexer::new(config, sink).unwrap();

        let collector = std::thread::spawn(move || {
            let mut out = Vec::new();
            peer.read_to_end(&mut out).unwrap();
            out
        });

        let cancel = CancelToken::new();
        let handle = spawn_mux(mux, &cancel);

        // Channel 1 live for a while.
        let mut producer = connect_writer(&input1);
        for _ in 0..10 {
            producer.write_all(ONE).unwrap();
            std::thread::sleep(Duration::from_millis(40));
        }

        // Silent past the stale timeout.
        std::thread::sleep(Duration::from_millis(600));

        // Channel 0 never sent anything.
        let mut ctl = connect_writer(&control);
        ctl.write_all(b"select 0\n").unwrap();
        std::thread::sleep(Duration::from_millis(300));

        cancel.cancel();
        let (mux, result) = handle.join().unwrap();
        result.unwrap();
        assert_eq!(mux.selector().mode(), Mode::Explicit(0));
        assert_eq!(mux.last_source(), Some(Source::Fallback));
        drop(mux);

        let frames = split_frames(&collector.join().unwrap());
        let mut runs: Vec<Vec<u8>> = Vec::new();
        for frame in frames {
            if runs.last() != Some(&frame) {
                runs.push(frame);
            }
        }
        assert!(runs.iter().all(|f| f == CARD || f == ONE));
        assert!(runs.ends_with(&[ONE.to_vec(), CARD.to_vec()]), "runs: {runs:?}");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn closed_sink_is_fatal() {
        let dir = test_dir("sink");
        let (sink, peer) = UnixStream::pair().unwrap();
        drop(peer);
        let mut mux = Multiplexer::new(config_in(&dir, 1, 50), sink).unwrap();

        let err = mux.run(&CancelToken::new()).unwrap_err();
        assert!(matches!(err, MuxError::Sink(_)));
        let _ = std::fs::remove_dir_all(&dir);
    }

    fn is_nonblocking(fd: &impl AsRawFd) -> bool {
        // SAFETY: the descriptor is open for the duration of the call.
        let flags = unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_GETFL) };
        assert!(flags >= 0);
        flags & libc::O_NONBLOCK != 0
    }

    #[test]
    fn sink_flags_restored_after_run() {
        let dir = test_dir("flags");
        let (sink, _peer) = UnixStream::pair().unwrap();
        let shared = sink.try_clone().unwrap();
        assert!(!is_nonblocking(&shared));

        let cancel = CancelToken::new();
        let mut mux = Multiplexer::new(config_in(&dir, 1, 50), sink).unwrap();
        assert!(is_nonblocking(&shared));
        cancel.cancel();
        mux.run(&cancel).unwrap();
        drop(mux);

        assert!(!is_nonblocking(&shared));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn sink_flags_restored_after_sink_failure() {
        let dir = test_dir("flags-fail");
        let (sink, peer) = UnixStream::pair().unwrap();
        let shared = sink.try_clone().unwrap();
        drop(peer);

        let mut mux = Multiplexer::new(config_in(&dir, 1, 50), sink).unwrap();
        assert!(mux.run(&CancelToken::new()).is_err());
        drop(mux);

        assert!(!is_nonblocking(&shared));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
