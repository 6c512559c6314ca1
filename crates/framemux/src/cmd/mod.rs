use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};
use framemux_core::{
    MuxConfig, DEFAULT_CHANNELS, DEFAULT_CONTROL_PATH, DEFAULT_INPUT_PREFIX, DEFAULT_INPUT_SUFFIX,
    DEFAULT_TARGET_FPS,
};
use framemux_frame::{FrameConfig, DEFAULT_MAX_FRAME_SIZE};

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod ctl;
pub mod doctor;
pub mod push;
pub mod run;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Multiplex the input FIFOs onto stdout (or a managed consumer).
    Run(RunArgs),
    /// Send one command to a running multiplexer.
    Ctl(CtlArgs),
    /// Write a frame file into an input FIFO.
    Push(PushArgs),
    /// Check endpoints and the fallback asset.
    Doctor(DoctorArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Run(args) => run::run(args),
        Command::Ctl(args) => ctl::run(args, format),
        Command::Push(args) => push::run(args, format),
        Command::Doctor(args) => doctor::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// Where the endpoints live. Shared by every subcommand so one set of
/// `FRAMEMUX_*` variables describes a deployment.
#[derive(Args, Debug, Clone)]
pub struct EndpointArgs {
    /// Number of input channels (1-8).
    #[arg(long, short = 'n', env = "FRAMEMUX_CHANNELS", default_value_t = DEFAULT_CHANNELS)]
    pub channels: usize,
    /// Control FIFO path.
    #[arg(long, short = 'c', env = "FRAMEMUX_CONTROL", default_value = DEFAULT_CONTROL_PATH)]
    pub control: PathBuf,
    /// Input FIFO path prefix; inputs are <prefix><index><suffix>.
    #[arg(long, short = 'p', env = "FRAMEMUX_INPUT_PREFIX", default_value = DEFAULT_INPUT_PREFIX)]
    pub input_prefix: String,
    /// Input FIFO path suffix.
    #[arg(long, env = "FRAMEMUX_INPUT_SUFFIX", default_value = DEFAULT_INPUT_SUFFIX)]
    pub input_suffix: String,
}

impl EndpointArgs {
    pub fn to_config(&self) -> MuxConfig {
        MuxConfig {
            channel_count: self.channels,
            input_prefix: self.input_prefix.clone(),
            input_suffix: self.input_suffix.clone(),
            control_path: self.control.clone(),
            ..MuxConfig::default()
        }
    }
}

#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub endpoints: EndpointArgs,
    /// Fallback JPEG emitted while no channel is live.
    #[arg(long, short = 't', visible_alias = "testcard", env = "FRAMEMUX_FALLBACK")]
    pub fallback: Option<PathBuf>,
    /// Output frames per second.
    #[arg(long, short = 'f', env = "FRAMEMUX_FPS", default_value_t = DEFAULT_TARGET_FPS)]
    pub fps: u32,
    /// Age after which a channel's frame is skipped (e.g. 500ms, 2s).
    #[arg(long, short = 'T', env = "FRAMEMUX_STALE_TIMEOUT", default_value = "500ms")]
    pub stale_timeout: String,
    /// Largest accepted input frame in bytes.
    #[arg(long, env = "FRAMEMUX_MAX_FRAME_SIZE", default_value_t = DEFAULT_MAX_FRAME_SIZE)]
    pub max_frame_size: usize,
    /// Longest wait for the consumer to accept output (e.g. 200ms).
    #[arg(long, env = "FRAMEMUX_WRITE_TIMEOUT", default_value = "200ms")]
    pub write_timeout: String,
    /// Throughput reporting window (e.g. 10s).
    #[arg(long, env = "FRAMEMUX_REPORT_INTERVAL", default_value = "10s")]
    pub report_interval: String,
    /// Shell command to start as the consumer; frames go to its stdin
    /// instead of stdout.
    #[arg(long, env = "FRAMEMUX_EXEC", value_name = "COMMAND")]
    pub exec: Option<String>,
}

impl RunArgs {
    pub fn to_config(&self) -> CliResult<MuxConfig> {
        Ok(MuxConfig {
            fallback_path: self.fallback.clone(),
            target_fps: self.fps,
            stale_timeout: parse_duration(&self.stale_timeout)?,
            frame: FrameConfig {
                write_timeout: parse_duration(&self.write_timeout)?,
                ..FrameConfig::with_max_frame_size(self.max_frame_size)
            },
            report_interval: parse_duration(&self.report_interval)?,
            ..self.endpoints.to_config()
        })
    }
}

#[derive(Args, Debug)]
pub struct CtlArgs {
    #[command(flatten)]
    pub endpoints: EndpointArgs,
    /// Command words, e.g. `select 1`, `fallback`, `auto`, `status`.
    #[arg(required = true, num_args = 1.., trailing_var_arg = true)]
    pub command: Vec<String>,
}

#[derive(Args, Debug)]
pub struct PushArgs {
    #[command(flatten)]
    pub endpoints: EndpointArgs,
    /// Input channel index.
    pub index: usize,
    /// JPEG file to send.
    pub file: PathBuf,
    /// Number of times to send the frame; 0 repeats until interrupted.
    #[arg(long, default_value_t = 1)]
    pub repeat: u64,
    /// Delay between repeated sends (e.g. 100ms).
    #[arg(long, default_value = "100ms")]
    pub interval: String,
    /// Longest wait for the multiplexer to drain the FIFO.
    #[arg(long, default_value = "1s")]
    pub write_timeout: String,
    /// Refuse files larger than this many bytes.
    #[arg(long, env = "FRAMEMUX_MAX_FRAME_SIZE", default_value_t = DEFAULT_MAX_FRAME_SIZE)]
    pub max_frame_size: usize,
}

#[derive(Args, Debug)]
pub struct DoctorArgs {
    #[command(flatten)]
    pub endpoints: EndpointArgs,
    /// Fallback JPEG to check.
    #[arg(long, short = 't', env = "FRAMEMUX_FALLBACK")]
    pub fallback: Option<PathBuf>,
    /// Size limit the multiplexer enforces on input frames.
    #[arg(long, env = "FRAMEMUX_MAX_FRAME_SIZE", default_value_t = DEFAULT_MAX_FRAME_SIZE)]
    pub max_frame_size: usize,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse `150ms`, `2s` or a bare number of seconds.
pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = match input.strip_suffix("ms") {
        Some(num) => (num, true),
        None => (input.strip_suffix('s').unwrap_or(input), false),
    };

    let value: u64 = number
        .trim()
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}
