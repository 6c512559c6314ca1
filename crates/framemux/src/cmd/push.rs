use std::path::PathBuf;

use framemux_core::CancelToken;
use framemux_frame::{check_frame_size, contains_frame, Frame, FrameConfig, FrameWriter};
use framemux_transport::FifoEndpoint;
use serde::Serialize;
use tracing::{debug, info};

use crate::cmd::{parse_duration, PushArgs};
use crate::exit::{
    frame_error, io_error, transport_error, CliError, CliResult, DATA_INVALID, INTERNAL, SUCCESS,
    USAGE,
};
use crate::output::{print_summary, OutputFormat};

#[derive(Debug, Serialize)]
struct PushOutput {
    channel: usize,
    endpoint: PathBuf,
    frame_size: usize,
    frames_sent: u64,
}

pub fn run(args: PushArgs, format: OutputFormat) -> CliResult<i32> {
    let config = args.endpoints.to_config();
    if args.index >= config.channel_count {
        return Err(CliError::new(
            USAGE,
            format!(
                "channel {} out of range (configured channels: {})",
                args.index, config.channel_count
            ),
        ));
    }

    let bytes = std::fs::read(&args.file)
        .map_err(|err| io_error(&format!("failed to read {}", args.file.display()), err))?;
    check_frame_size(bytes.len(), args.max_frame_size)
        .map_err(|err| frame_error("refusing to push", err))?;
    if !contains_frame(&bytes) {
        return Err(CliError::new(
            DATA_INVALID,
            format!("{} has no start/end delimited frame", args.file.display()),
        ));
    }
    let frame = Frame::new(bytes);
    let interval = parse_duration(&args.interval)?;
    let write_timeout = parse_duration(&args.write_timeout)?;

    let path = config.input_path(args.index);
    let endpoint = FifoEndpoint::open_writer(&path)
        .map_err(|err| transport_error("input endpoint unavailable", err))?;
    let mut writer = FrameWriter::with_config(
        endpoint,
        FrameConfig {
            write_timeout,
            ..FrameConfig::default()
        },
    );

    let cancel = CancelToken::new();
    if args.repeat != 1 {
        let handler_token = cancel.clone();
        ctrlc::set_handler(move || handler_token.cancel()).map_err(|err| {
            CliError::new(INTERNAL, format!("signal handler setup failed: {err}"))
        })?;
    }

    let mut sent = 0u64;
    while !cancel.is_cancelled() && (args.repeat == 0 || sent < args.repeat) {
        writer
            .write_frame(&frame)
            .map_err(|err| frame_error("push failed", err))?;
        sent += 1;
        debug!(channel = args.index, sent, "frame pushed");
        if args.repeat == 0 || sent < args.repeat {
            std::thread::sleep(interval);
        }
    }
    info!(channel = args.index, frames = sent, "push complete");

    let output = PushOutput {
        channel: args.index,
        endpoint: path,
        frame_size: frame.len(),
        frames_sent: sent,
    };
    print_summary(
        &output,
        &[
            ("channel", output.channel.to_string()),
            ("endpoint", output.endpoint.display().to_string()),
            ("frame_size", output.frame_size.to_string()),
            ("frames_sent", output.frames_sent.to_string()),
        ],
        format,
    );
    Ok(SUCCESS)
}
