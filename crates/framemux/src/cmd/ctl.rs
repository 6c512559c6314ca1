use std::io::Write;
use std::path::Path;

use framemux_core::ControlCommand;
use framemux_transport::FifoEndpoint;
use serde::Serialize;
use tracing::{debug, warn};

use crate::cmd::CtlArgs;
use crate::exit::{io_error, transport_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_summary, OutputFormat};

#[derive(Debug, Serialize)]
struct CtlOutput<'a> {
    control: &'a Path,
    command: String,
    sent: bool,
}

pub fn run(args: CtlArgs, format: OutputFormat) -> CliResult<i32> {
    let line = args.command.join(" ");
    let command: ControlCommand = line
        .parse()
        .map_err(|err| CliError::new(USAGE, format!("invalid control command: {err}")))?;

    if let ControlCommand::Select(index) = command {
        if index >= args.endpoints.channels {
            warn!(
                index,
                channels = args.endpoints.channels,
                "channel index beyond the configured count; the multiplexer will ignore it"
            );
        }
    }

    let control = &args.endpoints.control;
    let mut endpoint = FifoEndpoint::open_writer(control)
        .map_err(|err| transport_error("control endpoint unavailable", err))?;
    endpoint
        .write_all(format!("{command}\n").as_bytes())
        .map_err(|err| io_error("control write failed", err))?;
    debug!(%command, ?control, "control command sent");

    let output = CtlOutput {
        control,
        command: command.to_string(),
        sent: true,
    };
    print_summary(
        &output,
        &[
            ("control", control.display().to_string()),
            ("command", output.command.clone()),
            ("sent", output.sent.to_string()),
        ],
        format,
    );
    Ok(SUCCESS)
}
