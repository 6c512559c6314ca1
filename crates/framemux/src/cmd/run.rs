use std::fs::File;
use std::io::{IsTerminal, Write};
use std::os::fd::AsFd;

use framemux_core::{CancelToken, Multiplexer, MuxConfig};
use tracing::{info, warn};

use crate::cmd::RunArgs;
use crate::consumer::{Consumer, DEFAULT_STOP_GRACE};
use crate::exit::{io_error, mux_error, CliError, CliResult, INTERNAL, SUCCESS};

pub fn run(args: RunArgs) -> CliResult<i32> {
    let config = args.to_config()?;
    config
        .validate()
        .map_err(|err| mux_error("cannot run", err))?;

    let cancel = CancelToken::new();
    install_cancel_handler(cancel.clone())?;

    match args.exec.as_deref() {
        Some(command) => run_with_consumer(config, command, &cancel),
        None => run_to_stdout(config, &cancel),
    }
}

fn run_to_stdout(config: MuxConfig, cancel: &CancelToken) -> CliResult<i32> {
    let stdout = std::io::stdout();
    if stdout.is_terminal() {
        warn!("stdout is a terminal; frame data will be written to it");
    }
    let fd = stdout
        .as_fd()
        .try_clone_to_owned()
        .map_err(|err| io_error("failed to duplicate stdout", err))?;

    multiplex(config, File::from(fd), cancel)
}

fn run_with_consumer(config: MuxConfig, command: &str, cancel: &CancelToken) -> CliResult<i32> {
    let mut consumer =
        Consumer::spawn(command).map_err(|err| io_error("failed to start consumer", err))?;
    let stdin = consumer
        .take_stdin()
        .ok_or_else(|| CliError::new(INTERNAL, "consumer stdin unavailable"))?;

    let outcome = multiplex(config, stdin, cancel);
    if outcome.is_err() && !consumer.is_alive() {
        warn!(
            pid = consumer.id(),
            command = consumer.command(),
            "consumer exited before the multiplexer"
        );
    }

    match consumer.stop(DEFAULT_STOP_GRACE) {
        Ok(status) if status.success() => info!(%status, "consumer exited"),
        Ok(status) => warn!(%status, "consumer exited"),
        Err(err) => warn!(error = %err, "failed to stop consumer"),
    }
    outcome
}

/// Run to completion. The sink is dropped (closed) before returning.
fn multiplex<W: Write + AsFd>(
    config: MuxConfig,
    sink: W,
    cancel: &CancelToken,
) -> CliResult<i32> {
    let mut mux = Multiplexer::new(config, sink)
        .map_err(|err| mux_error("failed to start multiplexer", err))?;
    mux.run(cancel)
        .map_err(|err| mux_error("multiplexer stopped", err))?;
    Ok(SUCCESS)
}

fn install_cancel_handler(cancel: CancelToken) -> CliResult<()> {
    ctrlc::set_handler(move || {
        cancel.cancel();
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
