use std::io;
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

/// How long [`Consumer::stop`] waits after closing stdin before killing.
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(2);

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// A downstream process fed through its stdin.
///
/// The consumer runs under `sh -c`, so `command` may be a pipeline. Its
/// stdout and stderr are inherited.
#[derive(Debug)]
pub struct Consumer {
    child: Child,
    command: String,
}

impl Consumer {
    pub fn spawn(command: &str) -> io::Result<Self> {
        let child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::piped())
            .spawn()?;
        info!(pid = child.id(), command, "consumer started");
        Ok(Self {
            child,
            command: command.to_string(),
        })
    }

    /// Take the write end of the consumer's stdin. Returns `None` after the
    /// first call.
    pub fn take_stdin(&mut self) -> Option<ChildStdin> {
        self.child.stdin.take()
    }

    pub fn id(&self) -> u32 {
        self.child.id()
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// True while the process has not exited.
    pub fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Close stdin, give the process `grace` to exit on its own, then kill
    /// it.
    pub fn stop(mut self, grace: Duration) -> io::Result<ExitStatus> {
        drop(self.child.stdin.take());

        let deadline = Instant::now() + grace;
        loop {
            if let Some(status) = self.child.try_wait()? {
                debug!(pid = self.child.id(), %status, "consumer exited");
                return Ok(status);
            }
            if Instant::now() >= deadline {
                break;
            }
            std::thread::sleep(EXIT_POLL_INTERVAL);
        }

        warn!(
            pid = self.child.id(),
            grace_ms = grace.as_millis() as u64,
            "consumer did not exit; killing"
        );
        self.child.kill()?;
        self.child.wait()
    }
}
