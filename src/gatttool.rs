/*!
 # gatttool transport

 Writes the control characteristic by running `gatttool --char-write-req`
 from the calling task. A failing invocation is retried up to
 [`MAX_ATTEMPTS`] times; when every attempt fails the write is given up
 and only the logs record it.
*/

use futures::future::BoxFuture;
use tracing::{debug, error, instrument, trace, warn};

use crate::encoding::to_hex;
use crate::transport::Transport;
use crate::Result;

/// Number of invocations before a write is abandoned
pub const MAX_ATTEMPTS: usize = 5;

/// Default executable name
pub const DEFAULT_EXECUTABLE: &str = "gatttool";

/// What a finished process reported
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub status: String,
    pub stdout: String,
    pub stderr: String,
}

impl From<std::process::Output> for CommandOutput {
    fn from(output: std::process::Output) -> Self {
        CommandOutput {
            success: output.status.success(),
            status: output.status.to_string(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }
}

/// Runs an external program to completion and captures its output
pub trait CommandRunner: Send + Sync {
    fn run<'a>(
        &'a self,
        program: &'a str,
        args: &'a [String],
    ) -> BoxFuture<'a, std::io::Result<CommandOutput>>;
}

/// [`CommandRunner`] backed by `tokio::process`
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl CommandRunner for ProcessRunner {
    fn run<'a>(
        &'a self,
        program: &'a str,
        args: &'a [String],
    ) -> BoxFuture<'a, std::io::Result<CommandOutput>> {
        Box::pin(async move {
            let output = tokio::process::Command::new(program)
                .args(args)
                .kill_on_drop(true)
                .output()
                .await?;
            Ok(output.into())
        })
    }
}

/// Transport that shells out to `gatttool`
pub struct GattToolTransport<R = ProcessRunner> {
    address: String,
    executable: String,
    runner: R,
}

impl GattToolTransport<ProcessRunner> {
    pub fn new(address: impl Into<String>) -> Self {
        Self::with_runner(address, DEFAULT_EXECUTABLE, ProcessRunner)
    }
}

impl<R: CommandRunner> GattToolTransport<R> {
    pub fn with_runner(address: impl Into<String>, executable: impl Into<String>, runner: R) -> Self {
        GattToolTransport {
            address: address.into(),
            executable: executable.into(),
            runner,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Arguments of one `gatttool` invocation
    pub fn command_args(&self, handle: u16, payload: &[u8]) -> Vec<String> {
        vec![
            "-b".to_string(),
            self.address.clone(),
            "--char-write-req".to_string(),
            format!("--handle=0x{handle:04x}"),
            format!("--value={}", to_hex(payload)),
        ]
    }

    #[instrument(skip(self, payload), fields(address = %self.address, len = payload.len()))]
    async fn write_with_retries(&self, handle: u16, payload: &[u8]) {
        let args = self.command_args(handle, payload);
        debug!("Command is: {} {}", self.executable, args.join(" "));

        for attempt in 1..=MAX_ATTEMPTS {
            trace!("Running {} (attempt {}/{})", self.executable, attempt, MAX_ATTEMPTS);
            match self.runner.run(&self.executable, &args).await {
                Ok(output) if output.success => {
                    trace!("Command succeeded on attempt {}", attempt);
                    return;
                }
                Ok(output) => {
                    warn!(
                        "Command failed attempt {}/{} - exit {}\n{}\n{}",
                        attempt, MAX_ATTEMPTS, output.status, output.stdout, output.stderr
                    );
                }
                Err(e) => {
                    warn!(
                        "Command failed attempt {}/{} - could not run {}: {}",
                        attempt, MAX_ATTEMPTS, self.executable, e
                    );
                }
            }
        }

        error!(
            "Giving up on write to {} after {} attempts",
            self.address, MAX_ATTEMPTS
        );
    }
}

impl<R: CommandRunner> Transport for GattToolTransport<R> {
    fn write<'a>(&'a self, handle: u16, payload: &'a [u8]) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.write_with_retries(handle, payload).await;
            Ok(())
        })
    }

    fn kind(&self) -> &'static str {
        "gatttool"
    }
}
