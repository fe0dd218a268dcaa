//! Command execution for the firewall tool
//!
//! One call spawns one process and waits for it:
//! flags → optional `sudo` prefix → spawn → bounded wait → trim output.
//! Nothing is retried; a failed command is final for that call.

use std::io;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{ExecCause, ExecError};

/// Firewall tool invoked when no other binary is configured.
pub const DEFAULT_TOOL: &str = "iptables";

/// Privilege-escalation wrapper used when `sudo` is enabled.
pub const SUDO: &str = "sudo";

/// Upper bound on how long a single command may run.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Runs a program with arguments and returns its captured output.
///
/// On failure the returned [`ExecError`] still carries any output the
/// program produced before it failed.
#[tonic::async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, program: &str, args: &[String]) -> Result<Vec<u8>, ExecError>;
}

/// Spawns real processes through `tokio::process`.
///
/// The direct child is killed on timeout and when the call's future is
/// dropped. With `sudo` enabled the direct child is `sudo` itself, and a
/// SIGKILL to it does not reach the tool it started.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    timeout: Duration,
}

impl ProcessRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

/// Read a pipe to EOF. Bytes already read stay in `buf` if this is cancelled.
async fn drain<R: AsyncRead + Unpin>(pipe: Option<&mut R>, buf: &mut Vec<u8>) -> io::Result<()> {
    let Some(pipe) = pipe else {
        return Ok(());
    };
    let mut chunk = [0u8; 4096];
    loop {
        let n = pipe.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

/// stdout followed by stderr, newline-separated.
fn combine(mut stdout: Vec<u8>, stderr: Vec<u8>) -> Vec<u8> {
    if !stderr.is_empty() {
        if !stdout.is_empty() && !stdout.ends_with(b"\n") {
            stdout.push(b'\n');
        }
        stdout.extend_from_slice(&stderr);
    }
    stdout
}

#[tonic::async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, program: &str, args: &[String]) -> Result<Vec<u8>, ExecError> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| {
                ExecError::new(
                    Vec::new(),
                    ExecCause::Spawn {
                        program: program.to_string(),
                        source,
                    },
                )
            })?;

        let mut stdout = child.stdout.take();
        let mut stderr = child.stderr.take();
        let (mut out, mut err) = (Vec::new(), Vec::new());

        let waited = tokio::time::timeout(self.timeout, async {
            let (out_read, err_read, status) = tokio::join!(
                drain(stdout.as_mut(), &mut out),
                drain(stderr.as_mut(), &mut err),
                child.wait(),
            );
            out_read?;
            err_read?;
            status
        })
        .await;

        let status = match waited {
            Ok(Ok(status)) => status,
            Ok(Err(source)) => {
                return Err(ExecError::new(
                    combine(out, err),
                    ExecCause::Wait {
                        program: program.to_string(),
                        source,
                    },
                ));
            }
            Err(_) => {
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill {program} after timeout: {e}");
                }
                warn!("{program} timed out after {:?}, killed", self.timeout);
                return Err(ExecError::new(
                    combine(out, err),
                    ExecCause::TimedOut {
                        program: program.to_string(),
                        timeout: self.timeout,
                    },
                ));
            }
        };

        let combined = combine(out, err);
        if status.success() {
            Ok(combined)
        } else {
            Err(ExecError::new(
                combined,
                ExecCause::Exit {
                    program: program.to_string(),
                    code: status.code(),
                },
            ))
        }
    }
}

/// Invokes the firewall tool through a [`CommandRunner`].
#[derive(Clone)]
pub struct Executor {
    runner: Arc<dyn CommandRunner>,
    tool: String,
    flags: Vec<String>,
    sudo: bool,
}

impl Executor {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            tool: DEFAULT_TOOL.to_string(),
            flags: Vec::new(),
            sudo: false,
        }
    }

    /// Binary to run instead of `iptables` (e.g. `iptables-legacy`).
    pub fn with_tool(mut self, tool: impl Into<String>) -> Self {
        self.tool = tool.into();
        self
    }

    /// Flags placed in front of every argument vector (e.g. `-w`).
    pub fn with_flags(mut self, flags: Vec<String>) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_sudo(mut self, sudo: bool) -> Self {
        self.sudo = sudo;
        self
    }

    pub fn tool(&self) -> &str {
        &self.tool
    }

    /// Run the configured firewall tool with `args`.
    pub async fn execute(&self, args: &[String]) -> Result<Vec<u8>, ExecError> {
        self.run(&self.tool, args).await
    }

    /// Run `tool` with the configured flags followed by `args`.
    ///
    /// With `sudo` enabled the program becomes `sudo` and `tool` is shifted
    /// to the first argument.
    pub async fn run(&self, tool: &str, args: &[String]) -> Result<Vec<u8>, ExecError> {
        let mut argv: Vec<String> = self.flags.iter().chain(args).cloned().collect();
        let program = if self.sudo {
            argv.insert(0, tool.to_string());
            SUDO
        } else {
            tool
        };

        debug!("exec {program} {argv:?}");
        match self.runner.run(program, &argv).await {
            Ok(output) => {
                let output = trim_output(output);
                debug!("exec: {:?}", String::from_utf8_lossy(&output));
                Ok(output)
            }
            Err(mut err) => {
                err.output = trim_output(err.output);
                debug!("exec failed: {err}");
                Err(err)
            }
        }
    }
}

fn trim_output(output: Vec<u8>) -> Vec<u8> {
    let trimmed = output.trim_ascii();
    if trimmed.len() == output.len() {
        output
    } else {
        trimmed.to_vec()
    }
}
