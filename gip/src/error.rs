//! Error types for command execution and rule building.

use std::time::Duration;

/// Why an external command failed.
#[derive(Debug, thiserror::Error)]
pub enum ExecCause {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to wait for {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {}", exit_description(.code))]
    Exit { program: String, code: Option<i32> },

    #[error("{program} timed out after {timeout:?}")]
    TimedOut { program: String, timeout: Duration },
}

fn exit_description(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {code}"),
        None => "no status (terminated by signal)".to_string(),
    }
}

/// A failed external command together with whatever output it produced.
///
/// The output may be non-empty even on failure; iptables reports most
/// problems on stderr, which is captured alongside stdout.
#[derive(Debug, thiserror::Error)]
#[error("{cause}: {}", String::from_utf8_lossy(.output))]
pub struct ExecError {
    pub output: Vec<u8>,
    pub cause: ExecCause,
}

impl ExecError {
    pub fn new(output: Vec<u8>, cause: ExecCause) -> Self {
        Self { output, cause }
    }

    /// Captured output as text, lossily decoded.
    pub fn output_lossy(&self) -> String {
        String::from_utf8_lossy(&self.output).into_owned()
    }
}

/// Errors surfaced by the rule builder.
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    #[error("unknown chain: {0:?}")]
    UnknownChain(String),

    #[error("unknown policy: {0:?}")]
    UnknownPolicy(String),

    #[error("{0} interface name must not be empty")]
    EmptyInterface(&'static str),

    #[error(transparent)]
    Exec(#[from] ExecError),
}

impl RuleError {
    /// True when the request itself was malformed and no command was run.
    pub fn is_invalid_request(&self) -> bool {
        !matches!(self, RuleError::Exec(_))
    }
}
