//! Rule building — turns rule intents into iptables argument vectors
//!
//! Chains, policies and actions are closed vocabularies. Names outside them
//! are rejected here, before anything reaches the executor. Argument order is
//! positional in the iptables grammar and is never rearranged.

use std::fmt;
use std::str::FromStr;

use tracing::debug;

use crate::error::RuleError;
use crate::executor::Executor;

/// Built-in filter table chains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Chain {
    Input,
    Forward,
    Output,
}

impl Chain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Chain::Input => "INPUT",
            Chain::Forward => "FORWARD",
            Chain::Output => "OUTPUT",
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Chain {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [Chain::Input, Chain::Forward, Chain::Output]
            .into_iter()
            .find(|chain| chain.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| RuleError::UnknownChain(s.to_string()))
    }
}

/// Default chain policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Policy {
    Accept,
    Drop,
}

impl Policy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Policy::Accept => "ACCEPT",
            Policy::Drop => "DROP",
        }
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Policy {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [Policy::Accept, Policy::Drop]
            .into_iter()
            .find(|policy| policy.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| RuleError::UnknownPolicy(s.to_string()))
    }
}

/// iptables commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Append,
    Flush,
    Policy,
}

impl Action {
    pub fn flag(&self) -> &'static str {
        match self {
            Action::Append => "-A",
            Action::Flush => "-F",
            Action::Policy => "-P",
        }
    }
}

/// A single firewall mutation. Each intent becomes exactly one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleIntent {
    /// Remove every rule from a chain.
    Flush { chain: Chain },
    /// Set the policy applied to packets no rule matched.
    DefaultPolicy { chain: Chain, policy: Policy },
    /// Accept forwarded traffic from `input` to `output`.
    AcceptForward { input: String, output: String },
    /// Accept forwarded traffic from `input` to `output` unless it opens a
    /// new connection, so only return traffic passes.
    AcceptEstablished { input: String, output: String },
}

impl RuleIntent {
    pub fn accept_forward(input: &str, output: &str) -> Result<Self, RuleError> {
        check_interfaces(input, output)?;
        Ok(RuleIntent::AcceptForward {
            input: input.to_string(),
            output: output.to_string(),
        })
    }

    pub fn accept_established(input: &str, output: &str) -> Result<Self, RuleError> {
        check_interfaces(input, output)?;
        Ok(RuleIntent::AcceptEstablished {
            input: input.to_string(),
            output: output.to_string(),
        })
    }

    /// The iptables argument vector for this intent, without the tool name.
    pub fn args(&self) -> Vec<String> {
        let args: Vec<&str> = match self {
            RuleIntent::Flush { chain } => vec![Action::Flush.flag(), chain.as_str()],
            RuleIntent::DefaultPolicy { chain, policy } => {
                vec![Action::Policy.flag(), chain.as_str(), policy.as_str()]
            }
            RuleIntent::AcceptForward { input, output } => vec![
                Action::Append.flag(),
                Chain::Forward.as_str(),
                "-i",
                input.as_str(),
                "-o",
                output.as_str(),
                "-j",
                Policy::Accept.as_str(),
            ],
            RuleIntent::AcceptEstablished { input, output } => vec![
                Action::Append.flag(),
                Chain::Forward.as_str(),
                "-i",
                input.as_str(),
                "-o",
                output.as_str(),
                "-m",
                "state",
                "!",
                "--state",
                "NEW",
                "-j",
                Policy::Accept.as_str(),
            ],
        };
        args.into_iter().map(String::from).collect()
    }
}

impl fmt::Display for RuleIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleIntent::Flush { chain } => write!(f, "flush {chain}"),
            RuleIntent::DefaultPolicy { chain, policy } => {
                write!(f, "default policy {policy} on {chain}")
            }
            RuleIntent::AcceptForward { input, output } => {
                write!(f, "accept forward {input} -> {output}")
            }
            RuleIntent::AcceptEstablished { input, output } => {
                write!(f, "accept established {input} -> {output}")
            }
        }
    }
}

// An empty interface would make iptables read the next flag as its value.
fn check_interfaces(input: &str, output: &str) -> Result<(), RuleError> {
    if input.is_empty() {
        return Err(RuleError::EmptyInterface("input"));
    }
    if output.is_empty() {
        return Err(RuleError::EmptyInterface("output"));
    }
    Ok(())
}

/// Applies rule intents through an [`Executor`].
#[derive(Clone)]
pub struct RuleBuilder {
    executor: Executor,
}

impl RuleBuilder {
    pub fn new(executor: Executor) -> Self {
        Self { executor }
    }

    /// Execute the single command for `intent` and return its output.
    pub async fn apply(&self, intent: &RuleIntent) -> Result<Vec<u8>, RuleError> {
        debug!("applying rule: {intent}");
        Ok(self.executor.execute(&intent.args()).await?)
    }

    /// `iptables -F <chain>`. Destructive: every rule in the chain is gone.
    pub async fn flush_chain(&self, chain: Chain) -> Result<(), RuleError> {
        self.apply(&RuleIntent::Flush { chain }).await.map(drop)
    }

    /// `iptables -P <chain> <policy>`
    pub async fn set_default_policy(&self, chain: Chain, policy: Policy) -> Result<(), RuleError> {
        self.apply(&RuleIntent::DefaultPolicy { chain, policy })
            .await
            .map(drop)
    }

    /// `iptables -A FORWARD -i <input> -o <output> -j ACCEPT`
    pub async fn accept_forward(&self, input: &str, output: &str) -> Result<(), RuleError> {
        let intent = RuleIntent::accept_forward(input, output)?;
        self.apply(&intent).await.map(drop)
    }

    /// `iptables -A FORWARD -i <input> -o <output> -m state ! --state NEW -j ACCEPT`
    pub async fn accept_established(&self, input: &str, output: &str) -> Result<(), RuleError> {
        let intent = RuleIntent::accept_established(input, output)?;
        self.apply(&intent).await.map(drop)
    }
}
