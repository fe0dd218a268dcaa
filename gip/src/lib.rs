//! gip — authenticated gRPC control plane for host iptables rules
//!
//! Every inbound call passes through optional mutual TLS and a bearer-token
//! check before it reaches the rule handlers. Handlers turn a rule intent
//! into exactly one `iptables` invocation:
//! auth gate → handler → rule builder → executor → iptables.

pub mod auth;
pub mod config;
pub mod credentials;
pub mod error;
pub mod executor;
pub mod interfaces;
pub mod rules;
pub mod server;
pub mod service;

pub mod proto {
    tonic::include_proto!("iptables");

    /// Encoded descriptors for the reflection service.
    pub const FILE_DESCRIPTOR_SET: &[u8] =
        tonic::include_file_descriptor_set!("iptables_descriptor");
}

pub use error::{ExecCause, ExecError, RuleError};
pub use server::{BoundServer, GipServer};
