//! Shared fixtures for the front-door integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use gip::auth::AuthGate;
use gip::error::{ExecCause, ExecError};
use gip::executor::{CommandRunner, Executor};
use gip::rules::RuleBuilder;
use gip::service::IpTablesService;
use gip::GipServer;
use tokio::task::JoinHandle;

pub const SIGN_KEY: &str = "test-sign-key";
pub const AUTH_KEY: &str = "test-auth-key";

/// Records every command instead of running it.
#[derive(Default)]
pub struct RecordingRunner {
    calls: Mutex<Vec<(String, Vec<String>)>>,
    failure: Option<&'static [u8]>,
}

impl RecordingRunner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A runner whose commands all exit 1 with `output`.
    pub fn failing(output: &'static [u8]) -> Arc<Self> {
        Arc::new(Self {
            failure: Some(output),
            ..Default::default()
        })
    }

    pub fn calls(&self) -> Vec<(String, Vec<String>)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[tonic::async_trait]
impl CommandRunner for RecordingRunner {
    async fn run(&self, program: &str, args: &[String]) -> Result<Vec<u8>, ExecError> {
        self.calls
            .lock()
            .unwrap()
            .push((program.to_string(), args.to_vec()));
        match self.failure {
            Some(output) => Err(ExecError::new(
                output.to_vec(),
                ExecCause::Exit {
                    program: program.to_string(),
                    code: Some(1),
                },
            )),
            None => Ok(Vec::new()),
        }
    }
}

pub fn server_with(runner: Arc<RecordingRunner>) -> GipServer {
    let rules = RuleBuilder::new(Executor::new(runner));
    GipServer::new(IpTablesService::new(rules), AuthGate::jwt(SIGN_KEY, AUTH_KEY))
}

/// Bind on an ephemeral loopback port and serve in the background.
pub async fn spawn(server: GipServer) -> (SocketAddr, JoinHandle<()>) {
    let bound = server
        .bind("127.0.0.1:0".parse().unwrap())
        .await
        .unwrap();
    let addr = bound.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let _ = bound.serve().await;
    });
    (addr, handle)
}

/// PEM material for a CA and a leaf certificate it signed.
pub struct Pki {
    pub ca_cert: String,
    pub ca: rcgen::Certificate,
    pub ca_key: rcgen::KeyPair,
}

pub struct Leaf {
    pub cert: String,
    pub key: String,
}

impl Pki {
    pub fn new(name: &str) -> Self {
        let mut params = rcgen::CertificateParams::new(Vec::<String>::new()).unwrap();
        params.is_ca = rcgen::IsCa::Ca(rcgen::BasicConstraints::Unconstrained);
        params
            .distinguished_name
            .push(rcgen::DnType::CommonName, name);
        let ca_key = rcgen::KeyPair::generate().unwrap();
        let ca = params.self_signed(&ca_key).unwrap();
        Self {
            ca_cert: ca.pem(),
            ca,
            ca_key,
        }
    }

    pub fn issue(&self, dns_name: &str) -> Leaf {
        let mut params = rcgen::CertificateParams::new(vec![dns_name.to_string()]).unwrap();
        params
            .distinguished_name
            .push(rcgen::DnType::CommonName, dns_name);
        params.extended_key_usages = vec![
            rcgen::ExtendedKeyUsagePurpose::ServerAuth,
            rcgen::ExtendedKeyUsagePurpose::ClientAuth,
        ];
        let key = rcgen::KeyPair::generate().unwrap();
        let cert = params.signed_by(&key, &self.ca, &self.ca_key).unwrap();
        Leaf {
            cert: cert.pem(),
            key: key.serialize_pem(),
        }
    }
}
