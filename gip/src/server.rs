//! RPC front door
//!
//! Assembles, in order: transport security (mutual TLS when configured),
//! the [`AuthGate`] as a server-wide layer, the reflection service, and the
//! IPTables handlers.
//!
//! Lifecycle: [`GipServer`] (unbound) → [`GipServer::bind`] → [`BoundServer`]
//! → [`BoundServer::serve`], which runs until the transport fails. There is
//! no way back from serving to bound.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::{Server, ServerTlsConfig};
use tracing::info;

use crate::auth::AuthGate;
use crate::config::IpTablesConfig;
use crate::credentials::{load_credentials, CredentialError};
use crate::executor::{CommandRunner, Executor};
use crate::proto::ip_tables_server::IpTablesServer;
use crate::proto::FILE_DESCRIPTOR_SET;
use crate::rules::RuleBuilder;
use crate::service::IpTablesService;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("error on retrieving certificates: {0}")]
    Credentials(#[from] CredentialError),

    #[error("invalid TLS configuration: {0}")]
    Tls(#[source] tonic::transport::Error),

    #[error("failed to build reflection service: {0}")]
    Reflection(#[from] tonic_reflection::server::Error),

    #[error("gRPC transport failed: {0}")]
    Transport(#[from] tonic::transport::Error),
}

/// A configured but not yet listening server.
pub struct GipServer {
    service: IpTablesService,
    gate: AuthGate,
    tls: Option<ServerTlsConfig>,
}

impl GipServer {
    pub fn new(service: IpTablesService, gate: AuthGate) -> Self {
        Self {
            service,
            gate,
            tls: None,
        }
    }

    pub fn with_tls(mut self, tls: ServerTlsConfig) -> Self {
        self.tls = Some(tls);
        self
    }

    pub fn is_secure(&self) -> bool {
        self.tls.is_some()
    }

    /// Build the server described by `config`, running commands through
    /// `runner`. Loads TLS credentials when TLS is enabled.
    pub fn from_config(
        config: &IpTablesConfig,
        runner: Arc<dyn CommandRunner>,
    ) -> Result<Self, ServerError> {
        let executor = Executor::new(runner)
            .with_tool(config.exec.binary.clone())
            .with_flags(config.exec.flags.clone())
            .with_sudo(config.exec.sudo);
        let service = IpTablesService::new(RuleBuilder::new(executor));
        let gate = AuthGate::jwt(&config.auth.sign_key, &config.auth.auth_key);

        let mut server = Self::new(service, gate);
        if config.tls.enabled {
            let bundle = load_credentials(
                &config.tls.cert_file,
                &config.tls.cert_key,
                &config.tls.ca_file,
            )?;
            server = server.with_tls(bundle.server_tls_config());
            info!("Server is running in secure mode");
        }
        Ok(server)
    }

    /// Start listening on `addr`. Use port 0 for an ephemeral port.
    pub async fn bind(self, addr: SocketAddr) -> Result<BoundServer, ServerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        Ok(BoundServer {
            server: self,
            listener,
        })
    }
}

/// A server holding a listening socket, ready to serve.
pub struct BoundServer {
    server: GipServer,
    listener: TcpListener,
}

impl BoundServer {
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept and dispatch calls until the listener or transport fails.
    pub async fn serve(self) -> Result<(), ServerError> {
        let GipServer { service, gate, tls } = self.server;
        let secure = tls.is_some();

        let mut builder = Server::builder();
        if let Some(tls) = tls {
            builder = builder.tls_config(tls).map_err(ServerError::Tls)?;
        }

        let reflection = tonic_reflection::server::Builder::configure()
            .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
            .build_v1()?;

        match self.listener.local_addr() {
            Ok(addr) => info!(%addr, secure, "gip gRPC service listening"),
            Err(e) => info!(secure, "gip gRPC service listening (address unknown: {e})"),
        }

        builder
            .layer(tonic::service::interceptor(gate))
            .add_service(reflection)
            .add_service(IpTablesServer::new(service))
            .serve_with_incoming(TcpListenerStream::new(self.listener))
            .await?;

        info!("gip gRPC service stopped");
        Ok(())
    }
}
