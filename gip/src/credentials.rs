//! Mutual-TLS credentials for the gRPC server
//!
//! Loads the server certificate/key pair and the CA bundle used to verify
//! client certificates. PEM only. The material is parsed up front so a bad
//! file fails startup instead of the first handshake.

use std::fs;
use std::path::{Path, PathBuf};

use tonic::transport::{Certificate, Identity, ServerTlsConfig};
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("could not load server key pair from {path}: {reason}")]
    KeyPair { path: PathBuf, reason: String },

    #[error("could not read ca certificate {path}: {source}")]
    ReadCa {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to append client certs from {0}")]
    NoCaCerts(PathBuf),
}

/// Server identity plus the CA that client certificates must chain to.
#[derive(Debug, Clone)]
pub struct CredentialBundle {
    identity: Identity,
    client_ca: Certificate,
}

impl CredentialBundle {
    /// TLS settings that require every client to present a certificate
    /// signed by the bundled CA.
    pub fn server_tls_config(&self) -> ServerTlsConfig {
        ServerTlsConfig::new()
            .identity(self.identity.clone())
            .client_ca_root(self.client_ca.clone())
    }
}

/// Load and check the server key pair and client CA.
pub fn load_credentials(
    cert_file: impl AsRef<Path>,
    key_file: impl AsRef<Path>,
    ca_file: impl AsRef<Path>,
) -> Result<CredentialBundle, CredentialError> {
    let (cert_file, key_file, ca_file) = (cert_file.as_ref(), key_file.as_ref(), ca_file.as_ref());
    info!(
        "Preparing credentials: cert-file {}, cert-key {}, ca {}",
        cert_file.display(),
        key_file.display(),
        ca_file.display()
    );

    let cert_pem = read_key_pair_file(cert_file)?;
    let cert_count = count_certs(&cert_pem).map_err(|reason| key_pair_error(cert_file, reason))?;
    if cert_count == 0 {
        return Err(key_pair_error(cert_file, "no certificates found"));
    }

    let key_pem = read_key_pair_file(key_file)?;
    rustls_pemfile::private_key(&mut key_pem.as_slice())
        .map_err(|e| key_pair_error(key_file, e))?
        .ok_or_else(|| key_pair_error(key_file, "no private key found"))?;

    let ca_pem = fs::read(ca_file).map_err(|source| CredentialError::ReadCa {
        path: ca_file.to_path_buf(),
        source,
    })?;
    match count_certs(&ca_pem) {
        Ok(count) if count > 0 => {}
        _ => return Err(CredentialError::NoCaCerts(ca_file.to_path_buf())),
    }

    Ok(CredentialBundle {
        identity: Identity::from_pem(cert_pem, key_pem),
        client_ca: Certificate::from_pem(ca_pem),
    })
}

fn read_key_pair_file(path: &Path) -> Result<Vec<u8>, CredentialError> {
    fs::read(path).map_err(|e| key_pair_error(path, e))
}

fn count_certs(pem: &[u8]) -> Result<usize, std::io::Error> {
    let mut reader = pem;
    let count = rustls_pemfile::certs(&mut reader).try_fold(0, |count, cert| cert.map(|_| count + 1));
    count
}

fn key_pair_error(path: &Path, reason: impl ToString) -> CredentialError {
    CredentialError::KeyPair {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}
