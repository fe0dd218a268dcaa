//! gip configuration loading and validation

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_CONFIG_PATH: &str = "/etc/gip/config.toml";

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "CONFIG_FILE";

/// Root configuration structure
#[derive(Debug, Deserialize)]
pub struct Config {
    pub iptables: IpTablesConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize)]
pub struct IpTablesConfig {
    #[serde(default)]
    pub domain: DomainConfig,
    #[serde(default)]
    pub tls: TlsConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub exec: ExecConfig,
}

#[derive(Debug, Deserialize)]
pub struct DomainConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for DomainConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            port: default_port(),
        }
    }
}

impl DomainConfig {
    /// Address the server listens on: every interface, configured port.
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.port))
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct TlsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub cert_file: String,
    #[serde(default)]
    pub cert_key: String,
    #[serde(default)]
    pub ca_file: String,
}

#[derive(Debug, Deserialize)]
pub struct AuthConfig {
    pub auth_key: String,
    pub sign_key: String,
}

#[derive(Debug, Deserialize)]
pub struct ExecConfig {
    #[serde(default = "default_binary")]
    pub binary: String,
    #[serde(default)]
    pub sudo: bool,
    #[serde(default)]
    pub flags: Vec<String>,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            sudo: false,
            flags: Vec::new(),
            timeout_seconds: default_timeout(),
        }
    }
}

impl ExecConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_endpoint() -> String { "localhost".into() }
fn default_port() -> u16 { 5095 }
fn default_binary() -> String { "iptables".into() }
fn default_timeout() -> u64 { 30 }
fn default_log_level() -> String { "info".into() }

impl Config {
    /// Read, parse and validate a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        let ipt = &self.iptables;
        if ipt.auth.sign_key.is_empty() {
            bail!("iptables.auth.sign_key must not be empty");
        }
        if ipt.auth.auth_key.is_empty() {
            bail!("iptables.auth.auth_key must not be empty");
        }
        if ipt.domain.port == 0 {
            bail!("iptables.domain.port must not be 0");
        }
        if ipt.tls.enabled {
            for (name, value) in [
                ("cert_file", &ipt.tls.cert_file),
                ("cert_key", &ipt.tls.cert_key),
                ("ca_file", &ipt.tls.ca_file),
            ] {
                if value.is_empty() {
                    bail!("iptables.tls.{name} is required when TLS is enabled");
                }
            }
        }
        if ipt.exec.binary.is_empty() {
            bail!("iptables.exec.binary must not be empty");
        }
        if ipt.exec.timeout_seconds == 0 {
            bail!("iptables.exec.timeout_seconds must be greater than 0");
        }
        Ok(())
    }
}

/// Config path from `CONFIG_FILE`, falling back to /etc/gip/config.toml
pub fn config_path() -> PathBuf {
    std::env::var_os(CONFIG_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Make sure the path exists and is a regular file.
pub fn validate_config_path(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let meta = fs::metadata(path)
        .with_context(|| format!("Config file {} is not accessible", path.display()))?;
    if meta.is_dir() {
        bail!("'{}' is a directory, not a normal file", path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[iptables.auth]
auth_key = "iptservice-key"
sign_key = "signing-key"
"#;

    #[test]
    fn test_parse_minimal_config() {
        let config: Config = toml::from_str(MINIMAL).unwrap();
        config.validate().unwrap();
        assert_eq!(config.iptables.domain.port, 5095);
        assert_eq!(config.iptables.domain.endpoint, "localhost");
        assert!(!config.iptables.tls.enabled);
        assert_eq!(config.iptables.exec.binary, "iptables");
        assert_eq!(config.iptables.exec.timeout(), Duration::from_secs(30));
        assert!(!config.iptables.exec.sudo);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
[iptables.domain]
endpoint = "fw.example.org"
port = 4444

[iptables.tls]
enabled = true
cert_file = "/etc/gip/server.crt"
cert_key = "/etc/gip/server.key"
ca_file = "/etc/gip/ca.crt"

[iptables.auth]
auth_key = "a"
sign_key = "s"

[iptables.exec]
binary = "iptables-legacy"
sudo = true
flags = ["-w"]
timeout_seconds = 5

[logging]
level = "debug"
json = true
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        config.validate().unwrap();
        assert_eq!(config.iptables.domain.listen_addr().port(), 4444);
        assert_eq!(config.iptables.tls.ca_file, "/etc/gip/ca.crt");
        assert!(config.iptables.exec.sudo);
        assert_eq!(config.iptables.exec.flags, vec!["-w"]);
        assert_eq!(config.iptables.exec.timeout(), Duration::from_secs(5));
        assert!(config.logging.json);
    }

    #[test]
    fn test_missing_auth_section_fails() {
        let toml_str = r#"
[iptables.domain]
port = 4444
"#;
        assert!(toml::from_str::<Config>(toml_str).is_err());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config: Config = toml::from_str(MINIMAL).unwrap();
        config.iptables.auth.sign_key.clear();
        assert!(config.validate().is_err());

        let mut config: Config = toml::from_str(MINIMAL).unwrap();
        config.iptables.domain.port = 0;
        assert!(config.validate().is_err());

        let mut config: Config = toml::from_str(MINIMAL).unwrap();
        config.iptables.tls.enabled = true;
        config.iptables.tls.cert_file = "/etc/gip/server.crt".into();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("cert_key"));

        let mut config: Config = toml::from_str(MINIMAL).unwrap();
        config.iptables.exec.timeout_seconds = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, MINIMAL).unwrap();

        validate_config_path(&path).unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.iptables.auth.auth_key, "iptservice-key");
    }

    #[test]
    fn test_validate_config_path() {
        let dir = tempfile::tempdir().unwrap();
        let err = validate_config_path(dir.path()).unwrap_err();
        assert!(err.to_string().contains("is a directory, not a normal file"));

        assert!(validate_config_path(dir.path().join("missing.toml")).is_err());
    }
}
