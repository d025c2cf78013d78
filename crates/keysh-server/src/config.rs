//! Immutable server configuration.
//!
//! Built once from the CLI and shared by `Arc` between the listener and
//! every connection handler.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use russh::keys::ssh_key::rand_core::OsRng;
use russh::keys::PrivateKey;
use russh::keys::ssh_key::{Algorithm, HashAlg};
use russh::{MethodKind, MethodSet, SshId};
use tracing::{info, warn};

use keysh_core::constants::{MAX_AUTH_ATTEMPTS, SERVER_ID};
use keysh_core::error::{Error, Result};
use keysh_core::{AuthenticationGate, TrustStore};

use crate::bridge::SessionBridge;
use crate::cli::Cli;

/// Server configuration shared by all connections.
pub struct ServerConfig {
    /// Address to bind.
    pub listen_addr: SocketAddr,
    /// Command run when the client sends none.
    pub default_command: String,
    /// Gate over the trusted key set.
    pub gate: AuthenticationGate,
    /// SSH host key.
    pub host_key: PrivateKey,
}

impl ServerConfig {
    /// Build the configuration from parsed CLI arguments.
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let trust = TrustStore::load(cli.authorized_keys_path().as_deref(), cli.pubkey.as_deref());
        if trust.is_empty() {
            warn!("No trusted keys loaded; every connection will be rejected");
        }

        let host_key = match &cli.host_key {
            Some(path) => load_host_key(path)?,
            None => generate_host_key()?,
        };

        Ok(Self::new(cli.listen, cli.cmd.clone(), trust, host_key))
    }

    pub fn new(
        listen_addr: SocketAddr,
        default_command: impl Into<String>,
        trust: TrustStore,
        host_key: PrivateKey,
    ) -> Self {
        Self {
            listen_addr,
            default_command: default_command.into(),
            gate: AuthenticationGate::new(Arc::new(trust)),
            host_key,
        }
    }

    /// Bridge for sessions served with this configuration.
    pub fn bridge(&self) -> SessionBridge {
        SessionBridge::new(self.default_command.clone())
    }

    /// Protocol settings for russh: public key auth only.
    pub fn ssh_config(&self) -> russh::server::Config {
        russh::server::Config {
            server_id: SshId::Standard(SERVER_ID.to_string()),
            methods: MethodSet::from(&[MethodKind::PublicKey][..]),
            max_auth_attempts: MAX_AUTH_ATTEMPTS,
            auth_rejection_time: Duration::from_secs(1),
            auth_rejection_time_initial: Some(Duration::from_secs(0)),
            keys: vec![self.host_key.clone()],
            ..Default::default()
        }
    }
}

/// Load an OpenSSH private key for the server.
pub fn load_host_key(path: &Path) -> Result<PrivateKey> {
    let key = russh::keys::load_secret_key(path, None).map_err(|e| Error::Config {
        message: format!("failed to load host key {}: {}", path.display(), e),
    })?;
    info!(
        path = %path.display(),
        fingerprint = %key.public_key().fingerprint(HashAlg::Sha256),
        "Loaded host key"
    );
    Ok(key)
}

/// Generate an ephemeral Ed25519 host key.
pub fn generate_host_key() -> Result<PrivateKey> {
    let key = PrivateKey::random(&mut OsRng, Algorithm::Ed25519).map_err(|e| Error::Config {
        message: format!("failed to generate host key: {}", e),
    })?;
    info!(
        fingerprint = %key.public_key().fingerprint(HashAlg::Sha256),
        "Generated ephemeral host key"
    );
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use keysh_test_utils::TestKeys;
    use std::io::Write;

    #[test]
    fn from_cli_loads_file_and_inline_key() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(TestKeys::authorized_keys(&[TestKeys::ALICE]).as_bytes())
            .unwrap();
        let path = file.path().to_str().unwrap();

        let cli = Cli::try_parse_from([
            "keysh-server",
            "--authorized-keys",
            path,
            "--pubkey",
            TestKeys::BOB,
        ])
        .unwrap();
        let config = ServerConfig::from_cli(&cli).unwrap();

        assert_eq!(config.gate.trust_store().len(), 2);
        assert_eq!(config.default_command, "bash");
    }

    #[test]
    fn missing_host_key_file_is_config_error() {
        let err = load_host_key(Path::new("/nonexistent/keysh/host_key")).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn ssh_config_uses_host_key() {
        let config = ServerConfig::new(
            "127.0.0.1:0".parse().unwrap(),
            "sh",
            TrustStore::default(),
            generate_host_key().unwrap(),
        );
        let ssh = config.ssh_config();
        assert_eq!(ssh.keys.len(), 1);
        assert_eq!(ssh.max_auth_attempts, MAX_AUTH_ATTEMPTS);
    }
}
