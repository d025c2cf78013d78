//! TCP listener and accept loop.
//!
//! Each accepted socket gets its own task running the SSH protocol with a
//! fresh `SshHandler`. The listener keeps no per-connection state, so a
//! failing connection never affects the others.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use keysh_core::error::{Error, Result};

use crate::config::ServerConfig;
use crate::ssh::SshHandler;

/// Bound listener ready to accept connections.
pub struct Listener {
    listener: TcpListener,
    local_addr: SocketAddr,
    config: Arc<ServerConfig>,
    ssh_config: Arc<russh::server::Config>,
}

impl Listener {
    /// Bind to the configured listen address.
    pub async fn bind(config: Arc<ServerConfig>) -> Result<Self> {
        let listener = TcpListener::bind(config.listen_addr).await.map_err(|e| {
            Error::Transport {
                message: format!("failed to bind {}: {}", config.listen_addr, e),
            }
        })?;
        let local_addr = listener.local_addr()?;
        let ssh_config = Arc::new(config.ssh_config());

        Ok(Self {
            listener,
            local_addr,
            config,
            ssh_config,
        })
    }

    /// Get the local address this listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Run the accept loop until accepting fails.
    pub async fn run(self) -> Result<()> {
        info!(
            addr = %self.local_addr,
            trusted_keys = self.config.gate.trust_store().len(),
            default_command = %self.config.default_command,
            "Server starting"
        );

        loop {
            let (stream, peer) = self.listener.accept().await?;
            debug!(%peer, "Accepted connection");

            let config = Arc::clone(&self.config);
            let ssh_config = Arc::clone(&self.ssh_config);
            tokio::spawn(serve_connection(config, ssh_config, stream, peer));
        }
    }
}

/// Run the SSH protocol on one accepted socket until it closes.
async fn serve_connection(
    config: Arc<ServerConfig>,
    ssh_config: Arc<russh::server::Config>,
    stream: TcpStream,
    peer: SocketAddr,
) {
    let local = stream.local_addr().ok();
    let handler = SshHandler::new(config, Some(peer), local);

    match russh::server::run_stream(ssh_config, stream, handler).await {
        Ok(session) => {
            if let Err(e) = session.await {
                debug!(%peer, error = %e, "Connection ended with error");
            }
        }
        Err(e) => {
            warn!(%peer, error = %e, "SSH handshake failed");
        }
    }
    debug!(%peer, "Connection closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use keysh_core::TrustStore;

    use crate::config::generate_host_key;

    fn config(addr: &str) -> Arc<ServerConfig> {
        Arc::new(ServerConfig::new(
            addr.parse().unwrap(),
            "sh",
            TrustStore::default(),
            generate_host_key().unwrap(),
        ))
    }

    #[tokio::test]
    async fn bind_ephemeral_port() {
        let listener = Listener::bind(config("127.0.0.1:0")).await.unwrap();
        assert_ne!(listener.local_addr().port(), 0);
    }

    #[tokio::test]
    async fn bind_in_use_is_transport_error() {
        let first = Listener::bind(config("127.0.0.1:0")).await.unwrap();
        let taken = first.local_addr().to_string();
        let err = Listener::bind(config(&taken)).await.err().unwrap();
        assert!(matches!(err, Error::Transport { .. }));
    }
}
