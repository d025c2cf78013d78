//! SSH transport adapter.
//!
//! Implements the russh server `Handler` for one connection:
//! - public key offers go through the authentication gate
//! - `pty-req`, `shell`, `exec` and `window-change` build a `Session`
//! - channel data and EOF feed the session's client input
//! - the bridge's outcome becomes `exit-status`, EOF and close
//!
//! Only one session channel is served per connection.

use std::net::SocketAddr;
use std::sync::Arc;

use russh::keys::{PublicKey, PublicKeyBase64};
use russh::server::{Auth, Handle, Handler, Msg, Session as SshSession};
use russh::{Channel, ChannelId, CryptoVec};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use keysh_core::constants::{
    CLIENT_INPUT_QUEUE_DEPTH, CLIENT_PIPE_CAPACITY, DEFAULT_TERM, FAILURE_EXIT_STATUS,
    FORWARD_BUFFER_SIZE,
};
use keysh_core::{PtyRequest, Session, SessionHandle, SessionState, TermSize};

use crate::config::ServerConfig;

/// Error type for the russh handler.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Ssh(#[from] russh::Error),

    #[error(transparent)]
    Core(#[from] keysh_core::Error),
}

/// Per-connection handler state.
pub struct SshHandler {
    config: Arc<ServerConfig>,
    peer: Option<SocketAddr>,
    local: Option<SocketAddr>,
    state: SessionState,
    user: Option<String>,
    /// The one session channel this connection may use.
    channel: Option<ChannelId>,
    /// Terminal requested before `shell`/`exec`.
    pty: Option<PtyRequest>,
    /// Client bytes toward the running session.
    input_tx: Option<mpsc::Sender<Vec<u8>>>,
    /// Resizes and cancellation for the running session. Dropping it (on
    /// channel close or when the connection goes away) kills the process.
    session: Option<SessionHandle>,
    /// Whether `shell`/`exec` has already started a session.
    started: bool,
}

impl SshHandler {
    pub fn new(
        config: Arc<ServerConfig>,
        peer: Option<SocketAddr>,
        local: Option<SocketAddr>,
    ) -> Self {
        Self {
            config,
            peer,
            local,
            state: SessionState::Connected,
            user: None,
            channel: None,
            pty: None,
            input_tx: None,
            session: None,
            started: false,
        }
    }

    /// Current lifecycle state of this connection.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Run an offered key through the gate. `signed` is false for the
    /// unsigned query that precedes the real attempt.
    fn decide(&self, user: &str, key: &PublicKey, signed: bool) -> Auth {
        let offered = format!("{} {}", key.algorithm().as_str(), key.public_key_base64());
        let gate = &self.config.gate;
        let decision = if signed {
            gate.authenticate_openssh(user, &offered)
        } else {
            gate.check_offered_openssh(user, &offered)
        };

        if decision.is_accept() {
            Auth::Accept
        } else {
            Auth::Reject {
                proceed_with_methods: None,
                partial_success: false,
            }
        }
    }

    fn is_our_channel(&self, channel: ChannelId) -> bool {
        self.channel == Some(channel)
    }

    /// Start the session on `channel` and spawn the task that serves it.
    fn start_session(
        &mut self,
        channel: ChannelId,
        command_line: String,
        session: &mut SshSession,
    ) -> Result<(), HandlerError> {
        if !self.is_our_channel(channel) || self.started {
            warn!(?channel, "Rejecting second session request");
            let _ = session.channel_failure(channel);
            return Ok(());
        }
        self.started = true;
        let _ = session.channel_success(channel);

        let user = self.user.clone().unwrap_or_default();
        info!(
            user = %user,
            remote = ?self.peer,
            local = ?self.local,
            command = %command_line,
            "New session"
        );

        let (input_tx, input_rx) = client_input_channel();
        self.input_tx = Some(input_tx);

        let (request, control) =
            Session::new(user.clone(), self.peer, command_line, self.pty.clone());
        self.session = Some(control);
        let bridge = self.config.bridge();
        let handle = session.handle();

        tokio::spawn(async move {
            let (client_reader, client_writer) = tokio::io::duplex(CLIENT_PIPE_CAPACITY);
            let (output_writer, output_reader) = tokio::io::duplex(CLIENT_PIPE_CAPACITY);

            let feeder = tokio::spawn(feed_client_input(input_rx, client_writer));
            let (outcome, ()) = tokio::join!(
                bridge.run(request, client_reader, output_writer),
                pump_output(output_reader, handle.clone(), channel),
            );
            feeder.abort();

            let exit_status = match outcome {
                Ok(outcome) => outcome.exit_status,
                Err(e) => {
                    warn!(error = %e, "Session failed");
                    FAILURE_EXIT_STATUS
                }
            };

            let _ = handle.exit_status_request(channel, exit_status).await;
            let _ = handle.eof(channel).await;
            let _ = handle.close(channel).await;
            info!(user = %user, "disconnected");
        });

        Ok(())
    }
}

/// Bounded queue between the handler and the session's input pipe.
///
/// When the process stops reading, the queue fills and `data` waits, which
/// stops russh from reading further channel data.
fn client_input_channel() -> (mpsc::Sender<Vec<u8>>, mpsc::Receiver<Vec<u8>>) {
    mpsc::channel(CLIENT_INPUT_QUEUE_DEPTH)
}

/// Move client bytes from the handler into the session's input pipe.
///
/// Dropping the sender (channel EOF) closes the pipe.
async fn feed_client_input(mut rx: mpsc::Receiver<Vec<u8>>, mut writer: DuplexStream) {
    while let Some(data) = rx.recv().await {
        if writer.write_all(&data).await.is_err() {
            break;
        }
    }
    debug!("Client input closed");
}

/// Send everything the session writes to the SSH channel.
async fn pump_output(mut reader: DuplexStream, handle: Handle, channel: ChannelId) {
    let mut buf = vec![0u8; FORWARD_BUFFER_SIZE];
    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        if handle.data(channel, CryptoVec::from_slice(&buf[..n])).await.is_err() {
            debug!(?channel, "Channel closed while sending output");
            break;
        }
    }
}

impl Handler for SshHandler {
    type Error = HandlerError;

    async fn auth_publickey_offered(
        &mut self,
        user: &str,
        public_key: &PublicKey,
    ) -> Result<Auth, Self::Error> {
        Ok(self.decide(user, public_key, false))
    }

    async fn auth_publickey(
        &mut self,
        user: &str,
        public_key: &PublicKey,
    ) -> Result<Auth, Self::Error> {
        let auth = self.decide(user, public_key, true);
        if matches!(auth, Auth::Accept) && self.state == SessionState::Connected {
            self.state.transition(SessionState::Authenticated)?;
            self.user = Some(user.to_string());
        }
        Ok(auth)
    }

    async fn channel_open_session(
        &mut self,
        channel: Channel<Msg>,
        _session: &mut SshSession,
    ) -> Result<bool, Self::Error> {
        if self.state != SessionState::Authenticated || self.channel.is_some() {
            debug!(channel = ?channel.id(), "Refusing additional session channel");
            return Ok(false);
        }
        self.channel = Some(channel.id());
        Ok(true)
    }

    async fn pty_request(
        &mut self,
        channel: ChannelId,
        term: &str,
        col_width: u32,
        row_height: u32,
        _pix_width: u32,
        _pix_height: u32,
        _modes: &[(russh::Pty, u32)],
        session: &mut SshSession,
    ) -> Result<(), Self::Error> {
        if !self.is_our_channel(channel) || self.started {
            let _ = session.channel_failure(channel);
            return Ok(());
        }

        let term = if term.is_empty() { DEFAULT_TERM } else { term };
        let size = TermSize::from_wire(col_width, row_height);
        debug!(term, cols = size.cols, rows = size.rows, "PTY request");

        self.pty = Some(PtyRequest {
            term: term.to_string(),
            size,
        });
        let _ = session.channel_success(channel);
        Ok(())
    }

    async fn shell_request(
        &mut self,
        channel: ChannelId,
        session: &mut SshSession,
    ) -> Result<(), Self::Error> {
        self.start_session(channel, String::new(), session)
    }

    async fn exec_request(
        &mut self,
        channel: ChannelId,
        data: &[u8],
        session: &mut SshSession,
    ) -> Result<(), Self::Error> {
        let command_line = String::from_utf8_lossy(data).into_owned();
        self.start_session(channel, command_line, session)
    }

    async fn window_change_request(
        &mut self,
        channel: ChannelId,
        col_width: u32,
        row_height: u32,
        _pix_width: u32,
        _pix_height: u32,
        _session: &mut SshSession,
    ) -> Result<(), Self::Error> {
        if !self.is_our_channel(channel) {
            return Ok(());
        }
        let size = TermSize::from_wire(col_width, row_height);

        match (&self.session, &mut self.pty) {
            (Some(session), _) => {
                session.resize(size);
            }
            // Not started yet: fold into the initial size
            (None, Some(pty)) => pty.size = size,
            (None, None) => {}
        }
        Ok(())
    }

    async fn data(
        &mut self,
        channel: ChannelId,
        data: &[u8],
        _session: &mut SshSession,
    ) -> Result<(), Self::Error> {
        if !self.is_our_channel(channel) {
            return Ok(());
        }
        if let Some(tx) = &self.input_tx {
            if tx.send(data.to_vec()).await.is_err() {
                self.input_tx = None;
            }
        }
        Ok(())
    }

    async fn channel_eof(
        &mut self,
        channel: ChannelId,
        _session: &mut SshSession,
    ) -> Result<(), Self::Error> {
        debug!(?channel, "Channel EOF");
        if self.is_our_channel(channel) {
            // Drop the sender to signal EOF to the session
            self.input_tx = None;
        }
        Ok(())
    }

    async fn channel_close(
        &mut self,
        channel: ChannelId,
        _session: &mut SshSession,
    ) -> Result<(), Self::Error> {
        debug!(?channel, "Channel closed");
        if self.is_our_channel(channel) {
            self.input_tx = None;
            if let Some(session) = self.session.take() {
                session.cancel();
            }
        }
        Ok(())
    }
}
