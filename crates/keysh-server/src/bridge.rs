//! Session bridge.
//!
//! Runs one authenticated session end to end: resolves the command, picks
//! interactive or batch mode, wires the process to the client streams and
//! reports the exit status.
//!
//! In interactive mode three data paths run for the session's lifetime:
//! - input: client bytes into the pty (spawned task, aborted at the end)
//! - resize: resize events onto the pty (spawned task, stopped by a shutdown
//!   signal)
//! - output: pty bytes to the client (runs on the bridge's own task and
//!   decides when the session ends)
//!
//! Cancelling the session through its `SessionHandle` (or dropping the
//! handle) kills the process in either mode.

use std::future::Future;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use keysh_core::constants::{DEFAULT_TERM, FAILURE_EXIT_STATUS, FORWARD_BUFFER_SIZE};
use keysh_core::error::{Error, Result};
use keysh_core::{
    PtyControl, PtyRequest, ResolvedCommand, Session, SessionMode, SessionState, TermSize, resolve,
};

use crate::process::{PtyProcess, run_to_completion, start_interactive};
use crate::pty::Pty;

/// Result of a finished session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOutcome {
    /// Status to report to the client.
    pub exit_status: u32,
}

/// Orchestrates sessions for one server.
#[derive(Debug, Clone)]
pub struct SessionBridge {
    default_command: String,
}

impl SessionBridge {
    pub fn new(default_command: impl Into<String>) -> Self {
        Self {
            default_command: default_command.into(),
        }
    }

    /// Run `session` to completion.
    ///
    /// `input` carries client bytes and `output` receives everything the
    /// client should see. `output` is shut down before this returns.
    /// Returns early, with the process killed, if the session is cancelled.
    pub async fn run<R, W>(
        &self,
        mut session: Session,
        input: R,
        mut output: W,
    ) -> Result<SessionOutcome>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send,
    {
        let command = resolve(&session.command_line, &self.default_command);
        session.transition(SessionState::CommandResolved)?;
        let cancelled = session.cancelled();

        info!(
            user = %session.user,
            peer = ?session.peer,
            command = %command,
            mode = ?session.mode(),
            "Session started"
        );

        let exit_status = match session.mode() {
            SessionMode::Interactive => {
                session.transition(SessionState::InteractiveRunning)?;
                let request = session.pty.clone().unwrap_or_else(|| PtyRequest {
                    term: DEFAULT_TERM.to_string(),
                    size: TermSize::default(),
                });
                let resizes = session.take_resizes();
                run_interactive(&command, request, input, resizes, &mut output, cancelled).await
            }
            SessionMode::Batch => {
                session.transition(SessionState::BatchRunning)?;
                drop(input);
                run_batch(&command, &mut output, cancelled).await
            }
        };

        if let Err(e) = output.shutdown().await {
            debug!(error = %e, "Client output already closed");
        }
        session.transition(SessionState::Terminated)?;

        info!(user = %session.user, exit_status, "Session ended");
        Ok(SessionOutcome { exit_status })
    }
}

async fn run_interactive<R, W>(
    command: &ResolvedCommand,
    request: PtyRequest,
    input: R,
    resizes: mpsc::UnboundedReceiver<TermSize>,
    output: &mut W,
    cancelled: impl Future<Output = ()>,
) -> u32
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send,
{
    let started = start_interactive(command, &request.term, request.size);
    let PtyProcess { pty, mut handle } = match started {
        Ok(process) => process,
        Err(e) => {
            warn!(command = %command, error = %e, "Failed to start interactive process");
            let line = format_diagnostic(command, &error_text(&e), None);
            write_result(output, line.as_bytes()).await;
            return FAILURE_EXIT_STATUS;
        }
    };

    let tasks = ForwardingTasks::spawn(Arc::clone(&pty), input, resizes);

    let end = tokio::select! {
        end = copy_output(&pty, output) => end,
        () = cancelled => {
            debug!(command = %command, "Session cancelled");
            OutputEnd::ClientGone
        }
    };
    if end == OutputEnd::ClientGone {
        debug!("Client went away, terminating process");
        if let Err(e) = handle.kill() {
            debug!(error = %e, "Failed to signal process");
        }
    }

    tasks.shutdown().await;

    let status = match handle.wait().await {
        Ok(code) => u32::try_from(code).unwrap_or(FAILURE_EXIT_STATUS),
        Err(e) => {
            warn!(error = %e, "Failed to reap process");
            FAILURE_EXIT_STATUS
        }
    };

    // Last reference: closes the master
    drop(pty);
    status
}

async fn run_batch<W>(
    command: &ResolvedCommand,
    output: &mut W,
    cancelled: impl Future<Output = ()>,
) -> u32
where
    W: AsyncWrite + Unpin + Send,
{
    // Dropping the run kills the child
    let result = tokio::select! {
        result = run_to_completion(command) => result,
        () = cancelled => {
            debug!(command = %command, "Session cancelled, batch process killed");
            return FAILURE_EXIT_STATUS;
        }
    };

    let (bytes, status) = match result {
        Ok(result) if result.success() => (result.output, 0),
        Ok(result) => {
            let err = format!("exit status {}", result.status);
            let line = format_diagnostic(command, &err, Some(&result.output));
            (line.into_bytes(), FAILURE_EXIT_STATUS)
        }
        Err(e) => {
            warn!(command = %command, error = %e, "Batch command failed to run");
            let line = format_diagnostic(command, &error_text(&e), None);
            (line.into_bytes(), FAILURE_EXIT_STATUS)
        }
    };

    write_result(output, &bytes).await;
    status
}

/// Write a one-shot result (batch output or diagnostic) to the client.
async fn write_result<W>(output: &mut W, bytes: &[u8])
where
    W: AsyncWrite + Unpin + Send,
{
    if let Err(e) = output.write_all(bytes).await {
        debug!(error = %e, "Client output closed before the result was written");
    }
}

/// Why the output copy stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputEnd {
    /// The pty reached EOF or failed; the process is gone or going.
    ProcessClosed,
    /// Writing to the client failed.
    ClientGone,
}

async fn copy_output<W>(pty: &Pty, output: &mut W) -> OutputEnd
where
    W: AsyncWrite + Unpin + Send,
{
    let mut buf = vec![0u8; FORWARD_BUFFER_SIZE];
    loop {
        match pty.read(&mut buf).await {
            Ok(Some(n)) => {
                if output.write_all(&buf[..n]).await.is_err() {
                    return OutputEnd::ClientGone;
                }
            }
            Ok(None) => {
                debug!("PTY EOF");
                return OutputEnd::ProcessClosed;
            }
            Err(e) => {
                debug!(error = %e, "PTY read error");
                return OutputEnd::ProcessClosed;
            }
        }
    }
}

/// The input and resize tasks of one interactive session.
pub struct ForwardingTasks {
    input: JoinHandle<()>,
    resize: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
}

impl ForwardingTasks {
    /// Spawn the input and resize forwarders for `pty`.
    pub fn spawn<R>(pty: Arc<Pty>, input: R, resizes: mpsc::UnboundedReceiver<TermSize>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let control: Arc<dyn PtyControl> = pty.clone();

        let input = tokio::spawn(forward_input(input, pty));
        let resize = tokio::spawn(forward_resizes(resizes, control, shutdown_rx));

        Self {
            input,
            resize,
            shutdown_tx,
        }
    }

    /// Stop both forwarders and wait until they have ended.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        self.input.abort();

        if let Err(e) = self.input.await {
            if !e.is_cancelled() {
                warn!(error = %e, "Input forwarder panicked");
            }
        }
        if let Err(e) = self.resize.await {
            warn!(error = %e, "Resize forwarder panicked");
        }
    }
}

/// Copy client bytes into the pty until either side closes.
async fn forward_input<R>(mut input: R, pty: Arc<Pty>)
where
    R: AsyncRead + Unpin + Send,
{
    let mut buf = vec![0u8; FORWARD_BUFFER_SIZE];
    loop {
        let n = match input.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                let e = Error::from(e);
                if e.is_disconnect() {
                    debug!(error = %e, "Client input closed");
                } else {
                    warn!(error = %e, "Client input error");
                }
                break;
            }
        };
        if let Err(e) = pty.write(&buf[..n]).await {
            debug!(error = %e, "PTY write error");
            break;
        }
    }
    debug!("Input forwarder ended");
}

/// Apply resize events in order until the sequence closes or shutdown fires.
pub async fn forward_resizes(
    mut resizes: mpsc::UnboundedReceiver<TermSize>,
    control: Arc<dyn PtyControl>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            event = resizes.recv() => match event {
                Some(size) => {
                    if let Err(e) = control.resize(size) {
                        warn!(cols = size.cols, rows = size.rows, error = %e, "Resize failed");
                    }
                }
                None => break,
            },
        }
    }
    debug!("Resize forwarder ended");
}

/// Diagnostic line sent to the client when a command fails.
pub fn format_diagnostic(command: &ResolvedCommand, err: &str, output: Option<&[u8]>) -> String {
    match output {
        Some(out) => format!(
            "cmd: {}, err: {}, out: {}\n",
            command,
            err,
            String::from_utf8_lossy(out)
        ),
        None => format!("cmd: {}, err: {}\n", command, err),
    }
}

/// Text for the `err:` field; launch failures show the OS error only.
fn error_text(e: &Error) -> String {
    match e {
        Error::Launch { source, .. } => source.to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keysh_core::SessionHandle;
    use keysh_test_utils::FakePty;

    fn session(command_line: &str, pty: Option<PtyRequest>) -> (Session, SessionHandle) {
        Session::new("tester", None, command_line, pty)
    }

    fn terminal(cols: u16, rows: u16) -> Option<PtyRequest> {
        Some(PtyRequest {
            term: "xterm".into(),
            size: TermSize::new(cols, rows),
        })
    }

    #[test]
    fn diagnostic_without_output() {
        let cmd = resolve("nope --flag", "bash");
        assert_eq!(
            format_diagnostic(&cmd, "not found", None),
            "cmd: [nope --flag], err: not found\n"
        );
    }

    #[test]
    fn diagnostic_with_output() {
        let cmd = resolve("false", "bash");
        assert_eq!(
            format_diagnostic(&cmd, "exit status 1", Some(b"oops")),
            "cmd: [false], err: exit status 1, out: oops\n"
        );
    }

    #[tokio::test]
    async fn resize_forwarder_applies_in_order() {
        let fake = Arc::new(FakePty::new());
        let (tx, rx) = mpsc::unbounded_channel();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        tx.send(TermSize::new(80, 24)).unwrap();
        tx.send(TermSize::new(120, 40)).unwrap();
        tx.send(TermSize::new(120, 40)).unwrap();
        drop(tx);

        forward_resizes(rx, fake.clone(), shutdown_rx).await;

        assert_eq!(
            fake.resize_history(),
            vec![
                TermSize::new(80, 24),
                TermSize::new(120, 40),
                TermSize::new(120, 40)
            ]
        );
        assert_eq!(fake.size().unwrap(), TermSize::new(120, 40));
    }

    #[tokio::test]
    async fn resize_forwarder_stops_on_shutdown() {
        let fake = Arc::new(FakePty::new());
        let (tx, rx) = mpsc::unbounded_channel::<TermSize>();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(forward_resizes(rx, fake.clone(), shutdown_rx));
        shutdown_tx.send(true).unwrap();
        task.await.unwrap();

        // Sender is still alive, so only the signal could have ended the task
        assert!(tx.send(TermSize::new(1, 1)).is_err());
        assert!(fake.resize_history().is_empty());
    }

    #[tokio::test]
    async fn resize_forwarder_survives_resize_errors() {
        let fake = Arc::new(FakePty::new());
        fake.close();
        let (tx, rx) = mpsc::unbounded_channel();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        tx.send(TermSize::new(100, 50)).unwrap();
        drop(tx);
        forward_resizes(rx, fake.clone(), shutdown_rx).await;
        assert!(fake.resize_history().is_empty());
    }

    #[tokio::test]
    async fn batch_failure_writes_diagnostic() {
        let bridge = SessionBridge::new("bash");
        let (session, _handle) = session("false", None);
        let mut out = Vec::new();

        let outcome = bridge.run(session, tokio::io::empty(), &mut out).await.unwrap();

        assert_eq!(outcome.exit_status, 1);
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("cmd: [false], err: exit status 1"), "{text}");
        assert!(text.ends_with('\n'));
    }

    #[tokio::test]
    async fn batch_success_writes_output() {
        let bridge = SessionBridge::new("bash");
        let (session, _handle) = session("echo hi there", None);
        let mut out = Vec::new();

        let outcome = bridge.run(session, tokio::io::empty(), &mut out).await.unwrap();

        assert_eq!(outcome.exit_status, 0);
        assert_eq!(out, b"hi there\n");
    }

    #[tokio::test]
    async fn empty_command_uses_default() {
        let bridge = SessionBridge::new("true");
        let (session, _handle) = session("   ", None);
        let mut out = Vec::new();

        let outcome = bridge.run(session, tokio::io::empty(), &mut out).await.unwrap();
        assert_eq!(outcome.exit_status, 0);
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn batch_launch_failure_writes_diagnostic() {
        let bridge = SessionBridge::new("bash");
        let (session, _handle) = session("keysh-no-such-program arg", None);
        let mut out = Vec::new();

        let outcome = bridge.run(session, tokio::io::empty(), &mut out).await.unwrap();

        assert_eq!(outcome.exit_status, 1);
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("cmd: [keysh-no-such-program arg], err: "), "{text}");
        assert!(!text.contains(", out: "));
    }

    #[tokio::test]
    async fn interactive_launch_failure_writes_diagnostic() {
        let bridge = SessionBridge::new("bash");
        let (session, _handle) = session("keysh-no-such-program", terminal(80, 24));
        let mut out = Vec::new();

        let outcome = bridge.run(session, tokio::io::empty(), &mut out).await.unwrap();

        assert_eq!(outcome.exit_status, 1);
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("cmd: [keysh-no-such-program], err: "), "{text}");
    }

    #[tokio::test]
    async fn interactive_echo() {
        let bridge = SessionBridge::new("bash");
        let (session, _handle) = session("echo hello", terminal(80, 24));
        let (client_in, _keep_open) = tokio::io::duplex(64);
        let mut out = Vec::new();

        let outcome = bridge.run(session, client_in, &mut out).await.unwrap();

        assert_eq!(outcome.exit_status, 0);
        // The pty line discipline turns \n into \r\n
        let text = String::from_utf8_lossy(&out);
        assert!(text.ends_with("hello\r\n"), "{text:?}");
    }

    #[tokio::test]
    async fn interactive_reports_exit_status() {
        // Command lines split on whitespace, so the script lives in a file
        let mut script = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut script, b"exit 3\n").unwrap();

        let bridge = SessionBridge::new("bash");
        let line = format!("sh {}", script.path().display());
        let (session, _handle) = session(&line, terminal(80, 24));
        let mut out = Vec::new();

        let outcome = bridge.run(session, tokio::io::empty(), &mut out).await.unwrap();
        assert_eq!(outcome.exit_status, 3);
    }
}
