//! keysh-server: Server library for the keysh remote shell.
//!
//! Provides:
//! - PTY allocation and child process supervision
//! - The session bridge (interactive and batch modes)
//! - The SSH transport adapter and TCP listener
//! - CLI and server configuration

pub mod bridge;
pub mod cli;
pub mod config;
pub mod listener;
pub mod process;
pub mod pty;
pub mod ssh;

pub use bridge::{ForwardingTasks, SessionBridge, SessionOutcome};
pub use cli::Cli;
pub use config::ServerConfig;
pub use listener::Listener;
pub use process::{BatchOutput, ProcessHandle, PtyProcess, run_to_completion, start_interactive};
pub use pty::Pty;
pub use ssh::{HandlerError, SshHandler};
