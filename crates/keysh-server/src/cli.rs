//! Server CLI implementation.
//!
//! Provides command-line argument parsing for the keysh server.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{ArgAction, Parser, ValueEnum};
use keysh_core::constants::{DEFAULT_COMMAND, DEFAULT_LISTEN_ADDR};

/// Log output format for CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum CliLogFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// Structured JSON output.
    Json,
}

impl From<CliLogFormat> for keysh_core::LogFormat {
    fn from(fmt: CliLogFormat) -> Self {
        match fmt {
            CliLogFormat::Text => keysh_core::LogFormat::Text,
            CliLogFormat::Json => keysh_core::LogFormat::Json,
        }
    }
}

/// keysh server - public-key authenticated remote shell.
#[derive(Debug, Parser)]
#[command(
    name = "keysh-server",
    version,
    about = "keysh server - public-key authenticated remote shell"
)]
pub struct Cli {
    /// Address to listen on
    #[arg(
        short = 'l',
        long = "listen",
        default_value = DEFAULT_LISTEN_ADDR,
        env = "KEYSH_LISTEN"
    )]
    pub listen: SocketAddr,

    /// Command to run when the client does not send one
    #[arg(
        long = "cmd",
        default_value = DEFAULT_COMMAND,
        value_name = "PROGRAM",
        env = "KEYSH_CMD"
    )]
    pub cmd: String,

    /// Trusted keys file (default: $HOME/.ssh/authorized_keys)
    #[arg(long = "authorized-keys", value_name = "PATH", env = "KEYSH_AUTHORIZED_KEYS")]
    pub authorized_keys: Option<PathBuf>,

    /// Additional trusted key, as one authorized_keys line
    #[arg(long = "pubkey", value_name = "LINE", env = "KEYSH_PUBKEY")]
    pub pubkey: Option<String>,

    /// Host private key in OpenSSH format (default: ephemeral Ed25519 key)
    #[arg(long = "host-key", value_name = "PATH", env = "KEYSH_HOST_KEY")]
    pub host_key: Option<PathBuf>,

    /// Increase verbosity (can be repeated: -v, -vv, -vvv)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,

    /// Log to file instead of stderr
    #[arg(long = "log-file", value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Log output format
    #[arg(long = "log-format", default_value = "text")]
    pub log_format: CliLogFormat,
}

impl Cli {
    /// Trusted keys file to load, falling back to the per-user default.
    pub fn authorized_keys_path(&self) -> Option<PathBuf> {
        self.authorized_keys
            .clone()
            .or_else(keysh_core::auth::default_authorized_keys_path)
    }
}

// =============================================================================
// Tests
// =============================================================================
