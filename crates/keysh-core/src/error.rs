//! Error types for keysh-core.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for keysh operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from underlying system calls.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Credential file could not be read.
    #[error("cannot read credential file {}: {source}", path.display())]
    CredentialFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Pseudo-terminal allocation or process spawn failed.
    #[error("failed to launch {argv:?}: {source}")]
    Launch {
        argv: Vec<String>,
        #[source]
        source: std::io::Error,
    },

    /// Invalid state transition.
    #[error("invalid state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },

    /// Transport layer error.
    #[error("transport error: {message}")]
    Transport { message: String },

    /// PTY error.
    #[error("pty error: {message}")]
    Pty { message: String },

    /// Invalid startup configuration.
    #[error("config error: {message}")]
    Config { message: String },
}

impl Error {
    /// Returns true if this error only means the peer or the process went away.
    ///
    /// Forwarding loops treat these as a normal end of session rather than
    /// something worth reporting.
    pub fn is_disconnect(&self) -> bool {
        match self {
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }
}

/// Convenience result type for keysh operations.
pub type Result<T> = std::result::Result<T, Error>;
