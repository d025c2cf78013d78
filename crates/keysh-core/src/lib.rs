//! keysh-core: Shared library for the keysh remote shell server.
//!
//! This crate provides:
//! - Trusted key loading and the authentication gate
//! - Command line resolution
//! - Session model and lifecycle state machine
//! - Terminal geometry and the resize capability trait
//! - Error types and logging setup

pub mod auth;
pub mod command;
pub mod constants;
pub mod error;
pub mod logging;
pub mod session;
pub mod terminal;

pub use auth::{AuthDecision, AuthenticationGate, TrustStore};
pub use command::{ResolvedCommand, resolve};
pub use error::{Error, Result};
pub use logging::{LogFormat, init_logging};
pub use session::{PtyRequest, Session, SessionHandle, SessionMode, SessionState};
pub use terminal::{PtyControl, TermSize};
