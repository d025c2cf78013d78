//! Session model for keysh.
//!
//! This module provides:
//! - `Session`: what a client asked for on one channel
//! - `SessionHandle`: the transport's end, for resizes and cancellation
//! - `SessionState`: the checked lifecycle a session moves through

mod request;
mod state;

pub use request::{PtyRequest, Session, SessionHandle, SessionMode};
pub use state::SessionState;
