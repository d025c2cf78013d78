//! Public key authentication.
//!
//! This module provides:
//! - `TrustStore`: the immutable set of trusted keys loaded at startup
//! - `AuthenticationGate`: the accept/reject decision for an offered key
//!
//! Trust is binary. A key is accepted only if it byte-equals a trusted entry;
//! there is no further authorization.

mod gate;
mod keys;

pub use gate::{AuthDecision, AuthenticationGate};
pub use keys::{
    TrustStore, TrustedKey, constant_time_eq, key_fingerprint, offered_key_from_openssh,
    parse_authorized_key_line, read_credential_file,
};

use std::path::PathBuf;

/// Default authorized_keys location (`$HOME/.ssh/authorized_keys`).
pub fn default_authorized_keys_path() -> Option<PathBuf> {
    dirs_path::home_dir().map(|home| home.join(".ssh").join("authorized_keys"))
}

/// Simple home directory lookup (avoid adding dirs crate dependency).
mod dirs_path {
    use std::path::PathBuf;

    pub fn home_dir() -> Option<PathBuf> {
        std::env::var_os("HOME").map(PathBuf::from)
    }
}
