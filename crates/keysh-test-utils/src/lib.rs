//! keysh-test-utils: Test infrastructure for keysh.
//!
//! Provides:
//! - FakePty: In-memory terminal control that records every resize
//! - TestKeys: Fixed OpenSSH public keys for trust-set tests

mod fake_pty;
mod test_keys;

pub use fake_pty::FakePty;
pub use test_keys::TestKeys;
