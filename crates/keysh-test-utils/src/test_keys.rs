//! Fixed public keys for deterministic testing.
//!
//! All keys are well-formed `ssh-ed25519` lines so they pass parsing; which
//! of them are trusted is up to each test.

/// Test public keys in authorized_keys line format.
pub struct TestKeys;

impl TestKeys {
    /// First trusted key.
    pub const ALICE: &'static str = "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAINRHlNW52FYlU/5DcNv/dWdr23dIHEGiPUziQX7ICCTm alice@example";

    /// Second trusted key.
    pub const BOB: &'static str = "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIOMqqnkVzrm0SdG6UOoqKLsabgH5C9okWi0dh2l9GKJl bob@example";

    /// A key that tests keep out of the trust set.
    pub const MALLORY: &'static str = "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIAABAgMEBQYHCAkKCwwNDg8QERITFBUWFxgZGhscHR4f mallory@example";

    /// Build authorized_keys file content from key lines.
    pub fn authorized_keys(keys: &[&str]) -> String {
        let mut content = String::from("# keysh test keys\n");
        for key in keys {
            content.push_str(key);
            content.push('\n');
        }
        content
    }
}

// =============================================================================
// Tests
// =============================================================================
