//! Trusted public key loading and membership checks.
//!
//! Handles loading of:
//! - authorized_keys style credential files
//! - an inline key literal supplied at startup
//!
//! Keys are stored as their SSH wire-format blob (the base64-decoded middle
//! field of an `algorithm base64 [comment]` line) and compared byte for byte.

use std::fs;
use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use ssh_key::{HashAlg, public::PublicKey};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// One trusted credential parsed from a key line.
#[derive(Debug, Clone)]
pub struct TrustedKey {
    /// SSH wire-format key blob.
    blob: Vec<u8>,
    /// SHA256 fingerprint, for logging.
    fingerprint: String,
    /// Optional comment from the key line.
    comment: Option<String>,
}

impl TrustedKey {
    /// Raw key blob.
    pub fn blob(&self) -> &[u8] {
        &self.blob
    }

    /// SHA256 fingerprint in OpenSSH notation.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Comment carried on the key line, if any.
    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }
}

/// Immutable set of trusted public keys.
///
/// Built once at startup and shared read-only afterwards. An empty store
/// rejects every key.
#[derive(Debug, Clone, Default)]
pub struct TrustStore {
    keys: Vec<TrustedKey>,
}

impl TrustStore {
    /// Load the trust set from a credential file and/or an inline key.
    ///
    /// A missing or unreadable file contributes no keys; the failure is
    /// logged and loading continues with the inline key alone.
    pub fn load(path: Option<&Path>, inline_key: Option<&str>) -> Self {
        let mut data = match path {
            Some(path) => match read_credential_file(path) {
                Ok(data) => data,
                Err(e) => {
                    warn!(error = %e, "ignoring credential file");
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        if let Some(inline) = inline_key {
            // Keep the last file line and the inline key on separate lines
            data.push(b'\n');
            data.extend_from_slice(inline.as_bytes());
        }

        let store = Self::from_openssh_lines(&String::from_utf8_lossy(&data));
        info!(count = store.len(), "loaded trusted keys");
        store
    }

    /// Parse a buffer of key lines without touching the file system.
    ///
    /// Blank lines and `#` comments are skipped, malformed lines are dropped.
    pub fn from_openssh_lines(content: &str) -> Self {
        let mut keys = Vec::new();

        for (line_num, line) in content.lines().enumerate() {
            let line = line.trim();

            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            match parse_authorized_key_line(line) {
                Ok(key) => {
                    debug!(
                        line = line_num + 1,
                        fingerprint = %key.fingerprint,
                        "parsed trusted key"
                    );
                    keys.push(key);
                }
                Err(e) => {
                    debug!(line = line_num + 1, error = %e, "failed to parse key, skipping");
                }
            }
        }

        Self { keys }
    }

    /// Check whether `blob` byte-equals one of the trusted keys.
    ///
    /// Every entry is compared in full; the scan never stops at the first
    /// match or at the first differing byte.
    pub fn contains(&self, blob: &[u8]) -> bool {
        let mut found = 0u8;
        for key in &self.keys {
            found |= constant_time_eq(&key.blob, blob) as u8;
        }
        found == 1
    }

    /// Number of trusted keys.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// True when no key is trusted (every key will be rejected).
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Iterate over the trusted keys.
    pub fn iter(&self) -> impl Iterator<Item = &TrustedKey> {
        self.keys.iter()
    }
}

/// Read a credential file into memory.
pub fn read_credential_file(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|source| Error::CredentialFile {
        path: path.to_path_buf(),
        source,
    })
}

/// Parse a single `algorithm base64 [comment]` line.
pub fn parse_authorized_key_line(line: &str) -> Result<TrustedKey> {
    let mut parts = line.split_whitespace();
    let (algorithm, material) = match (parts.next(), parts.next()) {
        (Some(a), Some(m)) => (a, m),
        _ => {
            return Err(Error::Config {
                message: "invalid key format".into(),
            });
        }
    };
    let comment = {
        let rest: Vec<&str> = parts.collect();
        if rest.is_empty() {
            None
        } else {
            Some(rest.join(" "))
        }
    };

    let key = PublicKey::from_openssh(&format!("{} {}", algorithm, material)).map_err(|e| {
        Error::Config {
            message: format!("failed to parse public key: {}", e),
        }
    })?;

    let blob = STANDARD.decode(material).map_err(|e| Error::Config {
        message: format!("invalid key material: {}", e),
    })?;

    Ok(TrustedKey {
        blob,
        fingerprint: key_fingerprint(&key),
        comment,
    })
}

/// Decode an offered key in OpenSSH text form into its wire blob and fingerprint.
pub fn offered_key_from_openssh(line: &str) -> Result<(Vec<u8>, String)> {
    let key = parse_authorized_key_line(line)?;
    Ok((key.blob, key.fingerprint))
}

/// Get the SHA256 fingerprint of a public key.
pub fn key_fingerprint(key: &PublicKey) -> String {
    key.fingerprint(HashAlg::Sha256).to_string()
}

/// Compare two byte strings without short-circuiting on content.
///
/// Only the length is allowed to leak; every byte pair is visited.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use keysh_test_utils::TestKeys;
    use tempfile::NamedTempFile;

    const KEY_A: &str = TestKeys::ALICE;
    const KEY_B: &str = TestKeys::BOB;
    const KEY_C: &str = TestKeys::MALLORY;

    fn create_temp_file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    fn blob_of(line: &str) -> Vec<u8> {
        offered_key_from_openssh(line).unwrap().0
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"", b""));
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"ab"));
        assert!(!constant_time_eq(b"xbc", b"abc"));
    }

    #[test]
    fn test_parse_line_with_comment() {
        let key = parse_authorized_key_line(KEY_A).unwrap();
        assert_eq!(key.comment(), Some("alice@example"));
        assert!(key.fingerprint().starts_with("SHA256:"));
        // string "ssh-ed25519" + 32 byte point, each length-prefixed
        assert_eq!(key.blob().len(), 4 + 11 + 4 + 32);
    }

    #[test]
    fn test_parse_line_without_comment() {
        let line = KEY_A.rsplit_once(' ').unwrap().0;
        let key = parse_authorized_key_line(line).unwrap();
        assert_eq!(key.comment(), None);
    }

    #[test]
    fn test_parse_line_rejects_garbage() {
        assert!(parse_authorized_key_line("ssh-ed25519").is_err());
        assert!(parse_authorized_key_line("ssh-ed25519 not-base64!!").is_err());
        assert!(parse_authorized_key_line("command=\"x\" ssh-ed25519 AAAA").is_err());
    }

    #[test]
    fn test_from_lines_skips_comments_and_malformed() {
        let content = format!("# trusted\n\n{}\nthis is not a key\n{}\n", KEY_A, KEY_B);
        let store = TrustStore::from_openssh_lines(&content);
        assert_eq!(store.len(), 2);
        assert!(store.contains(&blob_of(KEY_A)));
        assert!(store.contains(&blob_of(KEY_B)));
        assert!(!store.contains(&blob_of(KEY_C)));
    }

    #[test]
    fn test_empty_store_rejects_everything() {
        let store = TrustStore::default();
        assert!(store.is_empty());
        assert!(!store.contains(&blob_of(KEY_A)));
        assert!(!store.contains(&[]));
    }

    #[test]
    fn test_contains_requires_exact_bytes() {
        let store = TrustStore::from_openssh_lines(KEY_A);
        let mut blob = blob_of(KEY_A);

        // Same algorithm, different material
        assert!(!store.contains(&blob_of(KEY_B)));

        // Prefix of a trusted key
        assert!(!store.contains(&blob[..blob.len() - 1]));

        // Last byte flipped
        let last = blob.len() - 1;
        blob[last] ^= 0x01;
        assert!(!store.contains(&blob));
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let store = TrustStore::load(Some(Path::new("/nonexistent/keysh/authorized_keys")), None);
        assert!(store.is_empty());
    }

    #[test]
    fn test_load_missing_file_with_inline_key() {
        let store = TrustStore::load(
            Some(Path::new("/nonexistent/keysh/authorized_keys")),
            Some(KEY_B),
        );
        assert_eq!(store.len(), 1);
        assert!(store.contains(&blob_of(KEY_B)));
    }

    #[test]
    fn test_load_file_and_inline_key() {
        // No trailing newline: the inline key must not be glued onto this line
        let file = create_temp_file(KEY_A);
        let store = TrustStore::load(Some(file.path()), Some(KEY_B));
        assert_eq!(store.len(), 2);
        assert!(store.contains(&blob_of(KEY_A)));
        assert!(store.contains(&blob_of(KEY_B)));
        assert!(!store.contains(&blob_of(KEY_C)));
    }

    #[test]
    fn test_read_credential_file_error() {
        let err = read_credential_file(Path::new("/nonexistent/keysh/keys")).unwrap_err();
        assert!(matches!(err, Error::CredentialFile { .. }));
    }
}
