//! Accept/reject decision for offered public keys.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::keys::{TrustStore, offered_key_from_openssh};

/// Outcome of an authentication attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthDecision {
    Accept,
    Reject,
}

impl AuthDecision {
    pub fn is_accept(self) -> bool {
        self == AuthDecision::Accept
    }
}

/// Gate consulted for every offered credential.
///
/// Holds a shared handle to the trust set and nothing else, so one gate can
/// be cloned into every connection handler.
#[derive(Debug, Clone)]
pub struct AuthenticationGate {
    trust: Arc<TrustStore>,
}

impl AuthenticationGate {
    pub fn new(trust: Arc<TrustStore>) -> Self {
        Self { trust }
    }

    /// Decide on an offered key given as its wire-format blob.
    pub fn authenticate(&self, offered: &[u8]) -> AuthDecision {
        if self.trust.contains(offered) {
            AuthDecision::Accept
        } else {
            AuthDecision::Reject
        }
    }

    /// Decide on an offered key in OpenSSH text form (`algorithm base64 [comment]`).
    ///
    /// This is the signed attempt: the decision is logged at `info` on accept
    /// and `warn` on reject. Keys that do not parse are rejected.
    pub fn authenticate_openssh(&self, user: &str, offered: &str) -> AuthDecision {
        let Some((decision, fingerprint)) = self.evaluate(user, offered) else {
            return AuthDecision::Reject;
        };

        match decision {
            AuthDecision::Accept => info!(user, %fingerprint, "public key accepted"),
            AuthDecision::Reject => warn!(user, %fingerprint, "public key rejected"),
        }
        decision
    }

    /// Same decision as `authenticate_openssh`, logged at `debug` only.
    ///
    /// Answers the unsigned "would this key be accepted" query a client sends
    /// before signing, so each login is reported once.
    pub fn check_offered_openssh(&self, user: &str, offered: &str) -> AuthDecision {
        let Some((decision, fingerprint)) = self.evaluate(user, offered) else {
            return AuthDecision::Reject;
        };

        debug!(user, %fingerprint, accepted = decision.is_accept(), "public key offered");
        decision
    }

    fn evaluate(&self, user: &str, offered: &str) -> Option<(AuthDecision, String)> {
        match offered_key_from_openssh(offered) {
            Ok((blob, fingerprint)) => Some((self.authenticate(&blob), fingerprint)),
            Err(e) => {
                warn!(user, error = %e, "rejecting unparseable public key");
                None
            }
        }
    }

    /// Trust set backing this gate.
    pub fn trust_store(&self) -> &TrustStore {
        &self.trust
    }
}
