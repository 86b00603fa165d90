//! Anonymized per-caller quota tokens.
//!
//! Providers that partition quota per caller (YouTube's `quotaUser`) receive
//! a one-way token instead of the caller's identity. Nothing is stored.

use sha2::{Digest, Sha256};

/// Maximum length accepted by provider quota parameters
pub const TOKEN_LEN: usize = 40;

/// Derive the quota token for a raw caller identity
pub fn token_for(raw_identity: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw_identity.as_bytes());
    let mut token = hex::encode(hasher.finalize());
    token.truncate(TOKEN_LEN);
    token
}

/// A caller identity paired with its derived token.
///
/// `Debug` only shows the token; the raw identity never reaches logs.
#[derive(Clone, PartialEq, Eq)]
pub struct QuotaToken {
    raw_identity: String,
    token: String,
}

impl QuotaToken {
    pub fn new(raw_identity: impl Into<String>) -> Self {
        let raw_identity = raw_identity.into();
        let token = token_for(&raw_identity);
        Self {
            raw_identity,
            token,
        }
    }

    /// The opaque token to send to providers
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn raw_identity(&self) -> &str {
        &self.raw_identity
    }
}

impl std::fmt::Debug for QuotaToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuotaToken").field("token", &self.token).finish()
    }
}
