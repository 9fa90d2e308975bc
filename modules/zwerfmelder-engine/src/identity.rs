//! Pseudonymous submitter identifiers.
//!
//! Two distinct hashes per submission: the fingerprint (device-ish identity,
//! used only for burst detection) and the reporter hash (cookie-backed
//! pseudonym, used for reconfirmation attribution). Neither is reversible.

use sha2::{Digest, Sha256};

/// Abuse-detection fingerprint from request attributes. Missing headers are
/// folded in as a placeholder so the shape of the input stays stable.
pub fn build_fingerprint(
    ip: &str,
    user_agent: Option<&str>,
    accept_language: Option<&str>,
) -> String {
    let normalized = format!(
        "{ip}|{}|{}",
        user_agent.unwrap_or("na"),
        accept_language.unwrap_or("na")
    );

    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    hex::encode(hasher.finalize())
}

/// Derive the identity-stable reporter pseudonym from the anonymous reporter
/// id. Keyed with the signing secret so the hash cannot be recomputed from
/// the cookie value alone.
pub fn derive_reporter_hash(anonymous_reporter_id: &str, secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(anonymous_reporter_id.as_bytes());
    hasher.update(b":");
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}
