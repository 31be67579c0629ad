//! PKCE (RFC 7636) helpers, S256 only.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

pub const S256: &str = "S256";

/// A verifier and the challenge derived from it.
#[derive(Debug, Clone)]
pub struct PkcePair {
    pub code_verifier: String,
    pub code_challenge: String,
}

/// Random bytes from the OS RNG, URL-safe base64 without padding.
///
/// A broken OS RNG is not recoverable, so this panics instead of returning
/// an error.
pub fn random_urlsafe(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    getrandom::fill(&mut bytes).expect("Failed to generate random bytes");
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Generate a fresh verifier (32 random bytes) and its S256 challenge.
pub fn generate() -> PkcePair {
    let code_verifier = random_urlsafe(32);
    let code_challenge = challenge_for(&code_verifier);
    PkcePair {
        code_verifier,
        code_challenge,
    }
}

/// base64url(SHA-256(verifier)) with no padding.
pub fn challenge_for(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

pub fn verify_s256(verifier: &str, challenge: &str) -> bool {
    challenge_for(verifier)
        .as_bytes()
        .ct_eq(challenge.as_bytes())
        .into()
}

/// Verifiers and challenges share the same alphabet and length bounds.
pub fn is_well_formed(value: &str) -> bool {
    (43..=128).contains(&value.len())
        && value
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~'))
}
