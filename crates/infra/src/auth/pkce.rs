//! PKCE (Proof Key for Code Exchange) helpers for the SSO login flow.
//!
//! RFC 7636: the verifier stays local, the SHA256 challenge travels in the
//! authorization request.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::Rng;
use sha2::{Digest, Sha256};

/// PKCE challenge pair plus CSRF state for one authorization attempt.
#[derive(Debug, Clone)]
pub struct PkceChallenge {
    /// Random string kept secret until token exchange
    pub code_verifier: String,
    /// base64url(SHA256(code_verifier)), sent in the authorization request
    pub code_challenge: String,
    /// Random CSRF token
    pub state: String,
}

impl PkceChallenge {
    /// Generate a fresh challenge.
    #[must_use]
    pub fn generate() -> Self {
        let code_verifier = random_token();
        let code_challenge = challenge_for(&code_verifier);
        Self { code_verifier, code_challenge, state: random_token() }
    }

    /// Challenge method, always "S256".
    #[must_use]
    pub fn challenge_method(&self) -> &'static str {
        "S256"
    }
}

/// 32 random bytes, base64url encoded (43 chars, within RFC 7636's 43-128).
fn random_token() -> String {
    let mut rng = rand::thread_rng();
    let bytes: Vec<u8> = (0..32).map(|_| rng.r#gen()).collect();
    URL_SAFE_NO_PAD.encode(bytes)
}

fn challenge_for(verifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verifier_length_within_rfc_limits() {
        let challenge = PkceChallenge::generate();
        assert!(challenge.code_verifier.len() >= 43);
        assert!(challenge.code_verifier.len() <= 128);
        assert_eq!(challenge.challenge_method(), "S256");
    }

    #[test]
    fn challenges_are_unique_and_url_safe() {
        let a = PkceChallenge::generate();
        let b = PkceChallenge::generate();
        assert_ne!(a.code_verifier, b.code_verifier);
        assert_ne!(a.state, b.state);

        for token in [&a.code_verifier, &a.code_challenge, &a.state] {
            assert!(!token.contains('='));
            assert!(!token.contains('+'));
            assert!(!token.contains('/'));
        }
    }

    #[test]
    fn challenge_is_deterministic_for_a_verifier() {
        let challenge = PkceChallenge::generate();
        assert_eq!(challenge.code_challenge, challenge_for(&challenge.code_verifier));
    }
}
