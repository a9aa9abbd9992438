//! PKCE verifier/challenge pairs and CSRF state values.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};

/// A PKCE code verifier and its S256 challenge.
#[derive(Debug, Clone)]
pub struct Pkce {
    /// Secret, sent with the code exchange.
    pub verifier: String,
    /// Public, sent in the authorization URL.
    pub challenge: String,
}

impl Pkce {
    /// Generate a verifier from 32 random bytes (43 base64url characters).
    pub fn generate() -> Self {
        let bytes: [u8; 32] = rand::random();
        let verifier = URL_SAFE_NO_PAD.encode(bytes);
        let challenge = challenge_for(&verifier);
        Self {
            verifier,
            challenge,
        }
    }
}

/// S256 challenge for a verifier.
pub fn challenge_for(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// Random state parameter, 16 bytes as 22 base64url characters.
pub fn generate_state() -> String {
    let bytes: [u8; 16] = rand::random();
    URL_SAFE_NO_PAD.encode(bytes)
}
