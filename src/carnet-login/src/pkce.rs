//! PKCE (Proof Key for Code Exchange) helpers for the authorize stage.
//!
//! The identity provider only accepts the S256 method, advertised in lower case.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::Rng;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// Allowed verifier length range from RFC 7636.
pub const VERIFIER_MIN_LEN: usize = 43;
pub const VERIFIER_MAX_LEN: usize = 128;

/// Characters used for `state` and `nonce` values.
const RANDOM_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789-";

/// PKCE challenge method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeMethod {
    S256,
}

impl std::fmt::Display for ChallengeMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChallengeMethod::S256 => write!(f, "s256"),
        }
    }
}

/// PKCE code verifier and challenge pair.
#[derive(Debug, Clone)]
pub struct PkceChallenge {
    /// The code verifier (secret, kept client-side until the code exchange).
    pub verifier: String,
    /// BASE64URL(SHA256(verifier)).
    pub challenge: String,
    pub method: ChallengeMethod,
}

impl PkceChallenge {
    /// Generate a new challenge from 32 random bytes.
    pub fn new() -> Result<Self> {
        Self::from_verifier(generate_verifier())
    }

    /// Build a challenge from an existing verifier.
    ///
    /// Fails with a login error when the verifier is outside 43..=128 characters.
    pub fn from_verifier(verifier: String) -> Result<Self> {
        if verifier.len() < VERIFIER_MIN_LEN {
            return Err(Error::Login(format!(
                "code verifier too short ({} < {VERIFIER_MIN_LEN})",
                verifier.len()
            )));
        }
        if verifier.len() > VERIFIER_MAX_LEN {
            return Err(Error::Login(format!(
                "code verifier too long ({} > {VERIFIER_MAX_LEN})",
                verifier.len()
            )));
        }
        let challenge = compute_s256_challenge(&verifier);

        Ok(Self {
            verifier,
            challenge,
            method: ChallengeMethod::S256,
        })
    }
}

/// 32 random bytes base64url-encoded without padding: 43 characters.
fn generate_verifier() -> String {
    let bytes: [u8; 32] = rand::rng().random();
    URL_SAFE_NO_PAD.encode(bytes)
}

fn compute_s256_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// Random string for `state` and `nonce` parameters.
pub fn random_string(len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| RANDOM_ALPHABET[rng.random_range(0..RANDOM_ALPHABET.len())] as char)
        .collect()
}
