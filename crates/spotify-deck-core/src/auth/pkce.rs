use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use sha2::{Digest, Sha256};

const VERIFIER_LEN: usize = 64;
const VERIFIER_ALPHABET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-._~";

/// PKCE code verifier and challenge pair.
#[derive(Debug, Clone)]
pub struct PkcePair {
    verifier: String,
    challenge: String,
}

impl PkcePair {
    /// Create a new random verifier/challenge pair following RFC 7636.
    pub fn generate() -> Self {
        let verifier = generate_verifier();
        let challenge = generate_challenge(&verifier);
        Self {
            verifier,
            challenge,
        }
    }

    pub fn verifier(&self) -> &str {
        &self.verifier
    }

    pub fn challenge(&self) -> &str {
        &self.challenge
    }
}

fn generate_verifier() -> String {
    let mut rng = thread_rng();
    (0..VERIFIER_LEN)
        .map(|_| VERIFIER_ALPHABET[rng.gen_range(0..VERIFIER_ALPHABET.len())] as char)
        .collect()
}

fn generate_challenge(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

/// Random alphanumeric token correlating an authorize request with its callback.
pub fn random_state(len: usize) -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verifier_is_64_chars_from_the_allowed_alphabet() {
        for _ in 0..16 {
            let pair = PkcePair::generate();
            assert_eq!(pair.verifier().len(), 64);
            assert!(pair
                .verifier()
                .bytes()
                .all(|byte| VERIFIER_ALPHABET.contains(&byte)));
        }
    }

    #[test]
    fn challenge_matches_rfc7636_appendix_b() {
        // Known vector: SHA-256 of the verifier, base64url-encoded without padding.
        let challenge = generate_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk");
        assert_eq!(challenge, "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM");
    }

    #[test]
    fn challenge_is_deterministic_and_unpadded() {
        let pair = PkcePair::generate();
        assert_eq!(pair.challenge(), generate_challenge(pair.verifier()));
        assert!(!pair.challenge().contains('='));
        assert!(pair
            .challenge()
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn consecutive_pairs_differ() {
        let first = PkcePair::generate();
        let second = PkcePair::generate();
        assert_ne!(first.verifier(), second.verifier());
        assert_ne!(first.challenge(), second.challenge());
    }

    #[test]
    fn random_state_has_requested_length() {
        let state = random_state(32);
        assert_eq!(state.len(), 32);
        assert!(state.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(state, random_state(32));
    }
}
