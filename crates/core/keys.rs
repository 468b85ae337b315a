//! API key generation and fingerprinting.

use rand::Rng;
use sha2::{Digest, Sha256};

/// Generate a random API key of the form `{prefix}-{64 hex chars}`.
pub fn generate_api_key(prefix: &str) -> String {
    let random_bytes: [u8; 32] = rand::thread_rng().gen();
    format!("{}-{}", prefix, hex::encode(random_bytes))
}

/// Stable, non-reversible fingerprint of a key (SHA-256, hex encoded).
pub fn fingerprint(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_api_key_shape() {
        let key = generate_api_key("tq");
        let (prefix, secret) = key.split_once('-').unwrap();
        assert_eq!(prefix, "tq");
        assert_eq!(secret.len(), 64);
        assert!(secret.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_generate_api_key_uniqueness() {
        assert_ne!(generate_api_key("tq"), generate_api_key("tq"));
    }

    #[test]
    fn test_fingerprint_is_stable() {
        assert_eq!(fingerprint("secret"), fingerprint("secret"));
        assert_ne!(fingerprint("secret"), fingerprint("secret2"));
    }

    #[test]
    fn test_fingerprint_known_value() {
        assert_eq!(
            fingerprint("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
