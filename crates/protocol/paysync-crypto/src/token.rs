//! Random token generation.
//!
//! Nonces and opaque identifiers are drawn from the operating system's
//! CSPRNG and hex-encoded, so they are safe to embed in URLs, SQL text
//! columns and JSON without further escaping.

use rand::rngs::OsRng;
use rand::RngCore;

/// Number of random bytes in a payment nonce (128 bits).
pub const NONCE_BYTES: usize = 16;

/// Generate a 128-bit random token, hex-encoded (32 characters).
///
/// # Example
/// ```
/// use paysync_crypto::random_token;
///
/// let a = random_token();
/// let b = random_token();
/// assert_ne!(a, b);
/// ```
pub fn random_token() -> String {
    random_token_with_len(NONCE_BYTES)
}

/// Generate a random token of `bytes` bytes, hex-encoded.
pub fn random_token_with_len(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    OsRng.fill_bytes(&mut buf);
    hex::encode(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_random_token_length_and_charset() {
        let token = random_token();
        assert_eq!(token.len(), NONCE_BYTES * 2);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_random_tokens_do_not_collide() {
        let tokens: HashSet<String> = (0..1000).map(|_| random_token()).collect();
        assert_eq!(tokens.len(), 1000);
    }

    #[test]
    fn test_custom_length() {
        assert_eq!(random_token_with_len(4).len(), 8);
    }
}
