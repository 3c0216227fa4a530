//! Shared-secret token digests.
//!
//! The client never sends the secret itself: it sends the lowercase hex
//! SHA-512 digest in the [`TOKEN_HEADER`] header, and the server compares it
//! with the digest stored in its configuration.

use sha2::Digest;
use sha2::Sha512;

/// Request header carrying the token digest.
pub const TOKEN_HEADER: &str = "Nemu-Token";

/// Length of a hex-encoded SHA-512 digest.
pub const DIGEST_HEX_LEN: usize = 128;

/// Returns the lowercase hex SHA-512 digest of `secret`.
///
/// # Examples
///
/// ```
/// use nemu_core::token::digest_token;
///
/// let digest = digest_token("hunter2");
/// assert_eq!(digest.len(), 128);
/// assert!(digest.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
/// ```
pub fn digest_token(secret: &str) -> String {
    hex::encode(Sha512::digest(secret.as_bytes()))
}

/// Compares a presented header value with the configured digest.
///
/// An empty configured digest never matches, so a server started without a
/// token rejects every upload. The configured value is compared
/// case-insensitively; the presented value must be the exact lowercase form
/// the client sends.
pub fn token_matches(presented: Option<&str>, expected: &str) -> bool {
    let expected = expected.trim();
    if expected.is_empty() {
        return false;
    }
    let Some(presented) = presented else {
        return false;
    };
    if presented.len() != expected.len() {
        return false;
    }
    presented
        .bytes()
        .zip(expected.bytes())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b.to_ascii_lowercase()))
        == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_known_vector() {
        // sha512("abc")
        assert_eq!(
            digest_token("abc"),
            "ddaf35a193617abacc417349ae20413112e6fa4e89a97ea20a9eeee64b55d39a\
             2192992a274fc1a836ba3c23a3feebbd454d4423643ce80e2a9ac94fa54ca49f"
        );
    }

    #[test]
    fn test_digest_len() {
        assert_eq!(digest_token("").len(), DIGEST_HEX_LEN);
    }

    #[test]
    fn test_token_matches() {
        let expected = digest_token("secret");
        assert!(token_matches(Some(&expected), &expected));
        assert!(token_matches(Some(&expected), &expected.to_uppercase()));
        assert!(!token_matches(Some(&digest_token("other")), &expected));
        assert!(!token_matches(None, &expected));
        assert!(!token_matches(Some("secret"), &expected));
    }

    #[test]
    fn test_empty_expected_never_matches() {
        assert!(!token_matches(Some(""), ""));
        assert!(!token_matches(Some(&digest_token("")), "  "));
    }
}
