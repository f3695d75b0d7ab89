//! Opaque token-value generation for access tokens

use base64::{engine::general_purpose::URL_SAFE, Engine as _};
use rand::RngCore;

/// Number of random bytes behind each token value. 12 bytes encode to
/// exactly 16 URL-safe base64 characters with no padding.
const TOKEN_BYTES: usize = 12;

/// Length in characters of every generated token value.
pub const TOKEN_LENGTH: usize = 16;

/// Generates the URL-safe random values used as access-token identifiers.
///
/// The value doubles as the read-group name placed on the protected media
/// object, so it must be safe to embed in URLs and group lists verbatim.
pub struct TokenGenerator;

impl TokenGenerator {
    pub fn generate() -> String {
        let mut bytes = [0u8; TOKEN_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        URL_SAFE.encode(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_sixteen_url_safe_characters() {
        let value = TokenGenerator::generate();

        assert_eq!(value.len(), TOKEN_LENGTH);
        assert!(value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn values_are_unique_in_practice() {
        let mut seen = std::collections::HashSet::new();
        for _ in 0..1000 {
            assert!(seen.insert(TokenGenerator::generate()));
        }
    }
}
