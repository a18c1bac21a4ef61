//! Content-addressed keys for the compilation caches

use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 of the source text
pub fn content_hash(source: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_deterministic() {
        assert_eq!(content_hash("extract.v = true"), content_hash("extract.v = true"));
        assert_ne!(content_hash("a"), content_hash("b"));
    }

    #[test]
    fn test_content_hash_of_empty_string() {
        assert_eq!(
            content_hash(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
