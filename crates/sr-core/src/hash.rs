//! Stable content hashing for synthesized event ids.

use sha2::{Digest, Sha256};

/// Hash an ordered list of fields into a stable hex id.
///
/// Fields are joined with a 0x1f separator so `("ab", "c")` and
/// `("a", "bc")` never collide. The result is the first 32 hex chars of
/// SHA-256 — long enough to be collision-safe at pipeline volumes, short
/// enough to read in logs.
pub fn stable_content_hash(fields: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            hasher.update([0x1f]);
        }
        hasher.update(field.as_bytes());
    }
    let digest = hasher.finalize();
    hex::encode(&digest[..16])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_fields_same_hash() {
        let a = stable_content_hash(&["ref-1", "content", "2026-02-23T10:00:00Z"]);
        let b = stable_content_hash(&["ref-1", "content", "2026-02-23T10:00:00Z"]);
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn field_boundaries_matter() {
        let a = stable_content_hash(&["ab", "c"]);
        let b = stable_content_hash(&["a", "bc"]);
        assert_ne!(a, b);
    }

    #[test]
    fn different_content_different_hash() {
        let a = stable_content_hash(&["ref", "x", "t"]);
        let b = stable_content_hash(&["ref", "y", "t"]);
        assert_ne!(a, b);
    }
}
