//! Ordering key derivation.
//!
//! Every record is placed in the chain by a 32-bit key computed from its name
//! with the Jenkins one-at-a-time hash. Inserts, lookups and deletes must all
//! go through [`name_key`] so that a name always lands on the same position.

/// Compute the ordering key for `name`.
///
/// Pure and deterministic. Distinct names may share a key; the key decides
/// placement only, identity is always the name itself.
pub fn name_key(name: &str) -> u32 {
    let mut hash: u32 = 0;
    for &byte in name.as_bytes() {
        hash = hash.wrapping_add(u32::from(byte));
        hash = hash.wrapping_add(hash << 10);
        hash ^= hash >> 6;
    }
    hash = hash.wrapping_add(hash << 3);
    hash ^= hash >> 11;
    hash = hash.wrapping_add(hash << 15);
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_values() {
        assert_eq!(name_key(""), 0);
        assert_eq!(name_key("a"), 3_392_050_242);
        assert_eq!(
            name_key("The quick brown fox jumps over the lazy dog"),
            1_369_346_549
        );
        assert_eq!(name_key("alice"), 1_031_422_857);
        assert_eq!(name_key("bob"), 4_065_264_892);
    }

    #[test]
    fn test_deterministic() {
        for name in ["alice", "bob", "carol", "a much longer employee name"] {
            assert_eq!(name_key(name), name_key(name));
        }
    }

    #[test]
    fn test_known_collision() {
        // Two distinct names that share a key.
        assert_eq!(name_key("emp90100"), 855_293_526);
        assert_eq!(name_key("emp99664"), 855_293_526);
    }
}
