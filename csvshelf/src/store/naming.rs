//! Collision suffixes for stored file names.

use rand::prelude::RngExt;
use rand::rng;

const ALPHABET: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Length of the suffix appended on a name collision
pub const SUFFIX_LEN: usize = 3;

/// Generate a random lowercase base-36 token of [`SUFFIX_LEN`] characters
pub fn random_suffix() -> String {
    let mut rng = rng();
    (0..SUFFIX_LEN)
        .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
        .collect()
}

/// `"<name>-<suffix>"`
pub fn suffixed_name(name: &str, suffix: &str) -> String {
    format!("{name}-{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suffix_shape() {
        for _ in 0..200 {
            let suffix = random_suffix();
            assert_eq!(suffix.len(), SUFFIX_LEN);
            assert!(suffix.chars().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()), "{suffix}");
        }
    }

    #[test]
    fn test_suffixed_name() {
        assert_eq!(suffixed_name("speed.csv", "a1z"), "speed.csv-a1z");
    }
}
