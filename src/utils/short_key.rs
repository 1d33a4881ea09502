use rand::{rng, Rng};

/// Length of every generated short key
pub const SHORT_KEY_LENGTH: usize = 5;

const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Generates a random short key of upper and lower case ASCII letters.
///
/// No uniqueness check happens here; the store rejects collisions.
pub fn generate_short_key() -> String {
    let mut rng = rng();
    (0..SHORT_KEY_LENGTH)
        .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_key_shape() {
        for _ in 0..1000 {
            let key = generate_short_key();
            assert_eq!(key.len(), SHORT_KEY_LENGTH);
            assert!(key.chars().all(|c| c.is_ascii_alphabetic()));
        }
    }

    #[test]
    fn test_keys_vary() {
        let keys: HashSet<String> = (0..100).map(|_| generate_short_key()).collect();
        // 52^5 possible keys, a handful of collisions at most
        assert!(keys.len() > 90);
    }

    #[test]
    fn test_alphabet() {
        assert_eq!(ALPHABET.len(), 52);
    }
}
