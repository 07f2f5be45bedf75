//! Topic routing-key matching
//!
//! Routing keys and binding patterns are dot-separated words. In a pattern
//! `*` matches exactly one word and `#` matches zero or more words.

/// Whether `routing_key` matches the binding `pattern`
pub fn matches(pattern: &str, routing_key: &str) -> bool {
    let pattern: Vec<&str> = pattern.split('.').collect();
    let key: Vec<&str> = if routing_key.is_empty() {
        Vec::new()
    } else {
        routing_key.split('.').collect()
    };
    match_words(&pattern, &key)
}

fn match_words(pattern: &[&str], key: &[&str]) -> bool {
    match (pattern.split_first(), key.split_first()) {
        (None, None) => true,
        (None, Some(_)) => false,
        (Some((&"#", rest)), _) => {
            // `#` swallows zero words, or one word and stays active
            match_words(rest, key) || (!key.is_empty() && match_words(pattern, &key[1..]))
        }
        (Some(_), None) => false,
        (Some((&"*", rest)), Some((_, key_rest))) => match_words(rest, key_rest),
        (Some((word, rest)), Some((k, key_rest))) => word == k && match_words(rest, key_rest),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    #[test]
    fn test_exact_match() {
        assert!(matches("email.verify", "email.verify"));
        assert!(!matches("email.verify", "email.reset.password"));
        assert!(!matches("email.verify", "email"));
    }

    #[test]
    fn test_star_matches_one_word() {
        assert!(matches("email.*", "email.verify"));
        assert!(!matches("email.*", "email.reset.password"));
        assert!(!matches("email.*", "email"));
        assert!(matches("*.verify", "email.verify"));
    }

    #[test]
    fn test_hash_matches_zero_or_more() {
        assert!(matches("#", "email.verify"));
        assert!(matches("#", ""));
        assert!(matches("email.#", "email"));
        assert!(matches("email.#", "email.reset.password"));
        assert!(matches("email.#.password", "email.reset.password"));
        assert!(matches("email.#.password", "email.password"));
        assert!(!matches("email.#.password", "email.reset.token"));
    }

    #[quickcheck]
    fn prop_key_matches_itself(words: Vec<u8>) -> bool {
        // plain words only, no wildcards
        let key = words
            .iter()
            .map(|w| format!("w{}", w % 8))
            .collect::<Vec<_>>()
            .join(".");
        key.is_empty() || matches(&key, &key)
    }

    #[quickcheck]
    fn prop_hash_matches_everything(words: Vec<u8>) -> bool {
        let key = words
            .iter()
            .map(|w| format!("w{}", w % 8))
            .collect::<Vec<_>>()
            .join(".");
        matches("#", &key)
    }
}
