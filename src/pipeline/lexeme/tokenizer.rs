//! Full address → prefix lexemes.
//!
//! Words of up to three characters are kept whole; longer words contribute
//! every prefix of two or more characters so that partially typed words match.

use std::collections::HashSet;

/// Words up to this many characters are emitted unchanged.
pub const SHORT_WORD_MAX_CHARS: usize = 3;

/// Shortest prefix emitted for long words.
pub const MIN_PREFIX_CHARS: usize = 2;

/// Lexemes of a single lower-cased word, before deduplication.
pub fn expand_word(word: &str) -> Vec<String> {
    let chars: Vec<char> = word.chars().collect();
    if chars.len() <= SHORT_WORD_MAX_CHARS {
        return vec![word.to_string()];
    }
    (MIN_PREFIX_CHARS..=chars.len())
        .map(|n| chars[..n].iter().collect())
        .collect()
}

/// Deduplicated lexemes in first-seen order.
pub fn lexemes(full_address: &str) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Vec::new();

    for part in full_address.split(',') {
        let part = part.trim().to_lowercase().replace('.', " ");
        for word in part.split_whitespace() {
            for lexeme in expand_word(word) {
                if seen.insert(lexeme.clone()) {
                    out.push(lexeme);
                }
            }
        }
    }

    out
}

/// Space-joined lexeme string stored in `fulladdress_search`.
pub fn tokenize(full_address: &str) -> String {
    lexemes(full_address).join(" ")
}
