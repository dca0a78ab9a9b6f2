//! Text normalization.
//!
//! The pipeline treats tokenization as an opaque `text -> [token]`
//! function. This is the default implementation: lowercase words,
//! alphabetic runs only. Swapping in a smarter normalizer (stemming,
//! stopword lists) does not touch any stage code.

/// Split a free-text field into normalized tokens.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphabetic())
        .filter(|s| !s.is_empty())
        .map(|word| word.to_lowercase())
        .collect()
}
