//! Token estimation from character length.
//!
//! All sizing decisions in the chunking engine use this approximation
//! rather than a real tokenizer.

/// Approximate chars-per-token ratio.
pub const CHARS_PER_TOKEN: usize = 4;

/// Estimate the token count of a text from its byte length.
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(CHARS_PER_TOKEN)
}
