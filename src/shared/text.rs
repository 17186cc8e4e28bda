//! Text normalization and alias candidate generation.
//!
//! Terms, aliases, and event titles all pass through the same
//! `normalize_text` so exact lookups and fuzzy scoring compare like with like.

use std::collections::HashSet;

/// Function words dropped when extracting content tokens from a term.
/// Stand-in for a part-of-speech filter: whatever is left after removing
/// these is treated as a noun/adjective content word.
const FUNCTION_WORDS: &[&str] = &[
    "a", "an", "the", "this", "that", "these", "those", "i", "me", "my", "we", "our", "you",
    "your", "it", "its", "in", "at", "on", "to", "for", "of", "with", "near", "around", "by",
    "from", "and", "or", "is", "are", "be", "do", "does", "go", "play", "find", "show", "want",
    "need", "looking", "some", "any",
];

/// Lowercases, strips non-alphanumeric characters per token, and joins with
/// single spaces. Empty tokens disappear ("Drop-in!" becomes "dropin").
pub fn normalize_text(value: &str) -> String {
    value
        .split_whitespace()
        .map(|token| {
            token
                .chars()
                .filter(|c| c.is_ascii_alphanumeric())
                .collect::<String>()
                .to_lowercase()
        })
        .filter(|token| !token.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Alias lookup candidates for one free-text term, in priority order:
/// the normalized full term, every contiguous token n-gram longest first,
/// then the content-word-only phrase and each content token individually.
pub fn build_alias_candidates(raw_term: &str) -> Vec<String> {
    let normalized = normalize_text(raw_term);
    if normalized.is_empty() {
        return Vec::new();
    }

    let tokens: Vec<&str> = normalized.split(' ').collect();
    let mut seen = HashSet::new();
    let mut candidates = Vec::new();
    let mut push = |candidate: String, seen: &mut HashSet<String>, out: &mut Vec<String>| {
        if !candidate.is_empty() && seen.insert(candidate.clone()) {
            out.push(candidate);
        }
    };

    push(normalized.clone(), &mut seen, &mut candidates);

    // Phrase n-grams (longest first) help map natural phrases like "play badminton".
    for size in (1..=tokens.len()).rev() {
        for window in tokens.windows(size) {
            push(window.join(" "), &mut seen, &mut candidates);
        }
    }

    let function_words: HashSet<&str> = FUNCTION_WORDS.iter().copied().collect();
    let content_tokens: Vec<&str> = tokens
        .iter()
        .copied()
        .filter(|token| !function_words.contains(token))
        .collect();
    if !content_tokens.is_empty() {
        push(content_tokens.join(" "), &mut seen, &mut candidates);
        for token in content_tokens {
            push(token.to_string(), &mut seen, &mut candidates);
        }
    }

    candidates
}
