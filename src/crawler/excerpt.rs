//! Relevant-text extraction around keyword hits
//!
//! The extractor cuts windows of text around every keyword occurrence and
//! keeps a window only when it starts at or after the end of the previously
//! accepted one. The cursor is shared by all keywords, so the same region of
//! the page is never emitted twice. Offsets are counted in characters.

use tracing::{debug, instrument};

use crate::crawler::config::ExcerptOptions;

/// Build a bounded excerpt of `text` around occurrences of `keywords`
///
/// `text` is expected to be lowercased already; keywords are lowercased here.
/// Returns `None` when no keyword occurs.
#[instrument(skip(text, keywords), fields(chars))]
pub fn extract_relevant_text(
    text: &str,
    keywords: &[String],
    options: &ExcerptOptions,
) -> Option<String> {
    let chars: Vec<char> = text.chars().collect();
    tracing::Span::current().record("chars", chars.len());

    let mut windows: Vec<String> = Vec::new();
    let mut last_end = 0usize;

    for keyword in keywords {
        let needle: Vec<char> = keyword.to_lowercase().chars().collect();
        if needle.is_empty() {
            continue;
        }

        let mut from = 0usize;
        while let Some(hit) = find_chars(&chars, &needle, from) {
            let start = hit.saturating_sub(options.leading_window);
            let end = (hit + options.trailing_window).min(chars.len());

            if start >= last_end && start < end {
                windows.push(chars[start..end].iter().collect());
                last_end = end;
            }

            from = hit + needle.len();
        }
    }

    if windows.is_empty() {
        return None;
    }

    debug!("Accepted {} excerpt windows", windows.len());
    Some(truncate_chars(&collapse_whitespace(&windows.join(" ")), options.max_length))
}

/// Collapse every whitespace run to a single space and trim the ends
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Keep at most `max` characters of `text`
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((byte_idx, _)) => text[..byte_idx].to_string(),
        None => text.to_string(),
    }
}

fn find_chars(haystack: &[char], needle: &[char], from: usize) -> Option<usize> {
    if needle.len() > haystack.len() {
        return None;
    }
    (from..=haystack.len() - needle.len()).find(|&i| haystack[i..i + needle.len()] == *needle)
}
