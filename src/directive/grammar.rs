//! Directive tag grammar.
//!
//! A directive is delimited by the literal start token `[ACTION:` and the
//! literal end token `]`. The body holds a kind segment and an optional
//! argument segment separated by the first `|`. Whitespace around the kind
//! and the separator is insignificant. Kind tokens are matched
//! case-sensitively by the registry; this module only checks that the kind
//! segment is a single bare token.

use once_cell::sync::Lazy;
use regex::Regex;

use super::{StreamExtractor, StreamItem};

/// Literal start token of a directive tag.
pub const START_MARKER: &str = "[ACTION:";

/// Literal end token of a directive tag.
pub const END_MARKER: char = ']';

/// Literal separator between the kind segment and the argument segment.
pub const SEPARATOR: char = '|';

/// A kind segment must be one bare word: letters and underscores only.
static KIND_TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_]+$").expect("kind token regex"));

/// Split a tag body (the text between `[ACTION:` and `]`) into its kind
/// token and trimmed argument. Returns `None` when the kind segment is
/// empty or not a single bare token; such a tag is malformed as a whole.
pub fn split_body(body: &str) -> Option<(String, String)> {
    let (kind_part, arg_part) = match body.find(SEPARATOR) {
        Some(at) => (&body[..at], &body[at + SEPARATOR.len_utf8()..]),
        None => (body, ""),
    };
    let kind = kind_part.trim();
    if kind.is_empty() || !KIND_TOKEN_RE.is_match(kind) {
        return None;
    }
    Some((kind.to_string(), arg_part.trim().to_string()))
}

/// Length in bytes of the longest suffix of `text` that is a proper prefix
/// of the start marker. That suffix must be held back between chunks: it
/// may become a marker once the next chunk arrives.
pub(crate) fn partial_marker_suffix(text: &str) -> usize {
    let bytes = text.as_bytes();
    let marker = START_MARKER.as_bytes();
    let longest = (marker.len() - 1).min(bytes.len());
    for len in (1..=longest).rev() {
        if bytes[bytes.len() - len..] == marker[..len] {
            return len;
        }
    }
    0
}

/// Scan a complete, fully buffered text in one call. Equivalent to feeding
/// the whole text to a fresh [`StreamExtractor`] and finishing the stream.
pub fn scan_complete(text: &str) -> Vec<StreamItem> {
    let mut extractor = StreamExtractor::new();
    let mut items = extractor.feed(text);
    items.extend(extractor.finish());
    items
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_body_with_argument() {
        let (kind, arg) = split_body(" TERMINAL | ls -la ").unwrap();
        assert_eq!(kind, "TERMINAL");
        assert_eq!(arg, "ls -la");
    }

    #[test]
    fn split_body_without_argument() {
        let (kind, arg) = split_body(" SCREENSHOT ").unwrap();
        assert_eq!(kind, "SCREENSHOT");
        assert_eq!(arg, "");
    }

    #[test]
    fn split_body_keeps_later_separators_in_argument() {
        let (kind, arg) = split_body("ANDROID | sms | +15551234 | hello").unwrap();
        assert_eq!(kind, "ANDROID");
        assert_eq!(arg, "sms | +15551234 | hello");
    }

    #[test]
    fn split_body_rejects_non_token_kinds() {
        assert!(split_body("").is_none());
        assert!(split_body("   ").is_none());
        assert!(split_body("open app | x").is_none());
        assert!(split_body("OPEN! | x").is_none());
    }

    #[test]
    fn split_body_preserves_kind_case() {
        let (kind, _) = split_body("open | firefox").unwrap();
        assert_eq!(kind, "open");
    }

    #[test]
    fn partial_suffix_lengths() {
        assert_eq!(partial_marker_suffix("hello"), 0);
        assert_eq!(partial_marker_suffix("hello ["), 1);
        assert_eq!(partial_marker_suffix("hello [ACT"), 4);
        assert_eq!(partial_marker_suffix("hello [ACTION"), 7);
        // A complete marker is not a partial one.
        assert_eq!(partial_marker_suffix("hello [ACTION:"), 0);
        // Matching must anchor at the very end.
        assert_eq!(partial_marker_suffix("[AC done"), 0);
    }

    #[test]
    fn partial_suffix_after_multibyte_text() {
        assert_eq!(partial_marker_suffix("héllo [A"), 2);
        assert_eq!(partial_marker_suffix("héllo…"), 0);
    }
}
