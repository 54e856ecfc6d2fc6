//! Escaping for markup-interpreting notification servers
//!
//! Notification bodies may be rendered as a small subset of HTML, so the five
//! reserved characters are replaced by their entities before sending.

use std::borrow::Cow;

fn entity(c: char) -> Option<&'static str> {
    match c {
        '&' => Some("&amp;"),
        '<' => Some("&lt;"),
        '>' => Some("&gt;"),
        '\'' => Some("&apos;"),
        '"' => Some("&quot;"),
        _ => None,
    }
}

/// Escape `text` without any size limit
///
/// Borrows the input when it contains nothing to escape.
pub fn escape_markup(text: &str) -> Cow<'_, str> {
    if !text.chars().any(|c| entity(c).is_some()) {
        return Cow::Borrowed(text);
    }
    let mut out = String::with_capacity(text.len() + text.len() / 2);
    escape_markup_into(text, &mut out, usize::MAX);
    Cow::Owned(out)
}

/// Escape `text` into `out`, writing at most `capacity` bytes
///
/// `out` is cleared first so its allocation can be reused across calls.
/// When the expansion does not fit, output stops before the first entity or
/// character that would cross the limit; entities and UTF-8 sequences are
/// never split. Returns `true` if the whole input was written.
pub fn escape_markup_into(text: &str, out: &mut String, capacity: usize) -> bool {
    out.clear();
    let mut buf = [0u8; 4];
    for c in text.chars() {
        let piece = match entity(c) {
            Some(e) => e,
            None => c.encode_utf8(&mut buf),
        };
        if out.len() + piece.len() > capacity {
            return false;
        }
        out.push_str(piece);
    }
    true
}

/// Escape `text` into a new string of at most `capacity` bytes
pub fn escape_markup_bounded(text: &str, capacity: usize) -> String {
    let mut out = String::with_capacity(capacity.min(text.len() * 6));
    escape_markup_into(text, &mut out, capacity);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_plain_text_is_borrowed() {
        let text = "Accepted password for root";
        match escape_markup(text) {
            Cow::Borrowed(s) => assert_eq!(s, text),
            Cow::Owned(_) => panic!("plain text should not be copied"),
        }
    }

    #[test]
    fn test_escape_empty() {
        assert_eq!(escape_markup(""), "");
        assert_eq!(escape_markup_bounded("", 0), "");
    }

    #[test]
    fn test_escape_all_reserved() {
        assert_eq!(
            escape_markup("a&b<c>d'e\"f"),
            "a&amp;b&lt;c&gt;d&apos;e&quot;f"
        );
    }

    #[test]
    fn test_escape_maximal_expansion() {
        assert_eq!(escape_markup("\"\"\""), "&quot;&quot;&quot;");
        assert_eq!(escape_markup("&&"), "&amp;&amp;");
    }

    #[test]
    fn test_escape_reescapes_existing_entities() {
        // Already-escaped input is escaped again: the renderer shows it verbatim.
        assert_eq!(escape_markup("&amp;"), "&amp;amp;");
    }

    #[test]
    fn test_truncation_never_splits_entity() {
        // "a&amp;" is 6 bytes; 4 bytes of room only fits "a".
        assert_eq!(escape_markup_bounded("a&b", 4), "a");
        assert_eq!(escape_markup_bounded("a&b", 6), "a&amp;");
        assert_eq!(escape_markup_bounded("a&b", 7), "a&amp;b");
    }

    #[test]
    fn test_truncation_never_splits_utf8() {
        // 'é' is two bytes
        assert_eq!(escape_markup_bounded("xé", 2), "x");
        assert_eq!(escape_markup_bounded("xé", 3), "xé");
    }

    #[test]
    fn test_truncation_respects_capacity_for_every_size() {
        let input = "<tag attr='v'>&\"é\"</tag>";
        let full = escape_markup(input).into_owned();
        for capacity in 0..full.len() {
            let mut out = String::new();
            let complete = escape_markup_into(input, &mut out, capacity);
            assert!(!complete);
            assert!(out.len() <= capacity, "capacity {}", capacity);
            assert!(full.starts_with(&out));
        }
        let mut out = String::from("stale");
        assert!(escape_markup_into(input, &mut out, full.len()));
        assert_eq!(out, full);
    }
}
