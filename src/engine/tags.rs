//! Leading-tag classification for post text.
//!
//! A post is tagged when its text opens with a bracketed single ideograph,
//! e.g. `（开）今天天气不错` or `(开)今天天气不错`. The match is anchored at
//! the very first character; a bracket anywhere else does not count.

const OPEN_BRACKETS: [char; 2] = ['（', '('];
const CLOSE_BRACKETS: [char; 2] = ['）', ')'];

/// Accepted tag characters (CJK unified ideographs 一..龥).
const IDEOGRAPH_RANGE: std::ops::RangeInclusive<char> = '\u{4E00}'..='\u{9FA5}';

/// Returns the tag and the byte length of the matched prefix.
fn match_prefix(text: &str) -> Option<(char, usize)> {
    let mut chars = text.char_indices();

    let (_, open) = chars.next()?;
    if !OPEN_BRACKETS.contains(&open) {
        return None;
    }

    let (_, tag) = chars.next()?;
    if !IDEOGRAPH_RANGE.contains(&tag) {
        return None;
    }

    let (close_at, close) = chars.next()?;
    if !CLOSE_BRACKETS.contains(&close) {
        return None;
    }

    Some((tag, close_at + close.len_utf8()))
}

/// Extracts the single-character tag from the start of `text`.
///
/// Total over all inputs: anything that is not an exact bracketed single
/// ideograph at position 0 yields `None`.
///
/// # Examples
///
/// ```
/// use skyshelf::engine::extract_tag;
///
/// assert_eq!(extract_tag("（开）今天天气不错"), Some('开'));
/// assert_eq!(extract_tag("(开)今天天气不错"), Some('开'));
/// assert_eq!(extract_tag("今天(开)天气不错"), None);
/// assert_eq!(extract_tag("（开开）"), None);
/// ```
pub fn extract_tag(text: &str) -> Option<char> {
    match_prefix(text).map(|(tag, _)| tag)
}

/// Returns `text` with the tag prefix removed, or `text` unchanged if it has none.
pub fn strip_tag(text: &str) -> &str {
    match match_prefix(text) {
        Some((_, prefix_len)) => &text[prefix_len..],
        None => text,
    }
}
