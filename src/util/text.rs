use std::borrow::Cow;

use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

const ELLIPSIS: &str = "...";
const ELLIPSIS_WIDTH: usize = 3;

/// Terminal columns occupied by `s` (CJK and emoji count as 2).
///
/// ```
/// use skyshelf::util::display_width;
///
/// assert_eq!(display_width("Hello"), 5);
/// assert_eq!(display_width("你好"), 4);
/// ```
pub fn display_width(s: &str) -> usize {
    UnicodeWidthStr::width(s)
}

fn char_width(c: char) -> usize {
    UnicodeWidthChar::width(c).unwrap_or(0)
}

/// Cuts `s` to at most `max_width` columns, appending `...` when text is lost.
///
/// Widths of 3 or less have no room for an ellipsis, so the text is cut bare.
/// Borrowed when `s` already fits.
///
/// ```
/// use skyshelf::util::truncate_to_width;
///
/// assert_eq!(truncate_to_width("Short", 10), "Short");
/// assert_eq!(truncate_to_width("Hello World", 8), "Hello...");
/// assert_eq!(truncate_to_width("你好世界", 7), "你好...");
/// assert_eq!(truncate_to_width("Test", 2), "Te");
/// ```
pub fn truncate_to_width(s: &str, max_width: usize) -> Cow<'_, str> {
    if display_width(s) <= max_width {
        return Cow::Borrowed(s);
    }

    let (budget, suffix) = if max_width <= ELLIPSIS_WIDTH {
        (max_width, "")
    } else {
        (max_width - ELLIPSIS_WIDTH, ELLIPSIS)
    };

    let mut used = 0;
    let mut cut = 0;
    for (idx, c) in s.char_indices() {
        let w = char_width(c);
        if used + w > budget {
            break;
        }
        used += w;
        cut = idx + c.len_utf8();
    }

    Cow::Owned(format!("{}{}", &s[..cut], suffix))
}

fn is_stripped_control(b: u8) -> bool {
    b == 0x7f || (b < 0x20 && !matches!(b, b'\t' | b'\n' | b'\r'))
}

/// Removes terminal control bytes and ANSI escape sequences (CSI and OSC)
/// from untrusted text. Tab, newline and carriage return are kept.
///
/// Borrowed when nothing needed removing.
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    let bytes = s.as_bytes();
    if !bytes.iter().any(|&b| b == 0x1b || is_stripped_control(b)) {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut i = 0;
    let mut run_start = 0;

    while i < bytes.len() {
        let b = bytes[i];
        if b != 0x1b && !is_stripped_control(b) {
            i += 1;
            continue;
        }

        // Control bytes are ASCII, so the run before them is valid UTF-8
        out.push_str(&s[run_start..i]);

        i += 1;
        if b == 0x1b {
            match bytes.get(i) {
                Some(b'[') => {
                    // CSI: parameters until a final byte in 0x40..=0x7e
                    i += 1;
                    while i < bytes.len() {
                        let c = bytes[i];
                        i += 1;
                        if (0x40..=0x7e).contains(&c) {
                            break;
                        }
                    }
                }
                Some(b']') => {
                    // OSC: until BEL or ESC \
                    i += 1;
                    while i < bytes.len() {
                        if bytes[i] == 0x07 {
                            i += 1;
                            break;
                        }
                        if bytes[i] == 0x1b && bytes.get(i + 1) == Some(&b'\\') {
                            i += 2;
                            break;
                        }
                        i += 1;
                    }
                }
                _ => {}
            }
        }
        run_start = i;
    }

    out.push_str(&s[run_start.min(bytes.len())..]);
    Cow::Owned(out)
}

/// Sanitizes `s` and folds it onto one line of at most `max_width` columns.
///
/// Runs of whitespace (including newlines) collapse to a single space.
pub fn single_line(s: &str, max_width: usize) -> String {
    let clean = strip_control_chars(s);
    let folded = clean.split_whitespace().collect::<Vec<_>>().join(" ");
    truncate_to_width(&folded, max_width).into_owned()
}
