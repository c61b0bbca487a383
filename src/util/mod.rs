//! Text helpers for printing untrusted post text to a terminal.
//!
//! ```
//! use skyshelf::util::{display_width, single_line};
//!
//! assert_eq!(display_width("Hello 世界"), 10);
//! assert_eq!(single_line("（开）line one\nline two", 80), "（开）line one line two");
//! ```

mod text;

pub use text::{display_width, single_line, strip_control_chars, truncate_to_width};
