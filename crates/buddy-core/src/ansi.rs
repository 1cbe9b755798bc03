//! Terminal escape sequence handling
//!
//! When adb believes it is attached to a terminal it redraws its progress
//! line with cursor-control sequences (`\x1b[K` after every update). Those
//! sequences are stripped before output is classified.

use regex::Regex;
use std::sync::LazyLock;

/// Regex pattern for escape sequences introduced by a real ESC byte.
///
/// Covers:
/// - CSI sequences: ESC [ ... letter (erase line, colors, cursor movement)
/// - OSC sequences: ESC ] ... BEL or ST (window titles)
/// - Simple escapes: ESC letter
///
/// Bare `[` is never matched, so progress prefixes such as `[ 39%]` survive.
static ANSI_ESCAPE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        \x1b\[[0-9;?]*[A-Za-z]               # CSI sequences
        | \x1b\][^\x07\x1b]*(?:\x07|\x1b\\)  # OSC sequences
        | \x1b[A-Za-z]                       # Simple escapes
        ",
    )
    .expect("ANSI regex pattern is valid")
});

/// Strip all terminal escape sequences from a string.
///
/// # Examples
///
/// ```
/// use buddy_core::strip_ansi_codes;
///
/// let input = "[ 39%] /sdcard/x.iso\x1b[K";
/// assert_eq!(strip_ansi_codes(input), "[ 39%] /sdcard/x.iso");
/// ```
pub fn strip_ansi_codes(input: &str) -> String {
    ANSI_ESCAPE_PATTERN.replace_all(input, "").into_owned()
}
