//! Escape-aware text measurement and layout.
//!
//! Terminal output mixes printable text with escape sequences (styles,
//! cursor movement, OSC titles), so byte and char counts are useless for
//! layout. These helpers strip or account for escapes when measuring,
//! padding, and truncating, and are total over arbitrary input — garbage
//! bytes never panic, they just measure as zero width.

use std::sync::LazyLock;

use regex::Regex;
use unicode_width::UnicodeWidthChar;

/// SGR reset, appended before padding when a style is still open.
pub const RESET: &str = "\x1b[0m";

/// Strip terminal escape sequences, returning plain text.
///
/// Covers CSI sequences (including private-mode `?` parameters and
/// intermediate bytes), OSC sequences with either BEL or ST termination,
/// charset designators (`ESC ( X` / `ESC ) X`), and bare two-byte escapes.
pub fn strip_escapes(input: &str) -> String {
    static ESCAPE_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(
            r"\x1b\[[0-9:;<=>?]*[ -/]*[@-~]|\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)|\x1b[()][0-9A-Za-z]|\x1b[^\[\]()]",
        )
        .unwrap()
    });
    ESCAPE_RE.replace_all(input, "").to_string()
}

/// Visible terminal width of a string: escapes contribute nothing, wide
/// glyphs count as two cells, unassigned control characters as zero.
pub fn visible_width(input: &str) -> usize {
    strip_escapes(input)
        .chars()
        .map(|c| c.width().unwrap_or(0))
        .sum()
}

/// Pad with trailing spaces to exactly `width` visible cells.
///
/// Text already at or past `width` is returned unchanged. If the text
/// leaves an SGR style open, a reset is inserted before the padding so the
/// style cannot bleed into the blank cells; plain or already-reset text is
/// padded with no extra codes.
pub fn pad_to_width(input: &str, width: usize) -> String {
    let current = visible_width(input);
    if current >= width {
        return input.to_string();
    }
    // A dangling trailing ESC would swallow the first pad space as its
    // payload, making the padded string measure one cell short.
    let input = trim_dangling_escape(input);
    let mut out = String::with_capacity(input.len() + (width - current));
    out.push_str(input);
    if style_left_open(input) {
        out.push_str(RESET);
    }
    for _ in current..width {
        out.push(' ');
    }
    out
}

/// Truncate so the rendered width never exceeds `width`, appending
/// `ellipsis` when anything was cut.
///
/// Truncation operates on the stripped text, so styling inside a truncated
/// string is dropped rather than left dangling. Holds for widths smaller
/// than the ellipsis itself (the ellipsis is clipped, down to empty at 0).
pub fn truncate_to_width(input: &str, width: usize, ellipsis: &str) -> String {
    if visible_width(input) <= width {
        return input.to_string();
    }
    let ellipsis_width = visible_width(ellipsis);
    if ellipsis_width >= width {
        return clip_to_width(ellipsis, width);
    }
    let mut out = clip_to_width(&strip_escapes(input), width - ellipsis_width);
    out.push_str(ellipsis);
    out
}

/// Drop trailing escape introducers that never got their payload. A lone
/// `ESC` at the end of a string strips to nothing on its own, but consumes
/// the next appended character; anything appended after it would vanish
/// from measurement. Escapes the stripper already consumes are left alone.
fn trim_dangling_escape(input: &str) -> &str {
    let mut out = input;
    while out.ends_with('\x1b') && strip_escapes(out).ends_with('\x1b') {
        out = &out[..out.len() - 1];
    }
    out
}

/// Keep the longest prefix of plain text that fits in `width` cells.
fn clip_to_width(input: &str, width: usize) -> String {
    let mut out = String::new();
    let mut used = 0;
    for c in input.chars() {
        let w = c.width().unwrap_or(0);
        if used + w > width {
            break;
        }
        out.push(c);
        used += w;
    }
    out
}

/// Whether the last SGR sequence in `input` sets a style without a
/// following reset. Non-SGR escapes are irrelevant to padding bleed.
fn style_left_open(input: &str) -> bool {
    static SGR_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\x1b\[([0-9;]*)m").unwrap());
    let mut open = false;
    for caps in SGR_RE.captures_iter(input) {
        let params = caps.get(1).map(|m| m.as_str()).unwrap_or("");
        open = !(params.is_empty() || params == "0");
    }
    open
}
