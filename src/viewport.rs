//! Bounded scrollback with auto-follow and fixed-geometry rendering.
//!
//! Holds a capped window of records, tracks the scroll position against a
//! host-supplied viewport height, and renders the visible slice into
//! exactly `height` rows of exactly `width` visible cells. The host owns
//! the draw loop and key handling; this module owns every scroll/eviction
//! invariant.

use std::collections::VecDeque;

use crate::glyph::{self, GlyphSet};
use crate::record::Record;
use crate::text::{self, RESET};

/// Default record cap.
pub const DEFAULT_MAX_RECORDS: usize = 500;

/// Ellipsis used when a row's content overflows its width.
const ELLIPSIS: &str = "…";

/// Shown in place of content that is pure noise (empty strings, bare JSON
/// punctuation fragments from partially-structured output).
const NOISE_PLACEHOLDER: &str = "(no output)";

/// Page movements leave this many rows of overlap context.
const PAGE_OVERLAP: usize = 2;

/// Navigation input forwarded verbatim from the host's key handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavAction {
    LineUp,
    LineDown,
    PageUp,
    PageDown,
    JumpToStart,
    JumpToEnd,
}

/// Scrollback buffer plus scroll state.
#[derive(Debug)]
pub struct Scrollback {
    buffer: VecDeque<Record>,
    max_records: usize,
    scroll_offset: usize,
    viewport_height: usize,
    auto_follow: bool,
    glyphs: GlyphSet,
}

impl Default for Scrollback {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RECORDS)
    }
}

impl Scrollback {
    pub fn new(max_records: usize) -> Self {
        Self {
            buffer: VecDeque::with_capacity(max_records.min(DEFAULT_MAX_RECORDS)),
            max_records: max_records.max(1),
            scroll_offset: 0,
            viewport_height: 0,
            auto_follow: true,
            glyphs: GlyphSet::default(),
        }
    }

    pub fn with_glyphs(mut self, glyphs: GlyphSet) -> Self {
        self.glyphs = glyphs;
        self
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn scroll_offset(&self) -> usize {
        self.scroll_offset
    }

    pub fn auto_follow(&self) -> bool {
        self.auto_follow
    }

    /// Append a record, sanitizing its content for single-line display and
    /// evicting from the front past the cap.
    ///
    /// An append while the offset already sits at the bottom re-pins to the
    /// new bottom and recovers auto-follow, so a user who scrolled exactly
    /// to the live edge keeps following.
    pub fn append(&mut self, mut record: Record) {
        record.content = sanitize_for_display(&record.content);

        let was_at_bottom = self.scroll_offset == self.max_scroll();
        if self.buffer.len() >= self.max_records {
            let evicted = self.buffer.len() + 1 - self.max_records;
            for _ in 0..evicted {
                self.buffer.pop_front();
            }
            self.scroll_offset = self.scroll_offset.saturating_sub(evicted);
        }
        self.buffer.push_back(record);

        if self.auto_follow || was_at_bottom {
            self.auto_follow = true;
            self.scroll_offset = self.max_scroll();
        } else {
            self.clamp();
        }
    }

    /// Drop all records and return to a fresh following state.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.scroll_offset = 0;
        self.auto_follow = true;
    }

    /// Host-supplied height; called on every terminal resize. Never flips
    /// auto-follow, but keeps the offset pinned while following.
    pub fn set_viewport_height(&mut self, height: usize) {
        self.viewport_height = height;
        if self.auto_follow {
            self.scroll_offset = self.max_scroll();
        } else {
            self.clamp();
        }
    }

    /// Apply one navigation action.
    ///
    /// Upward movement disables auto-follow immediately; downward movement
    /// that lands exactly at the bottom re-enables it.
    pub fn handle_navigation(&mut self, action: NavAction) {
        let max = self.max_scroll();
        let page = self.viewport_height.saturating_sub(PAGE_OVERLAP).max(1);
        match action {
            NavAction::LineUp => {
                self.scroll_offset = self.scroll_offset.saturating_sub(1);
                self.auto_follow = false;
            }
            NavAction::PageUp => {
                self.scroll_offset = self.scroll_offset.saturating_sub(page);
                self.auto_follow = false;
            }
            NavAction::JumpToStart => {
                self.scroll_offset = 0;
                self.auto_follow = false;
            }
            NavAction::LineDown => {
                self.scroll_offset = (self.scroll_offset + 1).min(max);
                if self.scroll_offset == max {
                    self.auto_follow = true;
                }
            }
            NavAction::PageDown => {
                self.scroll_offset = (self.scroll_offset + page).min(max);
                if self.scroll_offset == max {
                    self.auto_follow = true;
                }
            }
            NavAction::JumpToEnd => {
                self.scroll_offset = max;
                self.auto_follow = true;
            }
        }
    }

    /// Render the visible slice as exactly `viewport_height` rows, each of
    /// visible width exactly `width`. Rows past the buffer are blank.
    pub fn render(&self, width: usize) -> Vec<String> {
        let mut rows = Vec::with_capacity(self.viewport_height);
        for i in 0..self.viewport_height {
            match self.buffer.get(self.scroll_offset + i) {
                Some(record) => rows.push(self.render_row(record, width)),
                None => rows.push(" ".repeat(width)),
            }
        }
        rows
    }

    /// One record as a width-exact row: colored glyph in a fixed column,
    /// then content truncated to the remaining width.
    fn render_row(&self, record: &Record, width: usize) -> String {
        let glyph = glyph::resolve(self.glyphs, record);
        // One cell of glyph, one separator space.
        let content_width = width.saturating_sub(2);
        let content = truncated_content(record, content_width);
        let row = format!("{}{}{RESET} {}", glyph.color, glyph.symbol, content);
        if text::visible_width(&row) > width {
            // Width too narrow for even the glyph column; degrade to a
            // plain clipped row.
            return text::pad_to_width(&text::truncate_to_width(&row, width, ""), width);
        }
        text::pad_to_width(&row, width)
    }

    fn max_scroll(&self) -> usize {
        self.buffer.len().saturating_sub(self.viewport_height)
    }

    fn clamp(&mut self) {
        self.scroll_offset = self.scroll_offset.min(self.max_scroll());
    }
}

fn truncated_content(record: &Record, width: usize) -> String {
    let content = if is_noise(&record.content) {
        NOISE_PLACEHOLDER
    } else {
        record.content.as_str()
    };
    text::truncate_to_width(content, width, ELLIPSIS)
}

/// Reduce to the first logical line and neutralize remaining control bytes.
/// Escape sequences are left alone; the rendering helpers account for them.
fn sanitize_for_display(content: &str) -> String {
    let first_line = content.split(['\n', '\r']).next().unwrap_or("");
    first_line
        .chars()
        .map(|c| {
            if c != '\u{1b}' && c.is_control() {
                ' '
            } else {
                c
            }
        })
        .collect()
}

/// Bare JSON punctuation fragments and empty strings carry no information
/// worth a row.
fn is_noise(content: &str) -> bool {
    let trimmed = content.trim();
    trimmed.is_empty() || trimmed.chars().all(|c| "{}[]\",:".contains(c))
}
