//! Record-to-glyph mapping for the viewport's status column.
//!
//! Two alphabets: [`GlyphSet::Rich`] uses single-cell Unicode symbols,
//! [`GlyphSet::Plain`] is pure ASCII for terminals without glyph fonts.
//! Every symbol in both alphabets is exactly one cell wide.

use crate::record::{Record, RecordKind};

/// Which symbol alphabet to render with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GlyphSet {
    #[default]
    Rich,
    Plain,
}

/// A resolved display glyph: the symbol plus the SGR color applied to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Glyph {
    pub symbol: &'static str,
    /// SGR prefix; the renderer is responsible for the matching reset.
    pub color: &'static str,
}

const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const CYAN: &str = "\x1b[36m";
const DIM: &str = "\x1b[2m";

fn pick(set: GlyphSet, rich: &'static str, plain: &'static str) -> &'static str {
    match set {
        GlyphSet::Rich => rich,
        GlyphSet::Plain => plain,
    }
}

/// Rough tool families for picking an invocation symbol.
fn tool_family(tool: &str) -> ToolFamily {
    match tool {
        "Read" | "Write" | "Edit" | "MultiEdit" | "NotebookEdit" => ToolFamily::File,
        "Grep" | "Glob" => ToolFamily::Search,
        "Bash" => ToolFamily::Command,
        "WebFetch" | "WebSearch" => ToolFamily::Web,
        _ => ToolFamily::Other,
    }
}

enum ToolFamily {
    File,
    Search,
    Command,
    Web,
    Other,
}

/// Resolve the glyph for a record.
///
/// Outcome marks dominate (a failed tool result is an `✗` no matter what
/// produced it), then tool family, then the record kind.
pub fn resolve(set: GlyphSet, record: &Record) -> Glyph {
    match record.outcome {
        Some(true) => {
            return Glyph {
                symbol: pick(set, "✓", "+"),
                color: GREEN,
            };
        }
        Some(false) => {
            return Glyph {
                symbol: pick(set, "✗", "x"),
                color: RED,
            };
        }
        None => {}
    }

    match record.kind {
        RecordKind::Error => Glyph {
            symbol: pick(set, "✗", "x"),
            color: RED,
        },
        RecordKind::Response => Glyph {
            symbol: pick(set, "→", ">"),
            color: DIM,
        },
        RecordKind::Tool => {
            let symbol = match tool_family(record.tool.as_deref().unwrap_or("")) {
                ToolFamily::File => pick(set, "✎", "~"),
                ToolFamily::Search => pick(set, "⌕", "/"),
                ToolFamily::Command => "$",
                ToolFamily::Web => pick(set, "↗", "@"),
                ToolFamily::Other => pick(set, "⊕", "*"),
            };
            Glyph {
                symbol,
                color: CYAN,
            }
        }
    }
}
