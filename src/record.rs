//! Normalized display records.
//!
//! Every raw wire line the tailer reads is reduced to zero or more
//! [`Record`]s — the single unit the rest of the pipeline (buffering,
//! glyph resolution, rendering) operates on. Records serialize to JSON so
//! hosts can re-log the normalized stream.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Broad classification of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// A tool/command invocation by the agent.
    Tool,
    /// Agent text output or a successful tool result.
    Response,
    /// An error surfaced by the agent or a failed tool result.
    Error,
}

/// One normalized event flowing from the tailer to the viewport.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    pub kind: RecordKind,
    /// Tool name, only meaningful when `kind` is [`RecordKind::Tool`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    /// Display text, already resolved from the wire shape.
    pub content: String,
    /// Tri-state outcome: success, failure, or unknown.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<bool>,
    /// Wire timestamp, when the source carried one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Record {
    /// A tool-invocation record.
    pub fn tool(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            kind: RecordKind::Tool,
            tool: Some(name.into()),
            content: content.into(),
            outcome: None,
            timestamp: None,
        }
    }

    /// A plain response record.
    pub fn response(content: impl Into<String>) -> Self {
        Self {
            kind: RecordKind::Response,
            tool: None,
            content: content.into(),
            outcome: None,
            timestamp: None,
        }
    }

    /// An error record, outcome preset to failure.
    pub fn error(content: impl Into<String>) -> Self {
        Self {
            kind: RecordKind::Error,
            tool: None,
            content: content.into(),
            outcome: Some(false),
            timestamp: None,
        }
    }

    pub fn with_outcome(mut self, outcome: Option<bool>) -> Self {
        self.outcome = outcome;
        self
    }

    pub fn with_timestamp(mut self, timestamp: Option<DateTime<Utc>>) -> Self {
        self.timestamp = timestamp;
        self
    }
}
