//! Wire-line parsing — agent stream-json into normalized records.
//!
//! The agent CLI writes line-delimited JSON: `assistant`/`user` lines wrap
//! a list of typed content blocks, a `result` line carries the final text,
//! and `system` lines are bookkeeping we deliberately discard. The producer
//! flushes in bursts and truncates mid-line routinely, so malformed input
//! is never an error here — a line either parses or silently yields
//! nothing.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::record::{Record, RecordKind};

/// Parse one raw wire line into zero or more records, in block order.
///
/// An assistant turn can carry several tool invocations in sequence; all of
/// them come back, not just the first. Malformed JSON, unrecognized shapes,
/// and empty lines all yield an empty vec.
pub fn parse_line(raw: &str) -> Vec<Record> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    let value: Value = match serde_json::from_str(trimmed) {
        Ok(v) => v,
        Err(_) => return Vec::new(),
    };
    let Some(obj) = value.as_object() else {
        return Vec::new();
    };
    let timestamp = obj
        .get("timestamp")
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc));

    match obj.get("type").and_then(Value::as_str) {
        Some("assistant") | Some("user") => parse_message_blocks(obj, timestamp),
        Some("result") => parse_result(obj, timestamp),
        // Recognized bookkeeping lines, intentionally dropped.
        Some("system") => Vec::new(),
        _ => Vec::new(),
    }
}

/// Parse a chunk of text that may contain several lines plus a trailing
/// fragment. Returns the records plus the leftover remainder to carry into
/// the next chunk.
///
/// The trailing fragment is tentatively parsed standalone — a final line
/// with no newline at EOF is still complete JSON — and kept as remainder
/// only when it is not valid JSON yet.
pub fn parse_chunk(text: &str) -> (Vec<Record>, String) {
    let mut records = Vec::new();
    let mut lines: Vec<&str> = text.split('\n').collect();
    let tail = lines.pop().unwrap_or("");
    for line in lines {
        records.extend(parse_line(line));
    }

    let remainder = if tail.trim().is_empty() {
        String::new()
    } else if serde_json::from_str::<Value>(tail.trim()).is_ok() {
        // Complete line that just lacks its newline (end of file). Note a
        // discarded-but-complete line (e.g. "system") lands here too and
        // must not be carried forward.
        records.extend(parse_line(tail));
        String::new()
    } else {
        tail.to_string()
    };

    (records, remainder)
}

fn parse_message_blocks(obj: &Map<String, Value>, timestamp: Option<DateTime<Utc>>) -> Vec<Record> {
    let Some(blocks) = obj
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(Value::as_array)
    else {
        return Vec::new();
    };

    let mut records = Vec::new();
    for block in blocks {
        let Some(block) = block.as_object() else {
            continue;
        };
        match block.get("type").and_then(Value::as_str) {
            Some("tool_use") => {
                let Some(name) = block.get("name").and_then(Value::as_str) else {
                    continue;
                };
                let content = format_tool_use(name, block.get("input"));
                records.push(Record::tool(name, content).with_timestamp(timestamp));
            }
            Some("tool_result") => {
                let is_error = block
                    .get("is_error")
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                let content = result_text(block.get("content"));
                let kind = if is_error {
                    RecordKind::Error
                } else {
                    RecordKind::Response
                };
                records.push(Record {
                    kind,
                    tool: None,
                    content,
                    outcome: Some(!is_error),
                    timestamp,
                });
            }
            Some("text") => {
                if let Some(text) = block.get("text").and_then(Value::as_str) {
                    records.push(Record::response(text).with_timestamp(timestamp));
                }
            }
            _ => {}
        }
    }
    records
}

fn parse_result(obj: &Map<String, Value>, timestamp: Option<DateTime<Utc>>) -> Vec<Record> {
    let Some(text) = obj.get("result").and_then(Value::as_str) else {
        return Vec::new();
    };
    let is_error = obj
        .get("is_error")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let record = if is_error {
        Record::error(text)
    } else {
        Record::response(text)
    };
    vec![record.with_timestamp(timestamp)]
}

/// A `tool_result` content is either a plain string or a list of blocks;
/// in the latter case the first `text` block wins.
fn result_text(content: Option<&Value>) -> String {
    match content {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(blocks)) => blocks
            .iter()
            .filter_map(|b| b.as_object())
            .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
            .filter_map(|b| b.get("text").and_then(Value::as_str))
            .next()
            .unwrap_or("")
            .to_string(),
        _ => String::new(),
    }
}

/// Format a tool invocation as `"<Name>: <primary argument>"`.
///
/// No width-based truncation here — only the renderer knows the real
/// available width.
fn format_tool_use(name: &str, input: Option<&Value>) -> String {
    match primary_argument(name, input) {
        Some(arg) => format!("{name}: {arg}"),
        None => name.to_string(),
    }
}

/// Alias list for a tool family's primary argument key.
fn family_keys(tool: &str) -> &'static [&'static str] {
    match tool {
        "Read" | "Write" | "Edit" | "MultiEdit" | "NotebookEdit" => {
            &["file_path", "path", "notebook_path"]
        }
        "Grep" | "Glob" => &["pattern", "query", "glob"],
        "Bash" => &["command"],
        "WebFetch" | "WebSearch" => &["url", "query"],
        _ => &[],
    }
}

/// Resolve the one argument worth showing for a tool invocation.
///
/// Family alias keys are tried first; unknown tools fall back to the first
/// string-valued argument in wire order (serde_json's `preserve_order`
/// keeps the map in insertion order).
fn primary_argument(tool: &str, input: Option<&Value>) -> Option<String> {
    let input = input?.as_object()?;
    for key in family_keys(tool) {
        if let Some(arg) = input.get(*key).and_then(Value::as_str) {
            return Some(arg.to_string());
        }
    }
    input
        .values()
        .find_map(Value::as_str)
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn assistant_line(blocks: &str) -> String {
        format!(r#"{{"type":"assistant","message":{{"content":[{blocks}]}}}}"#)
    }

    // ── single lines ──

    #[test]
    fn parses_text_block_as_response() {
        let line = assistant_line(r#"{"type":"text","text":"thinking about it"}"#);
        let records = parse_line(&line);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].kind, RecordKind::Response);
        assert_eq!(records[0].content, "thinking about it");
    }

    #[test]
    fn parses_tool_use_with_command() {
        let line = assistant_line(r#"{"type":"tool_use","name":"Bash","input":{"command":"cargo test"}}"#);
        let records = parse_line(&line);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].kind, RecordKind::Tool);
        assert_eq!(records[0].tool.as_deref(), Some("Bash"));
        assert_eq!(records[0].content, "Bash: cargo test");
    }

    #[test]
    fn file_tool_accepts_path_alias() {
        let line = assistant_line(r#"{"type":"tool_use","name":"Read","input":{"path":"/tmp/a.rs"}}"#);
        assert_eq!(parse_line(&line)[0].content, "Read: /tmp/a.rs");
    }

    #[test]
    fn search_tool_accepts_pattern_alias() {
        let line = assistant_line(r#"{"type":"tool_use","name":"Grep","input":{"pattern":"fn main"}}"#);
        assert_eq!(parse_line(&line)[0].content, "Grep: fn main");
    }

    #[test]
    fn unknown_tool_uses_first_string_argument_in_wire_order() {
        let line = assistant_line(
            r#"{"type":"tool_use","name":"Custom","input":{"zzz":"first","aaa":"second"}}"#,
        );
        // "zzz" comes first on the wire; alphabetical order would pick "aaa".
        assert_eq!(parse_line(&line)[0].content, "Custom: first");
    }

    #[test]
    fn tool_without_arguments_renders_bare_name() {
        let line = assistant_line(r#"{"type":"tool_use","name":"Compact","input":{}}"#);
        assert_eq!(parse_line(&line)[0].content, "Compact");
    }

    #[test]
    fn tool_with_only_non_string_arguments_renders_bare_name() {
        let line = assistant_line(r#"{"type":"tool_use","name":"Custom","input":{"count":3}}"#);
        assert_eq!(parse_line(&line)[0].content, "Custom");
    }

    #[test]
    fn multiple_tool_uses_yield_records_in_order() {
        let line = assistant_line(
            r#"{"type":"tool_use","name":"Read","input":{"file_path":"a"}},{"type":"tool_use","name":"Bash","input":{"command":"ls"}}"#,
        );
        let records = parse_line(&line);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].content, "Read: a");
        assert_eq!(records[1].content, "Bash: ls");
    }

    #[test]
    fn tool_result_success() {
        let line = format!(
            r#"{{"type":"user","message":{{"content":[{}]}}}}"#,
            r#"{"type":"tool_result","content":"42 lines","is_error":false}"#
        );
        let records = parse_line(&line);
        assert_eq!(records[0].kind, RecordKind::Response);
        assert_eq!(records[0].outcome, Some(true));
        assert_eq!(records[0].content, "42 lines");
    }

    #[test]
    fn tool_result_failure_is_error_kind() {
        let line = format!(
            r#"{{"type":"user","message":{{"content":[{}]}}}}"#,
            r#"{"type":"tool_result","content":"no such file","is_error":true}"#
        );
        let records = parse_line(&line);
        assert_eq!(records[0].kind, RecordKind::Error);
        assert_eq!(records[0].outcome, Some(false));
    }

    #[test]
    fn tool_result_block_list_uses_first_text_block() {
        let line = format!(
            r#"{{"type":"user","message":{{"content":[{}]}}}}"#,
            r#"{"type":"tool_result","content":[{"type":"text","text":"inner"}]}"#
        );
        assert_eq!(parse_line(&line)[0].content, "inner");
    }

    #[test]
    fn result_line_is_single_response() {
        let records = parse_line(r#"{"type":"result","result":"all done"}"#);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].kind, RecordKind::Response);
        assert_eq!(records[0].content, "all done");
    }

    #[test]
    fn result_line_with_error_flag() {
        let records = parse_line(r#"{"type":"result","result":"budget exceeded","is_error":true}"#);
        assert_eq!(records[0].kind, RecordKind::Error);
        assert_eq!(records[0].outcome, Some(false));
    }

    #[test]
    fn system_line_is_discarded() {
        assert!(parse_line(r#"{"type":"system","subtype":"init"}"#).is_empty());
    }

    #[test]
    fn timestamp_is_parsed_when_present() {
        let records = parse_line(
            r#"{"type":"result","result":"ok","timestamp":"2026-03-01T12:00:00Z"}"#,
        );
        let expected = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        assert_eq!(records[0].timestamp, Some(expected));
    }

    #[test]
    fn unparseable_timestamp_is_none() {
        let records = parse_line(r#"{"type":"result","result":"ok","timestamp":"yesterday"}"#);
        assert_eq!(records[0].timestamp, None);
    }

    // ── malformed input ──

    #[test]
    fn malformed_lines_yield_nothing() {
        assert!(parse_line("").is_empty());
        assert!(parse_line("   ").is_empty());
        assert!(parse_line("{not json").is_empty());
        assert!(parse_line("[1,2,3]").is_empty());
        assert!(parse_line(r#"{"type":"assistant"}"#).is_empty());
        assert!(parse_line(r#"{"no_type":true}"#).is_empty());
    }

    // ── chunks ──

    #[test]
    fn chunk_with_complete_lines_and_partial_tail() {
        let chunk = format!(
            "{}\n{}\n{}",
            r#"{"type":"result","result":"one"}"#,
            r#"{"type":"result","result":"two"}"#,
            r#"{"type":"result","resu"#
        );
        let (records, remainder) = parse_chunk(&chunk);
        assert_eq!(records.len(), 2);
        assert_eq!(remainder, r#"{"type":"result","resu"#);
    }

    #[test]
    fn chunk_final_line_without_newline_is_parsed() {
        let (records, remainder) = parse_chunk(r#"{"type":"result","result":"eof"}"#);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].content, "eof");
        assert!(remainder.is_empty());
    }

    #[test]
    fn chunk_trailing_system_line_is_consumed_not_carried() {
        let (records, remainder) = parse_chunk(r#"{"type":"system","subtype":"init"}"#);
        assert!(records.is_empty());
        assert!(remainder.is_empty(), "complete-but-discarded line must not linger");
    }

    #[test]
    fn chunk_split_at_arbitrary_boundary_matches_unsplit_parse() {
        let full = format!(
            "{}\n{}\n{}\n",
            assistant_line(r#"{"type":"tool_use","name":"Bash","input":{"command":"make"}}"#),
            r#"{"type":"result","result":"done"}"#,
            r#"{"type":"system","subtype":"x"}"#
        );
        let (expected, last) = parse_chunk(&full);
        assert!(last.is_empty());

        for split in 0..full.len() {
            if !full.is_char_boundary(split) {
                continue;
            }
            let (mut records, remainder) = parse_chunk(&full[..split]);
            let second = format!("{remainder}{}", &full[split..]);
            let (more, trailing) = parse_chunk(&second);
            records.extend(more);
            assert_eq!(records, expected, "split at byte {split}");
            assert!(trailing.is_empty(), "split at byte {split}");
        }
    }
}
