//! Volume governor
//!
//! Reasoning-service calls have hard input-size limits, while the UI can
//! display far more. These pure helpers cap the volume of text and records
//! carried forward at each hop of the pipeline. Two independent ceilings
//! exist for two independent constraints: `REASONING_CAP` bounds payloads
//! re-injected into a completion call, `DISPLAY_CAP` only bounds pathological
//! row counts on the display path. They must not be conflated.

use crate::records::find_record_array;
use serde_json::Value;

/// Max records/lines carried into a reasoning call.
pub const REASONING_CAP: usize = 5;

/// Ceiling for the display path. Full data is preserved up to this bound.
pub const DISPLAY_CAP: usize = 1000;

/// Sentinel appended when line output was cut short.
const TRUNCATION_NOTE: &str = "... (output truncated)";

/// Marker appended inside a rewritten record array.
const ELLIPSIS_RECORD: &str = "...";

/// Keep the first `max` newline-delimited lines of `text`. If anything was
/// dropped, a fixed sentinel line is appended so downstream reasoning knows
/// the view is partial.
pub fn limit_lines(text: &str, max: usize) -> String {
    let mut lines = text.lines();
    let kept: Vec<&str> = lines.by_ref().take(max).collect();

    if lines.next().is_none() {
        return kept.join("\n");
    }

    let mut out = kept.join("\n");
    out.push('\n');
    out.push_str(TRUNCATION_NOTE);
    out
}

/// Shrink the first `[...]` record array embedded in `text` to `max` entries,
/// leaving the surrounding prose untouched. Used to cap database-query
/// summaries before they are fed back into a reasoning call. If no parseable
/// array is present, or it is already small enough, the text passes through
/// unchanged.
pub fn limit_bracketed_records(text: &str, max: usize) -> String {
    let Ok(array) = find_record_array(text) else {
        return text.to_string();
    };

    if array.records.len() <= max {
        return text.to_string();
    }

    let mut rewritten = String::with_capacity(text.len());
    rewritten.push_str(&text[..array.start]);
    rewritten.push('[');
    for (i, record) in array.records.iter().take(max).enumerate() {
        if i > 0 {
            rewritten.push_str(", ");
        }
        rewritten.push_str(record);
    }
    rewritten.push_str(", ");
    rewritten.push_str(ELLIPSIS_RECORD);
    rewritten.push(']');
    rewritten.push_str(&text[array.end..]);
    rewritten
}

/// Cap a structured record sequence. The display path keeps everything up to
/// `DISPLAY_CAP`; the reasoning path truncates to `max`. Non-array input
/// yields an empty sequence (the caller logs the contract violation).
pub fn limit_records(records: &Value, max: usize, for_display: bool) -> Vec<Value> {
    let Some(rows) = records.as_array() else {
        return Vec::new();
    };

    let cap = if for_display { DISPLAY_CAP } else { max };
    rows.iter().take(cap).cloned().collect()
}

/// Slice variant of [`limit_records`] for rows already owned as a vector.
pub fn limit_rows(rows: &[Value], max: usize, for_display: bool) -> Vec<Value> {
    let cap = if for_display { DISPLAY_CAP } else { max };
    rows.iter().take(cap).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_limit_lines_short_text_unchanged() {
        assert_eq!(limit_lines("a\nb", 5), "a\nb");
    }

    #[test]
    fn test_limit_lines_truncates_with_sentinel() {
        let out = limit_lines("1\n2\n3\n4\n5\n6\n7", 5);
        assert!(out.starts_with("1\n2\n3\n4\n5"));
        assert!(out.ends_with(TRUNCATION_NOTE));
        assert!(!out.contains('6'));
    }

    #[test]
    fn test_limit_lines_exact_boundary_has_no_sentinel() {
        let out = limit_lines("1\n2\n3\n4\n5", 5);
        assert!(!out.contains(TRUNCATION_NOTE));
    }

    #[test]
    fn test_limit_bracketed_rewrites_long_array() {
        let text = format!(
            "Query results: [{}] (7 rows)",
            (1..=7)
                .map(|i| format!(r#"{{"n": {}}}"#, i))
                .collect::<Vec<_>>()
                .join(", ")
        );
        let out = limit_bracketed_records(&text, 5);
        assert!(out.starts_with("Query results: ["));
        assert!(out.ends_with(", ...] (7 rows)"));
        assert!(out.contains(r#"{"n": 5}"#));
        assert!(!out.contains(r#"{"n": 6}"#));
    }

    #[test]
    fn test_limit_bracketed_small_array_untouched() {
        let text = r#"rows: [{"n": 1}, {"n": 2}]"#;
        assert_eq!(limit_bracketed_records(text, 5), text);
    }

    #[test]
    fn test_limit_bracketed_trailing_comma_tolerated() {
        let text = r#"rows: [{"n": 1}, {"n": 2}, {"n": 3},]"#;
        let out = limit_bracketed_records(text, 2);
        assert!(out.contains(r#"{"n": 2}, ...]"#));
    }

    #[test]
    fn test_limit_bracketed_no_array_passthrough() {
        assert_eq!(limit_bracketed_records("no rows at all", 5), "no rows at all");
    }

    #[test]
    fn test_limit_records_reasoning_cap() {
        let rows = json!([1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(limit_records(&rows, 5, false).len(), 5);
    }

    #[test]
    fn test_limit_records_display_keeps_all() {
        let rows = json!([1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(limit_records(&rows, 5, true).len(), 7);
    }

    #[test]
    fn test_limit_records_non_sequence_yields_empty() {
        assert!(limit_records(&json!("not an array"), 5, false).is_empty());
        assert!(limit_records(&Value::Null, 5, true).is_empty());
    }

    #[test]
    fn test_limit_records_idempotent() {
        let rows = json!([{"a": 1}, {"a": 2}, {"a": 3}, {"a": 4}, {"a": 5}, {"a": 6}]);
        let once = limit_records(&rows, 5, false);
        let twice = limit_records(&Value::Array(once.clone()), 5, false);
        assert_eq!(once, twice);
    }
}
