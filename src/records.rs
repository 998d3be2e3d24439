//! Tolerant record-array scanner
//!
//! Completion services routinely wrap a JSON-ish array of records in prose,
//! leave a trailing comma, or fence the whole thing in markdown. This module
//! locates the first `[...]` span in a text and splits it into top-level
//! record slices without a full JSON decode, so callers can truncate or
//! rebuild the array while leaving surrounding prose untouched.

/// The first bracketed array found in a text, split into top-level records.
#[derive(Debug, Clone, PartialEq)]
pub struct BracketedArray<'a> {
    /// Byte offset of the opening `[`.
    pub start: usize,
    /// Byte offset one past the closing `]`.
    pub end: usize,
    /// Raw record slices, trimmed, in order. Trailing commas yield no
    /// phantom record.
    pub records: Vec<&'a str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordScanError {
    /// No `[` occurs in the text.
    NoArrayFound,
    /// An array opens but never balances before the text ends.
    Unterminated,
}

impl std::fmt::Display for RecordScanError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordScanError::NoArrayFound => write!(f, "no bracketed array found"),
            RecordScanError::Unterminated => write!(f, "bracketed array never closes"),
        }
    }
}

/// Scan `text` for its first top-level `[...]` array and split it into
/// records. Brace/bracket depth is tracked through string literals and
/// escapes, so commas inside values never split a record.
pub fn find_record_array(text: &str) -> Result<BracketedArray<'_>, RecordScanError> {
    let start = text.find('[').ok_or(RecordScanError::NoArrayFound)?;

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    let mut records = Vec::new();
    let mut record_start = start + 1;

    for (offset, ch) in text[start..].char_indices() {
        let i = start + offset;

        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '[' | '{' => depth += 1,
            ']' | '}' => {
                depth -= 1;
                if depth == 0 {
                    push_record(text, record_start, i, &mut records);
                    return Ok(BracketedArray {
                        start,
                        end: i + 1,
                        records,
                    });
                }
            }
            ',' if depth == 1 => {
                push_record(text, record_start, i, &mut records);
                record_start = i + 1;
            }
            _ => {}
        }
    }

    Err(RecordScanError::Unterminated)
}

/// Push the slice between two delimiters as a record, dropping whitespace-only
/// slices so a trailing comma does not produce a phantom entry.
fn push_record<'a>(text: &'a str, from: usize, to: usize, records: &mut Vec<&'a str>) {
    let slice = text[from..to].trim();
    if !slice.is_empty() {
        records.push(slice);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_array() {
        let arr = find_record_array(r#"[{"a": 1}, {"a": 2}]"#).unwrap();
        assert_eq!(arr.records, vec![r#"{"a": 1}"#, r#"{"a": 2}"#]);
        assert_eq!(arr.start, 0);
    }

    #[test]
    fn test_array_embedded_in_prose() {
        let text = r#"Here are the rows: [{"close": 198.53}, {"close": 199.10}] as requested."#;
        let arr = find_record_array(text).unwrap();
        assert_eq!(arr.records.len(), 2);
        assert_eq!(&text[arr.start..arr.end], r#"[{"close": 198.53}, {"close": 199.10}]"#);
    }

    #[test]
    fn test_trailing_comma_tolerated() {
        let arr = find_record_array(r#"[{"a": 1}, {"a": 2},]"#).unwrap();
        assert_eq!(arr.records.len(), 2);
    }

    #[test]
    fn test_commas_inside_strings_do_not_split() {
        let arr = find_record_array(r#"[{"name": "Apple, Inc."}, {"name": "Ford"}]"#).unwrap();
        assert_eq!(arr.records.len(), 2);
        assert_eq!(arr.records[0], r#"{"name": "Apple, Inc."}"#);
    }

    #[test]
    fn test_escaped_quote_inside_string() {
        let arr = find_record_array(r#"[{"q": "said \"hi\", twice"}]"#).unwrap();
        assert_eq!(arr.records.len(), 1);
    }

    #[test]
    fn test_nested_arrays_stay_in_one_record() {
        let arr = find_record_array(r#"[{"vals": [1, 2, 3]}, {"vals": []}]"#).unwrap();
        assert_eq!(arr.records.len(), 2);
    }

    #[test]
    fn test_no_array() {
        assert_eq!(
            find_record_array("just prose here").unwrap_err(),
            RecordScanError::NoArrayFound
        );
    }

    #[test]
    fn test_unterminated_array() {
        assert_eq!(
            find_record_array(r#"[{"a": 1}, {"a": 2}"#).unwrap_err(),
            RecordScanError::Unterminated
        );
    }

    #[test]
    fn test_empty_array() {
        let arr = find_record_array("[]").unwrap();
        assert!(arr.records.is_empty());
    }
}
