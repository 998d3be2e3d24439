//! Response normalizer
//!
//! Completion services are treated as black boxes that return text. That text
//! is usually JSON, but often arrives fenced in markdown or buried in prose.
//! Every raw response goes through `normalize`, which either yields a
//! validated envelope or a typed failure. No path panics or raises past this
//! module.

use crate::error::OrchestrationError;
use crate::models::Status;
use crate::Result;
use serde_json::Value;

/// A completion response that decoded and passed the required-shape check:
/// `status` in {success, error}, non-empty `message`, `data` present.
#[derive(Debug, Clone)]
pub struct Normalized {
    pub status: Status,
    pub message: String,
    /// The envelope's `data` field, shape owned by the caller.
    pub data: Value,
}

/// Decode raw completion output into a validated envelope.
///
/// Fallback chain, each step only on failure of the previous:
/// 1. strip one surrounding markdown code fence
/// 2. direct JSON decode
/// 3. decode the first balanced `{...}` span found in the text
/// 4. `MalformedPayload` with a bounded preview
pub fn normalize(raw: &str) -> Result<Normalized> {
    let candidate = strip_code_fence(raw);

    let value: Value = match serde_json::from_str(candidate) {
        Ok(v) => v,
        Err(_) => match first_balanced_object(candidate) {
            Some(span) => {
                serde_json::from_str(span).map_err(|_| OrchestrationError::malformed(raw))?
            }
            None => return Err(OrchestrationError::malformed(raw)),
        },
    };

    check_shape(&value)
}

/// Strip a single leading/trailing triple-backtick fence, with an optional
/// language tag on the opening line. Anything else passes through untouched.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return trimmed;
    };

    // Drop the language tag ("json", "sql", ...) on the opening line.
    match body.find('\n') {
        Some(nl) if body[..nl].trim().chars().all(|c| c.is_ascii_alphanumeric()) => {
            body[nl + 1..].trim()
        }
        _ => body.trim(),
    }
}

/// Find the first top-level `{...}` span, brace-balanced and string-aware.
fn first_balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
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
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }

    None
}

/// Minimal required-shape contract for every completion envelope.
fn check_shape(value: &Value) -> Result<Normalized> {
    let obj = value
        .as_object()
        .ok_or_else(|| OrchestrationError::SchemaViolation("payload is not an object".into()))?;

    let status = match obj.get("status").and_then(Value::as_str) {
        Some("success") => Status::Success,
        Some("error") => Status::Error,
        Some(other) => {
            return Err(OrchestrationError::SchemaViolation(format!(
                "unknown status '{}'",
                other
            )))
        }
        None => {
            return Err(OrchestrationError::SchemaViolation(
                "missing 'status'".into(),
            ))
        }
    };

    let message = obj
        .get("message")
        .and_then(Value::as_str)
        .filter(|m| !m.trim().is_empty())
        .ok_or_else(|| {
            OrchestrationError::SchemaViolation("missing or empty 'message'".into())
        })?
        .to_string();

    let data = obj
        .get("data")
        .cloned()
        .ok_or_else(|| OrchestrationError::SchemaViolation("missing 'data'".into()))?;

    Ok(Normalized {
        status,
        message,
        data,
    })
}
