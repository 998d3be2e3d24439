//! Structured-data sub-flow
//!
//! Turns a sub-query into SQL via the translation collaborator, executes it
//! against the relational collaborator, and returns both a chat-safe summary
//! and the raw rows. Every failure becomes an explanatory string; nothing
//! escapes as an error.

use crate::collaborators::RelationalExecutor;
use crate::llm::CompletionService;
use crate::models::{Status, StructuredOutcome};
use crate::normalizer;
use crate::ratelimit::FixedIntervalLimiter;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct StructuredDataFlow {
    translator: Arc<dyn CompletionService>,
    executor: Arc<dyn RelationalExecutor>,
    limiter: Arc<FixedIntervalLimiter>,
}

impl StructuredDataFlow {
    pub fn new(
        translator: Arc<dyn CompletionService>,
        executor: Arc<dyn RelationalExecutor>,
        limiter: Arc<FixedIntervalLimiter>,
    ) -> Self {
        Self {
            translator,
            executor,
            limiter,
        }
    }

    /// Run the sub-flow. `required_fields` are advisory: their absence is
    /// logged for the visualization layer but never fails the flow.
    pub async fn run(&self, sub_query: &str, required_fields: &[String]) -> StructuredOutcome {
        self.limiter.acquire().await;

        let raw = match self.translator.complete(&translation_prompt(sub_query)).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "SQL translation call failed");
                return no_sql_outcome(sub_query);
            }
        };

        let sql = match extract_sql(&raw) {
            Some(sql) => sql,
            None => {
                warn!("Translator produced no usable SQL");
                return no_sql_outcome(sub_query);
            }
        };

        let sanitized = sanitize_sql(&sql);
        debug!(sql = %sanitized, "Executing translated query");

        let rows = match self.executor.execute(&sanitized).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(error = %e, "Query execution failed");
                return StructuredOutcome {
                    response_for_chat: format!(
                        "The database query for \"{}\" failed to execute.",
                        sub_query
                    ),
                    actual_result: vec![],
                };
            }
        };

        if rows.is_empty() {
            // Distinct from the error strings above so synthesis can tell
            // "no data" from "failure".
            return StructuredOutcome {
                response_for_chat: format!("No data found for this query: {}", sub_query),
                actual_result: vec![],
            };
        }

        check_required_fields(&rows, required_fields);

        let snapshot =
            serde_json::to_string(&rows).unwrap_or_else(|_| "[unserializable rows]".to_string());

        StructuredOutcome {
            response_for_chat: format!(
                "Database results for \"{}\": {}",
                sub_query, snapshot
            ),
            actual_result: rows,
        }
    }
}

fn translation_prompt(sub_query: &str) -> String {
    format!(
        r#"You are a SQL translation engine for a financial database with two tables:
- prices(company, date, open_price, close_price, high, low, volume)
- fundamentals(company, period, revenue, net_income, eps, total_assets)

Translate the question below into a single SELECT statement.

QUESTION:
{}

Rules:
- Reference only the two tables above
- Return ONLY valid JSON, no explanation text
- JSON format:

{{
  "status": "success",
  "message": "<one-line description>",
  "data": {{ "sql": "<the SELECT statement>" }}
}}

If the question cannot be answered from these tables, return status "error"
with an explanatory message and data {{}}.
"#,
        sub_query
    )
}

fn no_sql_outcome(sub_query: &str) -> StructuredOutcome {
    StructuredOutcome {
        response_for_chat: format!(
            "Could not translate \"{}\" into a database query.",
            sub_query
        ),
        actual_result: vec![],
    }
}

/// Pull the SQL text out of a normalized translator envelope.
fn extract_sql(raw: &str) -> Option<String> {
    let normalized = normalizer::normalize(raw).ok()?;
    if normalized.status == Status::Error {
        return None;
    }

    normalized
        .data
        .get("sql")
        .or_else(|| normalized.data.get("query"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Strip formatting noise the reasoning service tends to emit around SQL and
/// leave exactly one trailing statement terminator. This is cleanup, not a
/// security boundary; the execution collaborator rejects out-of-scope tables
/// on its own.
fn sanitize_sql(sql: &str) -> String {
    let cleaned = normalizer::strip_code_fence(sql)
        .trim()
        .trim_end_matches(';')
        .trim_end()
        .to_string();
    format!("{};", cleaned)
}

fn check_required_fields(rows: &[Value], required_fields: &[String]) {
    let Some(first) = rows.first().and_then(Value::as_object) else {
        return;
    };
    for field in required_fields {
        if !first.contains_key(field) {
            warn!(field = %field, "Required column missing from result rows (advisory)");
        }
    }
}
