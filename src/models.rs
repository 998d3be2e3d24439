//! Core data models for the QA orchestration pipeline

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

//
// ================= Enums =================
//

/// Outcome status carried by every envelope in the pipeline.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
}

/// The closed set of delegated capabilities a plan may name.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Responder {
    StructuredData,
    Document,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    #[default]
    None,
    Count,
    Sum,
    Avg,
}

//
// ================= Plan =================
//

/// Chart/table description attached to a plan when the user asked for one.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct VisualizationSpec {
    #[serde(default)]
    pub chart_kind: String,
    #[serde(default)]
    pub required_fields: Vec<String>,
    #[serde(default)]
    pub aggregation: Aggregation,
    #[serde(default)]
    pub ui_hints: HashMap<String, Value>,
}

/// Delegation decision produced by the planning collaborator.
///
/// Invariant: `status == Error` implies `agents` is empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryPlan {
    pub status: Status,
    pub message: String,
    #[serde(default)]
    pub agents: Vec<Responder>,
    #[serde(default)]
    pub sub_queries: HashMap<Responder, String>,
    #[serde(default)]
    pub dashboard_requested: bool,
    #[serde(default)]
    pub visualization: Option<VisualizationSpec>,
}

impl QueryPlan {
    /// Contract checks beyond what serde enforces: an error plan must not
    /// name responders, and every named responder needs a sub-query.
    pub fn validate(&self) -> crate::Result<()> {
        if self.status == Status::Error {
            if !self.agents.is_empty() {
                return Err(crate::error::OrchestrationError::PlanInvalid(
                    "error plan must not name responders".to_string(),
                ));
            }
            return Ok(());
        }

        for agent in &self.agents {
            if !self.sub_queries.contains_key(agent) {
                return Err(crate::error::OrchestrationError::PlanInvalid(format!(
                    "plan names {} without a sub-query",
                    agent
                )));
            }
        }

        Ok(())
    }
}

//
// ================= Responder Results =================
//

/// Output of the structured-data sub-flow. Immutable once produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredOutcome {
    /// Chat-safe text embedding the sub-query and a row snapshot, or an
    /// explanatory "no data" / error string. Never empty.
    pub response_for_chat: String,
    /// The unmodified row sequence. Empty on error or no data.
    pub actual_result: Vec<Value>,
}

/// Output of the document sub-flow. Immutable once produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentOutcome {
    pub status: Status,
    pub message: String,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub documents: Vec<String>,
    #[serde(default)]
    pub metadata: Vec<Value>,
    #[serde(default)]
    pub summary: String,
    /// The search query actually sent to the collaborator, for auditing.
    #[serde(default)]
    pub rag_query: String,
}

impl DocumentOutcome {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            message: message.into(),
            sources: vec![],
            documents: vec![],
            metadata: vec![],
            summary: String::new(),
            rag_query: String::new(),
        }
    }
}

//
// ================= Dashboard =================
//

/// Rows + visualization metadata eligible for UI rendering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardEnvelope {
    /// True only when the plan requested a dashboard AND at least one
    /// structured row exists.
    pub enabled: bool,
    /// Full row set for final display (display-capped only against
    /// pathological sizes).
    pub data: Vec<Value>,
    /// Size-limited copy used when rows are re-submitted to synthesis.
    pub capped_data: Vec<Value>,
    pub visualization: Option<VisualizationSpec>,
}

//
// ================= Final Response =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalData {
    pub result: Value,
    pub dashboard: Option<DashboardEnvelope>,
}

/// The envelope returned to the transport layer for one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalResponse {
    pub status: Status,
    pub message: String,
    pub data: FinalData,
    /// Diagnostic lines collected over the request's lifetime.
    pub logs: Vec<String>,
}

impl FinalResponse {
    pub fn error(message: impl Into<String>, logs: Vec<String>) -> Self {
        Self {
            status: Status::Error,
            message: message.into(),
            data: FinalData {
                result: Value::Null,
                dashboard: None,
            },
            logs,
        }
    }
}

impl fmt::Display for Responder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Responder::StructuredData => "structured_data",
            Responder::Document => "document",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Success => "success",
            Status::Error => "error",
        };
        write!(f, "{}", s)
    }
}
