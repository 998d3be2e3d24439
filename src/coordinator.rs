//! Orchestration coordinator
//!
//! The top-level state machine for one request:
//! receive → plan → delegate to responders → aggregate → synthesize → respond.
//! Planning, delegation and synthesis each talk to external collaborators;
//! the coordinator validates everything they return and guarantees it never
//! raises to its caller.

use crate::companies::CompanyLookup;
use crate::error::OrchestrationError;
use crate::governor;
use crate::llm::CompletionService;
use crate::models::{
    DashboardEnvelope, DocumentOutcome, FinalData, FinalResponse, QueryPlan, Responder, Status,
    StructuredOutcome,
};
use crate::normalizer;
use crate::responders::{DocumentFlow, StructuredDataFlow};
use crate::stream::ProgressSink;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Fixed user-safe wording for any terminal failure. Internal detail stays
/// in the request log only.
pub const FALLBACK_MESSAGE: &str =
    "Sorry, I could not process that question. Please try rephrasing it.";

pub struct Coordinator {
    planner: Arc<dyn CompletionService>,
    synthesizer: Arc<dyn CompletionService>,
    structured: StructuredDataFlow,
    documents: DocumentFlow,
    companies: Arc<CompanyLookup>,
}

/// Per-request aggregate of the delegation phase.
struct Aggregate {
    structured: Option<StructuredOutcome>,
    structured_chat_capped: Option<String>,
    document: Option<DocumentOutcome>,
}

impl Coordinator {
    pub fn new(
        planner: Arc<dyn CompletionService>,
        synthesizer: Arc<dyn CompletionService>,
        structured: StructuredDataFlow,
        documents: DocumentFlow,
        companies: Arc<CompanyLookup>,
    ) -> Self {
        Self {
            planner,
            synthesizer,
            structured,
            documents,
            companies,
        }
    }

    /// Run the full pipeline for one query. Every fault is converted into a
    /// terminal error response; this method never fails.
    pub async fn run(&self, query: &str, progress: &ProgressSink) -> FinalResponse {
        let mut trace: Vec<String> = Vec::new();

        match self.run_inner(query, progress, &mut trace).await {
            Ok(response) => response,
            Err(e) => {
                error!(error = %e, "Pipeline failed");
                trace.push(format!("ERROR: {}", e));
                FinalResponse::error(FALLBACK_MESSAGE, trace)
            }
        }
    }

    async fn run_inner(
        &self,
        query: &str,
        progress: &ProgressSink,
        trace: &mut Vec<String>,
    ) -> crate::Result<FinalResponse> {
        let query = self.companies.normalize_query(query);
        info!(query = %query, "Coordinator: request received");
        trace.push("RECEIVED: query accepted".to_string());
        progress.note("Understanding your question");

        // === PLAN ===
        let plan = self.request_plan(&query).await?;
        trace.push(format!(
            "PLAN: {} responder(s), dashboard_requested={}",
            plan.agents.len(),
            plan.dashboard_requested
        ));
        progress.note("Deciding which data sources to consult");

        // === DELEGATE ===
        let aggregate = self.delegate(&plan, progress, trace).await?;

        // === AGGREGATE ===
        let dashboard = build_dashboard(&plan, &aggregate);
        if let Some(d) = &dashboard {
            trace.push(format!(
                "AGGREGATE: dashboard enabled={}, rows={}, capped={}",
                d.enabled,
                d.data.len(),
                d.capped_data.len()
            ));
        }

        // === SYNTHESIZE ===
        // Always invoked, even when a sub-flow reported failure; synthesis is
        // responsible for explaining partial results to the user.
        progress.note("Composing the answer");
        let prompt = synthesis_prompt(&query, &plan, &aggregate, dashboard.as_ref());
        let raw = self.synthesizer.complete(&prompt).await?;

        // Synthesis output is literal display text, never re-parsed as
        // structured data.
        let message = normalizer::strip_code_fence(&raw).to_string();
        trace.push("SYNTHESIZE: answer composed".to_string());

        let result = json!({
            "answer": message,
            "structured_data": aggregate.structured_chat_capped,
            "documents": aggregate.document,
        });

        trace.push("COMPLETE: response ready".to_string());
        Ok(FinalResponse {
            status: Status::Success,
            message,
            data: FinalData { result, dashboard },
            logs: std::mem::take(trace),
        })
    }

    /// Submit the query to the planning collaborator and validate the plan.
    /// Any malformed or error plan is terminal; there is no retry.
    async fn request_plan(&self, query: &str) -> crate::Result<QueryPlan> {
        let raw = self.planner.complete(&planning_prompt(query)).await?;

        let normalized = normalizer::normalize(&raw).map_err(|e| {
            warn!(error = %e, "Planner output rejected");
            OrchestrationError::PlanInvalid(e.to_string())
        })?;

        if normalized.status == Status::Error {
            return Err(OrchestrationError::PlanInvalid(normalized.message));
        }

        #[derive(Deserialize, Default)]
        struct PlanBody {
            #[serde(default)]
            agents: Vec<Responder>,
            #[serde(default)]
            sub_queries: std::collections::HashMap<Responder, String>,
            #[serde(default)]
            dashboard_requested: bool,
            #[serde(default)]
            visualization: Option<crate::models::VisualizationSpec>,
        }

        let body: PlanBody = serde_json::from_value(normalized.data)
            .map_err(|e| OrchestrationError::PlanInvalid(format!("bad plan body: {}", e)))?;

        let plan = QueryPlan {
            status: normalized.status,
            message: normalized.message,
            agents: body.agents,
            sub_queries: body.sub_queries,
            dashboard_requested: body.dashboard_requested,
            visualization: body.visualization,
        };

        plan.validate()?;
        debug!(agents = ?plan.agents, "Plan validated");
        Ok(plan)
    }

    /// Dispatch each named responder in plan order. Responders are
    /// independent within one request; order still matters for the trace
    /// and progress notes the user sees.
    async fn delegate(
        &self,
        plan: &QueryPlan,
        progress: &ProgressSink,
        trace: &mut Vec<String>,
    ) -> crate::Result<Aggregate> {
        let mut aggregate = Aggregate {
            structured: None,
            structured_chat_capped: None,
            document: None,
        };

        for agent in &plan.agents {
            let sub_query = plan.sub_queries.get(agent).ok_or_else(|| {
                // validate() checks this, but the plan is untrusted input.
                OrchestrationError::PlanInvalid(format!("no sub-query for {}", agent))
            })?;

            match agent {
                Responder::StructuredData => {
                    progress.note("Looking up the numbers");
                    let required_fields = plan
                        .visualization
                        .as_ref()
                        .map(|v| v.required_fields.clone())
                        .unwrap_or_default();

                    let outcome = self.structured.run(sub_query, &required_fields).await;
                    trace.push(format!(
                        "DELEGATE: structured_data returned {} row(s)",
                        outcome.actual_result.len()
                    ));

                    // Reasoning-call copy is capped independently of the
                    // display copy held in the outcome itself.
                    aggregate.structured_chat_capped = Some(governor::limit_bracketed_records(
                        &outcome.response_for_chat,
                        governor::REASONING_CAP,
                    ));
                    aggregate.structured = Some(outcome);
                }
                Responder::Document => {
                    progress.note("Searching the document collection");
                    let outcome = self.documents.run(sub_query).await;
                    trace.push(format!(
                        "DELEGATE: document search status={}, {} passage(s)",
                        outcome.status,
                        outcome.documents.len()
                    ));
                    aggregate.document = Some(outcome);
                }
            }
        }

        Ok(aggregate)
    }
}

/// Dashboard assembly. `enabled` requires both the plan's request and at
/// least one structured row. The display copy keeps the full row set (bounded
/// only against pathological sizes); the synthesis copy is capped far lower.
fn build_dashboard(plan: &QueryPlan, aggregate: &Aggregate) -> Option<DashboardEnvelope> {
    let structured = aggregate.structured.as_ref()?;

    let display_rows = governor::limit_rows(&structured.actual_result, governor::REASONING_CAP, true);
    let capped = governor::limit_rows(&display_rows, governor::REASONING_CAP, false);

    Some(DashboardEnvelope {
        enabled: plan.dashboard_requested && !structured.actual_result.is_empty(),
        data: display_rows,
        capped_data: capped,
        visualization: plan.visualization.clone(),
    })
}

fn planning_prompt(query: &str) -> String {
    format!(
        r#"You are a query classification engine for a financial QA system.

Decide which responders are needed for the question below:
- structured_data: numeric lookups from the price/fundamentals database
- document: retrieval from the filings and reports collection

QUESTION:
{}

Return ONLY valid JSON, no explanation text:

{{
  "status": "success",
  "message": "<one-line classification summary>",
  "data": {{
    "agents": ["structured_data", "document"],
    "sub_queries": {{
      "structured_data": "<sub-question for the database>",
      "document": "<sub-question for document retrieval>"
    }},
    "dashboard_requested": false,
    "visualization": {{
      "chart_kind": "bar",
      "required_fields": ["date", "close_price"],
      "aggregation": "none",
      "ui_hints": {{}}
    }}
  }}
}}

Include only the responders that are actually needed, with one sub-query
each. Set dashboard_requested true only when the user asked for a chart or
table; omit visualization otherwise. If the question is out of scope, return
status "error" with an explanatory message, data {{}} and no agents.
"#,
        query
    )
}

fn synthesis_prompt(
    query: &str,
    plan: &QueryPlan,
    aggregate: &Aggregate,
    dashboard: Option<&DashboardEnvelope>,
) -> String {
    let mut sections = String::new();

    if let Some(doc) = &aggregate.document {
        let serialized =
            serde_json::to_string(doc).unwrap_or_else(|_| "[unserializable]".to_string());
        sections.push_str("DOCUMENT SEARCH RESULTS:\n");
        sections.push_str(&serialized);
        sections.push_str("\n\n");
    }

    if let Some(summary) = &aggregate.structured_chat_capped {
        sections.push_str("DATABASE RESULTS (may be truncated):\n");
        sections.push_str(summary);
        sections.push_str("\n\n");
    }

    if let Some(d) = dashboard {
        if d.enabled {
            let rows = serde_json::to_string(&d.capped_data)
                .unwrap_or_else(|_| "[unserializable]".to_string());
            let chart_kind = plan
                .visualization
                .as_ref()
                .map(|v| v.chart_kind.as_str())
                .unwrap_or("table");
            sections.push_str(&format!(
                "DASHBOARD: a {} over {} row(s); sample rows: {}\n\n",
                chart_kind,
                d.data.len(),
                rows
            ));
        }
    }

    format!(
        r#"You are a financial analyst assistant. Answer the user's question
using only the material below. If a data source reported a failure, say so
plainly and answer from what remains.

QUESTION:
{}

{}
Write a concise, user-facing answer in plain prose. Do not return JSON.
"#,
        query, sections
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{DocumentSearch, RelationalExecutor, SearchEnvelope};
    use crate::llm::{CompletionService, FixedCompletion};
    use crate::ratelimit::FixedIntervalLimiter;
    use crate::stream::ProgressSink;
    use async_trait::async_trait;
    use serde_json::Value;

    /// Synthesizer fake that echoes its prompt, so assertions can check what
    /// material reached the synthesis call.
    struct EchoCompletion;

    #[async_trait]
    impl CompletionService for EchoCompletion {
        async fn complete(&self, prompt: &str) -> crate::Result<String> {
            Ok(prompt.to_string())
        }
    }

    struct FixedRows(Vec<Value>);

    #[async_trait]
    impl RelationalExecutor for FixedRows {
        async fn execute(&self, _sql: &str) -> crate::Result<Vec<Value>> {
            Ok(self.0.clone())
        }
    }

    struct FixedSearch(SearchEnvelope);

    #[async_trait]
    impl DocumentSearch for FixedSearch {
        async fn search(
            &self,
            _query: &str,
            _company: Option<&str>,
            _description: Option<&str>,
        ) -> crate::Result<SearchEnvelope> {
            Ok(self.0.clone())
        }
    }

    fn sql_translator() -> Arc<dyn CompletionService> {
        Arc::new(FixedCompletion(
            r#"{"status": "success", "message": "ok",
                "data": {"sql": "SELECT close_price, date FROM prices"}}"#
                .to_string(),
        ))
    }

    fn rag_formulator() -> Arc<dyn CompletionService> {
        Arc::new(FixedCompletion(
            r#"{"status": "success", "message": "ok",
                "data": {"rag_query": "Apple annual report"}}"#
                .to_string(),
        ))
    }

    fn search_ok() -> SearchEnvelope {
        serde_json::from_str(
            r#"{"status": "success", "message": "1 passage",
                "sources": ["apple_10k.pdf"], "documents": ["Revenue grew."],
                "metadata": [{}], "summary": "Revenue grew."}"#,
        )
        .unwrap()
    }

    fn coordinator(
        planner_payload: &str,
        rows: Vec<Value>,
        search: SearchEnvelope,
    ) -> Coordinator {
        let limiter = Arc::new(FixedIntervalLimiter::per_minute(60_000));
        Coordinator::new(
            Arc::new(FixedCompletion(planner_payload.to_string())),
            Arc::new(EchoCompletion),
            StructuredDataFlow::new(sql_translator(), Arc::new(FixedRows(rows)), limiter),
            DocumentFlow::new(rag_formulator(), Arc::new(FixedSearch(search))),
            Arc::new(crate::companies::CompanyLookup::from_names(["Apple"])),
        )
    }

    fn month_rows(n: usize) -> Vec<Value> {
        (1..=n)
            .map(|m| serde_json::json!({"month": m, "close_price": 100.0 + m as f64}))
            .collect()
    }

    #[tokio::test]
    async fn test_scenario_a_structured_only_no_dashboard() {
        let plan = r#"{"status": "success", "message": "db lookup",
            "data": {"agents": ["structured_data"],
                     "sub_queries": {"structured_data": "latest close price for Apple"}}}"#;
        let rows = vec![serde_json::json!({"close_price": 198.53, "date": "2025-05-09"})];
        let c = coordinator(plan, rows, search_ok());

        let response = c
            .run("latest close price for apple", &ProgressSink::discard())
            .await;

        assert_eq!(response.status, Status::Success);
        assert!(response.message.contains("198.53"));
        let dashboard = response.data.dashboard.unwrap();
        assert!(!dashboard.enabled);
        assert_eq!(dashboard.data.len(), 1);
    }

    #[tokio::test]
    async fn test_scenario_b_dashboard_caps_are_independent() {
        let plan = r#"{"status": "success", "message": "chart",
            "data": {"agents": ["structured_data"],
                     "sub_queries": {"structured_data": "monthly close prices"},
                     "dashboard_requested": true,
                     "visualization": {"chart_kind": "bar",
                                       "required_fields": ["month", "close_price"],
                                       "aggregation": "none", "ui_hints": {}}}}"#;
        let c = coordinator(plan, month_rows(12), search_ok());

        let response = c.run("chart monthly prices", &ProgressSink::discard()).await;

        let dashboard = response.data.dashboard.unwrap();
        assert!(dashboard.enabled);
        assert_eq!(dashboard.data.len(), 12);
        assert!(dashboard.capped_data.len() <= 5);
        // The synthesis prompt (echoed back) carries the truncated copy only.
        assert!(response.message.contains(r#""month":5"#));
        assert!(!response.message.contains(r#""month":12"#));
    }

    #[tokio::test]
    async fn test_scenario_c_malformed_plan_is_terminal_error() {
        let c = coordinator("certainly! here is some prose", vec![], search_ok());

        let response = c.run("anything", &ProgressSink::discard()).await;

        assert_eq!(response.status, Status::Error);
        assert_eq!(response.message, FALLBACK_MESSAGE);
        assert!(response.logs.iter().any(|l| l.starts_with("ERROR")));
        // No delegation happened.
        assert!(!response.logs.iter().any(|l| l.starts_with("DELEGATE")));
    }

    #[tokio::test]
    async fn test_scenario_d_document_failure_still_synthesizes() {
        let plan = r#"{"status": "success", "message": "docs",
            "data": {"agents": ["document"],
                     "sub_queries": {"document": "Acme risk factors"}}}"#;
        let not_found: SearchEnvelope =
            serde_json::from_str(r#"{"status": "error", "message": "company not found"}"#)
                .unwrap();
        let c = coordinator(plan, vec![], not_found);

        let response = c.run("risks for Acme", &ProgressSink::discard()).await;

        // Synthesis ran and saw the verbatim collaborator message.
        assert_eq!(response.status, Status::Success);
        assert!(response.message.contains("company not found"));
    }

    #[tokio::test]
    async fn test_empty_agents_plan_synthesizes_successfully() {
        let plan = r#"{"status": "success", "message": "small talk",
            "data": {"agents": [], "sub_queries": {}}}"#;
        let c = coordinator(plan, vec![], search_ok());

        let response = c.run("hello there", &ProgressSink::discard()).await;

        assert_eq!(response.status, Status::Success);
        assert!(response.data.dashboard.is_none());
        assert!(!response.logs.iter().any(|l| l.starts_with("DELEGATE")));
    }

    #[tokio::test]
    async fn test_dashboard_requested_with_zero_rows_is_disabled() {
        let plan = r#"{"status": "success", "message": "chart",
            "data": {"agents": ["structured_data"],
                     "sub_queries": {"structured_data": "prices for Nowhere Corp"},
                     "dashboard_requested": true}}"#;
        let c = coordinator(plan, vec![], search_ok());

        let response = c.run("chart prices", &ProgressSink::discard()).await;

        let dashboard = response.data.dashboard.unwrap();
        assert!(!dashboard.enabled);
        assert!(dashboard.data.is_empty());
    }

    #[tokio::test]
    async fn test_error_plan_uses_fixed_message() {
        let plan = r#"{"status": "error", "message": "cannot classify", "data": {}}"#;
        let c = coordinator(plan, vec![], search_ok());

        let response = c.run("anything", &ProgressSink::discard()).await;
        assert_eq!(response.status, Status::Error);
        assert_eq!(response.message, FALLBACK_MESSAGE);
    }
}
