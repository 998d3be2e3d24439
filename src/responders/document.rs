//! Document sub-flow
//!
//! Turns a sub-query into a retrieval query via the formulation
//! collaborator, runs it against the document-search collaborator with
//! company/description hints, and merges the result with the query actually
//! used so callers can audit what was searched. All faults are caught at the
//! boundary and returned as error outcomes.

use crate::collaborators::DocumentSearch;
use crate::error::OrchestrationError;
use crate::llm::CompletionService;
use crate::models::{DocumentOutcome, Status};
use crate::normalizer;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct DocumentFlow {
    formulator: Arc<dyn CompletionService>,
    search: Arc<dyn DocumentSearch>,
}

impl DocumentFlow {
    pub fn new(formulator: Arc<dyn CompletionService>, search: Arc<dyn DocumentSearch>) -> Self {
        Self { formulator, search }
    }

    /// Run the sub-flow. Never raises past this entry point.
    pub async fn run(&self, sub_query: &str) -> DocumentOutcome {
        match self.run_inner(sub_query).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "Document sub-flow failed");
                match e {
                    OrchestrationError::NoQueryGenerated(_) => DocumentOutcome::error(
                        "No search query could be generated for this question.",
                    ),
                    _ => DocumentOutcome::error("The document search could not be completed."),
                }
            }
        }
    }

    async fn run_inner(&self, sub_query: &str) -> crate::Result<DocumentOutcome> {
        let raw = self
            .formulator
            .complete(&formulation_prompt(sub_query))
            .await?;
        let normalized = normalizer::normalize(&raw)?;

        if normalized.status == Status::Error {
            return Err(OrchestrationError::NoQueryGenerated(normalized.message));
        }

        let rag_query = normalized
            .data
            .get("rag_query")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                OrchestrationError::NoQueryGenerated("formulator returned no rag_query".into())
            })?;

        let company = normalized
            .data
            .get("company")
            .and_then(Value::as_str)
            .filter(|c| !c.is_empty())
            .map(str::to_string);
        let description = normalized
            .data
            .get("description")
            .and_then(Value::as_str)
            .filter(|d| !d.is_empty())
            .map(str::to_string);

        debug!(rag_query = %rag_query, company = ?company, "Running document search");

        let envelope = self
            .search
            .search(&rag_query, company.as_deref(), description.as_deref())
            .await?;

        // An unsuccessful collaborator status passes through unchanged; the
        // coordinator decides how to present it.
        if envelope.status == Status::Error {
            return Ok(DocumentOutcome {
                status: Status::Error,
                message: envelope.message,
                sources: vec![],
                documents: vec![],
                metadata: vec![],
                summary: String::new(),
                rag_query,
            });
        }

        Ok(DocumentOutcome {
            status: Status::Success,
            message: envelope.message,
            sources: envelope.sources,
            documents: envelope.documents,
            metadata: envelope.metadata,
            summary: envelope.summary,
            rag_query,
        })
    }
}

fn formulation_prompt(sub_query: &str) -> String {
    format!(
        r#"You formulate retrieval queries over a collection of financial filings
and reports.

QUESTION:
{}

Return ONLY valid JSON, no explanation text:

{{
  "status": "success",
  "message": "<one-line description>",
  "data": {{
    "rag_query": "<the retrieval query>",
    "company": "<company name if the question is about one, else omit>",
    "description": "<short topic description, optional>"
  }}
}}
"#,
        sub_query
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{DocumentSearch, SearchEnvelope};
    use crate::llm::FixedCompletion;
    use async_trait::async_trait;

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

    fn formulator() -> Arc<dyn CompletionService> {
        Arc::new(FixedCompletion(
            r#"{"status": "success", "message": "ok",
                "data": {"rag_query": "Apple 10-K risk factors", "company": "Apple"}}"#
                .to_string(),
        ))
    }

    fn found() -> SearchEnvelope {
        serde_json::from_str(
            r#"{"status": "success", "message": "2 passages",
                "sources": ["apple_10k.pdf"],
                "documents": ["Risk factors include..."],
                "metadata": [{"page": 12}],
                "summary": "Supply chain and FX risks."}"#,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_success_merges_rag_query() {
        let flow = DocumentFlow::new(formulator(), Arc::new(FixedSearch(found())));
        let out = flow.run("What risks does Apple disclose?").await;

        assert_eq!(out.status, Status::Success);
        assert_eq!(out.rag_query, "Apple 10-K risk factors");
        assert_eq!(out.sources, vec!["apple_10k.pdf"]);
        assert_eq!(out.summary, "Supply chain and FX risks.");
    }

    #[tokio::test]
    async fn test_collaborator_error_passes_through_verbatim() {
        let envelope: SearchEnvelope =
            serde_json::from_str(r#"{"status": "error", "message": "company not found"}"#)
                .unwrap();
        let flow = DocumentFlow::new(formulator(), Arc::new(FixedSearch(envelope)));
        let out = flow.run("anything").await;

        assert_eq!(out.status, Status::Error);
        assert_eq!(out.message, "company not found");
        assert_eq!(out.rag_query, "Apple 10-K risk factors");
    }

    #[tokio::test]
    async fn test_missing_rag_query_is_no_query_generated() {
        let flow = DocumentFlow::new(
            Arc::new(FixedCompletion(
                r#"{"status": "success", "message": "ok", "data": {}}"#.to_string(),
            )),
            Arc::new(FixedSearch(found())),
        );
        let out = flow.run("anything").await;

        assert_eq!(out.status, Status::Error);
        assert!(out.message.contains("No search query"));
    }

    #[tokio::test]
    async fn test_malformed_formulation_never_raises() {
        let flow = DocumentFlow::new(
            Arc::new(FixedCompletion("not json at all".to_string())),
            Arc::new(FixedSearch(found())),
        );
        let out = flow.run("anything").await;
        assert_eq!(out.status, Status::Error);
    }
}
