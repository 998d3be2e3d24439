//! Error types for the financial QA orchestrator

use thiserror::Error;

/// Result type alias for orchestrator operations
pub type Result<T> = std::result::Result<T, OrchestrationError>;

#[derive(Error, Debug)]
pub enum OrchestrationError {

    // =============================
    // Pipeline Errors
    // =============================

    /// Completion-service output could not be decoded at all.
    /// Carries a bounded preview of the raw text for diagnostics.
    #[error("Malformed payload: {preview}")]
    MalformedPayload { preview: String },

    /// Decodable output missing the required {status, message, data} shape.
    #[error("Schema violation: {0}")]
    SchemaViolation(String),

    /// Plan status=error, or plan names a responder without a sub-query.
    #[error("Invalid plan: {0}")]
    PlanInvalid(String),

    /// The query formulator produced no usable search query.
    #[error("No query generated: {0}")]
    NoQueryGenerated(String),

    /// A data collaborator reported a failure.
    #[error("Execution error: {0}")]
    ExecutionError(String),

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Unknown error: {0}")]
    Unknown(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl OrchestrationError {
    /// Build a `MalformedPayload` from raw completion output, keeping only a
    /// bounded preview so unbounded payloads never reach the logs.
    pub fn malformed(raw: &str) -> Self {
        const PREVIEW_LIMIT: usize = 200;
        let preview = if raw.len() > PREVIEW_LIMIT {
            let cut = raw
                .char_indices()
                .map(|(i, _)| i)
                .take_while(|i| *i <= PREVIEW_LIMIT)
                .last()
                .unwrap_or(0);
            format!("{}…", &raw[..cut])
        } else {
            raw.to_string()
        };
        OrchestrationError::MalformedPayload { preview }
    }
}
