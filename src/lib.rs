//! Financial QA Orchestrator
//!
//! Answers natural-language financial questions by:
//! - Asking an external reasoning service for a delegation plan
//! - Fanning out to specialized responders (structured numeric lookups,
//!   unstructured document retrieval)
//! - Capping the data volume re-injected into reasoning calls
//! - Synthesizing one user-facing answer plus an optional dashboard
//! - Streaming incremental progress to the caller while the pipeline runs
//!
//! PIPELINE:
//! RECEIVE → PLAN → DELEGATE → AGGREGATE → SYNTHESIZE → RESPOND

pub mod api;
pub mod collaborators;
pub mod companies;
pub mod coordinator;
pub mod error;
pub mod governor;
pub mod llm;
pub mod models;
pub mod normalizer;
pub mod ratelimit;
pub mod records;
pub mod responders;
pub mod stream;

pub use error::Result;

// Re-export common types
pub use coordinator::Coordinator;
pub use models::*;
