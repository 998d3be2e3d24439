//! Responder sub-flows
//!
//! Each sub-flow translates one responder's sub-query into a collaborator
//! call and normalizes the result. Sub-flows never raise past their public
//! entry point; every fault comes back as data the coordinator can aggregate.

pub mod document;
pub mod structured;

pub use document::DocumentFlow;
pub use structured::StructuredDataFlow;
