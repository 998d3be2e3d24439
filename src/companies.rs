//! Company-name lookup
//!
//! Built once at process start from the document-collection root directory
//! (one subdirectory or file stem per company) and read-only afterwards.
//! Shared as an explicitly passed `Arc`, never as ambient global state.
//! Incoming queries are normalized against it before planning so the
//! planner sees canonical company names.

use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

pub struct CompanyLookup {
    /// lowercase alias -> canonical display name
    canonical_by_alias: HashMap<String, String>,
}

impl CompanyLookup {
    /// Scan the docs root and register every subdirectory or file stem as a
    /// company. A missing root yields an empty lookup rather than a startup
    /// failure; queries then pass through unnormalized.
    pub fn from_docs_root(root: &Path) -> Self {
        let mut canonical_by_alias = HashMap::new();

        let entries = match std::fs::read_dir(root) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(root = %root.display(), error = %e, "Docs root not readable; company lookup is empty");
                return Self { canonical_by_alias };
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            let name = if path.is_dir() {
                path.file_name().and_then(|n| n.to_str()).map(str::to_string)
            } else {
                path.file_stem().and_then(|n| n.to_str()).map(str::to_string)
            };

            if let Some(name) = name {
                if name.starts_with('.') {
                    continue;
                }
                canonical_by_alias.insert(name.to_lowercase(), name);
            }
        }

        info!(companies = canonical_by_alias.len(), "Company lookup built");
        Self { canonical_by_alias }
    }

    /// Build from an explicit name list. Used by tests and embedders.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let canonical_by_alias = names
            .into_iter()
            .map(Into::into)
            .map(|n| (n.to_lowercase(), n))
            .collect();
        Self { canonical_by_alias }
    }

    pub fn empty() -> Self {
        Self {
            canonical_by_alias: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.canonical_by_alias.len()
    }

    pub fn is_empty(&self) -> bool {
        self.canonical_by_alias.is_empty()
    }

    pub fn canonical(&self, name: &str) -> Option<&str> {
        self.canonical_by_alias
            .get(&name.to_lowercase())
            .map(String::as_str)
    }

    /// Rewrite known company mentions in `query` to their canonical casing.
    /// Unknown text is left untouched.
    pub fn normalize_query(&self, query: &str) -> String {
        let mut out = query.to_string();

        for (alias, canonical) in &self.canonical_by_alias {
            let lowered = out.to_lowercase();
            // Offsets in the lowered copy only line up when lowercasing was
            // length-preserving; skip the rewrite otherwise.
            if lowered.len() != out.len() {
                continue;
            }
            if let Some(at) = lowered.find(alias.as_str()) {
                if out.is_char_boundary(at) && out.is_char_boundary(at + alias.len()) {
                    out.replace_range(at..at + alias.len(), canonical);
                }
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_lookup_is_case_insensitive() {
        let lookup = CompanyLookup::from_names(["Apple", "Microsoft"]);
        assert_eq!(lookup.canonical("apple"), Some("Apple"));
        assert_eq!(lookup.canonical("MICROSOFT"), Some("Microsoft"));
        assert_eq!(lookup.canonical("Tesla"), None);
    }

    #[test]
    fn test_normalize_query_rewrites_casing() {
        let lookup = CompanyLookup::from_names(["Apple"]);
        let out = lookup.normalize_query("latest close price for apple");
        assert_eq!(out, "latest close price for Apple");
    }

    #[test]
    fn test_normalize_query_leaves_unknown_text() {
        let lookup = CompanyLookup::from_names(["Apple"]);
        let query = "latest close price for Tesla";
        assert_eq!(lookup.normalize_query(query), query);
    }

    #[test]
    fn test_missing_root_yields_empty_lookup() {
        let lookup = CompanyLookup::from_docs_root(Path::new("/definitely/not/here"));
        assert!(lookup.is_empty());
    }
}
