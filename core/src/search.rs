//! Search candidate provider facet.
//!
//! Some hosts query input processors for search integration. Keys are still
//! handled by the key sink, so this provider never offers candidates, and
//! result feedback is explicitly unsupported.

use crate::error::{Result, ServiceError};

#[derive(Debug, Clone)]
pub struct SearchCandidateProvider {
    display_name: String,
}

impl SearchCandidateProvider {
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
        }
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Candidates for a search query. Always empty.
    pub fn search_candidates(&self, query: &str, application_id: &str) -> Result<Vec<String>> {
        tracing::debug!(query, application_id, "search candidates requested");
        Ok(Vec::new())
    }

    pub fn set_result(&self, _query: &str, _application_id: &str, _result: &str) -> Result<()> {
        Err(ServiceError::NotImplemented("search result feedback"))
    }
}
