//! Work item descriptor consumed by the assignment planner.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{ForemanError, Result};

/// Opaque handle to the external document a work item was parsed from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceRef(pub String);

impl SourceRef {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SourceRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One unit of requested orchestration work. Read-only after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: String,
    pub metadata: WorkItemMetadata,
    pub source_ref: SourceRef,
}

impl WorkItem {
    pub fn new(id: impl Into<String>, metadata: WorkItemMetadata, source_ref: SourceRef) -> Self {
        Self {
            id: id.into(),
            metadata,
            source_ref,
        }
    }
}

/// Classification attributes the planner matches rules against.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkItemMetadata {
    /// Work category, e.g. "feature", "bugfix", "security-review".
    pub category: String,
    /// Normalized complexity score in [0, 1].
    pub complexity: f64,
    /// Estimated magnitude (e.g. number of touched surfaces).
    pub magnitude: u32,
    #[serde(default)]
    pub domains: Vec<String>,
    /// Opaque attributes carried through but not interpreted by the core.
    #[serde(default)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl WorkItemMetadata {
    pub fn new(category: impl Into<String>, complexity: f64, magnitude: u32) -> Self {
        Self {
            category: category.into(),
            complexity,
            magnitude,
            domains: Vec::new(),
            extra: HashMap::new(),
        }
    }

    pub fn with_domains(mut self, domains: Vec<String>) -> Self {
        self.domains = domains;
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Validate the classification fields the planner requires.
    pub fn validate(&self) -> Result<()> {
        if self.category.trim().is_empty() {
            return Err(ForemanError::Assignment(
                "work item metadata is missing a category".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.complexity) {
            return Err(ForemanError::Assignment(format!(
                "complexity {} is outside [0, 1]",
                self.complexity
            )));
        }
        Ok(())
    }

    pub fn has_domain(&self, domain: &str) -> bool {
        self.domains.iter().any(|d| d.eq_ignore_ascii_case(domain))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_validation() {
        let ok = WorkItemMetadata::new("feature", 0.4, 3);
        assert!(ok.validate().is_ok());

        let no_category = WorkItemMetadata::new("  ", 0.4, 3);
        assert!(no_category.validate().is_err());

        let bad_complexity = WorkItemMetadata::new("feature", 1.4, 3);
        assert!(bad_complexity.validate().is_err());
    }

    #[test]
    fn test_domain_lookup_is_case_insensitive() {
        let metadata = WorkItemMetadata::new("feature", 0.5, 1)
            .with_domains(vec!["Frontend".to_string(), "security".to_string()]);

        assert!(metadata.has_domain("frontend"));
        assert!(metadata.has_domain("SECURITY"));
        assert!(!metadata.has_domain("backend"));
    }
}
