//! Classification rules mapping work-item metadata to executor subsets.

use serde::{Deserialize, Serialize};

use crate::workitem::WorkItemMetadata;

/// Predicate over work-item classification attributes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "match", rename_all = "snake_case")]
pub enum RuleMatcher {
    /// Matches every work item.
    Always,
    /// Category equality, case-insensitive.
    Category { category: String },
    /// Complexity score at or above the threshold.
    ComplexityAtLeast { threshold: f64 },
    /// Magnitude at or above the threshold.
    MagnitudeAtLeast { threshold: u32 },
    /// Work item tagged with the domain.
    Domain { domain: String },
}

impl RuleMatcher {
    pub fn matches(&self, metadata: &WorkItemMetadata) -> bool {
        match self {
            Self::Always => true,
            Self::Category { category } => metadata.category.eq_ignore_ascii_case(category),
            Self::ComplexityAtLeast { threshold } => metadata.complexity >= *threshold,
            Self::MagnitudeAtLeast { threshold } => metadata.magnitude >= *threshold,
            Self::Domain { domain } => metadata.has_domain(domain),
        }
    }
}

/// One ordered rule: when the matcher fires, the listed executors join the
/// assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentRule {
    pub name: String,
    pub matcher: RuleMatcher,
    pub executor_ids: Vec<String>,
}

impl AssignmentRule {
    pub fn new(
        name: impl Into<String>,
        matcher: RuleMatcher,
        executor_ids: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            matcher,
            executor_ids,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matchers() {
        let metadata = WorkItemMetadata::new("Feature", 0.7, 12)
            .with_domains(vec!["backend".to_string()]);

        assert!(RuleMatcher::Always.matches(&metadata));
        assert!(RuleMatcher::Category {
            category: "feature".into()
        }
        .matches(&metadata));
        assert!(RuleMatcher::ComplexityAtLeast { threshold: 0.5 }.matches(&metadata));
        assert!(!RuleMatcher::ComplexityAtLeast { threshold: 0.9 }.matches(&metadata));
        assert!(RuleMatcher::MagnitudeAtLeast { threshold: 10 }.matches(&metadata));
        assert!(RuleMatcher::Domain {
            domain: "backend".into()
        }
        .matches(&metadata));
        assert!(!RuleMatcher::Domain {
            domain: "frontend".into()
        }
        .matches(&metadata));
    }
}
