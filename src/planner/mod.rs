//! Assignment planner: deterministic rule matching over work-item metadata.

mod rules;

pub use rules::{AssignmentRule, RuleMatcher};

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{ForemanError, Result};
use crate::registry::ExecutorRegistry;
use crate::workitem::WorkItem;

/// Planned executor subset for a work item, with preview metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub work_item_id: String,
    /// Sorted, deduplicated executor ids.
    pub executor_ids: Vec<String>,
    /// The critical subset, always contained in `executor_ids`.
    pub critical_ids: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    /// Deterministic effort estimate derived from complexity and headcount.
    pub estimated_duration_secs: u64,
}

impl Assignment {
    pub fn includes(&self, executor_id: &str) -> bool {
        self.executor_ids.iter().any(|id| id == executor_id)
    }
}

/// Applies an ordered rule set against work-item metadata.
///
/// Same metadata always yields the same assignment: rules are evaluated in
/// order, results are set-unioned and sorted, and the critical roster is
/// unioned in regardless of rule outcome.
pub struct AssignmentPlanner {
    rules: Vec<AssignmentRule>,
}

impl AssignmentPlanner {
    pub fn new(rules: Vec<AssignmentRule>) -> Self {
        Self { rules }
    }

    pub fn assign(&self, item: &WorkItem, registry: &ExecutorRegistry) -> Result<Assignment> {
        item.metadata.validate()?;

        let mut warnings = Vec::new();
        let mut selected: BTreeSet<String> = BTreeSet::new();

        for rule in &self.rules {
            if !rule.matcher.matches(&item.metadata) {
                continue;
            }
            debug!(rule = %rule.name, work_item = %item.id, "Rule matched");
            for id in &rule.executor_ids {
                if registry.contains(id) {
                    selected.insert(id.clone());
                } else {
                    warn!(rule = %rule.name, executor = %id, "Rule references unknown executor");
                    warnings.push(format!(
                        "rule '{}' references unknown executor '{}'",
                        rule.name, id
                    ));
                }
            }
        }

        let critical_ids = registry.critical_ids();
        if critical_ids.is_empty() {
            return Err(ForemanError::Assignment(
                "registry has no critical executors; assignments must contain a non-empty critical subset"
                    .into(),
            ));
        }
        selected.extend(critical_ids.iter().cloned());

        let executor_ids: Vec<String> = selected.into_iter().collect();
        let mut critical_sorted = critical_ids;
        critical_sorted.sort();

        let estimated_duration_secs = estimate_duration(
            item.metadata.complexity,
            item.metadata.magnitude,
            executor_ids.len(),
        );

        debug!(
            work_item = %item.id,
            executors = executor_ids.len(),
            critical = critical_sorted.len(),
            "Assignment planned"
        );

        Ok(Assignment {
            work_item_id: item.id.clone(),
            executor_ids,
            critical_ids: critical_sorted,
            warnings,
            estimated_duration_secs,
        })
    }
}

/// Per-executor base cost plus a complexity- and magnitude-scaled share.
fn estimate_duration(complexity: f64, magnitude: u32, executors: usize) -> u64 {
    let per_executor = 60.0 + complexity * 540.0 + f64::from(magnitude) * 15.0;
    (per_executor * executors as f64) as u64
}
