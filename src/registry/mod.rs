//! Executor registry: a static registration table resolved at start-up.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::boundary::Executor;
use crate::error::{ForemanError, Result};

/// Static role metadata for one executor. Immutable after registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorDescriptor {
    pub id: String,
    pub role: String,
    #[serde(default)]
    pub expertise: Vec<String>,
    #[serde(default)]
    pub collaborators: Vec<String>,
    #[serde(default)]
    pub critical: bool,
}

impl ExecutorDescriptor {
    pub fn new(id: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: role.into(),
            expertise: Vec::new(),
            collaborators: Vec::new(),
            critical: false,
        }
    }

    pub fn with_expertise(mut self, expertise: Vec<String>) -> Self {
        self.expertise = expertise;
        self
    }

    pub fn with_collaborators(mut self, collaborators: Vec<String>) -> Self {
        self.collaborators = collaborators;
        self
    }

    pub fn critical(mut self) -> Self {
        self.critical = true;
        self
    }

    pub fn covers_domain(&self, domain: &str) -> bool {
        self.role.eq_ignore_ascii_case(domain)
            || self
                .expertise
                .iter()
                .any(|e| e.eq_ignore_ascii_case(domain))
    }
}

/// In-memory table of executor implementations keyed by descriptor id.
///
/// Built once at process start; `discover()` is idempotent and has no side
/// effects beyond the immutable list it returns.
pub struct ExecutorRegistry {
    executors: HashMap<String, Arc<dyn Executor>>,
    /// Registration order, kept for deterministic discovery output.
    order: Vec<String>,
    required_critical: Vec<String>,
}

impl ExecutorRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Enumerate registered executors, enforcing the critical roster.
    ///
    /// Fails with a discovery error naming the first missing critical
    /// executor; otherwise returns descriptors in registration order.
    pub fn discover(&self) -> Result<Vec<ExecutorDescriptor>> {
        for id in &self.required_critical {
            if !self.executors.contains_key(id) {
                return Err(ForemanError::Discovery(format!(
                    "critical executor missing: {}",
                    id
                )));
            }
        }

        let descriptors: Vec<ExecutorDescriptor> = self
            .order
            .iter()
            .filter_map(|id| self.executors.get(id))
            .map(|e| e.descriptor().clone())
            .collect();

        debug!(count = descriptors.len(), "Discovered executors");
        Ok(descriptors)
    }

    /// Ids that must be part of every assignment.
    pub fn critical_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.required_critical.clone();
        for id in &self.order {
            if let Some(executor) = self.executors.get(id) {
                if executor.descriptor().critical && !ids.contains(id) {
                    ids.push(id.clone());
                }
            }
        }
        ids
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn Executor>> {
        self.executors.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.executors.contains_key(id)
    }

    pub fn ids(&self) -> Vec<String> {
        self.order.clone()
    }

    pub fn len(&self) -> usize {
        self.executors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }

    /// Executors whose descriptor covers `domain`, excluding `except`.
    pub fn peers_for_domain(&self, domain: &str, except: &str) -> Vec<Arc<dyn Executor>> {
        self.order
            .iter()
            .filter(|id| id.as_str() != except)
            .filter_map(|id| self.executors.get(id))
            .filter(|e| e.descriptor().covers_domain(domain))
            .cloned()
            .collect()
    }
}

/// Builder collecting executor implementations and the critical roster.
#[derive(Default)]
pub struct RegistryBuilder {
    executors: Vec<Arc<dyn Executor>>,
    required_critical: Vec<String>,
}

impl RegistryBuilder {
    pub fn register(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executors.push(executor);
        self
    }

    pub fn register_all(mut self, executors: Vec<Arc<dyn Executor>>) -> Self {
        self.executors.extend(executors);
        self
    }

    /// Declare an executor id that must be present for discovery to succeed.
    pub fn require_critical(mut self, id: impl Into<String>) -> Self {
        self.required_critical.push(id.into());
        self
    }

    pub fn build(self) -> Result<ExecutorRegistry> {
        let mut executors = HashMap::new();
        let mut order = Vec::new();

        for executor in self.executors {
            let descriptor = executor.descriptor();
            if descriptor.id.trim().is_empty() {
                return Err(ForemanError::Discovery(
                    "executor descriptor has an empty id".into(),
                ));
            }
            if descriptor.role.trim().is_empty() {
                return Err(ForemanError::Discovery(format!(
                    "executor {} has an empty role",
                    descriptor.id
                )));
            }
            let id = descriptor.id.clone();
            if executors.contains_key(&id) {
                warn!(id = %id, "Duplicate executor registration ignored");
                continue;
            }
            executors.insert(id.clone(), executor);
            order.push(id);
        }

        Ok(ExecutorRegistry {
            executors,
            order,
            required_critical: self.required_critical,
        })
    }
}
