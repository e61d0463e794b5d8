//! Shared test doubles: scripted executors, probes, scanners, and sources.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use foreman::{
    Claim, EnvironmentResult, Executor, ExecutorDescriptor, ForemanError, FunctionalProbe,
    PeerOpinion, ProbeReport, Result, SecurityFinding, SecurityScanner, SourceRef, Task,
    TaskResult, TaskSpec, WorkItem, WorkItemSource,
};

/// Opt-in log output for debugging test runs: `RUST_LOG=debug cargo test`.
pub fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Executor scripted through task-id prefixes:
/// - `fail-*` errors out,
/// - `hang-*` sleeps for an hour,
/// - `sleep-*` takes one second,
/// - anything else completes after 10ms.
///
/// Completed tasks attach whatever claims were registered for their id.
pub struct MockExecutor {
    descriptor: ExecutorDescriptor,
    plan: Vec<TaskSpec>,
    artifacts: HashMap<String, Vec<Claim>>,
    opinion: PeerOpinion,
    execution_log: Option<Arc<Mutex<Vec<String>>>>,
}

impl MockExecutor {
    pub fn new(id: &str, role: &str) -> Self {
        Self {
            descriptor: ExecutorDescriptor::new(id, role),
            plan: Vec::new(),
            artifacts: HashMap::new(),
            opinion: PeerOpinion::agree("no objection"),
            execution_log: None,
        }
    }

    pub fn critical(mut self) -> Self {
        self.descriptor = self.descriptor.critical();
        self
    }

    pub fn with_expertise(mut self, expertise: Vec<String>) -> Self {
        self.descriptor = self.descriptor.with_expertise(expertise);
        self
    }

    pub fn with_plan(mut self, plan: Vec<TaskSpec>) -> Self {
        self.plan = plan;
        self
    }

    pub fn with_artifacts(mut self, task_id: &str, claims: Vec<Claim>) -> Self {
        self.artifacts.insert(task_id.to_string(), claims);
        self
    }

    pub fn with_opinion(mut self, opinion: PeerOpinion) -> Self {
        self.opinion = opinion;
        self
    }

    pub fn with_execution_log(mut self, log: Arc<Mutex<Vec<String>>>) -> Self {
        self.execution_log = Some(log);
        self
    }
}

#[async_trait]
impl Executor for MockExecutor {
    fn descriptor(&self) -> &ExecutorDescriptor {
        &self.descriptor
    }

    async fn plan_tasks(&self, _item: &WorkItem) -> Result<Vec<TaskSpec>> {
        Ok(self.plan.clone())
    }

    async fn execute(&self, task: &Task, _cancel: &CancellationToken) -> Result<TaskResult> {
        if let Some(log) = &self.execution_log {
            log.lock().unwrap().push(task.id.clone());
        }

        if task.id.starts_with("fail-") {
            return Err(ForemanError::Boundary("scripted failure".into()));
        }
        if task.id.starts_with("hang-") {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        } else if task.id.starts_with("sleep-") {
            tokio::time::sleep(Duration::from_secs(1)).await;
        } else {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let claims = self.artifacts.get(&task.id).cloned().unwrap_or_default();
        Ok(TaskResult::completed(&task.id, "done").with_artifacts(claims))
    }

    async fn review_claim(&self, _claim: &Claim) -> Result<PeerOpinion> {
        Ok(self.opinion.clone())
    }
}

/// Probe scripted per environment. Aggregate (final comprehensive) probes
/// are recognized by their feature prefix and can fail independently.
pub struct ScriptedProbe {
    fail_envs: HashSet<String>,
    aggregate_fail_envs: HashSet<String>,
    measured_value: Option<f64>,
}

impl ScriptedProbe {
    pub fn passing() -> Self {
        Self {
            fail_envs: HashSet::new(),
            aggregate_fail_envs: HashSet::new(),
            measured_value: None,
        }
    }

    pub fn failing_in(envs: &[&str]) -> Self {
        Self {
            fail_envs: envs.iter().map(|e| e.to_string()).collect(),
            aggregate_fail_envs: HashSet::new(),
            measured_value: None,
        }
    }

    pub fn aggregate_failing_in(envs: &[&str]) -> Self {
        Self {
            fail_envs: HashSet::new(),
            aggregate_fail_envs: envs.iter().map(|e| e.to_string()).collect(),
            measured_value: None,
        }
    }

    pub fn with_measured_value(mut self, value: f64) -> Self {
        self.measured_value = Some(value);
        self
    }
}

#[async_trait]
impl FunctionalProbe for ScriptedProbe {
    async fn probe(&self, claim: &Claim, environments: &[String]) -> Result<ProbeReport> {
        let is_aggregate = claim.summary().contains("aggregate result");
        let fail_set = if is_aggregate {
            &self.aggregate_fail_envs
        } else {
            &self.fail_envs
        };

        let environments = environments
            .iter()
            .map(|env| {
                if fail_set.contains(env) {
                    EnvironmentResult::fail(env, "scripted probe failure")
                } else {
                    EnvironmentResult::pass(env)
                }
            })
            .collect();

        Ok(ProbeReport {
            environments,
            measured_value: self.measured_value,
            diagnostics: Vec::new(),
        })
    }
}

/// Scanner returning a fixed set of findings.
pub struct ScriptedScanner {
    findings: Vec<SecurityFinding>,
}

impl ScriptedScanner {
    pub fn clean() -> Self {
        Self { findings: vec![] }
    }

    pub fn with_findings(findings: Vec<SecurityFinding>) -> Self {
        Self { findings }
    }
}

#[async_trait]
impl SecurityScanner for ScriptedScanner {
    async fn scan(&self, _claim: &Claim) -> Result<Vec<SecurityFinding>> {
        Ok(self.findings.clone())
    }
}

/// In-memory work-item store.
#[derive(Default)]
pub struct MemorySource {
    items: HashMap<String, WorkItem>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_item(mut self, item: WorkItem) -> Self {
        self.items.insert(item.source_ref.as_str().to_string(), item);
        self
    }
}

#[async_trait]
impl WorkItemSource for MemorySource {
    async fn read_work_item(&self, source_ref: &SourceRef) -> Result<WorkItem> {
        self.items
            .get(source_ref.as_str())
            .cloned()
            .ok_or_else(|| ForemanError::Boundary(format!("no work item at {}", source_ref)))
    }
}
