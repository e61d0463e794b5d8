//! Independent re-checking of claimed results against evidence sources.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::claims::{
    Claim, ClaimKind, Discrepancy, Evidence, EvidenceSource, ReworkOrder, VerificationRecord,
    VerificationState,
};
use crate::boundary::{FunctionalProbe, ProbeReport, SecurityScanner};
use crate::config::VerificationConfig;
use crate::error::Result;
use crate::registry::ExecutorRegistry;
use crate::task::{Task, TaskResult};
use crate::workitem::WorkItem;

/// Outcome of one verification pass over a task's claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskVerification {
    pub task_id: String,
    pub records: Vec<VerificationRecord>,
    pub state: VerificationState,
}

impl TaskVerification {
    pub fn verified(&self) -> bool {
        self.state == VerificationState::Verified
    }

    pub fn discrepancies(&self) -> Vec<Discrepancy> {
        self.records
            .iter()
            .flat_map(|r| r.discrepancies.iter().cloned())
            .collect()
    }
}

/// Re-checks every claim a task result makes. Hard evidence (artifacts,
/// probes, scans) always wins; peer opinions can only add discrepancies or
/// corroborate, never downgrade one.
pub struct VerificationAuthority {
    registry: Arc<ExecutorRegistry>,
    probe: Arc<dyn FunctionalProbe>,
    scanner: Arc<dyn SecurityScanner>,
    config: VerificationConfig,
    working_dir: PathBuf,
}

impl VerificationAuthority {
    pub fn new(
        registry: Arc<ExecutorRegistry>,
        probe: Arc<dyn FunctionalProbe>,
        scanner: Arc<dyn SecurityScanner>,
        config: VerificationConfig,
        working_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            registry,
            probe,
            scanner,
            config,
            working_dir: working_dir.into(),
        }
    }

    /// Run one verification pass over every claim in `result`.
    pub async fn verify_task(&self, task: &Task, result: &TaskResult) -> Result<TaskVerification> {
        debug!(task_id = %task.id, claims = result.artifacts.len(), "Checking claims");

        let mut records = Vec::new();
        for claim in &result.artifacts {
            let (mut evidence, mut discrepancies) = self.check_claim(claim).await;

            if self.config.consensus_enabled {
                if let Some(domain) = &claim.domain {
                    let (peer_evidence, peer_discrepancies) = self
                        .solicit_consensus(domain, &task.owner_executor_id, claim)
                        .await;
                    evidence.extend(peer_evidence);
                    discrepancies.extend(peer_discrepancies);
                }
            }

            records.push(VerificationRecord::new(
                &task.id,
                claim.clone(),
                evidence,
                discrepancies,
            ));
        }

        let state = if records.iter().all(|r| r.verified) {
            VerificationState::Verified
        } else {
            VerificationState::Discrepant
        };

        info!(
            task_id = %task.id,
            state = ?state,
            records = records.len(),
            "Verification pass complete"
        );

        Ok(TaskVerification {
            task_id: task.id.clone(),
            records,
            state,
        })
    }

    /// Dispatch a claim to its evidence check.
    async fn check_claim(&self, claim: &Claim) -> (Vec<Evidence>, Vec<Discrepancy>) {
        match &claim.kind {
            ClaimKind::FileExists { path, min_bytes } => {
                self.check_file_exists(path, *min_bytes).await
            }
            ClaimKind::CodeMatch { path, snippet } => self.check_code_match(path, snippet).await,
            ClaimKind::Functional { environments, .. } => {
                self.check_functional(claim, environments).await
            }
            ClaimKind::Performance { claimed_value, .. } => {
                self.check_performance(claim, *claimed_value).await
            }
            ClaimKind::Security { .. } => self.check_security(claim).await,
        }
    }

    async fn check_file_exists(
        &self,
        path: &str,
        min_bytes: u64,
    ) -> (Vec<Evidence>, Vec<Discrepancy>) {
        let full = self.resolve(path);
        match tokio::fs::metadata(&full).await {
            Ok(meta) if meta.is_file() && meta.len() >= min_bytes => (
                vec![Evidence::observed(
                    EvidenceSource::Artifact,
                    format!("{} exists ({} bytes)", path, meta.len()),
                )],
                vec![],
            ),
            Ok(meta) if meta.is_file() => (
                vec![],
                vec![Discrepancy::new(
                    EvidenceSource::Artifact,
                    format!(
                        "{} is {} bytes, below the claimed minimum of {}",
                        path,
                        meta.len(),
                        min_bytes
                    ),
                )],
            ),
            Ok(_) => (
                vec![],
                vec![Discrepancy::new(
                    EvidenceSource::Artifact,
                    format!("{} exists but is not a regular file", path),
                )],
            ),
            Err(_) => (
                vec![],
                vec![Discrepancy::new(
                    EvidenceSource::Artifact,
                    format!("claimed file {} not found", path),
                )],
            ),
        }
    }

    async fn check_code_match(
        &self,
        path: &str,
        snippet: &str,
    ) -> (Vec<Evidence>, Vec<Discrepancy>) {
        let full = self.resolve(path);
        match tokio::fs::read_to_string(&full).await {
            Ok(content) if content.contains(snippet) => (
                vec![Evidence::observed(
                    EvidenceSource::Content,
                    format!("{} contains the claimed snippet", path),
                )],
                vec![],
            ),
            Ok(_) => (
                vec![],
                vec![Discrepancy::new(
                    EvidenceSource::Content,
                    format!("{} does not contain the claimed snippet", path),
                )],
            ),
            Err(e) => (
                vec![],
                vec![Discrepancy::new(
                    EvidenceSource::Content,
                    format!("cannot read {}: {}", path, e),
                )],
            ),
        }
    }

    /// The probe is the strongest and final arbiter for behavioral claims:
    /// any failing environment, or any error from the probe itself, is a
    /// discrepancy regardless of what the executor reported.
    async fn check_functional(
        &self,
        claim: &Claim,
        environments: &[String],
    ) -> (Vec<Evidence>, Vec<Discrepancy>) {
        let environments = self.effective_environments(environments);
        match self.probe.probe(claim, &environments).await {
            Ok(report) => {
                let mut evidence = Vec::new();
                let mut discrepancies = Vec::new();
                for env in &report.environments {
                    if env.passed {
                        evidence.push(Evidence::observed(
                            EvidenceSource::Probe,
                            format!("passed in {}", env.environment),
                        ));
                    } else {
                        discrepancies.push(Discrepancy::new(
                            EvidenceSource::Probe,
                            format!(
                                "failed in {}: {}",
                                env.environment,
                                env.detail.as_deref().unwrap_or("no detail")
                            ),
                        ));
                    }
                }
                if report.environments.is_empty() {
                    discrepancies.push(Discrepancy::new(
                        EvidenceSource::Probe,
                        "probe returned no environment results".to_string(),
                    ));
                }
                (evidence, discrepancies)
            }
            Err(e) => (
                vec![],
                vec![Discrepancy::new(
                    EvidenceSource::Probe,
                    format!("probe error: {}", e),
                )],
            ),
        }
    }

    async fn check_performance(
        &self,
        claim: &Claim,
        claimed_value: f64,
    ) -> (Vec<Evidence>, Vec<Discrepancy>) {
        let environments = self.effective_environments(&[]);
        match self.probe.probe(claim, &environments).await {
            Ok(report) => match report.measured_value {
                Some(measured) => {
                    if within_tolerance(claimed_value, measured, self.config.performance_tolerance)
                    {
                        (
                            vec![Evidence::observed(
                                EvidenceSource::Probe,
                                format!(
                                    "measured {} within {}% of claimed {}",
                                    measured,
                                    self.config.performance_tolerance * 100.0,
                                    claimed_value
                                ),
                            )],
                            vec![],
                        )
                    } else {
                        (
                            vec![],
                            vec![Discrepancy::new(
                                EvidenceSource::Probe,
                                format!(
                                    "measured {} deviates more than {}% from claimed {}",
                                    measured,
                                    self.config.performance_tolerance * 100.0,
                                    claimed_value
                                ),
                            )],
                        )
                    }
                }
                None => (
                    vec![],
                    vec![Discrepancy::new(
                        EvidenceSource::Probe,
                        "probe produced no measurement for a performance claim".to_string(),
                    )],
                ),
            },
            Err(e) => (
                vec![],
                vec![Discrepancy::new(
                    EvidenceSource::Probe,
                    format!("probe error: {}", e),
                )],
            ),
        }
    }

    async fn check_security(&self, claim: &Claim) -> (Vec<Evidence>, Vec<Discrepancy>) {
        match self.scanner.scan(claim).await {
            Ok(findings) => {
                let open: Vec<_> = findings.iter().filter(|f| f.open).collect();
                if open.is_empty() {
                    (
                        vec![Evidence::observed(
                            EvidenceSource::Scan,
                            format!("scan clean ({} resolved findings)", findings.len()),
                        )],
                        vec![],
                    )
                } else {
                    (
                        vec![],
                        open.iter()
                            .map(|f| {
                                Discrepancy::new(
                                    EvidenceSource::Scan,
                                    format!("open {:?} finding: {}", f.severity, f.description),
                                )
                            })
                            .collect(),
                    )
                }
            }
            Err(e) => (
                vec![],
                vec![Discrepancy::new(
                    EvidenceSource::Scan,
                    format!("scan error: {}", e),
                )],
            ),
        }
    }

    /// Second opinions from executors covering the claim's domain.
    /// Agreement corroborates; disagreement adds a discrepancy; a peer that
    /// errors is logged and ignored rather than trusted either way.
    async fn solicit_consensus(
        &self,
        domain: &str,
        owner: &str,
        claim: &Claim,
    ) -> (Vec<Evidence>, Vec<Discrepancy>) {
        let peers = self.registry.peers_for_domain(domain, owner);
        if peers.is_empty() {
            return (vec![], vec![]);
        }

        let opinions = join_all(peers.iter().map(|peer| async {
            let id = peer.descriptor().id.clone();
            (id, peer.review_claim(claim).await)
        }))
        .await;

        let mut evidence = Vec::new();
        let mut discrepancies = Vec::new();
        for (peer_id, opinion) in opinions {
            match opinion {
                Ok(opinion) if opinion.agree => {
                    evidence.push(Evidence::corroborating(
                        EvidenceSource::Peer(peer_id),
                        opinion.evidence,
                    ));
                }
                Ok(opinion) => {
                    discrepancies.push(Discrepancy::new(
                        EvidenceSource::Peer(peer_id),
                        format!("peer conflict: {}", opinion.evidence),
                    ));
                }
                Err(e) => {
                    warn!(peer = %peer_id, error = %e, "Peer review failed");
                }
            }
        }
        (evidence, discrepancies)
    }

    /// Issue the bounded-retry instruction for a discrepant task.
    pub fn rework_order(&self, task_id: &str, discrepancies: Vec<Discrepancy>) -> ReworkOrder {
        let deadline =
            Utc::now() + ChronoDuration::seconds(self.config.rework_deadline_secs as i64);
        ReworkOrder::new(task_id, discrepancies, deadline)
    }

    /// One comprehensive probe over the aggregate result; approval requires
    /// every required environment to pass.
    pub async fn final_probe(&self, item: &WorkItem) -> Result<ProbeReport> {
        let claim = Claim::new(ClaimKind::Functional {
            feature: format!("aggregate result for work item {}", item.id),
            environments: self.config.required_environments.clone(),
        });
        self.probe
            .probe(&claim, &self.config.required_environments)
            .await
    }

    fn effective_environments(&self, claimed: &[String]) -> Vec<String> {
        if claimed.is_empty() {
            self.config.required_environments.clone()
        } else {
            claimed.to_vec()
        }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let candidate = Path::new(path);
        if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.working_dir.join(candidate)
        }
    }
}

fn within_tolerance(claimed: f64, measured: f64, tolerance: f64) -> bool {
    if claimed == 0.0 {
        return measured == 0.0;
    }
    ((measured - claimed) / claimed).abs() <= tolerance
}
