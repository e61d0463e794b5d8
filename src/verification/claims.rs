//! Typed claims and the evidence records produced by verifying them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A typed assertion made by a task result, subject to independent
/// verification. `domain` routes the claim to consensus peers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claim {
    #[serde(flatten)]
    pub kind: ClaimKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
}

impl Claim {
    pub fn new(kind: ClaimKind) -> Self {
        Self { kind, domain: None }
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn summary(&self) -> String {
        match &self.kind {
            ClaimKind::FileExists { path, .. } => format!("file exists: {}", path),
            ClaimKind::CodeMatch { path, .. } => format!("code match in {}", path),
            ClaimKind::Functional { feature, .. } => format!("functional: {}", feature),
            ClaimKind::Performance {
                metric,
                claimed_value,
            } => format!("performance: {} = {}", metric, claimed_value),
            ClaimKind::Security { scope } => format!("security: {}", scope),
        }
    }
}

/// Claim payload, dispatched by kind to its verification strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClaimKind {
    /// A file was created at `path`, at least `min_bytes` long.
    FileExists {
        path: String,
        #[serde(default)]
        min_bytes: u64,
    },
    /// The file at `path` contains `snippet`.
    CodeMatch { path: String, snippet: String },
    /// A behavioral feature works in every listed environment.
    Functional {
        feature: String,
        environments: Vec<String>,
    },
    /// A measured metric reached `claimed_value`.
    Performance { metric: String, claimed_value: f64 },
    /// A scope passed security scanning with no open findings.
    Security { scope: String },
}

/// Where a piece of evidence (or a discrepancy) came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceSource {
    /// Direct artifact inspection (file metadata).
    Artifact,
    /// File content inspection.
    Content,
    /// External functional probe.
    Probe,
    /// External security scan.
    Scan,
    /// A peer executor's opinion.
    Peer(String),
}

/// A recorded observation supporting (or corroborating) a claim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evidence {
    pub source: EvidenceSource,
    pub detail: String,
    /// True for soft peer agreement, false for hard observed facts.
    #[serde(default)]
    pub corroborating: bool,
}

impl Evidence {
    pub fn observed(source: EvidenceSource, detail: impl Into<String>) -> Self {
        Self {
            source,
            detail: detail.into(),
            corroborating: false,
        }
    }

    pub fn corroborating(source: EvidenceSource, detail: impl Into<String>) -> Self {
        Self {
            source,
            detail: detail.into(),
            corroborating: true,
        }
    }
}

/// A verification finding contradicting a claim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Discrepancy {
    pub source: EvidenceSource,
    pub detail: String,
}

impl Discrepancy {
    pub fn new(source: EvidenceSource, detail: impl Into<String>) -> Self {
        Self {
            source,
            detail: detail.into(),
        }
    }
}

impl std::fmt::Display for Discrepancy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.detail)
    }
}

/// Outcome of verifying one claim in one pass. History is retained for audit.
///
/// `verified` is derived in the constructor, so it can never disagree with
/// the discrepancy list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationRecord {
    pub task_id: String,
    pub claim: Claim,
    pub evidence: Vec<Evidence>,
    pub discrepancies: Vec<Discrepancy>,
    pub verified: bool,
    pub timestamp: DateTime<Utc>,
}

impl VerificationRecord {
    pub fn new(
        task_id: impl Into<String>,
        claim: Claim,
        evidence: Vec<Evidence>,
        discrepancies: Vec<Discrepancy>,
    ) -> Self {
        let verified = discrepancies.is_empty();
        Self {
            task_id: task_id.into(),
            claim,
            evidence,
            discrepancies,
            verified,
            timestamp: Utc::now(),
        }
    }
}

/// Per-task verification state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationState {
    Unverified,
    Checking,
    Verified,
    Discrepant,
    ReworkRequested,
    Rejected,
}

/// Instruction to re-attempt a task whose claims did not hold up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReworkOrder {
    pub task_id: String,
    pub discrepancies: Vec<Discrepancy>,
    pub required_actions: Vec<String>,
    pub deadline: DateTime<Utc>,
}

impl ReworkOrder {
    pub fn new(
        task_id: impl Into<String>,
        discrepancies: Vec<Discrepancy>,
        deadline: DateTime<Utc>,
    ) -> Self {
        let required_actions = discrepancies
            .iter()
            .map(|d| format!("resolve: {}", d.detail))
            .collect();
        Self {
            task_id: task_id.into(),
            discrepancies,
            required_actions,
            deadline,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verified_derived_from_discrepancies() {
        let claim = Claim::new(ClaimKind::FileExists {
            path: "out.txt".into(),
            min_bytes: 0,
        });

        let clean = VerificationRecord::new("t1", claim.clone(), vec![], vec![]);
        assert!(clean.verified);

        let dirty = VerificationRecord::new(
            "t1",
            claim,
            vec![],
            vec![Discrepancy::new(EvidenceSource::Artifact, "missing")],
        );
        assert!(!dirty.verified);
        assert!(!dirty.discrepancies.is_empty());
    }

    #[test]
    fn test_claim_serde_tagging() {
        let claim = Claim::new(ClaimKind::Performance {
            metric: "p95_ms".into(),
            claimed_value: 120.0,
        })
        .with_domain("backend");

        let json = serde_json::to_value(&claim).unwrap();
        assert_eq!(json["type"], "performance");
        assert_eq!(json["domain"], "backend");

        let back: Claim = serde_json::from_value(json).unwrap();
        assert!(matches!(back.kind, ClaimKind::Performance { .. }));
    }

    #[test]
    fn test_rework_order_actions_from_discrepancies() {
        let order = ReworkOrder::new(
            "t1",
            vec![Discrepancy::new(
                EvidenceSource::Artifact,
                "file out.txt not found",
            )],
            Utc::now(),
        );
        assert_eq!(order.required_actions.len(), 1);
        assert!(order.required_actions[0].contains("out.txt"));
    }
}
