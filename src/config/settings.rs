use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::error::{ForemanError, Result};

const CONFIG_FILE: &str = "foreman.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ForemanConfig {
    pub orchestrator: OrchestratorConfig,
    pub verification: VerificationConfig,
}

impl ForemanConfig {
    pub async fn load(dir: &Path) -> Result<Self> {
        let config_path = dir.join(CONFIG_FILE);
        let config = if config_path.exists() {
            let content = fs::read_to_string(&config_path).await?;
            toml::from_str(&content)?
        } else {
            Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub async fn save(&self, dir: &Path) -> Result<()> {
        self.validate()?;
        let content =
            toml::to_string_pretty(self).map_err(|e| ForemanError::Config(e.to_string()))?;
        fs::write(dir.join(CONFIG_FILE), content).await?;
        Ok(())
    }

    /// Validate configuration values, collecting every violation.
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        if self.orchestrator.concurrency_limit == 0 {
            errors.push("concurrency_limit must be greater than 0");
        }
        if self.orchestrator.task_timeout_secs == 0 {
            errors.push("task_timeout_secs must be greater than 0");
        }

        if !(0.0..1.0).contains(&self.verification.performance_tolerance) {
            errors.push("performance_tolerance must be in [0, 1)");
        }
        if self.verification.required_environments.is_empty() {
            errors.push("required_environments must not be empty");
        }
        if self.verification.rework_deadline_secs == 0 {
            errors.push("rework_deadline_secs must be greater than 0");
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ForemanError::Config(errors.join("; ")))
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Upper bound on concurrently running tasks within a stage.
    pub concurrency_limit: usize,
    /// Per-task timeout applied to every boundary invocation.
    pub task_timeout_secs: u64,
    /// Re-attempts granted after a verification discrepancy.
    pub max_rework_cycles: u32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: 4,
            task_timeout_secs: 300,
            max_rework_cycles: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationConfig {
    /// Allowed relative deviation for performance claims.
    pub performance_tolerance: f64,
    /// Environments the functional probe must pass in.
    pub required_environments: Vec<String>,
    /// Whether domain-tagged claims solicit peer opinions.
    pub consensus_enabled: bool,
    /// How long a rework order stays actionable.
    pub rework_deadline_secs: u64,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            performance_tolerance: 0.10,
            required_environments: vec![
                "development".to_string(),
                "staging".to_string(),
                "production".to_string(),
            ],
            consensus_enabled: true,
            rework_deadline_secs: 3600,
        }
    }
}

/// Per-call knobs for `orchestrate`, seeded from config and overridable.
#[derive(Debug, Clone)]
pub struct OrchestrateOptions {
    pub concurrency_limit: usize,
    pub per_task_timeout: Duration,
    pub max_rework_cycles: u32,
}

impl OrchestrateOptions {
    pub fn from_config(config: &ForemanConfig) -> Self {
        Self {
            concurrency_limit: config.orchestrator.concurrency_limit,
            per_task_timeout: Duration::from_secs(config.orchestrator.task_timeout_secs),
            max_rework_cycles: config.orchestrator.max_rework_cycles,
        }
    }

    pub fn with_concurrency_limit(mut self, limit: usize) -> Self {
        self.concurrency_limit = limit;
        self
    }

    pub fn with_per_task_timeout(mut self, timeout: Duration) -> Self {
        self.per_task_timeout = timeout;
        self
    }

    pub fn with_max_rework_cycles(mut self, cycles: u32) -> Self {
        self.max_rework_cycles = cycles;
        self
    }
}

impl Default for OrchestrateOptions {
    fn default() -> Self {
        Self::from_config(&ForemanConfig::default())
    }
}
