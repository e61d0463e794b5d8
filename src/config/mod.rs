//! Configuration for orchestration and verification.

mod settings;

pub use settings::{ForemanConfig, OrchestrateOptions, OrchestratorConfig, VerificationConfig};
