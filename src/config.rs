//! Aggregate engine configuration.
//!
//! Every section has serde defaults, so a TOML file only needs the keys it
//! overrides:
//!
//! ```toml
//! [solver]
//! time_limit_secs = 30.0
//!
//! [environment]
//! step_minutes = 10
//!
//! [orchestrator]
//! agent = "sac"
//! checkpoint_dir = "models"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::agents::{AgentKind, PpoConfig, SacConfig};
use crate::env::EnvConfig;
use crate::error::Result;
use crate::models::SchedulingConfig;

/// Orchestrator behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Initialize the environment and agent after a successful Tier-1 solve.
    pub enable_tier2: bool,
    pub agent: AgentKind,
    /// Upper bound on recommendations per disruption.
    pub max_recommendations: usize,
    /// Agents kept loaded at once.
    pub registry_capacity: usize,
    /// Checkpoints live under `<checkpoint_dir>/<agent>/`.
    pub checkpoint_dir: Option<PathBuf>,
    /// Seed for the environment and freshly created agents.
    pub seed: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            enable_tier2: true,
            agent: AgentKind::Ppo,
            max_recommendations: 5,
            registry_capacity: 2,
            checkpoint_dir: None,
            seed: 42,
        }
    }
}

/// Configuration for every tier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HybridConfig {
    pub solver: SchedulingConfig,
    pub environment: EnvConfig,
    pub ppo: PpoConfig,
    pub sac: SacConfig,
    pub orchestrator: OrchestratorConfig,
}

impl HybridConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn with_solver(mut self, solver: SchedulingConfig) -> Self {
        self.solver = solver;
        self
    }

    pub fn with_environment(mut self, environment: EnvConfig) -> Self {
        self.environment = environment;
        self
    }

    pub fn with_agent(mut self, agent: AgentKind) -> Self {
        self.orchestrator.agent = agent;
        self
    }

    pub fn with_tier2(mut self, enable: bool) -> Self {
        self.orchestrator.enable_tier2 = enable;
        self
    }

    pub fn with_checkpoint_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.orchestrator.checkpoint_dir = Some(dir.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SchedulingError;
    use crate::models::SolverStrategy;
    use crate::reward::RewardStrategy;

    #[test]
    fn test_empty_document_is_default() {
        let config = HybridConfig::from_toml_str("").unwrap();
        assert_eq!(config, HybridConfig::default());
        assert_eq!(config.orchestrator.max_recommendations, 5);
        assert_eq!(config.environment.step_minutes, 15);
    }

    #[test]
    fn test_partial_override() {
        let text = r#"
            [solver]
            time_limit_secs = 5.0
            strategy = "fixed_search"

            [environment]
            step_minutes = 10

            [environment.reward]
            strategy = "dense"

            [sac]
            tau = 0.01

            [orchestrator]
            agent = "sac"
            checkpoint_dir = "models"
        "#;
        let config = HybridConfig::from_toml_str(text).unwrap();
        assert!((config.solver.time_limit_secs - 5.0).abs() < 1e-12);
        assert_eq!(config.solver.strategy, SolverStrategy::FixedSearch);
        assert_eq!(config.environment.step_minutes, 10);
        assert_eq!(config.environment.reward.strategy, RewardStrategy::Dense);
        assert!((config.sac.tau - 0.01).abs() < 1e-12);
        assert_eq!(config.orchestrator.agent, AgentKind::Sac);
        assert_eq!(config.orchestrator.checkpoint_dir, Some(PathBuf::from("models")));
    }

    #[test]
    fn test_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.toml");
        std::fs::write(&path, "[orchestrator]\nenable_tier2 = false\n").unwrap();
        let config = HybridConfig::from_path(&path).unwrap();
        assert!(!config.orchestrator.enable_tier2);
    }

    #[test]
    fn test_malformed_toml() {
        let err = HybridConfig::from_toml_str("[solver\n").unwrap_err();
        assert!(matches!(err, SchedulingError::Config(_)));
    }
}
