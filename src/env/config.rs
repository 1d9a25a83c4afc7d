//! Environment configuration.

use serde::{Deserialize, Serialize};

use crate::reward::RewardConfig;

/// Tier-2 simulator configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvConfig {
    /// Simulated minutes per step.
    pub step_minutes: i64,
    /// Episode horizon (hours past the start time).
    pub horizon_hours: i64,
    /// Padded operation capacity.
    pub max_operations: usize,
    /// Padded machine capacity.
    pub max_machines: usize,
    /// Per-step probability of a random disruption.
    pub disruption_probability: f64,
    /// Mean breakdown duration (minutes).
    pub mean_breakdown_minutes: f64,
    /// Step-count truncation.
    pub max_steps: usize,
    /// Shift applied by the earlier/later actions (minutes).
    pub reschedule_shift_minutes: i64,
    /// Highest priority reachable through the priority action.
    pub priority_cap: i32,
    /// Minimum length of each half produced by a split (minutes).
    pub min_split_minutes: i64,
    /// Reward shaping.
    pub reward: RewardConfig,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            step_minutes: 15,
            horizon_hours: 168,
            max_operations: 100,
            max_machines: 20,
            disruption_probability: 0.05,
            mean_breakdown_minutes: 60.0,
            max_steps: 2000,
            reschedule_shift_minutes: 30,
            priority_cap: 10,
            min_split_minutes: 30,
            reward: RewardConfig::default(),
        }
    }
}

impl EnvConfig {
    /// Sets padded capacities.
    pub fn with_capacity(mut self, max_operations: usize, max_machines: usize) -> Self {
        self.max_operations = max_operations;
        self.max_machines = max_machines;
        self
    }

    /// Sets the disruption probability.
    pub fn with_disruption_probability(mut self, p: f64) -> Self {
        self.disruption_probability = p;
        self
    }

    /// Sets the step size.
    pub fn with_step_minutes(mut self, minutes: i64) -> Self {
        self.step_minutes = minutes;
        self
    }

    /// Sets the step-count truncation.
    pub fn with_max_steps(mut self, steps: usize) -> Self {
        self.max_steps = steps;
        self
    }

    /// Sets the reward configuration.
    pub fn with_reward(mut self, reward: RewardConfig) -> Self {
        self.reward = reward;
        self
    }

    /// Horizon in minutes.
    pub fn horizon_minutes(&self) -> i64 {
        self.horizon_hours * 60
    }
}
