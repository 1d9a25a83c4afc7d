//! Reward calculation for the Tier-2 environment.
//!
//! # Strategies
//!
//! | Strategy | Signal |
//! |----------|--------|
//! | Sparse | Only at episode end (terminated or truncated): completions, on-time count, late penalty, tardiness |
//! | Dense | Per-step increments of the same signals |
//! | Shaped | Dense plus `γ·Φ(s') − Φ(s)` |
//! | MultiObjective | Five named components, scalarized with configurable weights |
//!
//! The shaping potential of a terminal state is zero, so over a finished
//! episode with `γ = 1` the shaped return equals the dense return minus
//! `Φ(s₀)`. A truncated state keeps its potential: the episode was cut,
//! not finished.
//!
//! # Reference
//! Ng, Harada & Russell (1999), "Policy Invariance Under Reward
//! Transformations: Theory and Application to Reward Shaping"

use serde::{Deserialize, Serialize};

use crate::env::StateMetrics;

/// How rewards are produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardStrategy {
    Sparse,
    Dense,
    Shaped,
    MultiObjective,
}

/// Where a transition sits relative to the end of its episode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Boundary {
    /// The episode continues.
    #[default]
    Running,
    /// Every operation finished or the horizon passed.
    Terminated,
    /// The step limit cut the episode.
    Truncated,
}

impl Boundary {
    /// Termination wins over truncation.
    pub fn from_flags(terminated: bool, truncated: bool) -> Self {
        match (terminated, truncated) {
            (true, _) => Boundary::Terminated,
            (false, true) => Boundary::Truncated,
            (false, false) => Boundary::Running,
        }
    }

    /// Whether this is the last transition of the episode.
    pub fn is_episode_end(self) -> bool {
        self != Boundary::Running
    }
}

/// Weights of the shaping potential.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PotentialWeights {
    pub completion: f64,
    pub slack: f64,
    pub utilization: f64,
    pub tardiness: f64,
}

impl Default for PotentialWeights {
    fn default() -> Self {
        Self {
            completion: 1.0,
            slack: 0.1,
            utilization: 0.5,
            tardiness: 1.0,
        }
    }
}

/// Scalarization weights of the five multi-objective components.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectiveComponentWeights {
    pub completion: f64,
    pub on_time: f64,
    pub tardiness: f64,
    pub utilization: f64,
    pub validity: f64,
}

impl Default for ObjectiveComponentWeights {
    fn default() -> Self {
        Self {
            completion: 1.0,
            on_time: 0.5,
            tardiness: 1.0,
            utilization: 0.3,
            validity: 0.1,
        }
    }
}

/// Reward configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardConfig {
    pub strategy: RewardStrategy,
    /// Reward per completed operation.
    pub completion_reward: f64,
    /// Bonus per operation completed on time.
    pub on_time_bonus: f64,
    /// Penalty per operation completed late.
    pub late_penalty: f64,
    /// Penalty per hour of tardiness.
    pub tardiness_penalty: f64,
    /// Penalty for a failed action.
    pub invalid_action_penalty: f64,
    /// Discount used by the shaping term.
    pub gamma: f64,
    pub potential: PotentialWeights,
    pub objectives: ObjectiveComponentWeights,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            strategy: RewardStrategy::Shaped,
            completion_reward: 1.0,
            on_time_bonus: 0.5,
            late_penalty: 1.0,
            tardiness_penalty: 0.1,
            invalid_action_penalty: 0.1,
            gamma: 0.99,
            potential: PotentialWeights::default(),
            objectives: ObjectiveComponentWeights::default(),
        }
    }
}

impl RewardConfig {
    /// Config with a given strategy and default weights.
    pub fn with_strategy(mut self, strategy: RewardStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Sets the shaping discount.
    pub fn with_gamma(mut self, gamma: f64) -> Self {
        self.gamma = gamma;
        self
    }
}

/// Named reward components.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RewardComponents {
    /// Change in completion ratio.
    pub completion: f64,
    /// Operations newly completed on time.
    pub on_time: f64,
    /// Negative hours of new tardiness.
    pub tardiness: f64,
    /// Change in average utilization.
    pub utilization: f64,
    /// −1 when the action failed.
    pub validity: f64,
}

/// Reward of one transition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RewardSignal {
    pub scalar: f64,
    /// Filled only by the multi-objective strategy.
    pub components: Option<RewardComponents>,
}

/// Computes rewards from consecutive state metrics.
#[derive(Debug, Clone, Default)]
pub struct RewardCalculator {
    config: RewardConfig,
}

impl RewardCalculator {
    pub fn new(config: RewardConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RewardConfig {
        &self.config
    }

    /// Shaping potential of a non-terminal state.
    pub fn potential(&self, m: &StateMetrics) -> f64 {
        let w = &self.config.potential;
        let slack = m.mean_slack.signum() * (1.0 + m.mean_slack.abs() / 60.0).ln() / 10.0;
        let tardiness = if m.horizon_minutes > 0 {
            (m.total_tardiness as f64 / m.horizon_minutes as f64).min(1.0)
        } else {
            0.0
        };
        w.completion * m.completion_ratio() + w.slack * slack + w.utilization * m.avg_utilization
            - w.tardiness * tardiness
    }

    fn potential_at(&self, m: &StateMetrics, terminal: bool) -> f64 {
        if terminal {
            0.0
        } else {
            self.potential(m)
        }
    }

    /// Episode-level reward over cumulative metrics.
    fn outcome(&self, m: &StateMetrics) -> f64 {
        let c = &self.config;
        c.completion_reward * m.completed as f64 + c.on_time_bonus * m.on_time_completed as f64
            - c.late_penalty * m.late_completed as f64
            - c.tardiness_penalty * m.total_tardiness as f64 / 60.0
    }

    /// Per-step increment of the episode-level reward.
    pub fn dense(&self, prev: &StateMetrics, next: &StateMetrics, action_failed: bool) -> f64 {
        let penalty = if action_failed {
            self.config.invalid_action_penalty
        } else {
            0.0
        };
        self.outcome(next) - self.outcome(prev) - penalty
    }

    /// The five named components of a transition.
    pub fn components(
        &self,
        prev: &StateMetrics,
        next: &StateMetrics,
        action_failed: bool,
    ) -> RewardComponents {
        RewardComponents {
            completion: next.completion_ratio() - prev.completion_ratio(),
            on_time: next.on_time_completed as f64 - prev.on_time_completed as f64,
            tardiness: -((next.total_tardiness - prev.total_tardiness) as f64 / 60.0),
            utilization: next.avg_utilization - prev.avg_utilization,
            validity: if action_failed { -1.0 } else { 0.0 },
        }
    }

    /// Reward of the transition `prev → next`.
    pub fn compute(
        &self,
        prev: &StateMetrics,
        next: &StateMetrics,
        boundary: Boundary,
        action_failed: bool,
    ) -> RewardSignal {
        match self.config.strategy {
            RewardStrategy::Sparse => RewardSignal {
                scalar: if boundary.is_episode_end() {
                    self.outcome(next)
                } else {
                    0.0
                },
                components: None,
            },
            RewardStrategy::Dense => RewardSignal {
                scalar: self.dense(prev, next, action_failed),
                components: None,
            },
            RewardStrategy::Shaped => {
                let terminal = boundary == Boundary::Terminated;
                let shaping = self.config.gamma * self.potential_at(next, terminal)
                    - self.potential(prev);
                RewardSignal {
                    scalar: self.dense(prev, next, action_failed) + shaping,
                    components: None,
                }
            }
            RewardStrategy::MultiObjective => {
                let c = self.components(prev, next, action_failed);
                let w = &self.config.objectives;
                RewardSignal {
                    scalar: w.completion * c.completion
                        + w.on_time * c.on_time
                        + w.tardiness * c.tardiness
                        + w.utilization * c.utilization
                        + w.validity * c.validity,
                    components: Some(c),
                }
            }
        }
    }
}
