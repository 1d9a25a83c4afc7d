//! Learned adjustment agents.
//!
//! Two agents share the [`Agent`] contract:
//!
//! - [`PpoAgent`]: on-policy, clipped surrogate objective with GAE and a
//!   separate value critic.
//! - [`SacAgent`]: off-policy discrete soft actor-critic with twin Q critics,
//!   Polyak-averaged targets, and automatic entropy tuning.
//!
//! Both act over the factorized action `(type, operation, machine)`. The
//! joint log-probability is the sum of the three component
//! log-probabilities, treating the components as independent.
//!
//! # Reference
//! - Schulman et al. (2017), "Proximal Policy Optimization Algorithms"
//! - Christodoulou (2019), "Soft Actor-Critic for Discrete Action Settings"

mod buffer;
mod network;
mod ppo;
mod sac;
mod trainer;

use std::fs;
use std::path::Path;

use candle_core::{DType, Device, Tensor};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::info;

pub use buffer::{gae, ReplayBuffer, RolloutBuffer};
pub use network::{ActionDims, Components, PolicyNet, QNet, ValueNet};
pub use ppo::{PpoAgent, PpoConfig};
pub use sac::{polyak_update, SacAgent, SacConfig};
pub use trainer::{run_episode, EpisodeSummary};

use crate::env::{Action, ActionMask, ActionType};
use crate::error::{Result, SchedulingError};

/// Which learning algorithm backs an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    Ppo,
    Sac,
}

impl AgentKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ppo => "ppo",
            Self::Sac => "sac",
        }
    }
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One environment transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub state: Vec<f32>,
    pub mask: ActionMask,
    pub action: Action,
    pub reward: f64,
    pub next_state: Vec<f32>,
    pub next_mask: ActionMask,
    pub done: bool,
}

/// Losses reported by an update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateStats {
    pub policy_loss: f64,
    /// Value loss for PPO, twin-critic loss for SAC.
    pub value_loss: f64,
    pub entropy: f64,
    /// Entropy coefficient after the update (SAC only).
    pub alpha: Option<f64>,
    pub samples: usize,
}

/// Epsilon-greedy schedule.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplorationConfig {
    pub epsilon_start: f64,
    pub epsilon_min: f64,
    /// Multiplicative decay per call to `decay_epsilon`.
    pub epsilon_decay: f64,
}

impl Default for ExplorationConfig {
    fn default() -> Self {
        Self {
            epsilon_start: 0.1,
            epsilon_min: 0.01,
            epsilon_decay: 0.995,
        }
    }
}

/// Per-component probabilities for one state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionDistribution {
    pub action_types: Vec<f32>,
    pub operations: Vec<f32>,
    pub machines: Vec<f32>,
}

/// Valid indices of one mask component; index 0 if none.
fn valid_indices(mask: &[bool], len: usize) -> Vec<usize> {
    let valid: Vec<usize> = (0..len).filter(|&i| mask.get(i) == Some(&true)).collect();
    if valid.is_empty() {
        vec![0]
    } else {
        valid
    }
}

fn argmax(probs: &[f32], valid: &[usize]) -> usize {
    valid
        .iter()
        .copied()
        .fold(None, |best: Option<usize>, i| match best {
            Some(b) if probs[b] >= probs[i] => Some(b),
            _ => Some(i),
        })
        .unwrap_or(0)
}

fn sample_index<R: Rng + ?Sized>(probs: &[f32], valid: &[usize], rng: &mut R) -> usize {
    let total: f32 = valid.iter().map(|&i| probs[i].max(0.0)).sum();
    if total <= 0.0 {
        return valid[rng.random_range(0..valid.len())];
    }
    let mut r = rng.random::<f32>() * total;
    for &i in valid {
        r -= probs[i].max(0.0);
        if r <= 0.0 {
            return i;
        }
    }
    valid[valid.len() - 1]
}

impl ActionDistribution {
    /// Builds a distribution from per-component log-probabilities.
    pub fn from_log_probs([t, o, m]: [Vec<f32>; 3]) -> Self {
        let exp = |v: Vec<f32>| -> Vec<f32> { v.into_iter().map(f32::exp).collect() };
        Self {
            action_types: exp(t),
            operations: exp(o),
            machines: exp(m),
        }
    }

    fn valid(&self, mask: &ActionMask) -> [Vec<usize>; 3] {
        [
            valid_indices(&mask.action_types, self.action_types.len()),
            valid_indices(&mask.operations, self.operations.len()),
            valid_indices(&mask.machines, self.machines.len()),
        ]
    }

    fn compose(t: usize, o: usize, m: usize) -> Action {
        Action::new(ActionType::from_index(t).unwrap_or(ActionType::NoOp), o, m)
    }

    /// Most likely valid action.
    pub fn best(&self, mask: &ActionMask) -> Action {
        let [t, o, m] = self.valid(mask);
        Self::compose(
            argmax(&self.action_types, &t),
            argmax(&self.operations, &o),
            argmax(&self.machines, &m),
        )
    }

    /// Samples each component independently among valid entries.
    pub fn sample<R: Rng + ?Sized>(&self, mask: &ActionMask, rng: &mut R) -> Action {
        let [t, o, m] = self.valid(mask);
        Self::compose(
            sample_index(&self.action_types, &t, rng),
            sample_index(&self.operations, &o, rng),
            sample_index(&self.machines, &m, rng),
        )
    }

    /// Product of the component probabilities.
    pub fn joint(&self, action: &Action) -> f64 {
        let p = |v: &[f32], i: usize| v.get(i).copied().unwrap_or(0.0) as f64;
        p(&self.action_types, action.action_type.index())
            * p(&self.operations, action.operation)
            * p(&self.machines, action.machine)
    }

    /// The `k` most likely valid actions with their joint probabilities.
    pub fn ranked(&self, mask: &ActionMask, k: usize) -> Vec<(Action, f64)> {
        const PER_COMPONENT: usize = 3;
        let top = |probs: &[f32], valid: Vec<usize>| {
            let mut v = valid;
            v.sort_by(|&a, &b| probs[b].total_cmp(&probs[a]).then(a.cmp(&b)));
            v.truncate(PER_COMPONENT);
            v
        };
        let [t, o, m] = self.valid(mask);
        let (t, o, m) = (
            top(&self.action_types, t),
            top(&self.operations, o),
            top(&self.machines, m),
        );

        let mut out = Vec::new();
        for &ti in &t {
            for &oi in &o {
                for &mi in &m {
                    let action = Self::compose(ti, oi, mi);
                    out.push((action, self.joint(&action)));
                }
            }
        }
        out.sort_by(|a, b| b.1.total_cmp(&a.1));
        out.truncate(k);
        out
    }
}

/// Train/eval mode, epsilon schedule, and sampling randomness.
#[derive(Debug, Clone)]
pub struct Explorer {
    config: ExplorationConfig,
    epsilon: f64,
    training: bool,
    rng: StdRng,
}

impl Explorer {
    pub fn new(config: ExplorationConfig, seed: u64) -> Self {
        Self {
            config,
            epsilon: config.epsilon_start,
            training: true,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Picks an action: greedy when deterministic, otherwise epsilon-uniform
    /// in training mode and sampled from `dist` the rest of the time.
    pub fn pick(&mut self, dist: &ActionDistribution, mask: &ActionMask, deterministic: bool) -> Action {
        if deterministic {
            return dist.best(mask);
        }
        if self.training && self.rng.random::<f64>() < self.epsilon {
            let uniform = ActionDistribution {
                action_types: vec![1.0; dist.action_types.len()],
                operations: vec![1.0; dist.operations.len()],
                machines: vec![1.0; dist.machines.len()],
            };
            return uniform.sample(mask, &mut self.rng);
        }
        dist.sample(mask, &mut self.rng)
    }

    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    pub fn set_epsilon(&mut self, epsilon: f64) {
        self.epsilon = epsilon.clamp(0.0, 1.0);
    }

    pub fn decay(&mut self) {
        self.epsilon = (self.epsilon * self.config.epsilon_decay).max(self.config.epsilon_min);
    }

    pub fn training(&self) -> bool {
        self.training
    }

    pub fn set_training(&mut self, training: bool) {
        self.training = training;
    }
}

/// Running episode statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EpisodeLog {
    pub episodes: usize,
    pub total_steps: usize,
    pub last_reward: f64,
    pub best_reward: Option<f64>,
}

impl EpisodeLog {
    pub fn record(&mut self, kind: AgentKind, reward: f64, steps: usize, epsilon: f64) {
        self.episodes += 1;
        self.total_steps += steps;
        self.last_reward = reward;
        self.best_reward = Some(self.best_reward.map_or(reward, |b| b.max(reward)));
        info!(
            agent = %kind,
            episode = self.episodes,
            reward,
            steps,
            epsilon,
            "episode finished"
        );
    }
}

/// Checkpoint metadata written next to the weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMeta {
    pub kind: AgentKind,
    pub state_dim: usize,
    pub operations: usize,
    pub machines: usize,
    pub hidden_dim: usize,
    pub epsilon: f64,
    pub updates: u64,
    pub episodes: EpisodeLog,
    #[serde(default)]
    pub log_alpha: Option<f32>,
}

impl AgentMeta {
    const FILE: &'static str = "agent.json";

    pub fn write(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)?;
        fs::write(dir.join(Self::FILE), serde_json::to_vec_pretty(self)?)?;
        Ok(())
    }

    pub fn read(dir: &Path) -> Result<Self> {
        let bytes = fs::read(dir.join(Self::FILE))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Fails unless the checkpoint matches the expected agent shape.
    pub fn check(&self, kind: AgentKind, state_dim: usize, dims: ActionDims, hidden_dim: usize) -> Result<()> {
        if self.kind != kind
            || self.state_dim != state_dim
            || self.operations != dims.operations
            || self.machines != dims.machines
            || self.hidden_dim != hidden_dim
        {
            return Err(SchedulingError::AgentUnavailable(format!(
                "checkpoint shape mismatch: {} state {} ops {} machines {} hidden {}",
                self.kind, self.state_dim, self.operations, self.machines, self.hidden_dim
            )));
        }
        Ok(())
    }
}

/// Common agent contract.
///
/// `select_action` with `deterministic = true` is greedy and leaves the
/// parameters and random source untouched.
pub trait Agent: Send {
    fn kind(&self) -> AgentKind;

    fn select_action(&mut self, state: &[f32], mask: &ActionMask, deterministic: bool) -> Result<Action>;

    /// Component probabilities under the current policy.
    fn action_distribution(&self, state: &[f32], mask: &ActionMask) -> Result<ActionDistribution>;

    fn greedy_action(&self, state: &[f32], mask: &ActionMask) -> Result<Action> {
        Ok(self.action_distribution(state, mask)?.best(mask))
    }

    /// Records experience. Ignored in eval mode.
    fn observe(&mut self, transition: Transition) -> Result<()>;

    /// Learns from stored experience; `None` if there was not enough.
    fn update(&mut self) -> Result<Option<UpdateStats>>;

    fn save(&self, dir: &Path) -> Result<()>;

    fn load(&mut self, dir: &Path) -> Result<()>;

    fn set_training(&mut self, training: bool);

    fn is_training(&self) -> bool;

    fn epsilon(&self) -> f64;

    fn decay_epsilon(&mut self);

    fn end_episode(&mut self, reward: f64, steps: usize);
}

/// Checks that the tensor backend can run before any scheduling starts.
pub fn probe_backend() -> Result<Device> {
    let device = Device::Cpu;
    Tensor::ones((2, 2), DType::F32, &device)
        .and_then(|t| t.matmul(&t))
        .map_err(|e| SchedulingError::MissingDependency(format!("tensor backend unavailable: {e}")))?;
    Ok(device)
}

/// Builds a fresh agent of `kind`.
pub fn create_agent(
    kind: AgentKind,
    state_dim: usize,
    dims: ActionDims,
    ppo: &PpoConfig,
    sac: &SacConfig,
    seed: u64,
) -> Result<Box<dyn Agent>> {
    Ok(match kind {
        AgentKind::Ppo => Box::new(PpoAgent::new(state_dim, dims, ppo.clone(), seed)?),
        AgentKind::Sac => Box::new(SacAgent::new(state_dim, dims, sac.clone(), seed)?),
    })
}

fn poisoned<T>(_: T) -> SchedulingError {
    SchedulingError::AgentUnavailable("parameter store lock poisoned".into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dist() -> ActionDistribution {
        ActionDistribution {
            action_types: vec![0.1, 0.6, 0.1, 0.1, 0.05, 0.05, 0.0],
            operations: vec![0.2, 0.8],
            machines: vec![0.7, 0.3],
        }
    }

    fn full_mask() -> ActionMask {
        ActionMask {
            action_types: vec![true; 7],
            operations: vec![true; 2],
            machines: vec![true; 2],
        }
    }

    #[test]
    fn test_best_respects_mask() {
        let d = dist();
        assert_eq!(d.best(&full_mask()), Action::new(ActionType::Reassign, 1, 0));
        let mut mask = full_mask();
        mask.operations[1] = false;
        assert_eq!(d.best(&mask).operation, 0);
    }

    #[test]
    fn test_joint_and_ranked() {
        let d = dist();
        let a = Action::new(ActionType::Reassign, 1, 0);
        assert!((d.joint(&a) - 0.6 * 0.8 * 0.7).abs() < 1e-6);
        let ranked = d.ranked(&full_mask(), 3);
        assert_eq!(ranked.len(), 3);
        assert_eq!(ranked[0].0, a);
        assert!(ranked.windows(2).all(|w| w[0].1 >= w[1].1));
    }

    #[test]
    fn test_sampling_stays_valid() {
        let d = dist();
        let mut mask = full_mask();
        mask.machines[0] = false;
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..100 {
            assert_eq!(d.sample(&mask, &mut rng).machine, 1);
        }
    }

    #[test]
    fn test_explorer_deterministic_and_decay() {
        let mut ex = Explorer::new(ExplorationConfig::default(), 1);
        let d = dist();
        for _ in 0..10 {
            assert_eq!(ex.pick(&d, &full_mask(), true), d.best(&full_mask()));
        }
        for _ in 0..2000 {
            ex.decay();
        }
        assert!((ex.epsilon() - 0.01).abs() < 1e-12);
    }

    #[test]
    fn test_episode_log() {
        let mut log = EpisodeLog::default();
        log.record(AgentKind::Ppo, 2.0, 10, 0.1);
        log.record(AgentKind::Ppo, 1.0, 5, 0.1);
        assert_eq!(log.episodes, 2);
        assert_eq!(log.total_steps, 15);
        assert_eq!(log.best_reward, Some(2.0));
    }

    #[test]
    fn test_probe_backend() {
        assert!(probe_backend().is_ok());
    }
}
