//! Discrete soft actor-critic.
//!
//! The actor outputs factorized masked log-probabilities; twin critics
//! output additive factorized Q values. Expectations over the policy are
//! taken in closed form per component.
//!
//! ```text
//! V(s')  = Σ_c Σ_a π_c(a|s') · (min(Q1', Q2')_c(s', a) − α · log π_c(a|s'))
//! y      = r + γ · (1 − done) · V(s')
//! L_Q    = (Q1(s, a) − y)² + (Q2(s, a) − y)²
//! L_π    = Σ_c Σ_a π_c(a|s) · (α · log π_c(a|s) − min(Q1, Q2)_c(s, a))
//! L_α    = log α · (H(π) − H_target)
//! θ'     ← τ·θ + (1 − τ)·θ'
//! ```
//!
//! # Reference
//! - Haarnoja et al. (2018), "Soft Actor-Critic Algorithms and Applications"
//! - Christodoulou (2019), "Soft Actor-Critic for Discrete Action Settings"

use std::path::Path;

use candle_core::{DType, Device, Tensor, Var};
use candle_nn::{AdamW, Optimizer, ParamsAdamW, VarBuilder, VarMap};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::buffer::ReplayBuffer;
use super::network::{mask_tensors, stack_states, ActionDims, Components, PolicyNet, QNet};
use super::{
    poisoned, ActionDistribution, Agent, AgentKind, AgentMeta, EpisodeLog, ExplorationConfig, Explorer,
    Transition, UpdateStats,
};
use crate::env::{Action, ActionMask};
use crate::error::{Result, SchedulingError};

const ACTOR: &str = "actor.safetensors";
const CRITIC: &str = "critic.safetensors";
const TARGET: &str = "target.safetensors";

/// SAC hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SacConfig {
    pub learning_rate: f64,
    pub gamma: f64,
    /// Polyak coefficient for the target critics.
    pub tau: f64,
    pub batch_size: usize,
    pub buffer_capacity: usize,
    /// Target entropy as a fraction of the maximum factorized entropy.
    pub target_entropy_ratio: f64,
    pub initial_alpha: f64,
    /// Transitions required before the first update.
    pub learning_starts: usize,
    pub hidden_dim: usize,
    pub exploration: ExplorationConfig,
}

impl Default for SacConfig {
    fn default() -> Self {
        Self {
            learning_rate: 3e-4,
            gamma: 0.99,
            tau: 0.005,
            batch_size: 64,
            buffer_capacity: 100_000,
            target_entropy_ratio: 0.98,
            initial_alpha: 0.2,
            learning_starts: 1000,
            hidden_dim: 256,
            exploration: ExplorationConfig::default(),
        }
    }
}

impl SacConfig {
    pub fn with_hidden_dim(mut self, hidden_dim: usize) -> Self {
        self.hidden_dim = hidden_dim;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_learning_starts(mut self, learning_starts: usize) -> Self {
        self.learning_starts = learning_starts;
        self
    }
}

/// Moves every `target` parameter toward its `online` counterpart:
/// `target ← tau·online + (1 − tau)·target`.
///
/// Parameters are matched by name; a name missing from `online` is an error.
pub fn polyak_update(target: &VarMap, online: &VarMap, tau: f64) -> Result<()> {
    let online = online.data().lock().map_err(poisoned)?;
    let target = target.data().lock().map_err(poisoned)?;
    for (name, t) in target.iter() {
        let o = online
            .get(name)
            .ok_or_else(|| SchedulingError::AgentUnavailable(format!("no online parameter named {name}")))?;
        let blended = (o.as_tensor().affine(tau, 0.0)? + t.as_tensor().affine(1.0 - tau, 0.0)?)?;
        t.set(&blended)?;
    }
    Ok(())
}

/// Twin Q networks sharing one parameter store.
struct Critics {
    q1: QNet,
    q2: QNet,
}

impl Critics {
    fn new(state_dim: usize, hidden: usize, dims: ActionDims, vars: &VarMap, device: &Device) -> Result<Self> {
        let vb = VarBuilder::from_varmap(vars, DType::F32, device);
        Ok(Self {
            q1: QNet::new(state_dim, hidden, dims, vb.pp("q1"))?,
            q2: QNet::new(state_dim, hidden, dims, vb.pp("q2"))?,
        })
    }

    fn min(&self, states: &Tensor) -> candle_core::Result<Components> {
        let q1 = self.q1.forward(states)?;
        let q2 = self.q2.forward(states)?;
        q1.try_zip(&q2, |a, b| a.minimum(b))
    }
}

/// Off-policy discrete SAC agent.
pub struct SacAgent {
    config: SacConfig,
    dims: ActionDims,
    state_dim: usize,
    device: Device,
    actor_vars: VarMap,
    actor: PolicyNet,
    actor_opt: AdamW,
    critic_vars: VarMap,
    critics: Critics,
    critic_opt: AdamW,
    target_vars: VarMap,
    targets: Critics,
    log_alpha: Var,
    alpha_opt: AdamW,
    target_entropy: f64,
    buffer: ReplayBuffer,
    explorer: Explorer,
    updates: u64,
    log: EpisodeLog,
}

impl std::fmt::Debug for SacAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SacAgent")
            .field("state_dim", &self.state_dim)
            .field("dims", &self.dims)
            .field("replay", &self.buffer.len())
            .field("updates", &self.updates)
            .finish()
    }
}

impl SacAgent {
    pub fn new(state_dim: usize, dims: ActionDims, config: SacConfig, seed: u64) -> Result<Self> {
        let device = Device::Cpu;
        let hidden = config.hidden_dim;

        let actor_vars = VarMap::new();
        let actor = PolicyNet::new(
            state_dim,
            hidden,
            dims,
            VarBuilder::from_varmap(&actor_vars, DType::F32, &device).pp("actor"),
        )?;
        let actor_opt = AdamW::new_lr(actor_vars.all_vars(), config.learning_rate)?;

        let critic_vars = VarMap::new();
        let critics = Critics::new(state_dim, hidden, dims, &critic_vars, &device)?;
        let critic_opt = AdamW::new_lr(critic_vars.all_vars(), config.learning_rate)?;

        let target_vars = VarMap::new();
        let targets = Critics::new(state_dim, hidden, dims, &target_vars, &device)?;
        polyak_update(&target_vars, &critic_vars, 1.0)?;

        let log_alpha = Var::new(config.initial_alpha.max(1e-8).ln() as f32, &device)?;
        let alpha_opt = AdamW::new(
            vec![log_alpha.clone()],
            ParamsAdamW {
                lr: config.learning_rate,
                weight_decay: 0.0,
                ..Default::default()
            },
        )?;

        let target_entropy = config.target_entropy_ratio * dims.log_cardinality();
        let buffer = ReplayBuffer::new(config.buffer_capacity);
        let explorer = Explorer::new(config.exploration, seed);
        Ok(Self {
            config,
            dims,
            state_dim,
            device,
            actor_vars,
            actor,
            actor_opt,
            critic_vars,
            critics,
            critic_opt,
            target_vars,
            targets,
            log_alpha,
            alpha_opt,
            target_entropy,
            buffer,
            explorer,
            updates: 0,
            log: EpisodeLog::default(),
        })
    }

    pub fn config(&self) -> &SacConfig {
        &self.config
    }

    /// Transitions held in replay memory.
    pub fn replay_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn updates(&self) -> u64 {
        self.updates
    }

    /// Current entropy coefficient.
    pub fn alpha(&self) -> Result<f64> {
        Ok((self.log_alpha.as_tensor().to_scalar::<f32>()? as f64).exp())
    }

    pub fn target_entropy(&self) -> f64 {
        self.target_entropy
    }

    /// Polyak-averages the online critics into the targets.
    pub fn soft_update(&self) -> Result<()> {
        polyak_update(&self.target_vars, &self.critic_vars, self.config.tau)
    }

    fn column(&self, data: Vec<f32>) -> candle_core::Result<Tensor> {
        let n = data.len();
        Tensor::from_vec(data, n, &self.device)
    }

    fn learn(&mut self, batch: &[Transition]) -> Result<UpdateStats> {
        let alpha = self.alpha()?;
        let states = stack_states(batch.iter().map(|t| t.state.as_slice()), self.state_dim, &self.device)?;
        let next_states = stack_states(
            batch.iter().map(|t| t.next_state.as_slice()),
            self.state_dim,
            &self.device,
        )?;
        let masks: Vec<&ActionMask> = batch.iter().map(|t| &t.mask).collect();
        let next_masks: Vec<&ActionMask> = batch.iter().map(|t| &t.next_mask).collect();
        let masks = mask_tensors(&masks, self.dims, &self.device)?;
        let next_masks = mask_tensors(&next_masks, self.dims, &self.device)?;
        let actions: Vec<Action> = batch.iter().map(|t| t.action).collect();
        let rewards = self.column(batch.iter().map(|t| t.reward as f32).collect())?;
        let live = self.column(batch.iter().map(|t| if t.done { 0.0 } else { 1.0 }).collect())?;

        // Soft target.
        let next_lp = self.actor.log_probs(&next_states, &next_masks)?.detach();
        let next_q = self.targets.min(&next_states)?.detach();
        let soft = next_lp.try_zip(&next_q, |lp, q| lp.exp()? * (q - lp.affine(alpha, 0.0)?)?)?;
        let next_v = soft.sum_rows()?;
        let y = (rewards + (live * next_v)?.affine(self.config.gamma, 0.0)?)?.detach();

        // Critics.
        let q1 = self.critics.q1.forward(&states)?.gather(&actions, &self.device)?;
        let q2 = self.critics.q2.forward(&states)?.gather(&actions, &self.device)?;
        let critic_loss = ((q1 - &y)?.sqr()?.mean_all()? + (q2 - &y)?.sqr()?.mean_all()?)?;
        self.critic_opt.backward_step(&critic_loss)?;

        // Actor.
        let lp = self.actor.log_probs(&states, &masks)?;
        let q = self.critics.min(&states)?.detach();
        let inner = lp.try_zip(&q, |lp, q| lp.exp()? * (lp.affine(alpha, 0.0)? - q)?)?;
        let actor_loss = inner.sum_rows()?.mean_all()?;
        self.actor_opt.backward_step(&actor_loss)?;

        // Temperature.
        let entropy = lp
            .detach()
            .try_map(|lp| lp.exp()? * lp)?
            .sum_rows()?
            .neg()?
            .mean_all()?
            .to_scalar::<f32>()? as f64;
        let alpha_loss = self.log_alpha.as_tensor().affine(entropy - self.target_entropy, 0.0)?;
        self.alpha_opt.backward_step(&alpha_loss)?;

        self.soft_update()?;

        Ok(UpdateStats {
            policy_loss: actor_loss.to_scalar::<f32>()? as f64,
            value_loss: critic_loss.to_scalar::<f32>()? as f64,
            entropy,
            alpha: Some(self.alpha()?),
            samples: batch.len(),
        })
    }
}

impl Agent for SacAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Sac
    }

    fn select_action(&mut self, state: &[f32], mask: &ActionMask, deterministic: bool) -> Result<Action> {
        let dist = self.action_distribution(state, mask)?;
        Ok(self.explorer.pick(&dist, mask, deterministic))
    }

    fn action_distribution(&self, state: &[f32], mask: &ActionMask) -> Result<ActionDistribution> {
        let x = stack_states([state], self.state_dim, &self.device)?;
        let m = mask_tensors(&[mask], self.dims, &self.device)?;
        let rows = self.actor.log_probs(&x, &m)?.first_row()?;
        Ok(ActionDistribution::from_log_probs(rows))
    }

    fn observe(&mut self, transition: Transition) -> Result<()> {
        if self.explorer.training() {
            self.buffer.push(transition);
        }
        Ok(())
    }

    fn update(&mut self) -> Result<Option<UpdateStats>> {
        let batch_size = self.config.batch_size.max(1);
        if self.buffer.len() < batch_size.max(self.config.learning_starts) {
            return Ok(None);
        }
        let batch: Vec<Transition> = self
            .buffer
            .sample(batch_size, self.explorer.rng())
            .into_iter()
            .cloned()
            .collect();
        let stats = self.learn(&batch)?;
        self.updates += 1;
        if self.updates % 100 == 0 {
            info!(
                update = self.updates,
                critic_loss = stats.value_loss,
                actor_loss = stats.policy_loss,
                alpha = stats.alpha,
                "sac update"
            );
        } else {
            debug!(update = self.updates, critic_loss = stats.value_loss, "sac update");
        }
        Ok(Some(stats))
    }

    fn save(&self, dir: &Path) -> Result<()> {
        AgentMeta {
            kind: AgentKind::Sac,
            state_dim: self.state_dim,
            operations: self.dims.operations,
            machines: self.dims.machines,
            hidden_dim: self.config.hidden_dim,
            epsilon: self.explorer.epsilon(),
            updates: self.updates,
            episodes: self.log.clone(),
            log_alpha: Some(self.log_alpha.as_tensor().to_scalar::<f32>()?),
        }
        .write(dir)?;
        self.actor_vars.save(dir.join(ACTOR))?;
        self.critic_vars.save(dir.join(CRITIC))?;
        self.target_vars.save(dir.join(TARGET))?;
        Ok(())
    }

    fn load(&mut self, dir: &Path) -> Result<()> {
        let meta = AgentMeta::read(dir)?;
        meta.check(AgentKind::Sac, self.state_dim, self.dims, self.config.hidden_dim)?;
        self.actor_vars.load(dir.join(ACTOR))?;
        self.critic_vars.load(dir.join(CRITIC))?;
        self.target_vars.load(dir.join(TARGET))?;
        if let Some(log_alpha) = meta.log_alpha {
            self.log_alpha.set(&Tensor::new(log_alpha, &self.device)?)?;
        }
        self.explorer.set_epsilon(meta.epsilon);
        self.updates = meta.updates;
        self.log = meta.episodes;
        Ok(())
    }

    fn set_training(&mut self, training: bool) {
        self.explorer.set_training(training);
    }

    fn is_training(&self) -> bool {
        self.explorer.training()
    }

    fn epsilon(&self) -> f64 {
        self.explorer.epsilon()
    }

    fn decay_epsilon(&mut self) {
        self.explorer.decay();
    }

    fn end_episode(&mut self, reward: f64, steps: usize) {
        let epsilon = self.explorer.epsilon();
        self.log.record(AgentKind::Sac, reward, steps, epsilon);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::ActionType;

    fn mask() -> ActionMask {
        ActionMask {
            action_types: vec![true; 7],
            operations: vec![true; 3],
            machines: vec![true; 2],
        }
    }

    fn agent(learning_starts: usize) -> SacAgent {
        let config = SacConfig::default()
            .with_hidden_dim(16)
            .with_batch_size(8)
            .with_learning_starts(learning_starts);
        SacAgent::new(5, ActionDims::new(3, 2), config, 3).unwrap()
    }

    fn transition(i: usize) -> Transition {
        Transition {
            state: vec![i as f32 / 20.0; 5],
            mask: mask(),
            action: Action::new(ActionType::from_index(i % 7).unwrap(), i % 3, i % 2),
            reward: (i % 3) as f64 - 1.0,
            next_state: vec![(i + 1) as f32 / 20.0; 5],
            next_mask: mask(),
            done: i % 10 == 9,
        }
    }

    fn first_values(vars: &VarMap) -> Vec<(String, Vec<f32>)> {
        let data = vars.data().lock().unwrap();
        let mut out: Vec<(String, Vec<f32>)> = data
            .iter()
            .map(|(k, v)| (k.clone(), v.as_tensor().flatten_all().unwrap().to_vec1::<f32>().unwrap()))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    #[test]
    fn test_targets_start_as_copies() {
        let agent = agent(0);
        assert_eq!(first_values(&agent.target_vars), first_values(&agent.critic_vars));
    }

    #[test]
    fn test_soft_update_moves_strictly_between() {
        let agent = agent(0);
        let before = first_values(&agent.target_vars);
        for var in agent.critic_vars.all_vars() {
            var.set(&var.as_tensor().affine(1.0, 1.0).unwrap()).unwrap();
        }
        let online = first_values(&agent.critic_vars);
        agent.soft_update().unwrap();
        let after = first_values(&agent.target_vars);

        for (((_, b), (_, o)), (_, a)) in before.iter().zip(&online).zip(&after) {
            for ((b, o), a) in b.iter().zip(o).zip(a) {
                assert!(b < a && a < o, "{b} < {a} < {o}");
            }
        }
    }

    #[test]
    fn test_update_waits_for_learning_starts() {
        let mut agent = agent(20);
        for i in 0..10 {
            agent.observe(transition(i)).unwrap();
        }
        assert!(agent.update().unwrap().is_none());
        for i in 10..20 {
            agent.observe(transition(i)).unwrap();
        }
        let stats = agent.update().unwrap().unwrap();
        assert_eq!(stats.samples, 8);
        assert!(stats.value_loss.is_finite());
        assert!(stats.alpha.unwrap() > 0.0);
        assert_eq!(agent.updates(), 1);
    }

    #[test]
    fn test_target_entropy_from_dims() {
        let agent = agent(0);
        let expected = 0.98 * ((7.0f64).ln() + (3.0f64).ln() + (2.0f64).ln());
        assert!((agent.target_entropy() - expected).abs() < 1e-9);
        assert!((agent.alpha().unwrap() - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_save_and_load_restores_alpha() {
        let dir = tempfile::tempdir().unwrap();
        let mut agent = agent(0);
        for i in 0..8 {
            agent.observe(transition(i)).unwrap();
        }
        agent.update().unwrap();
        agent.save(dir.path()).unwrap();

        let mut restored = SacAgent::new(5, ActionDims::new(3, 2), agent.config().clone(), 11).unwrap();
        restored.load(dir.path()).unwrap();
        assert!((restored.alpha().unwrap() - agent.alpha().unwrap()).abs() < 1e-6);
        assert_eq!(first_values(&restored.target_vars), first_values(&agent.target_vars));

        let state = vec![0.4; 5];
        let a = agent.greedy_action(&state, &mask()).unwrap();
        let b = restored.greedy_action(&state, &mask()).unwrap();
        assert_eq!(a, b);
    }
}
