//! Proximal policy optimization over the factorized action space.
//!
//! # Algorithm
//!
//! 1. Collect transitions with the current policy into the rollout buffer,
//!    storing each action's log-probability and value estimate.
//! 2. Compute advantages with GAE and normalize them.
//! 3. For `n_epochs`, shuffle and split into minibatches; minimize
//!    `−min(r·A, clip(r, 1−ε, 1+ε)·A) + c_v·(V − R)² − c_e·H`.
//! 4. Clip the global gradient norm before each optimizer step.
//! 5. Clear the buffer.
//!
//! # Reference
//! Schulman et al. (2017), "Proximal Policy Optimization Algorithms"

use std::path::Path;

use candle_core::backprop::GradStore;
use candle_core::{DType, Device, Tensor, Var};
use candle_nn::{AdamW, Optimizer, VarBuilder, VarMap};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::buffer::{gae, RolloutBuffer};
use super::network::{entropy, mask_tensors, stack_states, ActionDims, PolicyNet, ValueNet};
use super::{
    ActionDistribution, Agent, AgentKind, AgentMeta, EpisodeLog, ExplorationConfig, Explorer, Transition,
    UpdateStats,
};
use crate::env::{Action, ActionMask};
use crate::error::Result;

const WEIGHTS: &str = "ppo.safetensors";

/// PPO hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PpoConfig {
    pub learning_rate: f64,
    pub gamma: f64,
    pub gae_lambda: f64,
    pub clip_epsilon: f64,
    pub entropy_coef: f64,
    pub value_coef: f64,
    pub max_grad_norm: f64,
    pub n_epochs: usize,
    pub batch_size: usize,
    pub hidden_dim: usize,
    pub exploration: ExplorationConfig,
}

impl Default for PpoConfig {
    fn default() -> Self {
        Self {
            learning_rate: 3e-4,
            gamma: 0.99,
            gae_lambda: 0.95,
            clip_epsilon: 0.2,
            entropy_coef: 0.01,
            value_coef: 0.5,
            max_grad_norm: 0.5,
            n_epochs: 4,
            batch_size: 64,
            hidden_dim: 256,
            exploration: ExplorationConfig::default(),
        }
    }
}

impl PpoConfig {
    pub fn with_hidden_dim(mut self, hidden_dim: usize) -> Self {
        self.hidden_dim = hidden_dim;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }
}

/// Scales gradients so their global L2 norm is at most `max_norm`.
/// Returns the norm before clipping.
pub(crate) fn clip_grad_norm(grads: &mut GradStore, vars: &[Var], max_norm: f64) -> candle_core::Result<f64> {
    let mut total = 0.0f64;
    for var in vars {
        if let Some(g) = grads.get(var) {
            total += g.sqr()?.sum_all()?.to_scalar::<f32>()? as f64;
        }
    }
    let norm = total.sqrt();
    if max_norm > 0.0 && norm > max_norm {
        let scale = max_norm / (norm + 1e-6);
        for var in vars {
            if let Some(g) = grads.remove(var) {
                grads.insert(var, g.affine(scale, 0.0)?);
            }
        }
    }
    Ok(norm)
}

/// On-policy PPO agent.
pub struct PpoAgent {
    config: PpoConfig,
    dims: ActionDims,
    state_dim: usize,
    device: Device,
    varmap: VarMap,
    policy: PolicyNet,
    value: ValueNet,
    optimizer: AdamW,
    buffer: RolloutBuffer,
    explorer: Explorer,
    updates: u64,
    log: EpisodeLog,
}

impl std::fmt::Debug for PpoAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PpoAgent")
            .field("state_dim", &self.state_dim)
            .field("dims", &self.dims)
            .field("buffered", &self.buffer.len())
            .field("updates", &self.updates)
            .finish()
    }
}

impl PpoAgent {
    pub fn new(state_dim: usize, dims: ActionDims, config: PpoConfig, seed: u64) -> Result<Self> {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let policy = PolicyNet::new(state_dim, config.hidden_dim, dims, vb.pp("policy"))?;
        let value = ValueNet::new(state_dim, config.hidden_dim, vb.pp("value"))?;
        let optimizer = AdamW::new_lr(varmap.all_vars(), config.learning_rate)?;
        let explorer = Explorer::new(config.exploration, seed);
        Ok(Self {
            config,
            dims,
            state_dim,
            device,
            varmap,
            policy,
            value,
            optimizer,
            buffer: RolloutBuffer::new(),
            explorer,
            updates: 0,
            log: EpisodeLog::default(),
        })
    }

    pub fn config(&self) -> &PpoConfig {
        &self.config
    }

    /// Transitions waiting for the next update.
    pub fn rollout_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn updates(&self) -> u64 {
        self.updates
    }

    /// Log-probability of `action` and the value of `state`.
    fn evaluate(&self, state: &[f32], mask: &ActionMask, action: Action) -> Result<(f32, f32)> {
        let x = stack_states([state], self.state_dim, &self.device)?;
        let m = mask_tensors(&[mask], self.dims, &self.device)?;
        let log_prob = self
            .policy
            .log_probs(&x, &m)?
            .gather(&[action], &self.device)?
            .squeeze(0)?
            .to_scalar::<f32>()?;
        let value = self.value.forward(&x)?.squeeze(0)?.to_scalar::<f32>()?;
        Ok((log_prob, value))
    }

    fn f32_tensor(&self, data: Vec<f32>) -> candle_core::Result<Tensor> {
        let n = data.len();
        Tensor::from_vec(data, n, &self.device)
    }
}

impl Agent for PpoAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Ppo
    }

    fn select_action(&mut self, state: &[f32], mask: &ActionMask, deterministic: bool) -> Result<Action> {
        let dist = self.action_distribution(state, mask)?;
        Ok(self.explorer.pick(&dist, mask, deterministic))
    }

    fn action_distribution(&self, state: &[f32], mask: &ActionMask) -> Result<ActionDistribution> {
        let x = stack_states([state], self.state_dim, &self.device)?;
        let m = mask_tensors(&[mask], self.dims, &self.device)?;
        let rows = self.policy.log_probs(&x, &m)?.first_row()?;
        Ok(ActionDistribution::from_log_probs(rows))
    }

    fn observe(&mut self, transition: Transition) -> Result<()> {
        if !self.explorer.training() {
            return Ok(());
        }
        let (log_prob, value) = self.evaluate(&transition.state, &transition.mask, transition.action)?;
        self.buffer.push(transition, log_prob, value);
        Ok(())
    }

    fn update(&mut self) -> Result<Option<UpdateStats>> {
        if self.buffer.is_empty() {
            return Ok(None);
        }
        let n = self.buffer.len();
        let transitions = self.buffer.transitions();

        let states = stack_states(transitions.iter().map(|t| t.state.as_slice()), self.state_dim, &self.device)?;
        let next_states = stack_states(
            transitions.iter().map(|t| t.next_state.as_slice()),
            self.state_dim,
            &self.device,
        )?;
        let next_values: Vec<f64> = self
            .value
            .forward(&next_states)?
            .to_vec1::<f32>()?
            .into_iter()
            .map(f64::from)
            .collect();
        let values: Vec<f64> = self.buffer.values().iter().map(|&v| v as f64).collect();
        let rewards: Vec<f64> = transitions.iter().map(|t| t.reward).collect();
        let dones: Vec<bool> = transitions.iter().map(|t| t.done).collect();
        let (mut advantages, returns) = gae(
            &rewards,
            &values,
            &next_values,
            &dones,
            self.config.gamma,
            self.config.gae_lambda,
        );
        if n > 1 {
            let mean = advantages.iter().sum::<f64>() / n as f64;
            let std = (advantages.iter().map(|a| (a - mean).powi(2)).sum::<f64>() / n as f64).sqrt();
            for a in &mut advantages {
                *a = (*a - mean) / (std + 1e-8);
            }
        }

        let masks: Vec<&ActionMask> = transitions.iter().map(|t| &t.mask).collect();
        let actions: Vec<Action> = transitions.iter().map(|t| t.action).collect();
        let old_log_probs = self.buffer.log_probs().to_vec();

        let vars = self.varmap.all_vars();
        let mut order: Vec<usize> = (0..n).collect();
        let batch_size = self.config.batch_size.max(1);
        let eps = self.config.clip_epsilon;
        let mut totals = UpdateStats::default();
        let mut batches = 0usize;

        for _ in 0..self.config.n_epochs.max(1) {
            order.shuffle(self.explorer.rng());
            for chunk in order.chunks(batch_size) {
                let idx: Vec<u32> = chunk.iter().map(|&i| i as u32).collect();
                let idx = Tensor::from_vec(idx, chunk.len(), &self.device)?;
                let s = states.index_select(&idx, 0)?;
                let batch_masks: Vec<&ActionMask> = chunk.iter().map(|&i| masks[i]).collect();
                let m = mask_tensors(&batch_masks, self.dims, &self.device)?;
                let batch_actions: Vec<Action> = chunk.iter().map(|&i| actions[i]).collect();

                let old = self.f32_tensor(chunk.iter().map(|&i| old_log_probs[i]).collect())?;
                let adv = self.f32_tensor(chunk.iter().map(|&i| advantages[i] as f32).collect())?;
                let ret = self.f32_tensor(chunk.iter().map(|&i| returns[i] as f32).collect())?;

                let log_probs = self.policy.log_probs(&s, &m)?;
                let new = log_probs.gather(&batch_actions, &self.device)?;
                let ent = entropy(&log_probs)?.mean_all()?;

                let ratio = (&new - &old)?.exp()?;
                let surr1 = (&ratio * &adv)?;
                let surr2 = (ratio.clamp(1.0 - eps, 1.0 + eps)? * &adv)?;
                let policy_loss = surr1.minimum(&surr2)?.mean_all()?.neg()?;
                let value_loss = (self.value.forward(&s)? - &ret)?.sqr()?.mean_all()?;
                let loss = ((&policy_loss + value_loss.affine(self.config.value_coef, 0.0)?)?
                    - ent.affine(self.config.entropy_coef, 0.0)?)?;

                let mut grads = loss.backward()?;
                let norm = clip_grad_norm(&mut grads, &vars, self.config.max_grad_norm)?;
                self.optimizer.step(&grads)?;

                totals.policy_loss += policy_loss.to_scalar::<f32>()? as f64;
                totals.value_loss += value_loss.to_scalar::<f32>()? as f64;
                totals.entropy += ent.to_scalar::<f32>()? as f64;
                batches += 1;
                debug!(batch = batches, grad_norm = norm, "ppo minibatch");
            }
        }

        self.buffer.clear();
        self.updates += 1;

        let k = batches.max(1) as f64;
        let stats = UpdateStats {
            policy_loss: totals.policy_loss / k,
            value_loss: totals.value_loss / k,
            entropy: totals.entropy / k,
            alpha: None,
            samples: n,
        };
        info!(
            update = self.updates,
            samples = n,
            policy_loss = stats.policy_loss,
            value_loss = stats.value_loss,
            entropy = stats.entropy,
            "ppo update"
        );
        Ok(Some(stats))
    }

    fn save(&self, dir: &Path) -> Result<()> {
        AgentMeta {
            kind: AgentKind::Ppo,
            state_dim: self.state_dim,
            operations: self.dims.operations,
            machines: self.dims.machines,
            hidden_dim: self.config.hidden_dim,
            epsilon: self.explorer.epsilon(),
            updates: self.updates,
            episodes: self.log.clone(),
            log_alpha: None,
        }
        .write(dir)?;
        self.varmap.save(dir.join(WEIGHTS))?;
        Ok(())
    }

    fn load(&mut self, dir: &Path) -> Result<()> {
        let meta = AgentMeta::read(dir)?;
        meta.check(AgentKind::Ppo, self.state_dim, self.dims, self.config.hidden_dim)?;
        self.varmap.load(dir.join(WEIGHTS))?;
        self.explorer.set_epsilon(meta.epsilon);
        self.updates = meta.updates;
        self.log = meta.episodes;
        self.buffer.clear();
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
        self.log.record(AgentKind::Ppo, reward, steps, epsilon);
    }
}
