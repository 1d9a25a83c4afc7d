//! Experience storage.
//!
//! `RolloutBuffer` holds the on-policy trajectory gathered since the last
//! update and is drained by every update. `ReplayBuffer` is a fixed
//! capacity ring sampled uniformly with replacement.

use rand::Rng;

use super::Transition;

/// On-policy trajectory storage.
#[derive(Debug, Clone, Default)]
pub struct RolloutBuffer {
    transitions: Vec<Transition>,
    log_probs: Vec<f32>,
    values: Vec<f32>,
}

impl RolloutBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a transition with the behaviour policy's log-probability and
    /// value estimate.
    pub fn push(&mut self, transition: Transition, log_prob: f32, value: f32) {
        self.transitions.push(transition);
        self.log_probs.push(log_prob);
        self.values.push(value);
    }

    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }

    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    pub fn log_probs(&self) -> &[f32] {
        &self.log_probs
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn clear(&mut self) {
        self.transitions.clear();
        self.log_probs.clear();
        self.values.clear();
    }
}

/// Generalized advantage estimation.
///
/// `next_values[t]` is `V(s_{t+1})`; it is ignored where `dones[t]`.
/// Returns `(advantages, returns)`.
///
/// # Reference
/// Schulman et al. (2016), "High-Dimensional Continuous Control Using
/// Generalized Advantage Estimation"
pub fn gae(
    rewards: &[f64],
    values: &[f64],
    next_values: &[f64],
    dones: &[bool],
    gamma: f64,
    lambda: f64,
) -> (Vec<f64>, Vec<f64>) {
    let n = rewards.len();
    let mut advantages = vec![0.0; n];
    let mut running = 0.0;
    for t in (0..n).rev() {
        let live = if dones[t] { 0.0 } else { 1.0 };
        let delta = rewards[t] + gamma * next_values[t] * live - values[t];
        running = delta + gamma * lambda * live * running;
        advantages[t] = running;
    }
    let returns = advantages.iter().zip(values).map(|(a, v)| a + v).collect();
    (advantages, returns)
}

/// Fixed-capacity replay memory.
#[derive(Debug, Clone)]
pub struct ReplayBuffer {
    capacity: usize,
    items: Vec<Transition>,
    next: usize,
}

impl ReplayBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            items: Vec::new(),
            next: 0,
        }
    }

    /// Adds a transition, overwriting the oldest once full.
    pub fn push(&mut self, transition: Transition) {
        if self.items.len() < self.capacity {
            self.items.push(transition);
        } else {
            self.items[self.next] = transition;
        }
        self.next = (self.next + 1) % self.capacity;
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Draws `batch` transitions uniformly with replacement.
    pub fn sample<R: Rng + ?Sized>(&self, batch: usize, rng: &mut R) -> Vec<&Transition> {
        if self.items.is_empty() {
            return Vec::new();
        }
        (0..batch)
            .map(|_| &self.items[rng.random_range(0..self.items.len())])
            .collect()
    }
}
