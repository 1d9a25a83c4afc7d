//! Agent registry with load-on-demand and least-recently-used eviction.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::agents::{create_agent, ActionDims, Agent, AgentKind, PpoConfig, SacConfig};
use crate::error::{Result, SchedulingError};

/// Identity of a loaded agent: algorithm plus network shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AgentKey {
    pub kind: AgentKind,
    pub state_dim: usize,
    pub operations: usize,
    pub machines: usize,
}

impl AgentKey {
    pub fn new(kind: AgentKind, state_dim: usize, dims: ActionDims) -> Self {
        Self {
            kind,
            state_dim,
            operations: dims.operations,
            machines: dims.machines,
        }
    }

    fn dims(&self) -> ActionDims {
        ActionDims::new(self.operations, self.machines)
    }
}

struct Entry {
    key: AgentKey,
    agent: Box<dyn Agent>,
}

/// Owns the loaded agents.
///
/// `get` returns a cached agent or builds one, restoring weights from
/// `<checkpoint_dir>/<kind>/` when a checkpoint exists there. Once
/// `capacity` agents are loaded the least recently used is dropped.
pub struct AgentRegistry {
    capacity: usize,
    checkpoint_dir: Option<PathBuf>,
    ppo: PpoConfig,
    sac: SacConfig,
    seed: u64,
    /// Least recently used first.
    entries: VecDeque<Entry>,
}

impl std::fmt::Debug for AgentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentRegistry")
            .field("capacity", &self.capacity)
            .field("checkpoint_dir", &self.checkpoint_dir)
            .field("loaded", &self.keys())
            .finish()
    }
}

impl AgentRegistry {
    pub fn new(capacity: usize, ppo: PpoConfig, sac: SacConfig, seed: u64) -> Self {
        Self {
            capacity: capacity.max(1),
            checkpoint_dir: None,
            ppo,
            sac,
            seed,
            entries: VecDeque::new(),
        }
    }

    pub fn with_checkpoint_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.checkpoint_dir = Some(dir.into());
        self
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Loaded keys, least recently used first.
    pub fn keys(&self) -> Vec<AgentKey> {
        self.entries.iter().map(|e| e.key).collect()
    }

    pub fn contains(&self, key: &AgentKey) -> bool {
        self.entries.iter().any(|e| e.key == *key)
    }

    fn checkpoint_path(&self, kind: AgentKind) -> Option<PathBuf> {
        self.checkpoint_dir.as_ref().map(|d| d.join(kind.name()))
    }

    /// Returns the agent for `key`, loading or creating it if needed.
    pub fn get(&mut self, key: AgentKey) -> Result<&mut dyn Agent> {
        match self.entries.iter().position(|e| e.key == key) {
            Some(pos) => {
                if let Some(entry) = self.entries.remove(pos) {
                    self.entries.push_back(entry);
                }
            }
            None => {
                let agent = self.build(key)?;
                if self.entries.len() >= self.capacity {
                    if let Some(evicted) = self.entries.pop_front() {
                        info!(kind = %evicted.key.kind, state_dim = evicted.key.state_dim, "agent evicted");
                    }
                }
                self.entries.push_back(Entry { key, agent });
            }
        }
        match self.entries.back_mut() {
            Some(entry) => Ok(entry.agent.as_mut()),
            None => Err(SchedulingError::AgentUnavailable(format!("{} agent not loaded", key.kind))),
        }
    }

    fn build(&self, key: AgentKey) -> Result<Box<dyn Agent>> {
        let mut agent = create_agent(key.kind, key.state_dim, key.dims(), &self.ppo, &self.sac, self.seed)?;
        match self.checkpoint_path(key.kind) {
            Some(dir) if has_checkpoint(&dir) => {
                agent.load(&dir)?;
                info!(kind = %key.kind, path = %dir.display(), "agent loaded from checkpoint");
            }
            _ => info!(kind = %key.kind, state_dim = key.state_dim, "agent created untrained"),
        }
        agent.set_training(false);
        Ok(agent)
    }

    /// Writes a loaded agent to its checkpoint directory.
    pub fn persist(&self, key: &AgentKey) -> Result<PathBuf> {
        let dir = self
            .checkpoint_path(key.kind)
            .ok_or_else(|| SchedulingError::AgentUnavailable("no checkpoint directory configured".into()))?;
        let entry = self
            .entries
            .iter()
            .find(|e| e.key == *key)
            .ok_or_else(|| SchedulingError::AgentUnavailable(format!("{} agent not loaded", key.kind)))?;
        entry.agent.save(&dir)?;
        info!(kind = %key.kind, path = %dir.display(), "agent checkpoint written");
        Ok(dir)
    }

    /// Drops a loaded agent.
    pub fn evict(&mut self, key: &AgentKey) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.key != *key);
        before != self.entries.len()
    }
}

fn has_checkpoint(dir: &Path) -> bool {
    dir.join("agent.json").is_file()
}
