//! Tier-2 reactive scheduling environment.
//!
//! A discrete-time simulator that replays a Tier-1 schedule, injects
//! disruptions, and accepts corrective actions from an agent. It is an MDP
//! environment, not a solver: it never searches for a schedule.
//!
//! # State Layout
//!
//! Operations and machines live in fixed-capacity arrays padded with
//! `Empty` slots, so encoded states always have the same shape.
//!
//! # Reference
//! Sutton & Barto (2018), "Reinforcement Learning: An Introduction", Ch. 3

mod action;
mod config;
mod disruption;
mod environment;
mod state;

pub use action::{Action, ActionHandler, ActionMask, ActionType, StateChange};
pub use config::EnvConfig;
pub use disruption::{sample as sample_disruption, Disruption, DisruptionTarget, DisruptionType};
pub use environment::{SchedulingEnv, StepInfo, StepResult};
pub use state::{
    EnvState, MachineSlot, MachineStatus, OpSlot, OpStatus, StateMetrics, StatusCounts,
};
