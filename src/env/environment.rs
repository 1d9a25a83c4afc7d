//! Step-based shop-floor simulator.
//!
//! # Step
//!
//! 1. Check the action's preconditions and apply its change, or record it
//!    as a failed no-op.
//! 2. Maybe inject one random disruption.
//! 3. Advance the clock by `step_minutes`.
//! 4. Replay the events up to the new clock in time order: breakdown
//!    recoveries and delay releases, then completions, then starts.
//! 5. Compute the reward.
//! 6. Check termination (everything completed or horizon passed) and
//!    step-count truncation.
//!
//! An operation starts once the clock reaches its planned start, its
//! machine is available, and earlier operations of its job are completed.

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::action::{Action, ActionMask, StateChange};
use super::config::EnvConfig;
use super::disruption::{self, Disruption};
use super::state::{EnvState, MachineSlot, MachineStatus, OpSlot, OpStatus};
use crate::error::{ActionError, Result, SchedulingError};
use crate::models::{Machine, SchedulingSolution};
use crate::reward::{Boundary, RewardCalculator, RewardComponents};

/// Diagnostics for one step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepInfo {
    /// Why the action was rejected, if it was.
    #[serde(skip)]
    pub action_error: Option<ActionError>,
    /// Disruption injected during this step.
    pub disruption: Option<Disruption>,
    /// Operation slots that started.
    pub started: Vec<usize>,
    /// Operation slots that completed.
    pub completed: Vec<usize>,
    /// Filled by the multi-objective reward.
    pub reward_components: Option<RewardComponents>,
}

impl StepInfo {
    /// Whether the requested action was rejected and ran as a no-op.
    pub fn action_failed(&self) -> bool {
        self.action_error.is_some()
    }
}

/// Outcome of [`SchedulingEnv::step`].
#[derive(Debug, Clone, PartialEq)]
pub struct StepResult {
    /// Scalar reward of the transition.
    pub reward: f64,
    /// All operations completed or the horizon passed.
    pub terminated: bool,
    /// Step limit reached before termination.
    pub truncated: bool,
    /// Step diagnostics.
    pub info: StepInfo,
}

impl StepResult {
    /// Terminated or truncated.
    pub fn done(&self) -> bool {
        self.terminated || self.truncated
    }
}

/// Tier-2 scheduling environment.
///
/// Each instance owns its state and random source; instances never share
/// mutable data.
#[derive(Debug, Clone)]
pub struct SchedulingEnv {
    config: EnvConfig,
    reward: RewardCalculator,
    rng: StdRng,
    state: Option<EnvState>,
}

impl SchedulingEnv {
    /// Creates an environment; call [`SchedulingEnv::reset`] before stepping.
    pub fn new(config: EnvConfig) -> Self {
        let reward = RewardCalculator::new(config.reward.clone());
        Self {
            config,
            reward,
            rng: StdRng::seed_from_u64(0),
            state: None,
        }
    }

    /// The environment configuration.
    pub fn config(&self) -> &EnvConfig {
        &self.config
    }

    /// Current state, `None` before the first reset.
    pub fn state(&self) -> Option<&EnvState> {
        self.state.as_ref()
    }

    fn ready(&self) -> Result<&EnvState> {
        self.state
            .as_ref()
            .ok_or_else(|| SchedulingError::EnvironmentNotReady("reset has not been called".into()))
    }

    /// Loads a schedule and rewinds the clock to `start_time`.
    ///
    /// Fails if the schedule exceeds the padded capacities or names a
    /// machine not in `machines`.
    pub fn reset(
        &mut self,
        solution: &SchedulingSolution,
        machines: &[Machine],
        start_time: i64,
        seed: u64,
    ) -> Result<&EnvState> {
        if solution.operations.len() > self.config.max_operations {
            return Err(SchedulingError::EnvironmentNotReady(format!(
                "{} operations exceed capacity {}",
                solution.operations.len(),
                self.config.max_operations
            )));
        }
        if machines.len() > self.config.max_machines {
            return Err(SchedulingError::EnvironmentNotReady(format!(
                "{} machines exceed capacity {}",
                machines.len(),
                self.config.max_machines
            )));
        }

        let mut state = EnvState::empty(self.config.max_operations, self.config.max_machines, start_time);
        for (slot, machine) in state.machines.iter_mut().zip(machines) {
            *slot = MachineSlot::available(&machine.id, machine.capacity, start_time);
            if !machine.available {
                slot.status = MachineStatus::Breakdown;
            }
        }

        let mut ordered: Vec<_> = solution.operations.iter().collect();
        ordered.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.operation_id.cmp(&b.operation_id)));
        for (slot, op) in state.operations.iter_mut().zip(ordered) {
            let machine = machines
                .iter()
                .position(|m| m.id == op.machine_id)
                .ok_or_else(|| SchedulingError::UnknownMachine(op.machine_id.clone()))?;
            *slot = OpSlot {
                status: OpStatus::Pending,
                operation_id: op.operation_id.clone(),
                job_id: op.job_id.clone(),
                machine,
                start: op.start,
                end: op.start + op.duration,
                duration: op.duration,
                due: op.due,
                priority: op.priority,
                sequence: op.sequence,
                ..OpSlot::empty()
            };
        }

        debug!(
            operations = solution.operations.len(),
            machines = machines.len(),
            start_time,
            seed,
            "environment reset"
        );
        self.rng = StdRng::seed_from_u64(seed);
        Ok(self.state.insert(state))
    }

    /// Validity masks for the current state.
    pub fn action_mask(&self) -> Result<ActionMask> {
        Ok(ActionMask::for_state(self.ready()?))
    }

    /// Advances the simulation by one step.
    pub fn step(&mut self, action: &Action) -> Result<StepResult> {
        let horizon = self.config.horizon_minutes();
        let state = self
            .state
            .as_mut()
            .ok_or_else(|| SchedulingError::EnvironmentNotReady("reset has not been called".into()))?;
        let before = state.metrics(horizon);
        let mut info = StepInfo::default();

        match action
            .action_type
            .handler()
            .apply(state, action.operation, action.machine, &self.config)
        {
            Ok(change) => apply_change(state, change),
            Err(e) => {
                debug!(?action, error = %e, "action rejected");
                info.action_error = Some(e);
            }
        }

        if let Some(d) = disruption::sample(
            &mut self.rng,
            state,
            self.config.disruption_probability,
            self.config.mean_breakdown_minutes,
        ) {
            if disruption::apply(state, &d, self.config.priority_cap) {
                info!(kind = ?d.kind, target = ?d.target, duration = d.duration, clock = state.clock, "disruption");
                state.disruptions.push(d.clone());
                info.disruption = Some(d);
            }
        }

        let from = state.clock;
        state.clock += self.config.step_minutes;
        let clock = state.clock;
        advance_to(state, from, clock, &mut info);
        state.disruptions.retain(|d| d.ends_at() > clock);
        state.step_count += 1;

        let terminated = state.all_completed() || clock - state.start_time >= horizon;
        let truncated = !terminated && state.step_count >= self.config.max_steps;
        let after = state.metrics(horizon);
        let signal = self.reward.compute(
            &before,
            &after,
            Boundary::from_flags(terminated, truncated),
            info.action_failed(),
        );
        info.reward_components = signal.components;

        Ok(StepResult {
            reward: signal.scalar,
            terminated,
            truncated,
            info,
        })
    }

    /// Applies a disruption at the current clock without advancing time.
    ///
    /// Returns `false` if its target no longer accepts it.
    pub fn inject_disruption(&mut self, disruption: Disruption) -> Result<bool> {
        let cap = self.config.priority_cap;
        let state = self
            .state
            .as_mut()
            .ok_or_else(|| SchedulingError::EnvironmentNotReady("reset has not been called".into()))?;
        let applied = disruption::apply(state, &disruption, cap);
        if applied {
            info!(kind = ?disruption.kind, target = ?disruption.target, duration = disruption.duration, "disruption injected");
            state.disruptions.push(disruption);
        }
        Ok(applied)
    }

    /// Applies an action without advancing time.
    pub fn apply_external(&mut self, action: &Action) -> Result<StateChange> {
        let state = self
            .state
            .as_mut()
            .ok_or_else(|| SchedulingError::EnvironmentNotReady("reset has not been called".into()))?;
        let change = action
            .action_type
            .handler()
            .apply(state, action.operation, action.machine, &self.config)?;
        apply_change(state, change.clone());
        Ok(change)
    }
}

/// Applies a handler-approved change.
fn apply_change(state: &mut EnvState, change: StateChange) {
    match change {
        StateChange::None => {}
        StateChange::Reassign { op, machine } => state.operations[op].machine = machine,
        StateChange::Shift { op, start } => state.operations[op].move_to(start),
        StateChange::SetPriority { op, priority } => state.operations[op].priority = priority,
        StateChange::Split { op, first, into } => {
            let original = &mut state.operations[op];
            let mut tail = original.clone();
            original.duration = first;
            original.end = original.start + first;

            tail.operation_id = format!("{}-b", original.operation_id);
            tail.duration -= first;
            tail.move_to(original.end);
            state.operations[into] = tail;
        }
        StateChange::Merge { op, other } => {
            let absorbed = std::mem::replace(&mut state.operations[other], OpSlot::empty());
            let target = &mut state.operations[op];
            target.duration += absorbed.duration;
            target.end = target.start + target.duration;
        }
    }
}

/// Next event up to a clock time.
#[derive(Debug, Clone, Copy)]
enum Event {
    Recover { at: i64, machine: usize },
    Release { at: i64, op: usize },
    Complete { at: i64, op: usize },
    Start { at: i64, rank: i32, op: usize },
}

impl Event {
    fn key(&self) -> (i64, u8, i32, usize) {
        match *self {
            Event::Recover { at, machine } => (at, 0, 0, machine),
            Event::Release { at, op } => (at, 1, 0, op),
            Event::Complete { at, op } => (at, 2, 0, op),
            Event::Start { at, rank, op } => (at, 3, rank, op),
        }
    }
}

/// Latest completion among earlier operations of the same job, or `None`
/// while any of them is unfinished.
fn predecessors_done(state: &EnvState, index: usize) -> Option<i64> {
    let op = &state.operations[index];
    let mut latest = i64::MIN;
    for o in &state.operations {
        if !o.is_live() || o.job_id != op.job_id || o.sequence >= op.sequence {
            continue;
        }
        if o.status != OpStatus::Completed {
            return None;
        }
        latest = latest.max(o.actual_end.unwrap_or(o.end));
    }
    Some(latest)
}

fn next_event(state: &EnvState, from: i64, clock: i64) -> Option<Event> {
    let recoveries = state.machines.iter().enumerate().filter_map(|(m, slot)| {
        match (slot.status, slot.breakdown_until) {
            (MachineStatus::Breakdown, Some(at)) if at <= clock => Some(Event::Recover { at, machine: m }),
            _ => None,
        }
    });
    let ops = state.operations.iter().enumerate().filter_map(|(i, op)| match op.status {
        OpStatus::Delayed => op
            .delayed_until
            .filter(|&at| at <= clock)
            .map(|at| Event::Release { at, op: i }),
        OpStatus::InProgress if op.end <= clock => Some(Event::Complete { at: op.end, op: i }),
        OpStatus::Pending => {
            let machine = state.machines.get(op.machine)?;
            if machine.status != MachineStatus::Available {
                return None;
            }
            let ready = predecessors_done(state, i)?;
            let at = op.start.max(machine.free_at).max(ready).max(from);
            (at <= clock).then_some(Event::Start {
                    at,
                    rank: -op.priority,
                    op: i,
                })
        }
        _ => None,
    });
    recoveries.chain(ops).min_by_key(Event::key)
}

/// Replays events in `(from, clock]` in time order.
fn advance_to(state: &mut EnvState, from: i64, clock: i64, info: &mut StepInfo) {
    while let Some(event) = next_event(state, from, clock) {
        match event {
            Event::Recover { at, machine } => {
                let slot = &mut state.machines[machine];
                slot.status = MachineStatus::Available;
                slot.breakdown_until = None;
                slot.free_at = slot.free_at.max(at);
            }
            Event::Release { at, op } => {
                let slot = &mut state.operations[op];
                slot.status = OpStatus::Pending;
                slot.delayed_until = None;
                if slot.start < at {
                    slot.move_to(at);
                }
            }
            Event::Complete { at, op } => {
                let slot = &mut state.operations[op];
                slot.status = OpStatus::Completed;
                slot.actual_end = Some(at);
                slot.tardiness = (at - slot.due).max(0);
                let busy = at - slot.actual_start.unwrap_or(slot.start);
                let machine = &mut state.machines[slot.machine];
                machine.busy_minutes += busy.max(0);
                machine.free_at = at;
                machine.current_op = None;
                if machine.status == MachineStatus::Busy {
                    machine.status = MachineStatus::Available;
                }
                info.completed.push(op);
            }
            Event::Start { at, op, .. } => {
                let slot = &mut state.operations[op];
                slot.status = OpStatus::InProgress;
                slot.actual_start = Some(at);
                slot.move_to(at);
                let machine = &mut state.machines[slot.machine];
                machine.status = MachineStatus::Busy;
                machine.current_op = Some(op);
                info.started.push(op);
            }
        }
    }
}
