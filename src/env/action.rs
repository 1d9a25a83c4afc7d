//! Action space and per-type handlers.
//!
//! An action is the triple (type, operation index, machine index). Each
//! type has one [`ActionHandler`] that checks preconditions against the
//! current state and returns the requested [`StateChange`]. Handlers never
//! mutate state; the environment applies the change.

use serde::{Deserialize, Serialize};

use super::config::EnvConfig;
use super::state::{EnvState, MachineStatus, OpSlot, OpStatus};
use crate::error::ActionError;

/// The seven action types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Leave the state unchanged.
    NoOp,
    /// Move the operation to another machine.
    Reassign,
    /// Start earlier, never before the clock.
    Earlier,
    /// Start later by the configured shift.
    Later,
    /// Raise priority by one, up to the cap.
    IncreasePriority,
    /// Split the batch in two halves.
    Split,
    /// Merge with the job's next pending operation.
    Merge,
}

impl ActionType {
    /// Number of action types.
    pub const COUNT: usize = 7;

    /// Every type in index order.
    pub const ALL: [ActionType; Self::COUNT] = [
        Self::NoOp,
        Self::Reassign,
        Self::Earlier,
        Self::Later,
        Self::IncreasePriority,
        Self::Split,
        Self::Merge,
    ];

    /// Position in the action-type component.
    pub fn index(&self) -> usize {
        match self {
            Self::NoOp => 0,
            Self::Reassign => 1,
            Self::Earlier => 2,
            Self::Later => 3,
            Self::IncreasePriority => 4,
            Self::Split => 5,
            Self::Merge => 6,
        }
    }

    /// Inverse of [`ActionType::index`]; `None` when out of range.
    ///
    /// ```
    /// use hybrid_schedule::env::ActionType;
    ///
    /// assert_eq!(ActionType::from_index(ActionType::Split.index()), Some(ActionType::Split));
    /// assert_eq!(ActionType::from_index(ActionType::COUNT), None);
    /// ```
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Handler implementing this type.
    pub fn handler(&self) -> &'static dyn ActionHandler {
        match self {
            Self::NoOp => &NoOpHandler,
            Self::Reassign => &ReassignHandler,
            Self::Earlier => &ShiftHandler { earlier: true },
            Self::Later => &ShiftHandler { earlier: false },
            Self::IncreasePriority => &PriorityHandler,
            Self::Split => &SplitHandler,
            Self::Merge => &MergeHandler,
        }
    }
}

/// A factorized action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Action {
    /// What to do.
    pub action_type: ActionType,
    /// Operation slot index.
    pub operation: usize,
    /// Machine slot index; only read by `Reassign`.
    pub machine: usize,
}

impl Action {
    /// Creates an action from its three components.
    pub fn new(action_type: ActionType, operation: usize, machine: usize) -> Self {
        Self {
            action_type,
            operation,
            machine,
        }
    }

    /// The no-op on slot 0.
    pub fn noop() -> Self {
        Self::new(ActionType::NoOp, 0, 0)
    }

    /// Builds an action from component indices.
    pub fn from_indices(action_type: usize, operation: usize, machine: usize) -> Option<Self> {
        ActionType::from_index(action_type).map(|t| Self::new(t, operation, machine))
    }
}

/// A change requested by a handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateChange {
    None,
    Reassign { op: usize, machine: usize },
    Shift { op: usize, start: i64 },
    SetPriority { op: usize, priority: i32 },
    /// Keep `first` minutes in `op`, move the rest to slot `into`.
    Split { op: usize, first: i64, into: usize },
    /// Absorb `other` into `op`.
    Merge { op: usize, other: usize },
}

/// Precondition check and change request for one action type.
pub trait ActionHandler: Send + Sync {
    fn apply(
        &self,
        state: &EnvState,
        op: usize,
        machine: usize,
        config: &EnvConfig,
    ) -> Result<StateChange, ActionError>;
}

/// The operation slot if it exists and is pending or delayed.
fn adjustable(state: &EnvState, index: usize) -> Result<&OpSlot, ActionError> {
    let op = state
        .operations
        .get(index)
        .ok_or(ActionError::OperationOutOfRange(index))?;
    match op.status {
        OpStatus::Empty => Err(ActionError::EmptySlot(index)),
        s if s.is_adjustable() => Ok(op),
        s => Err(ActionError::InvalidStatus {
            index,
            status: s.name(),
        }),
    }
}

struct NoOpHandler;

impl ActionHandler for NoOpHandler {
    fn apply(&self, _: &EnvState, _: usize, _: usize, _: &EnvConfig) -> Result<StateChange, ActionError> {
        Ok(StateChange::None)
    }
}

struct ReassignHandler;

impl ActionHandler for ReassignHandler {
    fn apply(
        &self,
        state: &EnvState,
        op: usize,
        machine: usize,
        _: &EnvConfig,
    ) -> Result<StateChange, ActionError> {
        let slot = adjustable(state, op)?;
        let target = state
            .machines
            .get(machine)
            .filter(|m| m.is_live())
            .ok_or(ActionError::MachineOutOfRange(machine))?;
        if target.status == MachineStatus::Breakdown {
            return Err(ActionError::MachineUnavailable(machine));
        }
        if slot.machine == machine {
            return Err(ActionError::NoChange);
        }
        Ok(StateChange::Reassign { op, machine })
    }
}

struct ShiftHandler {
    earlier: bool,
}

impl ActionHandler for ShiftHandler {
    fn apply(
        &self,
        state: &EnvState,
        op: usize,
        _: usize,
        config: &EnvConfig,
    ) -> Result<StateChange, ActionError> {
        let slot = adjustable(state, op)?;
        let shift = config.reschedule_shift_minutes;
        let start = if self.earlier {
            (slot.start - shift).max(state.clock)
        } else {
            slot.start + shift
        };
        if start == slot.start {
            return Err(ActionError::NoChange);
        }
        Ok(StateChange::Shift { op, start })
    }
}

struct PriorityHandler;

impl ActionHandler for PriorityHandler {
    fn apply(
        &self,
        state: &EnvState,
        op: usize,
        _: usize,
        config: &EnvConfig,
    ) -> Result<StateChange, ActionError> {
        let slot = adjustable(state, op)?;
        if slot.priority >= config.priority_cap {
            return Err(ActionError::PriorityCapped(config.priority_cap));
        }
        Ok(StateChange::SetPriority {
            op,
            priority: slot.priority + 1,
        })
    }
}

struct SplitHandler;

impl ActionHandler for SplitHandler {
    fn apply(
        &self,
        state: &EnvState,
        op: usize,
        _: usize,
        config: &EnvConfig,
    ) -> Result<StateChange, ActionError> {
        let slot = adjustable(state, op)?;
        let minimum = config.min_split_minutes.max(1);
        if slot.duration < 2 * minimum {
            return Err(ActionError::TooShortToSplit {
                duration: slot.duration,
                minimum: 2 * minimum,
            });
        }
        let into = state.free_op_slot().ok_or(ActionError::NoFreeSlot)?;
        Ok(StateChange::Split {
            op,
            first: slot.duration / 2,
            into,
        })
    }
}

struct MergeHandler;

impl ActionHandler for MergeHandler {
    fn apply(
        &self,
        state: &EnvState,
        op: usize,
        _: usize,
        _: &EnvConfig,
    ) -> Result<StateChange, ActionError> {
        let slot = adjustable(state, op)?;
        let other = state
            .operations
            .iter()
            .enumerate()
            .filter(|(i, o)| {
                *i != op
                    && o.status == OpStatus::Pending
                    && o.job_id == slot.job_id
                    && o.sequence > slot.sequence
            })
            .min_by_key(|(i, o)| (o.sequence, *i))
            .map(|(i, _)| i)
            .ok_or(ActionError::NothingToMerge)?;
        Ok(StateChange::Merge { op, other })
    }
}

/// Factorized validity masks over the three action components.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionMask {
    /// One flag per [`ActionType`].
    pub action_types: Vec<bool>,
    /// One flag per operation slot.
    pub operations: Vec<bool>,
    /// One flag per machine slot.
    pub machines: Vec<bool>,
}

impl ActionMask {
    /// Mask for `state`. With nothing adjustable only the no-op remains.
    pub fn for_state(state: &EnvState) -> Self {
        let operations: Vec<bool> = state
            .operations
            .iter()
            .map(|o| o.status.is_adjustable())
            .collect();
        let mut machines: Vec<bool> = state.machines.iter().map(|m| m.accepts_work()).collect();
        if !machines.iter().any(|&m| m) {
            if let Some(first) = machines.first_mut() {
                *first = true;
            }
        }

        if operations.iter().any(|&o| o) {
            Self {
                action_types: vec![true; ActionType::COUNT],
                operations,
                machines,
            }
        } else {
            Self::noop_only(state.operations.len(), machines)
        }
    }

    fn noop_only(operations: usize, machines: Vec<bool>) -> Self {
        let mut action_types = vec![false; ActionType::COUNT];
        action_types[ActionType::NoOp.index()] = true;
        let mut ops = vec![false; operations];
        if let Some(first) = ops.first_mut() {
            *first = true;
        }
        Self {
            action_types,
            operations: ops,
            machines,
        }
    }

    /// Restricts the operation component to a single index.
    pub fn only_operation(mut self, index: usize) -> Self {
        for (i, valid) in self.operations.iter_mut().enumerate() {
            *valid = *valid && i == index;
        }
        self
    }

    /// Whether every component of `action` is allowed.
    pub fn allows(&self, action: &Action) -> bool {
        self.action_types.get(action.action_type.index()) == Some(&true)
            && self.operations.get(action.operation) == Some(&true)
            && self.machines.get(action.machine) == Some(&true)
    }

    /// Whether any operation is selectable.
    pub fn has_operation(&self) -> bool {
        self.operations.iter().any(|&o| o)
    }
}
