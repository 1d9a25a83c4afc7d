//! Disruption events and their sampling.
//!
//! A disruption is drawn at most once per step with the configured
//! probability. Its type is uniform over [`DisruptionType::ALL`] and its
//! duration is exponential around the configured mean.

use rand::seq::IndexedRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::state::{EnvState, MachineStatus, OpStatus};

/// Kind of unplanned event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisruptionType {
    /// Machine goes down; its running operation is delayed.
    MachineBreakdown,
    /// A new urgent operation arrives.
    RushOrder,
    /// An operation takes longer than planned.
    ProcessingDelay,
    /// A pending operation is blocked waiting for material.
    MaterialShortage,
    /// Short machine outage for lack of an operator.
    WorkerAbsence,
    /// A running operation needs rework.
    QualityIssue,
}

impl DisruptionType {
    pub const ALL: [DisruptionType; 6] = [
        Self::MachineBreakdown,
        Self::RushOrder,
        Self::ProcessingDelay,
        Self::MaterialShortage,
        Self::WorkerAbsence,
        Self::QualityIssue,
    ];

    /// Whether the event targets a machine rather than an operation.
    pub fn targets_machine(&self) -> bool {
        matches!(self, Self::MachineBreakdown | Self::WorkerAbsence | Self::RushOrder)
    }
}

/// What a disruption hits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisruptionTarget {
    Machine(usize),
    Operation(usize),
}

/// A single disruption.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Disruption {
    pub kind: DisruptionType,
    pub target: DisruptionTarget,
    /// Clock time the event occurred.
    pub onset: i64,
    /// Minutes the event lasts or adds.
    pub duration: i64,
}

impl Disruption {
    pub fn new(kind: DisruptionType, target: DisruptionTarget, onset: i64, duration: i64) -> Self {
        Self {
            kind,
            target,
            onset,
            duration: duration.max(1),
        }
    }

    /// Machine breakdown starting at `onset`.
    pub fn machine_breakdown(machine: usize, onset: i64, duration: i64) -> Self {
        Self::new(
            DisruptionType::MachineBreakdown,
            DisruptionTarget::Machine(machine),
            onset,
            duration,
        )
    }

    /// When the event stops being in effect.
    pub fn ends_at(&self) -> i64 {
        self.onset + self.duration
    }
}

/// Samples one disruption, or `None` if the Bernoulli draw fails or no
/// suitable target exists.
pub fn sample<R: Rng + ?Sized>(
    rng: &mut R,
    state: &EnvState,
    probability: f64,
    mean_minutes: f64,
) -> Option<Disruption> {
    if probability <= 0.0 || !rng.random_bool(probability.min(1.0)) {
        return None;
    }
    let kind = *DisruptionType::ALL.choose(rng)?;
    // Exponential by inversion; `1 - u` keeps the logarithm finite.
    let u: f64 = rng.random();
    let duration = (-mean_minutes.max(1.0) * (1.0 - u).ln()).ceil().max(1.0) as i64;

    let target = if kind.targets_machine() {
        let candidates: Vec<usize> = (0..state.machines.len())
            .filter(|&i| state.machines[i].accepts_work())
            .collect();
        DisruptionTarget::Machine(*candidates.choose(rng)?)
    } else {
        let wanted: &[OpStatus] = match kind {
            DisruptionType::ProcessingDelay => &[OpStatus::Pending, OpStatus::InProgress],
            DisruptionType::MaterialShortage => &[OpStatus::Pending],
            _ => &[OpStatus::InProgress],
        };
        let candidates: Vec<usize> = (0..state.operations.len())
            .filter(|&i| wanted.contains(&state.operations[i].status))
            .collect();
        DisruptionTarget::Operation(*candidates.choose(rng)?)
    };

    Some(Disruption::new(kind, target, state.clock, duration))
}

/// Puts a machine down until `until`, delaying its running operation.
fn break_machine(state: &mut EnvState, machine: usize, until: i64) -> bool {
    let clock = state.clock;
    let Some(slot) = state.machines.get_mut(machine) else {
        return false;
    };
    if !slot.accepts_work() {
        return false;
    }
    slot.status = MachineStatus::Breakdown;
    slot.breakdown_until = Some(until);
    slot.free_at = slot.free_at.max(until);
    let running = slot.current_op.take();

    if let Some(i) = running {
        let op = &mut state.operations[i];
        if let Some(started) = op.actual_start.take() {
            state.machines[machine].busy_minutes += (clock - started).max(0);
        }
        op.status = OpStatus::Delayed;
        op.delayed_until = Some(until);
        op.move_to(until);
    }
    true
}

/// Applies `d` to `state`. Returns `false` if the target no longer fits.
pub(crate) fn apply(state: &mut EnvState, d: &Disruption, priority_cap: i32) -> bool {
    match (d.kind, d.target) {
        (DisruptionType::MachineBreakdown, DisruptionTarget::Machine(m)) => {
            break_machine(state, m, d.ends_at())
        }
        (DisruptionType::WorkerAbsence, DisruptionTarget::Machine(m)) => {
            break_machine(state, m, d.onset + (d.duration / 2).max(1))
        }
        (DisruptionType::RushOrder, DisruptionTarget::Machine(m)) => {
            let Some(slot) = state.free_op_slot() else {
                return false;
            };
            if !state.machines.get(m).is_some_and(|s| s.accepts_work()) {
                return false;
            }
            let count = state
                .disruptions
                .iter()
                .filter(|x| x.kind == DisruptionType::RushOrder)
                .count();
            let op = &mut state.operations[slot];
            op.status = OpStatus::Pending;
            op.operation_id = format!("RUSH-{}-{}", d.onset, count + 1);
            op.job_id = op.operation_id.clone();
            op.machine = m;
            op.duration = d.duration;
            op.move_to(d.onset);
            op.due = d.onset + 2 * d.duration;
            op.priority = priority_cap;
            op.sequence = 1;
            op.delayed_until = None;
            op.actual_start = None;
            op.actual_end = None;
            op.tardiness = 0;
            true
        }
        (DisruptionType::ProcessingDelay, DisruptionTarget::Operation(i)) => {
            let Some(op) = state.operations.get_mut(i) else {
                return false;
            };
            match op.status {
                OpStatus::Pending => op.move_to(op.start + d.duration),
                OpStatus::InProgress => {
                    op.duration += d.duration;
                    op.end += d.duration;
                }
                _ => return false,
            }
            true
        }
        (DisruptionType::MaterialShortage, DisruptionTarget::Operation(i)) => {
            let Some(op) = state.operations.get_mut(i) else {
                return false;
            };
            if op.status != OpStatus::Pending {
                return false;
            }
            op.status = OpStatus::Delayed;
            op.delayed_until = Some(d.ends_at());
            true
        }
        (DisruptionType::QualityIssue, DisruptionTarget::Operation(i)) => {
            let Some(op) = state.operations.get_mut(i) else {
                return false;
            };
            if op.status != OpStatus::InProgress {
                return false;
            }
            let rework = (d.duration / 2).max(1);
            op.duration += rework;
            op.end += rework;
            true
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::state::{MachineSlot, OpSlot};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn running_state() -> EnvState {
        let mut s = EnvState::empty(3, 2, 0);
        s.clock = 20;
        s.machines[0] = MachineSlot::available("M1", 1, 0);
        s.machines[0].status = MachineStatus::Busy;
        s.machines[0].current_op = Some(0);
        s.operations[0] = OpSlot {
            status: OpStatus::InProgress,
            operation_id: "O1".into(),
            job_id: "J1".into(),
            start: 0,
            end: 60,
            duration: 60,
            due: 100,
            actual_start: Some(0),
            ..OpSlot::empty()
        };
        s
    }

    #[test]
    fn test_breakdown_delays_running_operation() {
        let mut s = running_state();
        assert!(apply(&mut s, &Disruption::machine_breakdown(0, 20, 45), 10));
        let m = &s.machines[0];
        assert_eq!(m.status, MachineStatus::Breakdown);
        assert_eq!(m.breakdown_until, Some(65));
        assert_eq!(m.current_op, None);
        assert_eq!(m.busy_minutes, 20);
        let op = &s.operations[0];
        assert_eq!(op.status, OpStatus::Delayed);
        assert_eq!(op.delayed_until, Some(65));
        assert_eq!((op.start, op.end), (65, 125));
    }

    #[test]
    fn test_breakdown_twice_is_rejected() {
        let mut s = running_state();
        assert!(apply(&mut s, &Disruption::machine_breakdown(0, 20, 45), 10));
        assert!(!apply(&mut s, &Disruption::machine_breakdown(0, 20, 45), 10));
        assert!(!apply(&mut s, &Disruption::machine_breakdown(1, 20, 45), 10));
    }

    #[test]
    fn test_rush_order_fills_free_slot() {
        let mut s = running_state();
        let d = Disruption::new(DisruptionType::RushOrder, DisruptionTarget::Machine(0), 20, 30);
        assert!(apply(&mut s, &d, 10));
        let op = &s.operations[1];
        assert_eq!(op.status, OpStatus::Pending);
        assert_eq!(op.priority, 10);
        assert_eq!((op.start, op.end, op.due), (20, 50, 80));
    }

    #[test]
    fn test_quality_issue_adds_rework() {
        let mut s = running_state();
        let d = Disruption::new(DisruptionType::QualityIssue, DisruptionTarget::Operation(0), 20, 20);
        assert!(apply(&mut s, &d, 10));
        assert_eq!(s.operations[0].end, 70);
        assert_eq!(s.operations[0].duration, 70);
    }

    #[test]
    fn test_material_shortage_needs_pending() {
        let mut s = running_state();
        let d = Disruption::new(DisruptionType::MaterialShortage, DisruptionTarget::Operation(0), 20, 20);
        assert!(!apply(&mut s, &d, 10));
        s.operations[0].status = OpStatus::Pending;
        assert!(apply(&mut s, &d, 10));
        assert_eq!(s.operations[0].status, OpStatus::Delayed);
        assert_eq!(s.operations[0].delayed_until, Some(40));
    }

    #[test]
    fn test_sampling_is_seeded() {
        let s = running_state();
        let draw = |seed| {
            let mut rng = StdRng::seed_from_u64(seed);
            (0..50)
                .map(|_| sample(&mut rng, &s, 0.5, 60.0))
                .collect::<Vec<_>>()
        };
        assert_eq!(draw(7), draw(7));
        assert!(draw(7).iter().any(|d| d.is_some()));

        let mut rng = StdRng::seed_from_u64(1);
        assert!((0..50).all(|_| sample(&mut rng, &s, 0.0, 60.0).is_none()));
    }
}
