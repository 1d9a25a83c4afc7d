//! MDP state: padded operation and machine records plus a clock.
//!
//! Slots beyond the live operations and machines are marked `Empty` so the
//! arrays keep a fixed shape. Only the environment's transition function
//! mutates a state; action handlers read it.

use serde::{Deserialize, Serialize};

use super::disruption::Disruption;

/// Status of an operation slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpStatus {
    /// Waiting for its start time and machine.
    Pending,
    /// Running on its machine.
    InProgress,
    /// Finished.
    Completed,
    /// Blocked by a disruption until `delayed_until`.
    Delayed,
    /// Padding.
    Empty,
}

impl OpStatus {
    /// Numeric code used by the encoder (0..=4).
    pub fn code(&self) -> u8 {
        match self {
            Self::Empty => 0,
            Self::Pending => 1,
            Self::InProgress => 2,
            Self::Delayed => 3,
            Self::Completed => 4,
        }
    }

    /// Lower-case name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Delayed => "delayed",
            Self::Empty => "empty",
        }
    }

    /// Whether actions may target this operation.
    pub fn is_adjustable(&self) -> bool {
        matches!(self, Self::Pending | Self::Delayed)
    }
}

/// Status of a machine slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MachineStatus {
    /// Idle and usable.
    Available,
    /// Running an operation.
    Busy,
    /// Down until `breakdown_until`.
    Breakdown,
    /// Padding.
    Empty,
}

impl MachineStatus {
    /// Numeric code used by the encoder (0..=3).
    pub fn code(&self) -> u8 {
        match self {
            Self::Empty => 0,
            Self::Available => 1,
            Self::Busy => 2,
            Self::Breakdown => 3,
        }
    }
}

/// One operation slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpSlot {
    pub status: OpStatus,
    pub operation_id: String,
    pub job_id: String,
    /// Assigned machine slot index.
    pub machine: usize,
    /// Planned start (minutes).
    pub start: i64,
    /// Planned end (minutes); `end = start + duration`.
    pub end: i64,
    pub duration: i64,
    pub due: i64,
    pub priority: i32,
    pub sequence: i32,
    /// Blocked until this time while `Delayed`.
    pub delayed_until: Option<i64>,
    pub actual_start: Option<i64>,
    pub actual_end: Option<i64>,
    /// `max(0, actual_end - due)` once completed.
    pub tardiness: i64,
}

impl OpSlot {
    /// An empty padding slot.
    pub fn empty() -> Self {
        Self {
            status: OpStatus::Empty,
            operation_id: String::new(),
            job_id: String::new(),
            machine: 0,
            start: 0,
            end: 0,
            duration: 0,
            due: 0,
            priority: 0,
            sequence: 0,
            delayed_until: None,
            actual_start: None,
            actual_end: None,
            tardiness: 0,
        }
    }

    /// Whether this slot holds an operation.
    pub fn is_live(&self) -> bool {
        self.status != OpStatus::Empty
    }

    /// Whether the planned end is past due.
    pub fn is_late(&self) -> bool {
        self.is_live() && self.end > self.due
    }

    /// Moves the planned start, keeping the duration.
    pub fn move_to(&mut self, start: i64) {
        self.start = start;
        self.end = start + self.duration;
    }
}

/// One machine slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineSlot {
    pub status: MachineStatus,
    pub machine_id: String,
    pub capacity: i32,
    /// Recovery time while `Breakdown`.
    pub breakdown_until: Option<i64>,
    /// When the machine last became free.
    pub free_at: i64,
    /// Operation slot currently running.
    pub current_op: Option<usize>,
    /// Accumulated processing minutes.
    pub busy_minutes: i64,
}

impl MachineSlot {
    /// An empty padding slot.
    pub fn empty() -> Self {
        Self {
            status: MachineStatus::Empty,
            machine_id: String::new(),
            capacity: 0,
            breakdown_until: None,
            free_at: 0,
            current_op: None,
            busy_minutes: 0,
        }
    }

    /// A live, idle machine.
    pub fn available(machine_id: impl Into<String>, capacity: i32, free_at: i64) -> Self {
        Self {
            status: MachineStatus::Available,
            machine_id: machine_id.into(),
            capacity,
            breakdown_until: None,
            free_at,
            current_op: None,
            busy_minutes: 0,
        }
    }

    /// Whether this slot holds a machine.
    pub fn is_live(&self) -> bool {
        self.status != MachineStatus::Empty
    }

    /// Whether operations may be assigned here.
    pub fn accepts_work(&self) -> bool {
        matches!(self.status, MachineStatus::Available | MachineStatus::Busy)
    }
}

/// Counts of live operations by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub delayed: usize,
}

impl StatusCounts {
    /// Number of live operations.
    pub fn total(&self) -> usize {
        self.pending + self.in_progress + self.completed + self.delayed
    }
}

/// Aggregate signals derived from a state, consumed by the reward calculator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StateMetrics {
    pub total_operations: usize,
    pub completed: usize,
    pub on_time_completed: usize,
    pub late_completed: usize,
    /// Tardiness of completed operations (minutes).
    pub total_tardiness: i64,
    /// Mean slack of unfinished operations (minutes, may be negative).
    pub mean_slack: f64,
    /// Mean machine utilization in [0, 1].
    pub avg_utilization: f64,
    /// Horizon used for normalization (minutes).
    pub horizon_minutes: i64,
}

impl StateMetrics {
    /// Completed fraction of live operations.
    pub fn completion_ratio(&self) -> f64 {
        if self.total_operations == 0 {
            0.0
        } else {
            self.completed as f64 / self.total_operations as f64
        }
    }
}

/// Full environment state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvState {
    pub operations: Vec<OpSlot>,
    pub machines: Vec<MachineSlot>,
    /// Simulated clock (minutes).
    pub clock: i64,
    /// Clock at reset.
    pub start_time: i64,
    /// Disruptions still in effect.
    pub disruptions: Vec<Disruption>,
    pub step_count: usize,
}

impl EnvState {
    /// An all-empty state with the given capacities.
    pub fn empty(max_operations: usize, max_machines: usize, start_time: i64) -> Self {
        Self {
            operations: vec![OpSlot::empty(); max_operations],
            machines: vec![MachineSlot::empty(); max_machines],
            clock: start_time,
            start_time,
            disruptions: Vec::new(),
            step_count: 0,
        }
    }

    /// Operation counts by status.
    pub fn status_counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for op in &self.operations {
            match op.status {
                OpStatus::Pending => counts.pending += 1,
                OpStatus::InProgress => counts.in_progress += 1,
                OpStatus::Completed => counts.completed += 1,
                OpStatus::Delayed => counts.delayed += 1,
                OpStatus::Empty => {}
            }
        }
        counts
    }

    /// Number of live machines.
    pub fn live_machines(&self) -> usize {
        self.machines.iter().filter(|m| m.is_live()).count()
    }

    /// Whether every live operation is completed.
    pub fn all_completed(&self) -> bool {
        self.operations
            .iter()
            .filter(|o| o.is_live())
            .all(|o| o.status == OpStatus::Completed)
    }

    /// First empty operation slot.
    pub fn free_op_slot(&self) -> Option<usize> {
        self.operations.iter().position(|o| !o.is_live())
    }

    /// Slot index of an operation id.
    pub fn op_index(&self, operation_id: &str) -> Option<usize> {
        self.operations
            .iter()
            .position(|o| o.is_live() && o.operation_id == operation_id)
    }

    /// Slot index of a machine id.
    pub fn machine_index(&self, machine_id: &str) -> Option<usize> {
        self.machines
            .iter()
            .position(|m| m.is_live() && m.machine_id == machine_id)
    }

    /// Utilization of a machine: busy minutes over elapsed minutes.
    ///
    /// Running work counts up to the clock.
    pub fn machine_utilization(&self, index: usize) -> f64 {
        let elapsed = self.clock - self.start_time;
        let Some(machine) = self.machines.get(index) else {
            return 0.0;
        };
        if elapsed <= 0 || !machine.is_live() {
            return 0.0;
        }
        let running = machine
            .current_op
            .and_then(|i| self.operations[i].actual_start)
            .map_or(0, |s| (self.clock - s).max(0));
        ((machine.busy_minutes + running) as f64 / elapsed as f64).clamp(0.0, 1.0)
    }

    /// Mean utilization over live machines.
    pub fn average_utilization(&self) -> f64 {
        let live: Vec<usize> = (0..self.machines.len())
            .filter(|&i| self.machines[i].is_live())
            .collect();
        if live.is_empty() {
            return 0.0;
        }
        live.iter().map(|&i| self.machine_utilization(i)).sum::<f64>() / live.len() as f64
    }

    /// Remaining assigned work per machine (minutes).
    pub fn remaining_work(&self, index: usize) -> i64 {
        self.operations
            .iter()
            .filter(|o| o.machine == index)
            .map(|o| match o.status {
                OpStatus::Pending | OpStatus::Delayed => o.duration,
                OpStatus::InProgress => (o.end - self.clock).max(0),
                _ => 0,
            })
            .sum()
    }

    /// Aggregate metrics for reward computation.
    pub fn metrics(&self, horizon_minutes: i64) -> StateMetrics {
        let mut m = StateMetrics {
            horizon_minutes,
            avg_utilization: self.average_utilization(),
            ..StateMetrics::default()
        };
        let mut slack_sum = 0.0;
        let mut unfinished = 0usize;
        for op in self.operations.iter().filter(|o| o.is_live()) {
            m.total_operations += 1;
            if op.status == OpStatus::Completed {
                m.completed += 1;
                m.total_tardiness += op.tardiness;
                if op.tardiness > 0 {
                    m.late_completed += 1;
                } else {
                    m.on_time_completed += 1;
                }
            } else {
                slack_sum += (op.due - op.end.max(self.clock)) as f64;
                unfinished += 1;
            }
        }
        if unfinished > 0 {
            m.mean_slack = slack_sum / unfinished as f64;
        }
        m
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn live_op(id: &str, machine: usize, start: i64, duration: i64, due: i64) -> OpSlot {
        OpSlot {
            status: OpStatus::Pending,
            operation_id: id.into(),
            job_id: "J1".into(),
            machine,
            start,
            end: start + duration,
            duration,
            due,
            ..OpSlot::empty()
        }
    }

    fn sample_state() -> EnvState {
        let mut s = EnvState::empty(4, 2, 0);
        s.machines[0] = MachineSlot::available("M1", 1, 0);
        s.operations[0] = live_op("O1", 0, 0, 30, 100);
        s.operations[1] = live_op("O2", 0, 30, 30, 40);
        s
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(OpStatus::Empty.code(), 0);
        assert_eq!(OpStatus::Completed.code(), 4);
        assert_eq!(MachineStatus::Breakdown.code(), 3);
        assert!(OpStatus::Delayed.is_adjustable());
        assert!(!OpStatus::InProgress.is_adjustable());
    }

    #[test]
    fn test_counts_and_lookup() {
        let s = sample_state();
        let c = s.status_counts();
        assert_eq!(c.pending, 2);
        assert_eq!(c.total(), 2);
        assert_eq!(s.free_op_slot(), Some(2));
        assert_eq!(s.op_index("O2"), Some(1));
        assert_eq!(s.machine_index("M1"), Some(0));
        assert_eq!(s.machine_index("M2"), None);
        assert_eq!(s.live_machines(), 1);
        assert!(!s.all_completed());
    }

    #[test]
    fn test_lateness_and_move() {
        let mut s = sample_state();
        assert!(s.operations[1].is_late());
        s.operations[1].move_to(0);
        assert_eq!(s.operations[1].end, 30);
        assert!(!s.operations[1].is_late());
    }

    #[test]
    fn test_utilization_counts_running_work() {
        let mut s = sample_state();
        s.clock = 20;
        s.operations[0].status = OpStatus::InProgress;
        s.operations[0].actual_start = Some(0);
        s.machines[0].status = MachineStatus::Busy;
        s.machines[0].current_op = Some(0);
        assert!((s.machine_utilization(0) - 1.0).abs() < 1e-10);
        assert_eq!(s.remaining_work(0), 10 + 30);
    }

    #[test]
    fn test_metrics() {
        let mut s = sample_state();
        s.clock = 60;
        s.operations[0].status = OpStatus::Completed;
        s.operations[1].status = OpStatus::Completed;
        s.operations[1].tardiness = 20;
        let m = s.metrics(1000);
        assert_eq!(m.completed, 2);
        assert_eq!(m.on_time_completed, 1);
        assert_eq!(m.late_completed, 1);
        assert_eq!(m.total_tardiness, 20);
        assert!((m.completion_ratio() - 1.0).abs() < 1e-10);
    }
}
