//! Scheduling solution model.
//!
//! A solution is the output of one solve call: a status, the scheduled
//! operations, and summary metrics. Infeasibility and timeout are
//! statuses, not errors.
//!
//! # Reference
//! Pinedo (2016), "Scheduling: Theory, Algorithms, and Systems", Ch. 3

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::calendar::{available_minutes, TimeWindow};

/// Outcome of a solve call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolutionStatus {
    /// Proven optimal.
    Optimal,
    /// Feasible, optimality not proven.
    Feasible,
    /// Proven that no schedule satisfies the constraints.
    Infeasible,
    /// Limit reached before any schedule was found.
    Timeout,
    /// The model could not be built.
    Error,
}

impl SolutionStatus {
    /// Whether the solution carries a schedule.
    pub fn has_schedule(&self) -> bool {
        matches!(self, Self::Optimal | Self::Feasible)
    }
}

/// An operation placed on a machine at a concrete time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledOperation {
    /// Operation identifier.
    pub operation_id: String,
    /// Parent job identifier.
    pub job_id: String,
    /// Assigned machine identifier.
    pub machine_id: String,
    /// Start time (minutes).
    pub start: i64,
    /// End time (minutes). `end = start + duration`.
    pub end: i64,
    /// Occupation length including setup (minutes).
    pub duration: i64,
    /// Setup portion at the start of the interval (minutes).
    pub setup: i64,
    /// Sequence number within the job.
    pub sequence: i32,
    /// Due time of the parent job (minutes).
    pub due: i64,
    /// Priority of the parent job.
    pub priority: i32,
    /// Whether this operation ends after the job's due time.
    pub is_late: bool,
    /// `max(0, end - due)`.
    pub tardiness_minutes: i64,
}

impl ScheduledOperation {
    /// Moves the operation to start at `start`, keeping its duration.
    #[cfg(test)]
    pub(crate) fn place_at(&mut self, start: i64) {
        self.start = start;
        self.end = start + self.duration;
        self.refresh_lateness();
    }

    /// Recomputes lateness from `end` and `due`.
    pub(crate) fn refresh_lateness(&mut self) {
        self.tardiness_minutes = (self.end - self.due).max(0);
        self.is_late = self.tardiness_minutes > 0;
    }
}

/// Search statistics reported by the solver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SolveStats {
    /// Times the incumbent improved.
    pub incumbent_updates: u64,
    /// Best proven lower bound on the objective.
    pub lower_bound: f64,
    /// Objective of the returned schedule.
    pub objective: f64,
}

/// Result of one solve call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulingSolution {
    /// Solve outcome.
    pub status: SolutionStatus,
    /// Scheduled operations, ordered by start time.
    pub operations: Vec<ScheduledOperation>,
    /// Latest end time (minutes).
    pub makespan: i64,
    /// Sum of job tardiness (minutes).
    pub total_tardiness: i64,
    /// Jobs finishing by their due time.
    pub on_time_jobs: usize,
    /// Jobs finishing after their due time.
    pub late_jobs: usize,
    /// Machine id → utilization in [0, 1].
    pub machine_utilization: HashMap<String, f64>,
    /// Wall-clock time spent solving.
    pub solve_time: Duration,
    /// Relative gap between objective and lower bound.
    pub optimality_gap: f64,
    /// Search statistics.
    pub stats: SolveStats,
}

impl SchedulingSolution {
    /// Creates a solution with no schedule (Infeasible, Timeout, Error).
    pub fn empty(status: SolutionStatus, solve_time: Duration) -> Self {
        Self {
            status,
            operations: Vec::new(),
            makespan: 0,
            total_tardiness: 0,
            on_time_jobs: 0,
            late_jobs: 0,
            machine_utilization: HashMap::new(),
            solve_time,
            optimality_gap: 0.0,
            stats: SolveStats::default(),
        }
    }

    /// Creates a solution from scheduled operations and computes its metrics.
    ///
    /// Machines missing from `windows` are treated as always available.
    pub fn from_operations(
        status: SolutionStatus,
        operations: Vec<ScheduledOperation>,
        windows: &HashMap<String, Vec<TimeWindow>>,
        solve_time: Duration,
    ) -> Self {
        let mut solution = Self::empty(status, solve_time);
        solution.operations = operations;
        solution.recompute_metrics(windows);
        solution
    }

    /// Recomputes lateness, job counts, makespan, and utilization.
    pub fn recompute_metrics(&mut self, windows: &HashMap<String, Vec<TimeWindow>>) {
        self.operations.sort_by(|a, b| {
            a.start
                .cmp(&b.start)
                .then_with(|| a.machine_id.cmp(&b.machine_id))
        });
        for op in &mut self.operations {
            op.refresh_lateness();
        }
        self.makespan = self.operations.iter().map(|o| o.end).max().unwrap_or(0);

        let (total_tardiness, late_jobs, jobs) = {
            let completions = self.job_completions();
            (
                completions.values().map(|(end, due)| (end - due).max(0)).sum::<i64>(),
                completions.values().filter(|(end, due)| end > due).count(),
                completions.len(),
            )
        };
        self.total_tardiness = total_tardiness;
        self.late_jobs = late_jobs;
        self.on_time_jobs = jobs - late_jobs;

        self.machine_utilization = machine_utilization(&self.operations, windows);
    }

    /// Job id → (completion, due).
    fn job_completions(&self) -> HashMap<&str, (i64, i64)> {
        let mut completions: HashMap<&str, (i64, i64)> = HashMap::new();
        for op in &self.operations {
            let entry = completions.entry(op.job_id.as_str()).or_insert((op.end, op.due));
            entry.0 = entry.0.max(op.end);
        }
        completions
    }

    /// Finds a scheduled operation by id.
    pub fn operation(&self, operation_id: &str) -> Option<&ScheduledOperation> {
        self.operations.iter().find(|o| o.operation_id == operation_id)
    }

    /// Mutable lookup by operation id.
    pub fn operation_mut(&mut self, operation_id: &str) -> Option<&mut ScheduledOperation> {
        self.operations
            .iter_mut()
            .find(|o| o.operation_id == operation_id)
    }

    /// Operations of a job, ordered by sequence.
    pub fn operations_for_job(&self, job_id: &str) -> Vec<&ScheduledOperation> {
        let mut ops: Vec<&ScheduledOperation> =
            self.operations.iter().filter(|o| o.job_id == job_id).collect();
        ops.sort_by_key(|o| o.sequence);
        ops
    }

    /// Operations on a machine, ordered by start.
    pub fn operations_on_machine(&self, machine_id: &str) -> Vec<&ScheduledOperation> {
        let mut ops: Vec<&ScheduledOperation> = self
            .operations
            .iter()
            .filter(|o| o.machine_id == machine_id)
            .collect();
        ops.sort_by_key(|o| o.start);
        ops
    }

    /// Completion time of a job (latest end of its operations).
    pub fn job_completion(&self, job_id: &str) -> Option<i64> {
        self.operations
            .iter()
            .filter(|o| o.job_id == job_id)
            .map(|o| o.end)
            .max()
    }

    /// Mean utilization across machines that were used.
    pub fn average_utilization(&self) -> f64 {
        if self.machine_utilization.is_empty() {
            return 0.0;
        }
        self.machine_utilization.values().sum::<f64>() / self.machine_utilization.len() as f64
    }
}

/// Busy minutes over available working minutes in each machine's used span.
///
/// The span runs from the machine's first start to its last end. The ratio
/// is capped at 1.0.
pub fn machine_utilization(
    operations: &[ScheduledOperation],
    windows: &HashMap<String, Vec<TimeWindow>>,
) -> HashMap<String, f64> {
    let mut spans: HashMap<&str, (i64, i64, i64)> = HashMap::new();
    for op in operations {
        let entry = spans
            .entry(op.machine_id.as_str())
            .or_insert((op.start, op.end, 0));
        entry.0 = entry.0.min(op.start);
        entry.1 = entry.1.max(op.end);
        entry.2 += op.end - op.start;
    }

    spans
        .into_iter()
        .map(|(machine, (first, last, busy))| {
            let span = TimeWindow::new(first, last);
            let available = match windows.get(machine) {
                Some(w) => available_minutes(w, span),
                None => span.length(),
            };
            let util = if available > 0 {
                (busy as f64 / available as f64).min(1.0)
            } else if busy > 0 {
                1.0
            } else {
                0.0
            };
            (machine.to_string(), util)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sched(op: &str, job: &str, machine: &str, start: i64, end: i64, due: i64) -> ScheduledOperation {
        let mut s = ScheduledOperation {
            operation_id: op.into(),
            job_id: job.into(),
            machine_id: machine.into(),
            start,
            end,
            duration: end - start,
            setup: 0,
            sequence: 0,
            due,
            priority: 0,
            is_late: false,
            tardiness_minutes: 0,
        };
        s.refresh_lateness();
        s
    }

    fn sample() -> SchedulingSolution {
        SchedulingSolution::from_operations(
            SolutionStatus::Feasible,
            vec![
                sched("O3", "J2", "M1", 50, 80, 70),
                sched("O1", "J1", "M1", 0, 50, 100),
                sched("O2", "J1", "M2", 50, 90, 100),
            ],
            &HashMap::new(),
            Duration::from_millis(5),
        )
    }

    #[test]
    fn test_metrics() {
        let s = sample();
        assert_eq!(s.makespan, 90);
        assert_eq!(s.total_tardiness, 10);
        assert_eq!(s.late_jobs, 1);
        assert_eq!(s.on_time_jobs, 1);
        assert_eq!(s.operations[0].operation_id, "O1"); // sorted by start
        assert!(s.operation("O3").unwrap().is_late);
        assert_eq!(s.operation("O3").unwrap().tardiness_minutes, 10);
    }

    #[test]
    fn test_utilization_full_span() {
        let s = sample();
        assert!((s.machine_utilization["M1"] - 1.0).abs() < 1e-10);
        assert!((s.machine_utilization["M2"] - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_utilization_with_windows() {
        let ops = vec![sched("O1", "J1", "M1", 0, 30, 100), sched("O2", "J1", "M1", 70, 100, 100)];
        let mut windows = HashMap::new();
        windows.insert("M1".to_string(), vec![TimeWindow::new(0, 40), TimeWindow::new(60, 120)]);
        let util = machine_utilization(&ops, &windows);
        // busy 60 over available 40 + 40 = 80
        assert!((util["M1"] - 0.75).abs() < 1e-10);
    }

    #[test]
    fn test_place_at_updates_lateness() {
        let mut op = sched("O1", "J1", "M1", 0, 50, 60);
        assert!(!op.is_late);
        op.place_at(30);
        assert_eq!(op.end, 80);
        assert!(op.is_late);
        assert_eq!(op.tardiness_minutes, 20);
    }

    #[test]
    fn test_recompute_after_move() {
        let mut s = sample();
        assert_eq!(s.total_tardiness, 10);
        s.operation_mut("O3").unwrap().place_at(0);
        s.operation_mut("O1").unwrap().place_at(30);
        s.recompute_metrics(&HashMap::new());

        // J2 ends 30 (due 70), J1 ends max(80, 90) = 90 (due 100)
        assert_eq!(s.total_tardiness, 0);
        assert_eq!(s.late_jobs, 0);
        assert_eq!(s.on_time_jobs, 2);
        assert_eq!(s.operations[0].operation_id, "O3");
        assert!(!s.operation("O3").unwrap().is_late);

        s.operation_mut("O2").unwrap().place_at(100);
        s.recompute_metrics(&HashMap::new());
        assert_eq!(s.makespan, 140);
        assert_eq!(s.total_tardiness, 40);
        assert_eq!(s.late_jobs, 1);
        assert_eq!(s.on_time_jobs, 1);
    }

    #[test]
    fn test_lookups() {
        let s = sample();
        assert_eq!(s.operations_for_job("J1").len(), 2);
        assert_eq!(s.operations_on_machine("M1").len(), 2);
        assert_eq!(s.job_completion("J1"), Some(90));
        assert_eq!(s.job_completion("J9"), None);
    }

    #[test]
    fn test_empty_solution() {
        let s = SchedulingSolution::empty(SolutionStatus::Timeout, Duration::ZERO);
        assert!(!s.status.has_schedule());
        assert!(s.operations.is_empty());
        assert_eq!(s.makespan, 0);
        assert!(s.average_utilization().abs() < 1e-10);
    }
}
