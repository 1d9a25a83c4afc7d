//! Scheduling problem and solver configuration.
//!
//! A [`SchedulingProblem`] bundles jobs, machines, and holiday calendars
//! with a planning epoch. [`SchedulingConfig`] controls how the
//! constraint scheduler builds and solves its model.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use super::calendar::{HolidayCalendar, MINUTES_PER_DAY};
use super::{Job, Machine, Operation};

/// A complete scheduling problem instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulingProblem {
    /// Jobs to schedule, in creation order.
    pub jobs: Vec<Job>,
    /// Available machines.
    pub machines: Vec<Machine>,
    /// Holiday calendars referenced by machines.
    #[serde(default)]
    pub calendars: Vec<HolidayCalendar>,
    /// Wall-clock instant corresponding to t=0.
    pub planning_start: NaiveDateTime,
}

impl SchedulingProblem {
    /// Creates an empty problem anchored at `planning_start`.
    pub fn new(planning_start: NaiveDateTime) -> Self {
        Self {
            jobs: Vec::new(),
            machines: Vec::new(),
            calendars: Vec::new(),
            planning_start,
        }
    }

    /// Adds a job.
    pub fn with_job(mut self, job: Job) -> Self {
        self.jobs.push(job);
        self
    }

    /// Adds a machine.
    pub fn with_machine(mut self, machine: Machine) -> Self {
        self.machines.push(machine);
        self
    }

    /// Adds a holiday calendar.
    pub fn with_calendar(mut self, calendar: HolidayCalendar) -> Self {
        self.calendars.push(calendar);
        self
    }

    /// Finds a machine by id.
    pub fn machine(&self, id: &str) -> Option<&Machine> {
        self.machines.iter().find(|m| m.id == id)
    }

    /// Finds a job by id.
    pub fn job(&self, id: &str) -> Option<&Job> {
        self.jobs.iter().find(|j| j.id == id)
    }

    /// Iterates over every operation of every job.
    pub fn operations(&self) -> impl Iterator<Item = &Operation> {
        self.jobs.iter().flat_map(|j| j.operations.iter())
    }

    /// Total number of operations.
    pub fn operation_count(&self) -> usize {
        self.jobs.iter().map(|j| j.operations.len()).sum()
    }

    /// Sum of setup and processing time over all jobs (minutes).
    pub fn total_work_minutes(&self) -> i64 {
        self.jobs.iter().map(Job::total_work_minutes).sum()
    }

    /// Latest release time over all jobs (minutes).
    pub fn max_release_minutes(&self) -> i64 {
        self.jobs
            .iter()
            .map(|j| j.release_minutes)
            .max()
            .unwrap_or(0)
    }
}

/// A fallback epoch (2024-01-01 00:00) for problems built without one.
pub fn default_epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

/// Weights of the two objective terms.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectiveWeights {
    /// Weight on makespan.
    pub makespan: f64,
    /// Weight on total tardiness.
    pub tardiness: f64,
}

impl Default for ObjectiveWeights {
    fn default() -> Self {
        Self {
            makespan: 1.0,
            tardiness: 10.0,
        }
    }
}

impl ObjectiveWeights {
    /// Weighted objective value.
    #[inline]
    pub fn evaluate(&self, makespan: i64, total_tardiness: i64) -> f64 {
        self.makespan * makespan as f64 + self.tardiness * total_tardiness as f64
    }
}

/// Search strategy for the constraint solver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverStrategy {
    /// Improve from the first schedule found.
    #[default]
    Default,
    /// Try every operation at its earliest start before free search.
    FixedSearch,
    /// Raise the objective bound from below until a schedule appears.
    Exhaustive,
}

/// Constraint-scheduler configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulingConfig {
    /// Hard wall-clock limit (seconds).
    pub time_limit_secs: f64,
    /// Search strategy.
    pub strategy: SolverStrategy,
    /// Objective weights.
    pub weights: ObjectiveWeights,
    /// Nominal planning horizon (days).
    pub horizon_days: i64,
    /// Whether operations may ignore working-hour windows.
    pub allow_overtime: bool,
    /// Minimum gap between consecutive operations of a job (minutes).
    pub min_gap_minutes: i64,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            time_limit_secs: 60.0,
            strategy: SolverStrategy::Default,
            weights: ObjectiveWeights::default(),
            horizon_days: 14,
            allow_overtime: false,
            min_gap_minutes: 0,
        }
    }
}

impl SchedulingConfig {
    /// Sets the time limit.
    pub fn with_time_limit(mut self, secs: f64) -> Self {
        self.time_limit_secs = secs;
        self
    }

    /// Sets the search strategy.
    pub fn with_strategy(mut self, strategy: SolverStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Sets the objective weights.
    pub fn with_weights(mut self, makespan: f64, tardiness: f64) -> Self {
        self.weights = ObjectiveWeights {
            makespan,
            tardiness,
        };
        self
    }

    /// Sets the nominal horizon.
    pub fn with_horizon_days(mut self, days: i64) -> Self {
        self.horizon_days = days;
        self
    }

    /// Allows operations outside working hours.
    pub fn with_overtime(mut self, allow: bool) -> Self {
        self.allow_overtime = allow;
        self
    }

    /// Sets the minimum precedence gap.
    pub fn with_min_gap(mut self, minutes: i64) -> Self {
        self.min_gap_minutes = minutes;
        self
    }

    /// Planning horizon for `problem` (minutes).
    ///
    /// At least the nominal horizon, and at least twice the total work past
    /// the latest release so the solver has room to place every operation.
    pub fn horizon_for(&self, problem: &SchedulingProblem) -> i64 {
        let nominal = self.horizon_days.max(0) * MINUTES_PER_DAY;
        let gaps = self.min_gap_minutes.max(0) * problem.operation_count() as i64;
        let room = problem.max_release_minutes() + 2 * (problem.total_work_minutes() + gaps);
        nominal.max(room)
    }
}
