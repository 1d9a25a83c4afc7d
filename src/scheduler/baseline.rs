//! Greedy single-pass baseline schedulers.
//!
//! # Algorithm
//!
//! 1. Order jobs by a dispatching rule (creation order or due date).
//! 2. For each job, place its operations in sequence order.
//! 3. Each operation goes on its first available eligible machine at
//!    `max(machine free, previous end + gap, release)`.
//!
//! Working hours are ignored. Baselines exist only to measure how much
//! the constraint scheduler improves on naive dispatching; they never
//! produce a live schedule.
//!
//! # Complexity
//! O(n log n + o) where n=jobs, o=operations.
//!
//! # Reference
//! Pinedo (2016), "Scheduling", Ch. 4: Priority Dispatching

use std::collections::HashMap;
use std::time::Instant;

use tracing::debug;

use crate::dispatching::{rules, RuleEngine, SchedulingContext, TieBreaker};
use crate::models::{ScheduledOperation, SchedulingProblem, SchedulingSolution, SolutionStatus};

/// Job ordering used by a baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaselineRule {
    /// Creation order (earliest arrival).
    Fifo,
    /// Earliest due date.
    Edd,
}

/// Greedy baseline scheduler.
///
/// # Example
///
/// ```
/// use hybrid_schedule::scheduler::BaselineScheduler;
/// use hybrid_schedule::models::{default_epoch, Job, Machine, Operation, SchedulingProblem};
///
/// let problem = SchedulingProblem::new(default_epoch())
///     .with_machine(Machine::new("M1", "CNC"))
///     .with_job(Job::new("J1").with_due(60).with_operation(
///         Operation::new("O1", "J1", 1).with_duration(30).with_machine("M1"),
///     ));
///
/// let solution = BaselineScheduler::fifo().schedule(&problem);
/// assert_eq!(solution.makespan, 30);
/// ```
#[derive(Debug, Clone)]
pub struct BaselineScheduler {
    rule: BaselineRule,
    min_gap_minutes: i64,
}

impl BaselineScheduler {
    /// Creation-order baseline.
    pub fn fifo() -> Self {
        Self::with_rule(BaselineRule::Fifo)
    }

    /// Earliest-due-date baseline.
    pub fn edd() -> Self {
        Self::with_rule(BaselineRule::Edd)
    }

    /// Baseline for a given rule.
    pub fn with_rule(rule: BaselineRule) -> Self {
        Self {
            rule,
            min_gap_minutes: 0,
        }
    }

    /// Sets the minimum gap between consecutive operations of a job.
    pub fn with_min_gap(mut self, minutes: i64) -> Self {
        self.min_gap_minutes = minutes;
        self
    }

    /// The job ordering rule.
    pub fn rule(&self) -> BaselineRule {
        self.rule
    }

    fn engine(&self) -> RuleEngine {
        match self.rule {
            BaselineRule::Fifo => RuleEngine::new().with_rule(rules::Fifo),
            BaselineRule::Edd => RuleEngine::new().with_rule(rules::Edd).then_by(rules::Fifo),
        }
        .with_final_tie_breaker(TieBreaker::ById)
    }

    /// Schedules all jobs greedily.
    pub fn schedule(&self, problem: &SchedulingProblem) -> SchedulingSolution {
        let started = Instant::now();
        let mut machine_free: HashMap<&str, i64> = HashMap::new();
        let mut operations = Vec::with_capacity(problem.operation_count());

        let context = SchedulingContext::for_jobs(&problem.jobs);
        for idx in self.engine().sort_indices(&problem.jobs, &context) {
            let job = &problem.jobs[idx];
            let mut previous_end: Option<i64> = None;

            for op in job.ordered_operations() {
                let Some(machine) = op
                    .eligible_machines
                    .iter()
                    .filter_map(|id| problem.machine(id))
                    .find(|m| m.available)
                else {
                    continue;
                };

                let free = machine_free.get(machine.id.as_str()).copied().unwrap_or(0);
                let after_previous = previous_end.map_or(0, |end| end + self.min_gap_minutes);
                let start = free.max(after_previous).max(job.release_minutes);
                let duration = op.total_minutes();
                let end = start + duration;

                operations.push(ScheduledOperation {
                    operation_id: op.id.clone(),
                    job_id: job.id.clone(),
                    machine_id: machine.id.clone(),
                    start,
                    end,
                    duration,
                    setup: op.setup_minutes,
                    sequence: op.sequence,
                    due: job.due_minutes,
                    priority: job.priority,
                    is_late: false,
                    tardiness_minutes: 0,
                });
                machine_free.insert(machine.id.as_str(), end);
                previous_end = Some(end);
            }
        }

        let solution = SchedulingSolution::from_operations(
            SolutionStatus::Feasible,
            operations,
            &HashMap::new(),
            started.elapsed(),
        );
        debug!(
            rule = ?self.rule,
            makespan = solution.makespan,
            late_jobs = solution.late_jobs,
            "baseline schedule built"
        );
        solution
    }
}
