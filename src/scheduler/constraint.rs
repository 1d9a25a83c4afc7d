//! Tier-1 constraint scheduler.
//!
//! Validates the problem, builds the constraint model, solves it under the
//! configured limits, and maps the outcome to a [`SchedulingSolution`].
//!
//! # Status Mapping
//!
//! | Solver outcome | Solution status |
//! |----------------|-----------------|
//! | proven best schedule | Optimal |
//! | limit hit, schedule found | Feasible |
//! | proven unsatisfiable | Infeasible |
//! | limit hit, nothing found | Timeout |
//! | invalid input | Error |
//!
//! Each call builds its own model; nothing is shared between runs.

use std::time::Instant;

use tracing::{info, warn};

use crate::cp::{CpSolver, CpStatus, PumpkinSolver, ScheduleCpBuilder};
use crate::models::{SchedulingConfig, SchedulingProblem, SchedulingSolution, SolutionStatus, SolveStats};
use crate::validation::validate_problem;

/// Offline constraint-based scheduler.
#[derive(Debug, Clone)]
pub struct ConstraintScheduler<S: CpSolver = PumpkinSolver> {
    config: SchedulingConfig,
    solver: S,
}

impl ConstraintScheduler<PumpkinSolver> {
    /// Creates a scheduler using the Pumpkin solver.
    pub fn new(config: SchedulingConfig) -> Self {
        Self {
            config,
            solver: PumpkinSolver::new(),
        }
    }
}

impl<S: CpSolver> ConstraintScheduler<S> {
    /// Creates a scheduler backed by a custom solver.
    pub fn with_solver(config: SchedulingConfig, solver: S) -> Self {
        Self { config, solver }
    }

    /// The scheduler configuration.
    pub fn config(&self) -> &SchedulingConfig {
        &self.config
    }

    /// Solves `problem`.
    ///
    /// Infeasibility, timeouts, and invalid input are reported through the
    /// solution status.
    pub fn solve(&self, problem: &SchedulingProblem) -> SchedulingSolution {
        let started = Instant::now();

        if let Err(errors) = validate_problem(problem) {
            for e in &errors {
                warn!(kind = ?e.kind, "{}", e.message);
            }
            return SchedulingSolution::empty(SolutionStatus::Error, started.elapsed());
        }

        let builder = ScheduleCpBuilder::new(problem, &self.config);
        info!(
            jobs = problem.jobs.len(),
            operations = problem.operation_count(),
            machines = problem.machines.len(),
            horizon = builder.horizon(),
            "building constraint model"
        );

        let (operations, cp) = builder.solve(&self.solver);
        let status = match cp.status {
            CpStatus::Optimal => SolutionStatus::Optimal,
            CpStatus::Feasible => SolutionStatus::Feasible,
            CpStatus::Infeasible => SolutionStatus::Infeasible,
            CpStatus::Unknown => SolutionStatus::Timeout,
        };

        let mut solution = if status.has_schedule() {
            SchedulingSolution::from_operations(status, operations, builder.windows(), started.elapsed())
        } else {
            SchedulingSolution::empty(status, started.elapsed())
        };
        solution.optimality_gap = cp.gap();
        solution.stats = SolveStats {
            incumbent_updates: cp.incumbent_updates,
            lower_bound: cp.lower_bound,
            objective: cp.objective,
        };

        info!(
            status = ?solution.status,
            makespan = solution.makespan,
            total_tardiness = solution.total_tardiness,
            late_jobs = solution.late_jobs,
            incumbents = cp.incumbent_updates,
            gap = solution.optimality_gap,
            elapsed_ms = solution.solve_time.as_millis() as u64,
            "constraint solve finished"
        );
        solution
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{default_epoch, Job, Machine, Operation, WorkingHourSlot};
    use crate::scheduler::{BaselineScheduler, Improvement};

    fn two_job_problem() -> SchedulingProblem {
        SchedulingProblem::new(default_epoch())
            .with_machine(Machine::new("M1", "CNC"))
            .with_job(
                Job::new("J1")
                    .with_due(100)
                    .with_operation(Operation::new("J1_O1", "J1", 1).with_duration(30).with_machine("M1"))
                    .with_operation(Operation::new("J1_O2", "J1", 2).with_duration(30).with_machine("M1")),
            )
            .with_job(
                Job::new("J2")
                    .with_due(40)
                    .with_operation(Operation::new("J2_O1", "J2", 1).with_duration(20).with_machine("M1"))
                    .with_operation(Operation::new("J2_O2", "J2", 2).with_duration(20).with_machine("M1")),
            )
    }

    #[test]
    fn test_beats_fifo_baseline() {
        let problem = two_job_problem();
        let fifo = BaselineScheduler::fifo().schedule(&problem);
        assert_eq!(fifo.late_jobs, 1);

        let solution = ConstraintScheduler::new(SchedulingConfig::default()).solve(&problem);
        assert_eq!(solution.status, SolutionStatus::Optimal);
        assert_eq!(solution.late_jobs, 0);
        assert_eq!(solution.on_time_jobs, 2);
        assert!(solution.optimality_gap.abs() < 1e-10);

        let improvement = Improvement::between(&fifo, &solution);
        assert_eq!(improvement.late_jobs_reduced, 1);
    }

    #[test]
    fn test_invalid_problem_is_error_status() {
        let problem = two_job_problem().with_job(Job::new("empty"));
        let solution = ConstraintScheduler::new(SchedulingConfig::default()).solve(&problem);
        assert_eq!(solution.status, SolutionStatus::Error);
        assert!(solution.operations.is_empty());
    }

    #[test]
    fn test_operation_too_long_for_shift_is_infeasible() {
        let problem = SchedulingProblem::new(default_epoch())
            .with_machine(Machine::new("M1", "CNC").with_slot(WorkingHourSlot::from_hours(8, 9)))
            .with_job(Job::new("J1").with_due(1000).with_operation(
                Operation::new("O1", "J1", 1).with_duration(90).with_machine("M1"),
            ));
        let solution = ConstraintScheduler::new(SchedulingConfig::default()).solve(&problem);
        assert_eq!(solution.status, SolutionStatus::Infeasible);

        let relaxed = ConstraintScheduler::new(SchedulingConfig::default().with_overtime(true)).solve(&problem);
        assert_eq!(relaxed.status, SolutionStatus::Optimal);
    }

    #[test]
    fn test_zero_time_limit_is_timeout() {
        let problem = two_job_problem();
        let config = SchedulingConfig::default().with_time_limit(0.0);
        let solution = ConstraintScheduler::new(config).solve(&problem);
        assert_eq!(solution.status, SolutionStatus::Timeout);
        assert!(solution.operations.is_empty());
    }

    #[test]
    fn test_utilization_capped_and_stats_filled() {
        let problem = two_job_problem();
        let solution = ConstraintScheduler::new(SchedulingConfig::default()).solve(&problem);
        let util = solution.machine_utilization["M1"];
        assert!(util > 0.0 && util <= 1.0);
        assert!(solution.stats.incumbent_updates > 0);
        assert!((solution.stats.objective - 100.0).abs() < 1e-10);
    }
}
