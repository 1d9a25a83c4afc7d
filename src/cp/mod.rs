//! CP-based scheduling formulation.
//!
//! Bridges the problem model to a constraint model. Builds a [`CpModel`]
//! from jobs, machines, and calendars, then solves it with any
//! [`CpSolver`].
//!
//! # Reference
//! - Laborie et al. (2018), "IBM ILOG CP Optimizer for Scheduling"
//! - Baptiste et al. (2001), "Constraint-Based Scheduling"

mod model;
mod solver;

use std::collections::HashMap;

pub use model::{CpModel, DueDate, IntervalVar, NoOverlap, Objective, Precedence};
pub use solver::{CpSolution, CpSolver, CpStatus, Procedure, PumpkinSolver, SolverConfig};

use crate::models::{
    ScheduledOperation, SchedulingConfig, SchedulingProblem, SolverStrategy, TimeWindow,
};

/// Where an interval came from.
#[derive(Debug, Clone, PartialEq, Eq)]
struct IntervalSource {
    job: usize,
    operation: usize,
    machine_id: String,
}

/// Builds a CP model from a scheduling problem.
///
/// Each operation is pinned to its first available eligible machine.
///
/// # Example
/// ```
/// use hybrid_schedule::cp::{PumpkinSolver, ScheduleCpBuilder};
/// use hybrid_schedule::models::{default_epoch, Job, Machine, Operation, SchedulingConfig, SchedulingProblem};
///
/// let problem = SchedulingProblem::new(default_epoch())
///     .with_machine(Machine::new("M1", "CNC"))
///     .with_job(Job::new("J1").with_due(120).with_operation(
///         Operation::new("O1", "J1", 1).with_duration(60).with_machine("M1"),
///     ));
/// let config = SchedulingConfig::default();
/// let builder = ScheduleCpBuilder::new(&problem, &config);
/// let (operations, solution) = builder.solve(&PumpkinSolver::new());
/// assert!(solution.is_solution_found());
/// assert_eq!(operations[0].end, 60);
/// ```
pub struct ScheduleCpBuilder<'a> {
    problem: &'a SchedulingProblem,
    config: &'a SchedulingConfig,
    horizon: i64,
    windows: HashMap<String, Vec<TimeWindow>>,
}

impl<'a> ScheduleCpBuilder<'a> {
    /// Creates a builder and expands machine working windows.
    pub fn new(problem: &'a SchedulingProblem, config: &'a SchedulingConfig) -> Self {
        let horizon = config.horizon_for(problem);
        let windows = problem
            .machines
            .iter()
            .map(|m| {
                (
                    m.id.clone(),
                    m.working_windows(problem.planning_start, horizon, &problem.calendars),
                )
            })
            .collect();
        Self {
            problem,
            config,
            horizon,
            windows,
        }
    }

    /// Planning horizon (minutes).
    pub fn horizon(&self) -> i64 {
        self.horizon
    }

    /// Working windows per machine over the horizon.
    pub fn windows(&self) -> &HashMap<String, Vec<TimeWindow>> {
        &self.windows
    }

    /// Machine an operation is pinned to: its first available eligible machine.
    fn pinned_machine(&self, eligible: &[String]) -> Option<String> {
        eligible
            .iter()
            .find(|id| self.problem.machine(id).is_some_and(|m| m.available))
            .cloned()
    }

    fn build_with_sources(&self) -> (CpModel, Vec<IntervalSource>) {
        let horizon = self.horizon;
        let mut model = CpModel::new("scheduling", horizon);
        let mut sources = Vec::new();
        let mut by_machine: HashMap<String, Vec<usize>> = HashMap::new();
        let mut due_dates = Vec::new();

        for (j, job) in self.problem.jobs.iter().enumerate() {
            let mut ordered: Vec<(usize, &crate::models::Operation)> =
                job.operations.iter().enumerate().collect();
            ordered.sort_by_key(|(_, op)| op.sequence);

            let mut previous = None;
            for (o, op) in ordered {
                let Some(machine_id) = self.pinned_machine(&op.eligible_machines) else {
                    continue;
                };
                let duration = op.total_minutes();
                let mut interval = IntervalVar::new(
                    &op.id,
                    j,
                    job.release_minutes,
                    horizon - duration,
                    duration,
                    horizon,
                );
                if !self.config.allow_overtime {
                    if let Some(windows) = self.windows.get(&machine_id) {
                        interval = interval.with_windows(windows);
                    }
                }
                let idx = model.add_interval(interval);
                by_machine.entry(machine_id.clone()).or_default().push(idx);
                sources.push(IntervalSource {
                    job: j,
                    operation: o,
                    machine_id,
                });

                if let Some(prev) = previous {
                    model.add_precedence(prev, idx, self.config.min_gap_minutes);
                }
                previous = Some(idx);
            }

            if let Some(last) = previous {
                due_dates.push(DueDate {
                    interval: last,
                    due: job.due_minutes,
                });
            }
        }

        let mut machines: Vec<_> = by_machine.into_iter().collect();
        machines.sort_by(|a, b| a.0.cmp(&b.0));
        for (machine_id, intervals) in machines {
            model.add_no_overlap(machine_id, intervals);
        }

        model.set_objective(Objective {
            makespan_weight: self.config.weights.makespan,
            tardiness_weight: self.config.weights.tardiness,
            due_dates,
        });

        (model, sources)
    }

    /// Builds the CP model.
    ///
    /// Creates:
    /// - An `IntervalVar` per operation, bounded by release and horizon
    /// - `Precedence` constraints between consecutive operations of a job
    /// - A `NoOverlap` group per machine
    /// - Working-window alternatives unless overtime is allowed
    /// - The weighted makespan + tardiness objective
    pub fn build(&self) -> CpModel {
        self.build_with_sources().0
    }

    /// Solver limits derived from the scheduling config.
    pub fn solver_config(&self) -> SolverConfig {
        let (procedure, warm_start) = match self.config.strategy {
            SolverStrategy::Default => (Procedure::SatUnsat, false),
            SolverStrategy::FixedSearch => (Procedure::SatUnsat, true),
            SolverStrategy::Exhaustive => (Procedure::UnsatSat, false),
        };
        SolverConfig {
            time_limit: std::time::Duration::from_secs_f64(self.config.time_limit_secs.max(0.0)),
            procedure,
            warm_start,
        }
    }

    /// Solves the model and decodes scheduled operations.
    pub fn solve<S: CpSolver>(&self, solver: &S) -> (Vec<ScheduledOperation>, CpSolution) {
        let (model, sources) = self.build_with_sources();
        let solution = solver.solve(&model, &self.solver_config());
        let operations = self.decode_solution(&model, &sources, &solution);
        (operations, solution)
    }

    fn decode_solution(
        &self,
        model: &CpModel,
        sources: &[IntervalSource],
        solution: &CpSolution,
    ) -> Vec<ScheduledOperation> {
        if !solution.is_solution_found() {
            return Vec::new();
        }

        sources
            .iter()
            .zip(&model.intervals)
            .zip(&solution.starts)
            .map(|((src, interval), &start)| {
                let job = &self.problem.jobs[src.job];
                let op = &job.operations[src.operation];
                let end = start + interval.duration;
                let tardiness = (end - job.due_minutes).max(0);
                ScheduledOperation {
                    operation_id: op.id.clone(),
                    job_id: job.id.clone(),
                    machine_id: src.machine_id.clone(),
                    start,
                    end,
                    duration: interval.duration,
                    setup: op.setup_minutes,
                    sequence: op.sequence,
                    due: job.due_minutes,
                    priority: job.priority,
                    is_late: tardiness > 0,
                    tardiness_minutes: tardiness,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{default_epoch, Job, Machine, Operation, WorkingHourSlot};

    fn make_problem() -> SchedulingProblem {
        SchedulingProblem::new(default_epoch())
            .with_machine(Machine::new("M1", "CNC"))
            .with_machine(Machine::new("M2", "CNC"))
            .with_job(
                Job::new("T1")
                    .with_due(500)
                    .with_operation(Operation::new("T1_O1", "T1", 1).with_duration(10).with_machine("M1"))
                    .with_operation(Operation::new("T1_O2", "T1", 2).with_duration(20).with_machine("M2")),
            )
            .with_job(
                Job::new("T2")
                    .with_due(500)
                    .with_operation(Operation::new("T2_O1", "T2", 1).with_duration(15).with_machine("M1")),
            )
    }

    #[test]
    fn test_build_model() {
        let problem = make_problem();
        let config = SchedulingConfig::default();
        let model = ScheduleCpBuilder::new(&problem, &config).build();

        assert_eq!(model.interval_count(), 3);
        // 1 precedence + 2 no-overlap groups
        assert_eq!(model.constraint_count(), 3);
        assert_eq!(model.objective.due_dates.len(), 2);
    }

    #[test]
    fn test_pins_first_available_machine() {
        let mut problem = make_problem();
        problem.machines[0].available = false;
        problem.jobs[1].operations[0].eligible_machines = vec!["M1".into(), "M2".into()];
        let config = SchedulingConfig::default();
        let (ops, _) = ScheduleCpBuilder::new(&problem, &config).solve(&PumpkinSolver::new());
        let t2 = ops.iter().find(|o| o.operation_id == "T2_O1").unwrap();
        assert_eq!(t2.machine_id, "M2");
    }

    #[test]
    fn test_solve_basic() {
        let problem = make_problem();
        let config = SchedulingConfig::default();
        let (ops, solution) = ScheduleCpBuilder::new(&problem, &config).solve(&PumpkinSolver::new());
        assert!(solution.is_solution_found());
        assert_eq!(ops.len(), 3);
        assert!(ops.iter().all(|o| o.end == o.start + o.duration));
    }

    #[test]
    fn test_intra_job_precedence_with_gap() {
        let problem = make_problem();
        let config = SchedulingConfig::default().with_min_gap(5);
        let (ops, _) = ScheduleCpBuilder::new(&problem, &config).solve(&PumpkinSolver::new());
        let o1 = ops.iter().find(|o| o.operation_id == "T1_O1").unwrap();
        let o2 = ops.iter().find(|o| o.operation_id == "T1_O2").unwrap();
        assert!(o2.start >= o1.end + 5);
    }

    #[test]
    fn test_working_hours_respected() {
        let mut problem = make_problem();
        for m in &mut problem.machines {
            m.working_hours.push(WorkingHourSlot::from_hours(8, 16));
        }
        let config = SchedulingConfig::default();
        let builder = ScheduleCpBuilder::new(&problem, &config);
        let (ops, solution) = builder.solve(&PumpkinSolver::new());
        assert!(solution.is_solution_found());
        for op in &ops {
            let windows = &builder.windows()[&op.machine_id];
            assert!(windows.iter().any(|w| w.fits(op.start, op.duration)));
        }
    }

    #[test]
    fn test_overtime_ignores_windows() {
        let mut problem = make_problem();
        problem.machines[0].working_hours.push(WorkingHourSlot::from_hours(8, 16));
        let config = SchedulingConfig::default().with_overtime(true);
        let model = ScheduleCpBuilder::new(&problem, &config).build();
        assert!(model.intervals.iter().all(|i| i.windows.is_none()));
    }

    #[test]
    fn test_strategy_maps_to_solver_config() {
        let problem = make_problem();
        let config = SchedulingConfig::default().with_strategy(SolverStrategy::Exhaustive);
        let sc = ScheduleCpBuilder::new(&problem, &config).solver_config();
        assert_eq!(sc.procedure, Procedure::UnsatSat);
        assert!(!sc.warm_start);

        let fixed = config.with_strategy(SolverStrategy::FixedSearch);
        let sc = ScheduleCpBuilder::new(&problem, &fixed).solver_config();
        assert_eq!(sc.procedure, Procedure::SatUnsat);
        assert!(sc.warm_start);
    }
}
