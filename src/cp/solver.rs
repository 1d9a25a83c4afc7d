//! [`CpSolver`] backed by the Pumpkin lazy clause generation solver.
//!
//! # Encoding
//!
//! - One bounded integer start variable per interval.
//! - Precedence: `start(before) + duration(before) + gap <= start(after)`.
//! - No-overlap: for each pair in a group, two half-reified orderings and a
//!   clause requiring at least one of them.
//! - Windows: one literal per candidate window implying the interval lies
//!   inside it, plus a clause over the literals. Windows never overlap, so
//!   at most one literal can hold.
//! - Objective: integer variables for makespan and per-job tardiness tied to
//!   an objective variable by a linear equality. Weights are scaled to
//!   integer coefficients.
//!
//! The wall-clock limit is a Pumpkin [`TimeBudget`].
//!
//! # Reference
//! - Schutt et al. (2013), "Solving RCPSP/max by lazy clause generation"
//! - Baptiste et al. (2001), "Constraint-Based Scheduling", Ch. 2

use std::cell::Cell;
use std::time::{Duration, Instant};

use pumpkin_core::branching::branchers::dynamic_brancher::DynamicBrancher;
use pumpkin_core::branching::branchers::warm_start::WarmStart;
use pumpkin_core::branching::Brancher;
use pumpkin_core::constraints::{self, Constraint};
use pumpkin_core::optimisation::linear_sat_unsat::LinearSatUnsat;
use pumpkin_core::optimisation::linear_unsat_sat::LinearUnsatSat;
use pumpkin_core::optimisation::OptimisationDirection;
use pumpkin_core::proof::ConstraintTag;
use pumpkin_core::results::{OptimisationResult, ProblemSolution, SolutionReference};
use pumpkin_core::termination::TimeBudget;
use pumpkin_core::variables::{DomainId, TransformableVariable};
use pumpkin_core::{ConstraintOperationError, Solver};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::model::CpModel;

const EPS: f64 = 1e-9;

/// Objective weights are multiplied by this before rounding to coefficients.
const WEIGHT_SCALE: f64 = 10.0;

/// Optimisation procedure run by the solver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Procedure {
    /// Find a schedule, then tighten the objective bound until unsatisfiable.
    #[default]
    SatUnsat,
    /// Raise the objective lower bound until the first schedule appears.
    UnsatSat,
}

/// Search limits and options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Wall-clock limit.
    pub time_limit: Duration,
    /// Optimisation procedure.
    pub procedure: Procedure,
    /// Try every interval at its earliest start before the default branching.
    pub warm_start: bool,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            time_limit: Duration::from_secs(60),
            procedure: Procedure::SatUnsat,
            warm_start: false,
        }
    }
}

/// Raw solver outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CpStatus {
    /// Search completed with a proven best schedule.
    Optimal,
    /// Limit reached with a schedule.
    Feasible,
    /// No schedule exists.
    Infeasible,
    /// Limit reached without a schedule.
    Unknown,
}

/// Solver result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CpSolution {
    /// Outcome.
    pub status: CpStatus,
    /// Start per interval (empty when no solution).
    pub starts: Vec<i64>,
    /// Objective of `starts`.
    pub objective: f64,
    /// Proven lower bound.
    pub lower_bound: f64,
    /// Improving schedules reported during search.
    pub incumbent_updates: u64,
    /// Wall-clock time spent.
    pub elapsed: Duration,
}

impl CpSolution {
    fn without_schedule(status: CpStatus, lower_bound: f64, started: Instant) -> Self {
        Self {
            status,
            starts: Vec::new(),
            objective: 0.0,
            lower_bound,
            incumbent_updates: 0,
            elapsed: started.elapsed(),
        }
    }

    /// Whether a schedule was found.
    pub fn is_solution_found(&self) -> bool {
        matches!(self.status, CpStatus::Optimal | CpStatus::Feasible)
    }

    /// Relative gap `(objective - lower_bound) / objective`.
    pub fn gap(&self) -> f64 {
        if !self.is_solution_found() || self.status == CpStatus::Optimal || self.objective <= EPS {
            return 0.0;
        }
        ((self.objective - self.lower_bound) / self.objective).clamp(0.0, 1.0)
    }
}

/// A solver for [`CpModel`]s.
pub trait CpSolver {
    /// Solves `model` within the limits in `config`.
    fn solve(&self, model: &CpModel, config: &SolverConfig) -> CpSolution;
}

/// Solves [`CpModel`]s with Pumpkin.
///
/// A fresh Pumpkin instance is created per call. Search is single-threaded
/// with a fixed seed, so equal models and configs give equal schedules when
/// the search completes within the limit.
#[derive(Debug, Clone, Copy, Default)]
pub struct PumpkinSolver;

impl PumpkinSolver {
    /// Creates a solver.
    pub fn new() -> Self {
        Self
    }
}

impl CpSolver for PumpkinSolver {
    fn solve(&self, model: &CpModel, config: &SolverConfig) -> CpSolution {
        let started = Instant::now();
        let root_bound = model.lower_bound();

        let mut solver = Solver::default();
        let encoding = match Encoding::post(model, &mut solver) {
            Ok(encoding) => encoding,
            Err(RootConflict) => {
                debug!(model = %model.name, "infeasible at the root");
                return CpSolution::without_schedule(CpStatus::Infeasible, root_bound, started);
            }
        };

        let mut termination = TimeBudget::starting_now(config.time_limit);
        let incumbents = Cell::new(0u64);
        let result = if config.warm_start {
            let values: Vec<i32> = model.intervals.iter().map(|iv| to_i32(iv.start_min)).collect();
            let fallback = solver.default_brancher();
            let mut brancher = DynamicBrancher::new(vec![
                Box::new(WarmStart::new(&encoding.starts, &values)),
                Box::new(fallback),
            ]);
            optimise(&mut solver, &mut brancher, &mut termination, config.procedure, &encoding, &incumbents)
        } else {
            let mut brancher = solver.default_brancher();
            optimise(&mut solver, &mut brancher, &mut termination, config.procedure, &encoding, &incumbents)
        };

        let (status, starts) = match result {
            OptimisationResult::Optimal(solution) => (CpStatus::Optimal, encoding.read_starts(&solution)),
            OptimisationResult::Satisfiable(solution) => {
                (CpStatus::Feasible, encoding.read_starts(&solution))
            }
            OptimisationResult::Unsatisfiable => (CpStatus::Infeasible, Vec::new()),
            OptimisationResult::Unknown => (CpStatus::Unknown, Vec::new()),
        };

        if starts.is_empty() {
            debug!(model = %model.name, ?status, "no schedule");
            return CpSolution::without_schedule(status, root_bound, started);
        }

        let ends: Vec<i64> = starts
            .iter()
            .zip(&model.intervals)
            .map(|(s, iv)| s + iv.duration)
            .collect();
        let objective = model.objective.evaluate(&ends);
        let lower_bound = match status {
            CpStatus::Optimal => objective,
            _ => root_bound.min(objective),
        };

        debug!(
            model = %model.name,
            ?status,
            objective,
            lower_bound,
            incumbents = incumbents.get(),
            "pumpkin search finished"
        );

        CpSolution {
            status,
            starts,
            objective,
            lower_bound,
            incumbent_updates: incumbents.get(),
            elapsed: started.elapsed(),
        }
    }
}

fn optimise<B: Brancher>(
    solver: &mut Solver,
    brancher: &mut B,
    termination: &mut TimeBudget,
    procedure: Procedure,
    encoding: &Encoding,
    incumbents: &Cell<u64>,
) -> OptimisationResult {
    let on_solution = |_: &Solver, _: SolutionReference<'_>, _: &B| {
        incumbents.set(incumbents.get() + 1);
    };
    match procedure {
        Procedure::SatUnsat => solver.optimise(
            brancher,
            termination,
            LinearSatUnsat::new(OptimisationDirection::Minimise, encoding.objective, on_solution),
        ),
        Procedure::UnsatSat => solver.optimise(
            brancher,
            termination,
            LinearUnsatSat::new(OptimisationDirection::Minimise, encoding.objective, on_solution),
        ),
    }
}

/// The model conflicts before any search.
#[derive(Debug, Clone, Copy)]
struct RootConflict;

impl From<ConstraintOperationError> for RootConflict {
    fn from(_: ConstraintOperationError) -> Self {
        RootConflict
    }
}

/// Pumpkin variables standing for a [`CpModel`].
struct Encoding {
    starts: Vec<DomainId>,
    objective: DomainId,
}

impl Encoding {
    fn post(model: &CpModel, solver: &mut Solver) -> Result<Self, RootConflict> {
        let tag = solver.new_constraint_tag();

        let mut starts = Vec::with_capacity(model.intervals.len());
        for iv in &model.intervals {
            let latest = iv.start_max.min(iv.end_max - iv.duration);
            if latest < iv.start_min {
                return Err(RootConflict);
            }
            let start = solver.new_bounded_integer(to_i32(iv.start_min), to_i32(latest));
            if let Some(windows) = &iv.windows {
                let candidates: Vec<(i64, i64)> = windows
                    .iter()
                    .map(|w| (w.start.max(iv.start_min), (w.end - iv.duration).min(latest)))
                    .filter(|(lo, hi)| lo <= hi)
                    .collect();
                post_window_choice(solver, start, &candidates, tag)?;
            }
            starts.push(start);
        }

        for p in &model.precedences {
            let lag = model.intervals[p.before].duration + p.min_gap;
            constraints::less_than_or_equals(
                [starts[p.before].scaled(1), starts[p.after].scaled(-1)],
                to_i32(-lag),
                tag,
            )
            .post(solver)?;
        }

        for group in &model.no_overlaps {
            for (k, &a) in group.intervals.iter().enumerate() {
                for &b in &group.intervals[k + 1..] {
                    let a_first = solver.new_literal();
                    let b_first = solver.new_literal();
                    constraints::less_than_or_equals(
                        [starts[a].scaled(1), starts[b].scaled(-1)],
                        to_i32(-model.intervals[a].duration),
                        tag,
                    )
                    .implied_by(solver, a_first)?;
                    constraints::less_than_or_equals(
                        [starts[b].scaled(1), starts[a].scaled(-1)],
                        to_i32(-model.intervals[b].duration),
                        tag,
                    )
                    .implied_by(solver, b_first)?;
                    solver.add_clause(
                        [a_first.get_true_predicate(), b_first.get_true_predicate()],
                        tag,
                    )?;
                }
            }
        }

        let objective = post_objective(model, solver, &starts, tag)?;
        Ok(Self { starts, objective })
    }

    fn read_starts(&self, solution: &impl ProblemSolution) -> Vec<i64> {
        self.starts
            .iter()
            .map(|&s| i64::from(solution.get_integer_value(s)))
            .collect()
    }
}

/// `start` lies in one of the `[earliest, latest]` ranges.
fn post_window_choice(
    solver: &mut Solver,
    start: DomainId,
    candidates: &[(i64, i64)],
    tag: ConstraintTag,
) -> Result<(), RootConflict> {
    if candidates.is_empty() {
        return Err(RootConflict);
    }
    let mut clause = Vec::with_capacity(candidates.len());
    for &(earliest, latest) in candidates {
        let inside = solver.new_literal();
        constraints::less_than_or_equals([start.scaled(-1)], to_i32(-earliest), tag)
            .implied_by(solver, inside)?;
        constraints::less_than_or_equals([start.scaled(1)], to_i32(latest), tag)
            .implied_by(solver, inside)?;
        clause.push(inside.get_true_predicate());
    }
    solver.add_clause(clause, tag)?;
    Ok(())
}

/// Makespan, tardiness, and the weighted objective variable.
fn post_objective(
    model: &CpModel,
    solver: &mut Solver,
    starts: &[DomainId],
    tag: ConstraintTag,
) -> Result<DomainId, RootConflict> {
    let makespan_coef = coefficient(model.objective.makespan_weight);
    let tardiness_coef = coefficient(model.objective.tardiness_weight);

    let latest_end = model.intervals.iter().map(|iv| iv.end_max).max().unwrap_or(0).max(0);
    let makespan = solver.new_bounded_integer(0, to_i32(latest_end));
    for (iv, start) in model.intervals.iter().zip(starts) {
        constraints::less_than_or_equals(
            [start.scaled(1), makespan.scaled(-1)],
            to_i32(-iv.duration),
            tag,
        )
        .post(solver)?;
    }

    let mut terms = Vec::new();
    let mut upper = 0i64;
    if makespan_coef > 0 {
        terms.push(makespan.scaled(makespan_coef));
        upper += i64::from(makespan_coef) * latest_end;
    }

    for due in &model.objective.due_dates {
        let iv = &model.intervals[due.interval];
        let worst = (iv.end_max - due.due).max(0);
        let tardiness = solver.new_bounded_integer(0, to_i32(worst));
        constraints::less_than_or_equals(
            [starts[due.interval].scaled(1), tardiness.scaled(-1)],
            to_i32(due.due - iv.duration),
            tag,
        )
        .post(solver)?;
        if tardiness_coef > 0 {
            terms.push(tardiness.scaled(tardiness_coef));
            upper += i64::from(tardiness_coef) * worst;
        }
    }

    let objective = solver.new_bounded_integer(0, to_i32(upper));
    terms.push(objective.scaled(-1));
    constraints::equals(terms, 0, tag).post(solver)?;
    Ok(objective)
}

/// Integer coefficient for a non-negative weight; positive weights stay positive.
fn coefficient(weight: f64) -> i32 {
    if weight <= 0.0 {
        return 0;
    }
    to_i32(((weight * WEIGHT_SCALE).round() as i64).max(1))
}

#[inline]
fn to_i32(value: i64) -> i32 {
    value.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cp::model::{DueDate, IntervalVar, Objective};
    use crate::models::TimeWindow;

    /// Two jobs of two operations on one machine.
    fn two_job_model() -> CpModel {
        let h = 1000;
        let mut m = CpModel::new("two-job", h);
        let a1 = m.add_interval(IntervalVar::new("J1_O1", 0, 0, h - 30, 30, h));
        let a2 = m.add_interval(IntervalVar::new("J1_O2", 0, 0, h - 30, 30, h));
        let b1 = m.add_interval(IntervalVar::new("J2_O1", 1, 0, h - 20, 20, h));
        let b2 = m.add_interval(IntervalVar::new("J2_O2", 1, 0, h - 20, 20, h));
        m.add_precedence(a1, a2, 0);
        m.add_precedence(b1, b2, 0);
        m.add_no_overlap("M1", vec![a1, a2, b1, b2]);
        m.set_objective(Objective {
            makespan_weight: 1.0,
            tardiness_weight: 10.0,
            due_dates: vec![
                DueDate { interval: a2, due: 100 },
                DueDate { interval: b2, due: 40 },
            ],
        });
        m
    }

    /// Two jobs crossing two machines in opposite order.
    fn crossing_model() -> CpModel {
        let h = 500;
        let mut m = CpModel::new("crossing", h);
        let a1 = m.add_interval(IntervalVar::new("J1_O1", 0, 0, h, 40, h));
        let a2 = m.add_interval(IntervalVar::new("J1_O2", 0, 0, h, 10, h));
        let b1 = m.add_interval(IntervalVar::new("J2_O1", 1, 0, h, 10, h));
        let b2 = m.add_interval(IntervalVar::new("J2_O2", 1, 0, h, 40, h));
        m.add_precedence(a1, a2, 0);
        m.add_precedence(b1, b2, 0);
        m.add_no_overlap("M1", vec![a1, b2]);
        m.add_no_overlap("M2", vec![a2, b1]);
        m
    }

    #[test]
    fn test_solve_optimal() {
        let model = two_job_model();
        let sol = PumpkinSolver::new().solve(&model, &SolverConfig::default());
        assert_eq!(sol.status, CpStatus::Optimal);
        assert!(model.is_feasible(&sol.starts));
        // J2 first: ends 40, J1 ends 100 -> objective = makespan 100
        assert!((sol.objective - 100.0).abs() < 1e-10);
        assert!(sol.gap().abs() < 1e-10);
        assert!(sol.incumbent_updates >= 1);
    }

    #[test]
    fn test_procedures_agree() {
        let model = crossing_model();
        let lsu = PumpkinSolver::new().solve(&model, &SolverConfig::default());
        let usat = PumpkinSolver::new().solve(
            &model,
            &SolverConfig {
                procedure: Procedure::UnsatSat,
                ..SolverConfig::default()
            },
        );
        let warm = PumpkinSolver::new().solve(
            &model,
            &SolverConfig {
                warm_start: true,
                ..SolverConfig::default()
            },
        );
        // M1 carries 80 minutes of work; J1_O1 first reaches that bound.
        for sol in [&lsu, &usat, &warm] {
            assert_eq!(sol.status, CpStatus::Optimal);
            assert!(model.is_feasible(&sol.starts));
            assert!((sol.objective - 80.0).abs() < 1e-10);
        }
    }

    #[test]
    fn test_zero_time_limit_is_unknown() {
        let model = crossing_model();
        let config = SolverConfig {
            time_limit: Duration::ZERO,
            ..SolverConfig::default()
        };
        let sol = PumpkinSolver::new().solve(&model, &config);
        assert_eq!(sol.status, CpStatus::Unknown);
        assert!(!sol.is_solution_found());
        assert!(sol.starts.is_empty());
    }

    #[test]
    fn test_feasible_gap_uses_lower_bound() {
        let sol = CpSolution {
            status: CpStatus::Feasible,
            starts: vec![0],
            objective: 200.0,
            lower_bound: 150.0,
            incumbent_updates: 1,
            elapsed: Duration::ZERO,
        };
        assert!((sol.gap() - 0.25).abs() < 1e-10);
    }

    #[test]
    fn test_lower_bound_never_exceeds_objective() {
        let model = crossing_model();
        let sol = PumpkinSolver::new().solve(&model, &SolverConfig::default());
        assert!(model.lower_bound() <= sol.objective + 1e-10);
        assert!((model.lower_bound() - 80.0).abs() < 1e-10);
    }

    #[test]
    fn test_windows_respected() {
        let h = 1000;
        let mut m = CpModel::new("windows", h);
        let windows = [TimeWindow::new(0, 50), TimeWindow::new(100, 200)];
        let a = m.add_interval(IntervalVar::new("A", 0, 0, h, 40, h).with_windows(&windows));
        let b = m.add_interval(IntervalVar::new("B", 1, 0, h, 40, h).with_windows(&windows));
        m.add_no_overlap("M1", vec![a, b]);

        let sol = PumpkinSolver::new().solve(&m, &SolverConfig::default());
        assert_eq!(sol.status, CpStatus::Optimal);
        assert!(m.is_feasible(&sol.starts));
        assert!((sol.objective - 140.0).abs() < 1e-10);
    }

    #[test]
    fn test_infeasible_windows() {
        let h = 1000;
        let mut m = CpModel::new("tight", h);
        m.add_interval(
            IntervalVar::new("A", 0, 0, h, 60, h).with_windows(&[TimeWindow::new(0, 50)]),
        );
        let sol = PumpkinSolver::new().solve(&m, &SolverConfig::default());
        assert_eq!(sol.status, CpStatus::Infeasible);
    }

    #[test]
    fn test_precedence_cycle_is_infeasible() {
        let mut m = CpModel::new("cycle", 100);
        let a = m.add_interval(IntervalVar::new("A", 0, 0, 90, 10, 100));
        let b = m.add_interval(IntervalVar::new("B", 0, 0, 90, 10, 100));
        m.add_precedence(a, b, 0);
        m.add_precedence(b, a, 0);
        let sol = PumpkinSolver::new().solve(&m, &SolverConfig::default());
        assert_eq!(sol.status, CpStatus::Infeasible);
    }

    #[test]
    fn test_deterministic() {
        let model = two_job_model();
        let s1 = PumpkinSolver::new().solve(&model, &SolverConfig::default());
        let s2 = PumpkinSolver::new().solve(&model, &SolverConfig::default());
        assert_eq!(s1.starts, s2.starts);
        assert!((s1.objective - s2.objective).abs() < 1e-10);
    }

    #[test]
    fn test_coefficient_scaling() {
        assert_eq!(coefficient(0.0), 0);
        assert_eq!(coefficient(-1.0), 0);
        assert_eq!(coefficient(0.01), 1);
        assert_eq!(coefficient(1.0), 10);
        assert_eq!(coefficient(10.0), 100);
    }
}
