//! Constraint model for disjunctive scheduling.
//!
//! A [`CpModel`] holds fixed-duration interval variables, precedence
//! constraints with minimum gaps, no-overlap groups, optional
//! working-window alternatives per interval, and a weighted
//! makespan + tardiness objective.
//!
//! # Reference
//! - Laborie et al. (2018), "IBM ILOG CP Optimizer for Scheduling"
//! - Baptiste et al. (2001), "Constraint-Based Scheduling"

use serde::{Deserialize, Serialize};

use crate::models::TimeWindow;

/// A fixed-duration interval variable.
///
/// Domain: `start in [start_min, start_max]`, `end = start + duration`,
/// `end <= end_max`. When `windows` is set the whole interval must lie
/// inside exactly one of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntervalVar {
    /// Interval name (operation id).
    pub name: String,
    /// Owning group (job index), used for branching heuristics.
    pub group: usize,
    /// Earliest start.
    pub start_min: i64,
    /// Latest start.
    pub start_max: i64,
    /// Fixed length.
    pub duration: i64,
    /// Latest end.
    pub end_max: i64,
    /// Candidate windows, each long enough to hold the interval.
    pub windows: Option<Vec<TimeWindow>>,
}

impl IntervalVar {
    /// Creates an interval with no window restriction.
    pub fn new(
        name: impl Into<String>,
        group: usize,
        start_min: i64,
        start_max: i64,
        duration: i64,
        end_max: i64,
    ) -> Self {
        Self {
            name: name.into(),
            group,
            start_min,
            start_max,
            duration,
            end_max,
            windows: None,
        }
    }

    /// Restricts the interval to one of `windows`.
    ///
    /// Windows shorter than the interval are dropped.
    pub fn with_windows(mut self, windows: &[TimeWindow]) -> Self {
        let candidates = windows
            .iter()
            .copied()
            .filter(|w| w.length() >= self.duration)
            .collect();
        self.windows = Some(candidates);
        self
    }

    /// Earliest feasible start at or after `earliest`, if any.
    pub fn earliest_start(&self, earliest: i64) -> Option<i64> {
        let earliest = earliest.max(self.start_min);
        let start = match &self.windows {
            None => Some(earliest),
            Some(windows) => windows
                .iter()
                .map(|w| (earliest.max(w.start), w.end))
                .find(|(s, end)| s + self.duration <= *end)
                .map(|(s, _)| s),
        }?;
        (start <= self.start_max && start + self.duration <= self.end_max).then_some(start)
    }
}

/// `start(after) >= end(before) + min_gap`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Precedence {
    /// Predecessor interval index.
    pub before: usize,
    /// Successor interval index.
    pub after: usize,
    /// Minimum gap (minutes).
    pub min_gap: i64,
}

/// Intervals that must not overlap pairwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoOverlap {
    /// Resource name (machine id).
    pub resource: String,
    /// Member interval indices.
    pub intervals: Vec<usize>,
}

/// A tardiness term: `max(0, end(interval) - due)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DueDate {
    /// Interval index (last operation of a job).
    pub interval: usize,
    /// Due time.
    pub due: i64,
}

/// Weighted objective: `makespan_weight * makespan + tardiness_weight * sum(tardiness)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Objective {
    /// Weight on makespan.
    pub makespan_weight: f64,
    /// Weight on summed tardiness.
    pub tardiness_weight: f64,
    /// Tardiness terms.
    pub due_dates: Vec<DueDate>,
}

impl Objective {
    /// Evaluates the objective for complete `ends`.
    pub fn evaluate(&self, ends: &[i64]) -> f64 {
        let makespan = ends.iter().copied().max().unwrap_or(0);
        self.evaluate_parts(makespan, self.tardiness(ends))
    }

    /// Summed tardiness for complete `ends`.
    pub fn tardiness(&self, ends: &[i64]) -> i64 {
        self.due_dates
            .iter()
            .map(|d| (ends[d.interval] - d.due).max(0))
            .sum()
    }

    /// Weighted value from makespan and tardiness.
    #[inline]
    pub fn evaluate_parts(&self, makespan: i64, tardiness: i64) -> f64 {
        self.makespan_weight * makespan as f64 + self.tardiness_weight * tardiness as f64
    }
}

impl Default for Objective {
    fn default() -> Self {
        Self {
            makespan_weight: 1.0,
            tardiness_weight: 0.0,
            due_dates: Vec::new(),
        }
    }
}

/// A complete constraint model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CpModel {
    /// Model name.
    pub name: String,
    /// Planning horizon.
    pub horizon: i64,
    /// Interval variables.
    pub intervals: Vec<IntervalVar>,
    /// Precedence constraints.
    pub precedences: Vec<Precedence>,
    /// No-overlap groups.
    pub no_overlaps: Vec<NoOverlap>,
    /// Objective.
    pub objective: Objective,
}

impl CpModel {
    /// Creates an empty model.
    pub fn new(name: impl Into<String>, horizon: i64) -> Self {
        Self {
            name: name.into(),
            horizon,
            intervals: Vec::new(),
            precedences: Vec::new(),
            no_overlaps: Vec::new(),
            objective: Objective::default(),
        }
    }

    /// Adds an interval and returns its index.
    pub fn add_interval(&mut self, interval: IntervalVar) -> usize {
        self.intervals.push(interval);
        self.intervals.len() - 1
    }

    /// Adds a precedence constraint.
    pub fn add_precedence(&mut self, before: usize, after: usize, min_gap: i64) {
        self.precedences.push(Precedence {
            before,
            after,
            min_gap,
        });
    }

    /// Adds a no-overlap group.
    pub fn add_no_overlap(&mut self, resource: impl Into<String>, intervals: Vec<usize>) {
        self.no_overlaps.push(NoOverlap {
            resource: resource.into(),
            intervals,
        });
    }

    /// Sets the objective.
    pub fn set_objective(&mut self, objective: Objective) {
        self.objective = objective;
    }

    /// Number of interval variables.
    pub fn interval_count(&self) -> usize {
        self.intervals.len()
    }

    /// Number of constraints (precedence + no-overlap).
    pub fn constraint_count(&self) -> usize {
        self.precedences.len() + self.no_overlaps.len()
    }

    /// Index of an interval by name.
    pub fn interval_index(&self, name: &str) -> Option<usize> {
        self.intervals.iter().position(|i| i.name == name)
    }

    /// Objective bound from earliest ends and no-overlap workloads.
    pub fn lower_bound(&self) -> f64 {
        let earliest_ends: Vec<i64> = self
            .intervals
            .iter()
            .map(|iv| iv.start_min + iv.duration)
            .collect();
        let chain = earliest_ends.iter().copied().max().unwrap_or(0);
        let load = self
            .no_overlaps
            .iter()
            .map(|group| {
                let release = group
                    .intervals
                    .iter()
                    .map(|&i| self.intervals[i].start_min)
                    .min()
                    .unwrap_or(0);
                release + group.intervals.iter().map(|&i| self.intervals[i].duration).sum::<i64>()
            })
            .max()
            .unwrap_or(0);
        self.objective
            .evaluate_parts(chain.max(load), self.objective.tardiness(&earliest_ends))
    }

    /// Checks a complete assignment of starts against every constraint.
    pub fn is_feasible(&self, starts: &[i64]) -> bool {
        if starts.len() != self.intervals.len() {
            return false;
        }
        let ends: Vec<i64> = self
            .intervals
            .iter()
            .zip(starts)
            .map(|(iv, s)| s + iv.duration)
            .collect();

        let domains_ok = self.intervals.iter().zip(starts).all(|(iv, &s)| {
            s >= iv.start_min
                && s <= iv.start_max
                && s + iv.duration <= iv.end_max
                && iv
                    .windows
                    .as_ref()
                    .map_or(true, |ws| ws.iter().any(|w| w.fits(s, iv.duration)))
        });
        let precedence_ok = self
            .precedences
            .iter()
            .all(|p| starts[p.after] >= ends[p.before] + p.min_gap);
        let overlap_ok = self.no_overlaps.iter().all(|group| {
            let mut members: Vec<(i64, i64)> = group
                .intervals
                .iter()
                .map(|&i| (starts[i], ends[i]))
                .collect();
            members.sort_unstable();
            members.windows(2).all(|w| w[0].1 <= w[1].0)
        });

        domains_ok && precedence_ok && overlap_ok
    }
}
