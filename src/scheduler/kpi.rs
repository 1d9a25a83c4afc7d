//! Schedule quality metrics (KPIs).
//!
//! Computes standard scheduling performance indicators from a solution
//! and its problem, and the improvement of one solution over another.
//!
//! # Metrics
//!
//! | Metric | Definition |
//! |--------|-----------|
//! | Makespan (C_max) | Latest completion time |
//! | Total Tardiness | Sum of max(0, completion - due) |
//! | Maximum Tardiness | Largest single delay |
//! | On-Time Rate | Fraction meeting due times |
//! | Avg Utilization | Mean machine busyness |
//! | Avg Flow Time | Mean time from release to completion |
//!
//! # Reference
//! Pinedo (2016), "Scheduling", Ch. 1.2: Performance Measures

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::models::{SchedulingProblem, SchedulingSolution};

/// Schedule performance indicators.
///
/// All time values are in minutes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleKpi {
    /// Makespan: latest completion time.
    pub makespan: i64,
    /// Sum of tardiness across all jobs.
    pub total_tardiness: i64,
    /// Maximum tardiness of any single job.
    pub max_tardiness: i64,
    /// Jobs finishing after their due time.
    pub late_jobs: usize,
    /// Fraction of jobs completing on time (0.0..1.0).
    pub on_time_rate: f64,
    /// Average machine utilization (0.0..1.0).
    pub avg_utilization: f64,
    /// Per-machine utilization.
    pub utilization_by_machine: HashMap<String, f64>,
    /// Average flow time: mean(completion - release).
    pub avg_flow_time: f64,
}

impl ScheduleKpi {
    /// Computes KPIs from a solution and its problem.
    ///
    /// Jobs without scheduled operations are not counted.
    pub fn calculate(solution: &SchedulingSolution, problem: &SchedulingProblem) -> Self {
        let mut total_tardiness: i64 = 0;
        let mut max_tardiness: i64 = 0;
        let mut on_time_count: usize = 0;
        let mut total_flow_time: f64 = 0.0;
        let mut counted_jobs: usize = 0;

        for job in &problem.jobs {
            if let Some(completion) = solution.job_completion(&job.id) {
                counted_jobs += 1;
                total_flow_time += (completion - job.release_minutes) as f64;

                let tardiness = job.tardiness_at(completion);
                if tardiness > 0 {
                    total_tardiness += tardiness;
                    max_tardiness = max_tardiness.max(tardiness);
                } else {
                    on_time_count += 1;
                }
            }
        }

        let on_time_rate = if counted_jobs == 0 {
            1.0
        } else {
            on_time_count as f64 / counted_jobs as f64
        };

        let avg_flow_time = if counted_jobs == 0 {
            0.0
        } else {
            total_flow_time / counted_jobs as f64
        };

        Self {
            makespan: solution.makespan,
            total_tardiness,
            max_tardiness,
            late_jobs: counted_jobs - on_time_count,
            on_time_rate,
            avg_utilization: solution.average_utilization(),
            utilization_by_machine: solution.machine_utilization.clone(),
            avg_flow_time,
        }
    }

    /// Whether the schedule meets the given quality thresholds.
    pub fn meets_thresholds(&self, max_tardiness: i64, min_utilization: f64) -> bool {
        self.max_tardiness <= max_tardiness && self.avg_utilization >= min_utilization
    }
}

/// Improvement of an optimized solution over a baseline.
///
/// Percentages are reductions relative to the baseline; positive means
/// the optimized solution is better.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Improvement {
    /// Makespan reduction (%).
    pub makespan_pct: f64,
    /// Total tardiness reduction (%).
    pub tardiness_pct: f64,
    /// Late jobs removed (baseline minus optimized).
    pub late_jobs_reduced: i64,
}

impl Improvement {
    /// Compares `optimized` against `baseline`.
    pub fn between(baseline: &SchedulingSolution, optimized: &SchedulingSolution) -> Self {
        Self {
            makespan_pct: reduction_pct(baseline.makespan, optimized.makespan),
            tardiness_pct: reduction_pct(baseline.total_tardiness, optimized.total_tardiness),
            late_jobs_reduced: baseline.late_jobs as i64 - optimized.late_jobs as i64,
        }
    }
}

fn reduction_pct(baseline: i64, optimized: i64) -> f64 {
    if baseline <= 0 {
        0.0
    } else {
        (baseline - optimized) as f64 / baseline as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{default_epoch, Job, Machine, Operation};
    use crate::scheduler::BaselineScheduler;

    fn make_problem(jobs: &[(&str, i64, i64, i64)]) -> SchedulingProblem {
        let mut p = SchedulingProblem::new(default_epoch()).with_machine(Machine::new("M1", "CNC"));
        for &(id, work, release, due) in jobs {
            p = p.with_job(
                Job::new(id)
                    .with_release(release)
                    .with_due(due)
                    .with_operation(Operation::new(format!("{id}_O1"), id, 1).with_duration(work).with_machine("M1")),
            );
        }
        p
    }

    #[test]
    fn test_kpi_basic() {
        let problem = make_problem(&[("J1", 10, 0, 500), ("J2", 20, 0, 500)]);
        let solution = BaselineScheduler::fifo().schedule(&problem);
        let kpi = ScheduleKpi::calculate(&solution, &problem);
        assert_eq!(kpi.makespan, 30);
        assert_eq!(kpi.total_tardiness, 0);
        assert!((kpi.on_time_rate - 1.0).abs() < 1e-10);
        assert!((kpi.avg_flow_time - 20.0).abs() < 1e-10); // (10 + 30) / 2
        assert!((kpi.avg_utilization - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_kpi_tardiness() {
        let problem = make_problem(&[("J1", 100, 0, 50), ("J2", 100, 0, 500)]);
        let solution = BaselineScheduler::fifo().schedule(&problem);
        let kpi = ScheduleKpi::calculate(&solution, &problem);
        assert_eq!(kpi.total_tardiness, 50);
        assert_eq!(kpi.max_tardiness, 50);
        assert_eq!(kpi.late_jobs, 1);
        assert!((kpi.on_time_rate - 0.5).abs() < 1e-10);
        assert!(kpi.meets_thresholds(50, 0.0));
        assert!(!kpi.meets_thresholds(49, 0.0));
    }

    #[test]
    fn test_kpi_flow_time_uses_release() {
        let problem = make_problem(&[("J1", 10, 40, 500)]);
        let solution = BaselineScheduler::fifo().schedule(&problem);
        let kpi = ScheduleKpi::calculate(&solution, &problem);
        assert!((kpi.avg_flow_time - 10.0).abs() < 1e-10);
    }

    #[test]
    fn test_kpi_empty() {
        let problem = make_problem(&[]);
        let solution = BaselineScheduler::fifo().schedule(&problem);
        let kpi = ScheduleKpi::calculate(&solution, &problem);
        assert_eq!(kpi.makespan, 0);
        assert!((kpi.on_time_rate - 1.0).abs() < 1e-10);
        assert!(kpi.avg_utilization.abs() < 1e-10);
    }

    #[test]
    fn test_improvement() {
        let problem = make_problem(&[("J1", 60, 0, 100), ("J2", 40, 0, 40)]);
        let fifo = BaselineScheduler::fifo().schedule(&problem);
        let edd = BaselineScheduler::edd().schedule(&problem);
        let imp = Improvement::between(&fifo, &edd);
        assert!(imp.makespan_pct.abs() < 1e-10);
        // FIFO tardiness 60, EDD tardiness 0
        assert!((imp.tardiness_pct - 100.0).abs() < 1e-10);
        assert_eq!(imp.late_jobs_reduced, 1);
    }

    #[test]
    fn test_improvement_zero_baseline() {
        assert!(reduction_pct(0, 10).abs() < 1e-10);
        assert!((reduction_pct(200, 150) - 25.0).abs() < 1e-10);
    }
}
