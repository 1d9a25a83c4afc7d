//! Tier-1 constraint scheduling, greedy baselines, and KPI evaluation.
//!
//! # Algorithm
//!
//! `ConstraintScheduler` builds a constraint model from the problem and
//! solves it under a wall-clock limit. `BaselineScheduler` uses a greedy
//! FIFO or EDD heuristic and serves only as a yardstick.
//!
//! # KPI
//!
//! `ScheduleKpi` computes standard scheduling metrics: makespan, tardiness,
//! on-time rate, utilization, and flow time. `Improvement` compares two
//! solutions.
//!
//! # References
//!
//! - Pinedo (2016), "Scheduling: Theory, Algorithms, and Systems", Ch. 3-4
//! - Baker & Trietsch (2019), "Principles of Sequencing and Scheduling"

mod baseline;
mod constraint;
mod kpi;

pub use baseline::{BaselineRule, BaselineScheduler};
pub use constraint::ConstraintScheduler;
pub use kpi::{Improvement, ScheduleKpi};
