//! Job ordering rules for the baseline heuristics.
//!
//! A baseline orders jobs once, then places their operations greedily.
//! FIFO orders by creation and EDD by due time; the [`RuleEngine`]
//! chains rules so that a later rule only decides ties left by the
//! earlier ones.
//!
//! # Usage
//!
//! ```
//! use hybrid_schedule::dispatching::{RuleEngine, SchedulingContext};
//! use hybrid_schedule::dispatching::rules;
//! use hybrid_schedule::models::Job;
//!
//! let jobs = vec![Job::new("J1").with_due(500), Job::new("J2").with_due(100)];
//! let engine = RuleEngine::new().with_rule(rules::Edd).then_by(rules::Fifo);
//!
//! let context = SchedulingContext::for_jobs(&jobs);
//! assert_eq!(engine.sort_indices(&jobs, &context), vec![1, 0]);
//! ```
//!
//! # References
//!
//! - Pinedo (2016), "Scheduling: Theory, Algorithms, and Systems", Ch. 4
//! - Jackson (1955), "Scheduling a production line to minimize maximum tardiness"

mod context;
mod engine;
pub mod rules;

pub use context::SchedulingContext;
pub use engine::{RuleEngine, TieBreaker};

use std::fmt::Debug;

use crate::models::Job;

/// Score returned by a rule. Lower scores are scheduled first.
pub type RuleScore = f64;

/// A job ordering criterion.
pub trait DispatchingRule: Send + Sync + Debug {
    /// Short upper-case name ("FIFO", "EDD").
    fn name(&self) -> &'static str;

    fn evaluate(&self, job: &Job, context: &SchedulingContext) -> RuleScore;
}
