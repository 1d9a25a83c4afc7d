//! Hybrid job-shop scheduling engine.
//!
//! Computes an offline baseline schedule with a constraint model (Tier 1)
//! and adjusts it in real time with learned policies when disruptions
//! invalidate it (Tier 2).
//!
//! # Modules
//!
//! - **`models`**: Domain records: `Operation`, `Job`, `Machine`,
//!   `WorkingHourSlot`, `SchedulingProblem`, `SchedulingConfig`,
//!   `SchedulingSolution`
//! - **`validation`**: Input integrity checks (duplicate ids, machine refs,
//!   sequence order, due ≥ release)
//! - **`cp`**: Constraint model and its Pumpkin-backed solver
//! - **`dispatching`**: Job ordering rules for the greedy baselines
//! - **`scheduler`**: Tier-1 constraint scheduler, FIFO/EDD baselines, KPIs
//! - **`env`**: Tier-2 simulator: padded state, disruptions, seven action
//!   handlers, and the step transition
//! - **`encoder`**: Fixed-layout feature vectors for the agents
//! - **`reward`**: Sparse, dense, shaped, and multi-objective rewards
//! - **`agents`**: PPO and discrete SAC over the factorized action space
//! - **`orchestrator`**: Runs Tier 1 then Tier 2; disruption handling,
//!   recommendations, idempotent adjustments, agent registry, data sources
//! - **`config`**: Aggregate TOML configuration
//! - **`error`**, **`telemetry`**: Error taxonomy and logging bootstrap
//!
//! # Time
//!
//! All times are integer minutes relative to the problem's planning epoch.
//!
//! # Example
//!
//! ```no_run
//! use hybrid_schedule::config::HybridConfig;
//! use hybrid_schedule::env::DisruptionType;
//! use hybrid_schedule::models::{default_epoch, Job, Machine, Operation, SchedulingProblem};
//! use hybrid_schedule::orchestrator::HybridOrchestrator;
//!
//! # fn main() -> hybrid_schedule::error::Result<()> {
//! let problem = SchedulingProblem::new(default_epoch())
//!     .with_machine(Machine::new("M1", "CNC"))
//!     .with_job(
//!         Job::new("J1")
//!             .with_due(120)
//!             .with_operation(Operation::new("J1_O1", "J1", 1).with_duration(60).with_machine("M1")),
//!     );
//!
//! let mut engine = HybridOrchestrator::new(HybridConfig::default())?;
//! let run = engine.schedule(problem)?;
//! println!("{:?} makespan={}", run.solution.status, run.solution.makespan);
//!
//! for rec in engine.handle_disruption(DisruptionType::MachineBreakdown, "M1", 90)? {
//!     println!("{:?} {:?} ({:.2})", rec.action_type, rec.target_operation, rec.confidence);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # References
//!
//! - Pinedo (2016), "Scheduling: Theory, Algorithms, and Systems"
//! - Ng, Harada & Russell (1999), "Policy invariance under reward transformations"
//! - Schulman et al. (2017), "Proximal Policy Optimization Algorithms"
//! - Christodoulou (2019), "Soft Actor-Critic for Discrete Action Settings"

pub mod agents;
pub mod config;
pub mod cp;
pub mod dispatching;
pub mod encoder;
pub mod env;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod reward;
pub mod scheduler;
pub mod telemetry;
pub mod validation;

pub use error::{ActionError, Result, SchedulingError};
