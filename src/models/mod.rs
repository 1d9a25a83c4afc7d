//! Scheduling domain models.
//!
//! Plain data records for job-shop problems and their solutions. All times
//! are integer minutes relative to the problem's planning epoch.
//!
//! # Domain Mappings
//!
//! | hybrid-schedule | Manufacturing | Notes |
//! |-----------------|---------------|-------|
//! | Job | Production order | Ordered chain of operations |
//! | Operation | Routing step | Pinned to its first eligible machine |
//! | Machine | Work center | Working hours + holiday calendar |
//! | SchedulingSolution | Production plan | Output of one solve |

mod calendar;
mod job;
mod machine;
mod operation;
mod problem;
mod solution;

pub use calendar::{
    available_minutes, expand_windows, HolidayCalendar, TimeWindow, WorkingHourSlot,
    MINUTES_PER_DAY,
};
pub use job::Job;
pub use machine::Machine;
pub use operation::Operation;
pub use problem::{default_epoch, ObjectiveWeights, SchedulingConfig, SchedulingProblem, SolverStrategy};
pub use solution::{
    machine_utilization, ScheduledOperation, SchedulingSolution, SolutionStatus, SolveStats,
};
