//! Input validation for scheduling problems.
//!
//! Checks structural integrity of jobs, operations, and machines before
//! a model is built. Detects:
//! - Duplicate IDs
//! - Empty jobs and operations without eligible machines
//! - Unknown machine or calendar references
//! - Non-increasing sequence numbers within a job
//! - Due times before release times
//! - Non-positive durations and capacities

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::models::SchedulingProblem;

/// Validation result.
pub type ValidationResult = Result<(), Vec<ValidationError>>;

/// A validation error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    /// Error category.
    pub kind: ValidationErrorKind,
    /// Human-readable description.
    pub message: String,
}

/// Categories of validation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationErrorKind {
    /// Two entities share the same ID.
    DuplicateId,
    /// A job has no operations.
    EmptyJob,
    /// An operation lists no eligible machines.
    NoEligibleMachine,
    /// An operation references a machine that doesn't exist.
    InvalidMachineReference,
    /// Every eligible machine of an operation is unavailable.
    NoAvailableMachine,
    /// A machine references a holiday calendar that doesn't exist.
    InvalidCalendarReference,
    /// Sequence numbers within a job are not strictly increasing.
    InvalidSequence,
    /// An operation's `job_id` doesn't match its parent job.
    JobMismatch,
    /// A job's due time precedes its release time.
    DueBeforeRelease,
    /// A duration, setup time, or release time is out of range.
    InvalidDuration,
    /// A machine's capacity is below one.
    InvalidCapacity,
}

impl ValidationError {
    fn new(kind: ValidationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

/// Validates the input data for a scheduling problem.
///
/// # Returns
/// `Ok(())` if all checks pass, `Err(errors)` with all detected issues.
pub fn validate_problem(problem: &SchedulingProblem) -> ValidationResult {
    let mut errors = Vec::new();

    let calendar_ids: HashSet<&str> = problem.calendars.iter().map(|c| c.id.as_str()).collect();

    let mut machine_ids = HashSet::new();
    for m in &problem.machines {
        if !machine_ids.insert(m.id.as_str()) {
            errors.push(ValidationError::new(
                ValidationErrorKind::DuplicateId,
                format!("Duplicate machine ID: {}", m.id),
            ));
        }
        if m.capacity < 1 {
            errors.push(ValidationError::new(
                ValidationErrorKind::InvalidCapacity,
                format!("Machine '{}' has capacity {}", m.id, m.capacity),
            ));
        }
        if let Some(cal) = &m.holiday_calendar {
            if !calendar_ids.contains(cal.as_str()) {
                errors.push(ValidationError::new(
                    ValidationErrorKind::InvalidCalendarReference,
                    format!("Machine '{}' references unknown calendar '{}'", m.id, cal),
                ));
            }
        }
    }

    let mut job_ids = HashSet::new();
    let mut operation_ids = HashSet::new();

    for job in &problem.jobs {
        if !job_ids.insert(job.id.as_str()) {
            errors.push(ValidationError::new(
                ValidationErrorKind::DuplicateId,
                format!("Duplicate job ID: {}", job.id),
            ));
        }
        if job.operations.is_empty() {
            errors.push(ValidationError::new(
                ValidationErrorKind::EmptyJob,
                format!("Job '{}' has no operations", job.id),
            ));
        }
        if job.due_minutes < job.release_minutes {
            errors.push(ValidationError::new(
                ValidationErrorKind::DueBeforeRelease,
                format!(
                    "Job '{}' is due at {} but released at {}",
                    job.id, job.due_minutes, job.release_minutes
                ),
            ));
        }
        if job.release_minutes < 0 {
            errors.push(ValidationError::new(
                ValidationErrorKind::InvalidDuration,
                format!("Job '{}' has negative release time", job.id),
            ));
        }
        if !job.has_strict_sequence() {
            errors.push(ValidationError::new(
                ValidationErrorKind::InvalidSequence,
                format!("Job '{}' has non-increasing operation sequence", job.id),
            ));
        }

        for op in &job.operations {
            if !operation_ids.insert(op.id.as_str()) {
                errors.push(ValidationError::new(
                    ValidationErrorKind::DuplicateId,
                    format!("Duplicate operation ID: {}", op.id),
                ));
            }
            if op.job_id != job.id {
                errors.push(ValidationError::new(
                    ValidationErrorKind::JobMismatch,
                    format!(
                        "Operation '{}' claims job '{}' but belongs to '{}'",
                        op.id, op.job_id, job.id
                    ),
                ));
            }
            if op.duration_minutes <= 0 || op.setup_minutes < 0 {
                errors.push(ValidationError::new(
                    ValidationErrorKind::InvalidDuration,
                    format!(
                        "Operation '{}' has duration {} and setup {}",
                        op.id, op.duration_minutes, op.setup_minutes
                    ),
                ));
            }
            if op.eligible_machines.is_empty() {
                errors.push(ValidationError::new(
                    ValidationErrorKind::NoEligibleMachine,
                    format!("Operation '{}' has no eligible machines", op.id),
                ));
                continue;
            }

            let mut any_known = false;
            for cand in &op.eligible_machines {
                if machine_ids.contains(cand.as_str()) {
                    any_known = true;
                } else {
                    errors.push(ValidationError::new(
                        ValidationErrorKind::InvalidMachineReference,
                        format!("Operation '{}' references unknown machine '{}'", op.id, cand),
                    ));
                }
            }
            let any_available = op
                .eligible_machines
                .iter()
                .filter_map(|id| problem.machine(id))
                .any(|m| m.available);
            if any_known && !any_available {
                errors.push(ValidationError::new(
                    ValidationErrorKind::NoAvailableMachine,
                    format!("Operation '{}' has no available eligible machine", op.id),
                ));
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{default_epoch, HolidayCalendar, Job, Machine, Operation};

    fn op(id: &str, job: &str, seq: i32, machine: &str) -> Operation {
        Operation::new(id, job, seq).with_duration(30).with_machine(machine)
    }

    fn sample_problem() -> SchedulingProblem {
        SchedulingProblem::new(default_epoch())
            .with_machine(Machine::new("M1", "CNC"))
            .with_machine(Machine::new("M2", "Lathe").with_holidays("plant"))
            .with_calendar(HolidayCalendar::new("plant"))
            .with_job(
                Job::new("J1")
                    .with_due(500)
                    .with_operation(op("O1", "J1", 1, "M1"))
                    .with_operation(op("O2", "J1", 2, "M2")),
            )
            .with_job(Job::new("J2").with_due(300).with_operation(op("O3", "J2", 1, "M1")))
    }

    fn kinds(problem: &SchedulingProblem) -> Vec<ValidationErrorKind> {
        validate_problem(problem)
            .unwrap_err()
            .into_iter()
            .map(|e| e.kind)
            .collect()
    }

    #[test]
    fn test_valid_input() {
        assert!(validate_problem(&sample_problem()).is_ok());
    }

    #[test]
    fn test_duplicate_job_id() {
        let mut p = sample_problem();
        p.jobs[1].id = "J1".into();
        p.jobs[1].operations[0].job_id = "J1".into();
        assert!(kinds(&p).contains(&ValidationErrorKind::DuplicateId));
    }

    #[test]
    fn test_duplicate_machine_id() {
        let p = sample_problem().with_machine(Machine::new("M1", "CNC"));
        let errors = validate_problem(&p).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| e.kind == ValidationErrorKind::DuplicateId && e.message.contains("machine")));
    }

    #[test]
    fn test_empty_job() {
        let p = sample_problem().with_job(Job::new("J3"));
        assert!(kinds(&p).contains(&ValidationErrorKind::EmptyJob));
    }

    #[test]
    fn test_unknown_machine_reference() {
        let p = sample_problem().with_job(Job::new("J3").with_operation(op("O9", "J3", 1, "NOPE")));
        assert!(kinds(&p).contains(&ValidationErrorKind::InvalidMachineReference));
    }

    #[test]
    fn test_no_eligible_machine() {
        let p = sample_problem()
            .with_job(Job::new("J3").with_operation(Operation::new("O9", "J3", 1).with_duration(10)));
        assert!(kinds(&p).contains(&ValidationErrorKind::NoEligibleMachine));
    }

    #[test]
    fn test_no_available_machine() {
        let mut p = sample_problem();
        p.machines[0].available = false;
        assert!(kinds(&p).contains(&ValidationErrorKind::NoAvailableMachine));
    }

    #[test]
    fn test_unknown_calendar() {
        let p = sample_problem().with_machine(Machine::new("M3", "CNC").with_holidays("missing"));
        assert!(kinds(&p).contains(&ValidationErrorKind::InvalidCalendarReference));
    }

    #[test]
    fn test_sequence_must_increase() {
        let p = sample_problem().with_job(
            Job::new("J3")
                .with_due(100)
                .with_operation(op("O8", "J3", 2, "M1"))
                .with_operation(op("O9", "J3", 2, "M1")),
        );
        assert!(kinds(&p).contains(&ValidationErrorKind::InvalidSequence));
    }

    #[test]
    fn test_due_before_release() {
        let p = sample_problem().with_job(
            Job::new("J3")
                .with_release(200)
                .with_due(100)
                .with_operation(op("O9", "J3", 1, "M1")),
        );
        assert!(kinds(&p).contains(&ValidationErrorKind::DueBeforeRelease));
    }

    #[test]
    fn test_multiple_errors() {
        let p = sample_problem()
            .with_job(Job::new("empty"))
            .with_job(Job::new("J4").with_due(10).with_operation(op("O1", "J9", 1, "UNKNOWN")));
        let errors = validate_problem(&p).unwrap_err();
        // empty job, duplicate O1, job mismatch, unknown machine
        assert!(errors.len() >= 4);
    }
}
