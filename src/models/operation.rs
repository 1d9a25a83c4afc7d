//! Operation model.
//!
//! An operation is the smallest schedulable unit of work. It belongs to a job,
//! runs on exactly one machine chosen from an ordered eligibility list, and
//! occupies that machine for its setup plus processing time.
//!
//! # Reference
//! Pinedo (2016), "Scheduling: Theory, Algorithms, and Systems", Ch. 2

use serde::{Deserialize, Serialize};

/// An operation (processing step) to be scheduled.
///
/// Immutable for the duration of a solve. Operations within a job are
/// ordered by `sequence`; the order must be strictly increasing but gaps
/// in the numbering are allowed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    /// Unique operation identifier.
    pub id: String,
    /// Parent job identifier.
    pub job_id: String,
    /// Human-readable name.
    pub name: String,
    /// Required machine type (e.g., "CNC", "Lathe").
    pub machine_type: String,
    /// Machine IDs able to run this operation, in preference order.
    pub eligible_machines: Vec<String>,
    /// Processing time (minutes).
    pub duration_minutes: i64,
    /// Position within the job. Unique and strictly increasing per job.
    pub sequence: i32,
    /// Preparation time before processing (minutes).
    pub setup_minutes: i64,
}

impl Operation {
    /// Creates a new operation with zero duration and no eligible machines.
    pub fn new(id: impl Into<String>, job_id: impl Into<String>, sequence: i32) -> Self {
        Self {
            id: id.into(),
            job_id: job_id.into(),
            name: String::new(),
            machine_type: String::new(),
            eligible_machines: Vec::new(),
            duration_minutes: 0,
            sequence,
            setup_minutes: 0,
        }
    }

    /// Sets the operation name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the required machine type.
    pub fn with_machine_type(mut self, machine_type: impl Into<String>) -> Self {
        self.machine_type = machine_type.into();
        self
    }

    /// Sets the processing time (minutes).
    pub fn with_duration(mut self, minutes: i64) -> Self {
        self.duration_minutes = minutes;
        self
    }

    /// Sets the setup time (minutes).
    pub fn with_setup(mut self, minutes: i64) -> Self {
        self.setup_minutes = minutes;
        self
    }

    /// Appends an eligible machine.
    pub fn with_machine(mut self, machine_id: impl Into<String>) -> Self {
        self.eligible_machines.push(machine_id.into());
        self
    }

    /// Replaces the eligible machine list.
    pub fn with_machines(mut self, machine_ids: Vec<String>) -> Self {
        self.eligible_machines = machine_ids;
        self
    }

    /// Total machine occupation (setup + processing), in minutes.
    #[inline]
    pub fn total_minutes(&self) -> i64 {
        self.setup_minutes + self.duration_minutes
    }

    /// The machine this operation is pinned to before solving.
    ///
    /// The constraint model fixes each operation on its first eligible
    /// machine rather than treating machine choice as a decision.
    pub fn primary_machine(&self) -> Option<&str> {
        self.eligible_machines.first().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_builder() {
        let op = Operation::new("O1", "J1", 10)
            .with_name("Turning")
            .with_machine_type("Lathe")
            .with_duration(45)
            .with_setup(15)
            .with_machine("L1")
            .with_machine("L2");

        assert_eq!(op.id, "O1");
        assert_eq!(op.job_id, "J1");
        assert_eq!(op.sequence, 10);
        assert_eq!(op.machine_type, "Lathe");
        assert_eq!(op.total_minutes(), 60);
        assert_eq!(op.primary_machine(), Some("L1"));
    }

    #[test]
    fn test_operation_without_machines() {
        let op = Operation::new("O1", "J1", 0).with_duration(30);
        assert_eq!(op.primary_machine(), None);
        assert_eq!(op.total_minutes(), 30);
    }

    #[test]
    fn test_with_machines_replaces() {
        let op = Operation::new("O1", "J1", 0)
            .with_machine("M9")
            .with_machines(vec!["M1".into(), "M2".into()]);
        assert_eq!(op.eligible_machines, vec!["M1", "M2"]);
    }
}
