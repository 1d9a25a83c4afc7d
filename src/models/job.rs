//! Job model.
//!
//! A job is a production order for some quantity of an item. It consists of
//! an ordered chain of operations that must run one after another.
//!
//! # Reference
//! Pinedo (2016), "Scheduling: Theory, Algorithms, and Systems", Ch. 1

use serde::{Deserialize, Serialize};

use super::Operation;

/// A job (production order) to be scheduled.
///
/// # Time Representation
/// `release_minutes` and `due_minutes` are minutes relative to the problem's
/// planning epoch (t=0). Invariant: `due_minutes >= release_minutes`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Unique job identifier.
    pub id: String,
    /// Item (part number) being produced.
    pub item_id: String,
    /// Quantity ordered.
    pub quantity: u32,
    /// Operations in processing order.
    pub operations: Vec<Operation>,
    /// Earliest start time (minutes).
    pub release_minutes: i64,
    /// Due time (minutes).
    pub due_minutes: i64,
    /// Scheduling priority (higher = more important).
    pub priority: i32,
}

impl Job {
    /// Creates a new job released at t=0 and due at t=0.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            item_id: String::new(),
            quantity: 1,
            operations: Vec::new(),
            release_minutes: 0,
            due_minutes: 0,
            priority: 0,
        }
    }

    /// Sets the item and quantity.
    pub fn with_item(mut self, item_id: impl Into<String>, quantity: u32) -> Self {
        self.item_id = item_id.into();
        self.quantity = quantity;
        self
    }

    /// Sets the release time (minutes).
    pub fn with_release(mut self, minutes: i64) -> Self {
        self.release_minutes = minutes;
        self
    }

    /// Sets the due time (minutes).
    pub fn with_due(mut self, minutes: i64) -> Self {
        self.due_minutes = minutes;
        self
    }

    /// Sets the scheduling priority.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Adds an operation to this job.
    pub fn with_operation(mut self, operation: Operation) -> Self {
        self.operations.push(operation);
        self
    }

    /// Operations sorted by sequence number.
    pub fn ordered_operations(&self) -> Vec<&Operation> {
        let mut ops: Vec<&Operation> = self.operations.iter().collect();
        ops.sort_by_key(|o| o.sequence);
        ops
    }

    /// Sum of setup and processing time over all operations (minutes).
    pub fn total_work_minutes(&self) -> i64 {
        self.operations.iter().map(Operation::total_minutes).sum()
    }

    /// Whether sequence numbers are strictly increasing in declaration order.
    pub fn has_strict_sequence(&self) -> bool {
        self.operations
            .windows(2)
            .all(|w| w[0].sequence < w[1].sequence)
    }

    /// Tardiness for a given completion time: `max(0, completion - due)`.
    #[inline]
    pub fn tardiness_at(&self, completion_minutes: i64) -> i64 {
        (completion_minutes - self.due_minutes).max(0)
    }
}
