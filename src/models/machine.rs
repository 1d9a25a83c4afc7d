//! Machine model.
//!
//! Machines are the disjunctive resources operations run on. Each machine
//! has a type, a capacity, recurring working-hour slots, an optional holiday
//! calendar reference, and an availability flag.
//!
//! # Reference
//! Pinedo (2016), "Scheduling: Theory, Algorithms, and Systems", Ch. 1.2

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::calendar::{expand_windows, HolidayCalendar, TimeWindow, WorkingHourSlot};

/// A machine that can process operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Machine {
    /// Unique machine identifier.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Machine type (matched against `Operation::machine_type`).
    pub machine_type: String,
    /// Number of units available (>= 1).
    pub capacity: i32,
    /// Daily working-hour slots. Empty = always available.
    pub working_hours: Vec<WorkingHourSlot>,
    /// Referenced holiday calendar id.
    pub holiday_calendar: Option<String>,
    /// Whether the machine can be scheduled at all.
    pub available: bool,
}

impl Machine {
    /// Creates an always-available machine with capacity 1.
    pub fn new(id: impl Into<String>, machine_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            machine_type: machine_type.into(),
            capacity: 1,
            working_hours: Vec::new(),
            holiday_calendar: None,
            available: true,
        }
    }

    /// Sets the machine name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the capacity.
    pub fn with_capacity(mut self, capacity: i32) -> Self {
        self.capacity = capacity;
        self
    }

    /// Adds a working-hour slot.
    pub fn with_slot(mut self, slot: WorkingHourSlot) -> Self {
        self.working_hours.push(slot);
        self
    }

    /// Sets the holiday calendar reference.
    pub fn with_holidays(mut self, calendar_id: impl Into<String>) -> Self {
        self.holiday_calendar = Some(calendar_id.into());
        self
    }

    /// Marks the machine unavailable.
    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    /// Absolute working windows over `[0, horizon)`.
    ///
    /// `calendars` is searched for the referenced holiday calendar; an unknown
    /// reference is treated as no holidays.
    pub fn working_windows(
        &self,
        epoch: NaiveDateTime,
        horizon: i64,
        calendars: &[HolidayCalendar],
    ) -> Vec<TimeWindow> {
        let holidays = self
            .holiday_calendar
            .as_deref()
            .and_then(|id| calendars.iter().find(|c| c.id == id));
        expand_windows(&self.working_hours, holidays, epoch, horizon)
    }
}
