//! Working-hour and holiday calendar models.
//!
//! Machines declare recurring daily working-hour slots (time-of-day pairs,
//! possibly wrapping past midnight) and may reference a holiday calendar.
//! Both are expanded into absolute [`TimeWindow`]s over a planning horizon.
//!
//! # Time Model
//! Absolute times are minutes relative to the planning epoch. A slot on a
//! holiday date is dropped entirely; a slot wrapping past midnight belongs
//! to the day it starts on.
//!
//! # Precedence
//! Holidays override slots. A minute is working time iff it falls within an
//! expanded window.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

/// Minutes in a day.
pub const MINUTES_PER_DAY: i64 = 24 * 60;

/// A time interval [start, end) in minutes.
///
/// Half-open interval: includes start, excludes end.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeWindow {
    /// Interval start (minutes, inclusive).
    pub start: i64,
    /// Interval end (minutes, exclusive).
    pub end: i64,
}

impl TimeWindow {
    /// Creates a new time window.
    pub fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    /// Length of this window (minutes).
    #[inline]
    pub fn length(&self) -> i64 {
        self.end - self.start
    }

    /// Whether a timestamp falls within this window.
    #[inline]
    pub fn contains(&self, t: i64) -> bool {
        t >= self.start && t < self.end
    }

    /// Whether `[start, start + length)` fits entirely in this window.
    #[inline]
    pub fn fits(&self, start: i64, length: i64) -> bool {
        start >= self.start && start + length <= self.end
    }

    /// Overlap with another window (minutes), zero if disjoint.
    pub fn overlap(&self, other: &Self) -> i64 {
        (self.end.min(other.end) - self.start.max(other.start)).max(0)
    }
}

/// A recurring daily working-hour slot.
///
/// `end <= start` means the slot wraps past midnight; `end == start`
/// denotes a full 24-hour slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingHourSlot {
    /// Time of day the slot opens.
    pub start: NaiveTime,
    /// Time of day the slot closes.
    pub end: NaiveTime,
}

impl WorkingHourSlot {
    /// Creates a slot from two times of day.
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    /// Creates a slot from whole hours, e.g. `from_hours(22, 6)` for a night shift.
    ///
    /// Hours are taken modulo 24.
    pub fn from_hours(start_hour: u32, end_hour: u32) -> Self {
        Self {
            start: NaiveTime::from_hms_opt(start_hour % 24, 0, 0).unwrap_or(NaiveTime::MIN),
            end: NaiveTime::from_hms_opt(end_hour % 24, 0, 0).unwrap_or(NaiveTime::MIN),
        }
    }

    /// Opening minute of day (0..1440).
    pub fn start_minute(&self) -> i64 {
        i64::from(self.start.num_seconds_from_midnight() / 60)
    }

    /// Length of the slot in minutes (1..=1440).
    pub fn length_minutes(&self) -> i64 {
        let end = i64::from(self.end.num_seconds_from_midnight() / 60);
        let start = self.start_minute();
        if end > start {
            end - start
        } else {
            end + MINUTES_PER_DAY - start
        }
    }

    /// Whether the slot crosses midnight.
    pub fn wraps_midnight(&self) -> bool {
        self.end <= self.start
    }
}

/// A named set of non-working dates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HolidayCalendar {
    /// Calendar identifier referenced by machines.
    pub id: String,
    /// Non-working dates.
    pub dates: Vec<NaiveDate>,
}

impl HolidayCalendar {
    /// Creates an empty calendar.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            dates: Vec::new(),
        }
    }

    /// Adds a holiday.
    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.dates.push(date);
        self
    }

    /// Whether the date is a holiday.
    pub fn is_holiday(&self, date: NaiveDate) -> bool {
        self.dates.contains(&date)
    }
}

/// Expands daily slots into merged absolute windows over `[0, horizon)`.
///
/// With no slots the whole day is working time (subject to holidays).
/// Touching or overlapping windows are merged, so an operation may run
/// across back-to-back shifts.
pub fn expand_windows(
    slots: &[WorkingHourSlot],
    holidays: Option<&HolidayCalendar>,
    epoch: NaiveDateTime,
    horizon: i64,
) -> Vec<TimeWindow> {
    if horizon <= 0 {
        return Vec::new();
    }
    if slots.is_empty() && holidays.map_or(true, |h| h.dates.is_empty()) {
        return vec![TimeWindow::new(0, horizon)];
    }

    let full_day = [WorkingHourSlot::from_hours(0, 0)];
    let slots = if slots.is_empty() { &full_day[..] } else { slots };

    let epoch_offset = i64::from(epoch.time().num_seconds_from_midnight() / 60);
    let first_date = epoch.date();
    let days = horizon / MINUTES_PER_DAY + 2;

    let mut windows = Vec::new();
    // Day -1 catches a slot that started before the epoch and wraps into day 0.
    for day in -1..=days {
        let date = first_date + Duration::days(day);
        if holidays.is_some_and(|h| h.is_holiday(date)) {
            continue;
        }
        for slot in slots {
            let start = day * MINUTES_PER_DAY + slot.start_minute() - epoch_offset;
            let end = start + slot.length_minutes();
            let clipped = TimeWindow::new(start.max(0), end.min(horizon));
            if clipped.length() > 0 {
                windows.push(clipped);
            }
        }
    }

    merge_windows(windows)
}

/// Sorts and merges touching or overlapping windows.
fn merge_windows(mut windows: Vec<TimeWindow>) -> Vec<TimeWindow> {
    windows.sort_by_key(|w| (w.start, w.end));
    let mut merged: Vec<TimeWindow> = Vec::with_capacity(windows.len());
    for w in windows {
        match merged.last_mut() {
            Some(last) if w.start <= last.end => last.end = last.end.max(w.end),
            _ => merged.push(w),
        }
    }
    merged
}

/// Total working minutes of `windows` inside `range`.
pub fn available_minutes(windows: &[TimeWindow], range: TimeWindow) -> i64 {
    windows.iter().map(|w| w.overlap(&range)).sum()
}
