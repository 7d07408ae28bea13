//! Cycle data types and calendar-method date arithmetic.

pub mod calculator;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Allowed range for `cycle_length`, enforced at the CRUD boundary.
pub const CYCLE_LENGTH_RANGE: std::ops::RangeInclusive<i64> = 21..=40;
/// Allowed range for `period_length`, enforced at the CRUD boundary.
pub const PERIOD_LENGTH_RANGE: std::ops::RangeInclusive<i64> = 1..=10;

/// One recorded menstrual cycle.
///
/// A user has at most one cycle with `is_current = true`; older cycles are
/// kept for history display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cycle {
    pub id: i64,
    pub user_id: i64,
    /// First day of the last period (the cycle anchor).
    pub start_date: NaiveDate,
    /// Cycle length in days, 21-40.
    pub cycle_length: i64,
    /// Period duration in days, 1-10.
    pub period_length: i64,
    pub is_current: bool,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Inclusive date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Number of days in the range, inclusive of both ends.
    pub fn num_days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }
}

/// Phase of the menstrual cycle on a given day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CyclePhase {
    Menstruation,
    Follicular,
    Ovulation,
    Luteal,
    PreMenstruation,
}

impl CyclePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            CyclePhase::Menstruation => "menstruation",
            CyclePhase::Follicular => "follicular",
            CyclePhase::Ovulation => "ovulation",
            CyclePhase::Luteal => "luteal",
            CyclePhase::PreMenstruation => "pre_menstruation",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            CyclePhase::Menstruation => "Menstruation",
            CyclePhase::Follicular => "Follicular phase",
            CyclePhase::Ovulation => "Ovulation",
            CyclePhase::Luteal => "Luteal phase",
            CyclePhase::PreMenstruation => "Premenstrual days",
        }
    }
}

impl std::fmt::Display for CyclePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Phase classification for a specific day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseInfo {
    pub phase: CyclePhase,
    /// Day of cycle, 1-based.
    pub day: i64,
    pub is_fertile: bool,
    pub is_safe: bool,
    /// Days until the next expected period; negative means overdue.
    pub days_until_period: i64,
}

/// Everything the calculator can derive from one cycle record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleDates {
    pub start_date: NaiveDate,
    pub cycle_length: i64,
    pub period_length: i64,
    pub ovulation_date: NaiveDate,
    pub fertile_window: DateRange,
    /// Low-probability windows before and after the fertile window.
    /// Either may be absent for short cycles.
    pub first_safe_period: Option<DateRange>,
    pub second_safe_period: Option<DateRange>,
    pub next_period: NaiveDate,
    pub current_phase: PhaseInfo,
}
