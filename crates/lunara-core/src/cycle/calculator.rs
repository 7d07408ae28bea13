//! Pure calendar-method date arithmetic.
//!
//! All functions here are deterministic and do no I/O. The arithmetic is
//! the standard calendar-method approximation: the luteal phase is assumed
//! to be a constant 14 days regardless of total cycle length, so ovulation
//! lands `cycle_length - 14` days after the period start.
//!
//! Input ranges are validated at the cycle-creation boundary, not here:
//! phase classification may legitimately be requested for a historical
//! cycle, so out-of-range lengths only produce a warning.

use chrono::{Duration, NaiveDate};
use tracing::{debug, warn};

use super::{Cycle, CycleDates, CyclePhase, DateRange, PhaseInfo, CYCLE_LENGTH_RANGE};

/// Assumed luteal phase length in days.
const LUTEAL_PHASE_DAYS: i64 = 14;
/// Sperm viability before ovulation, in days.
const FERTILE_DAYS_BEFORE: i64 = 5;
/// Ovum viability after ovulation, in days.
const FERTILE_DAYS_AFTER: i64 = 1;
/// Safety margin added on each side of the fertile window.
const SAFE_MARGIN_DAYS: i64 = 2;
/// Half-width of the "ovulation" phase around the ovulation day.
/// Tuning constant carried over from the source data, not derived.
const OVULATION_PHASE_MARGIN_DAYS: i64 = 2;
/// Days before the next period classified as premenstrual.
/// Tuning constant carried over from the source data, not derived.
const PRE_MENSTRUAL_LEAD_DAYS: i64 = 3;

/// Estimated ovulation date: `start_date + (cycle_length - 14)` days.
pub fn ovulation_date(start_date: NaiveDate, cycle_length: i64) -> NaiveDate {
    if !CYCLE_LENGTH_RANGE.contains(&cycle_length) {
        warn!(cycle_length, "unusual cycle length");
    }
    start_date + Duration::days(cycle_length - LUTEAL_PHASE_DAYS)
}

/// Fertile window: 5 days before ovulation through 1 day after,
/// a 7-day inclusive range.
pub fn fertile_window(ovulation: NaiveDate) -> DateRange {
    DateRange::new(
        ovulation - Duration::days(FERTILE_DAYS_BEFORE),
        ovulation + Duration::days(FERTILE_DAYS_AFTER),
    )
}

/// Low-conception-probability windows outside the fertile window.
///
/// A 2-day margin is kept on each side of the fertile window. The first
/// window runs from the end of the period to the margin; the second from
/// the margin to the last day of the cycle. Either may be empty for short
/// cycles.
pub fn safe_periods(
    start_date: NaiveDate,
    cycle_length: i64,
    period_length: i64,
) -> (Option<DateRange>, Option<DateRange>) {
    let fertile = fertile_window(ovulation_date(start_date, cycle_length));
    let unsafe_start = fertile.start - Duration::days(SAFE_MARGIN_DAYS);
    let unsafe_end = fertile.end + Duration::days(SAFE_MARGIN_DAYS);

    let first_start = start_date + Duration::days(period_length);
    let first_end = unsafe_start - Duration::days(1);
    let first = (first_end >= first_start).then(|| DateRange::new(first_start, first_end));

    let second_start = unsafe_end + Duration::days(1);
    let second_end = start_date + Duration::days(cycle_length - 1);
    let second = (second_end >= second_start).then(|| DateRange::new(second_start, second_end));

    (first, second)
}

/// Expected start of the next period: `start_date + cycle_length` days.
pub fn next_period_date(start_date: NaiveDate, cycle_length: i64) -> NaiveDate {
    start_date + Duration::days(cycle_length)
}

/// Classify the phase of the cycle on `as_of`.
///
/// The stored start date is first normalised forward by whole cycles so
/// that the classification stays meaningful arbitrarily far past the
/// recorded cycle (users do not log every cycle).
pub fn current_phase(
    start_date: NaiveDate,
    cycle_length: i64,
    period_length: i64,
    as_of: NaiveDate,
) -> PhaseInfo {
    let mut start = start_date;
    let mut days_passed = (as_of - start).num_days();
    while days_passed >= cycle_length {
        days_passed -= cycle_length;
        start += Duration::days(cycle_length);
    }
    let day = days_passed + 1;

    let ovulation = ovulation_date(start, cycle_length);
    let fertile = fertile_window(ovulation);

    let phase = if day <= period_length {
        CyclePhase::Menstruation
    } else if as_of < ovulation - Duration::days(OVULATION_PHASE_MARGIN_DAYS) {
        CyclePhase::Follicular
    } else if as_of <= ovulation + Duration::days(OVULATION_PHASE_MARGIN_DAYS) {
        CyclePhase::Ovulation
    } else if as_of < start + Duration::days(cycle_length - PRE_MENSTRUAL_LEAD_DAYS) {
        CyclePhase::Luteal
    } else {
        CyclePhase::PreMenstruation
    };

    let (first_safe, second_safe) = safe_periods(start, cycle_length, period_length);
    let is_safe = first_safe.is_some_and(|r| r.contains(as_of))
        || second_safe.is_some_and(|r| r.contains(as_of));

    let info = PhaseInfo {
        phase,
        day,
        is_fertile: fertile.contains(as_of),
        is_safe,
        days_until_period: (next_period_date(start, cycle_length) - as_of).num_days(),
    };
    debug!(?info.phase, day = info.day, "classified cycle phase");
    info
}

/// Derive every date of interest for one cycle record.
pub fn cycle_dates(cycle: &Cycle, as_of: NaiveDate) -> CycleDates {
    let ovulation = ovulation_date(cycle.start_date, cycle.cycle_length);
    let (first_safe, second_safe) =
        safe_periods(cycle.start_date, cycle.cycle_length, cycle.period_length);
    CycleDates {
        start_date: cycle.start_date,
        cycle_length: cycle.cycle_length,
        period_length: cycle.period_length,
        ovulation_date: ovulation,
        fertile_window: fertile_window(ovulation),
        first_safe_period: first_safe,
        second_safe_period: second_safe,
        next_period: next_period_date(cycle.start_date, cycle.cycle_length),
        current_phase: current_phase(
            cycle.start_date,
            cycle.cycle_length,
            cycle.period_length,
            as_of,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn ovulation_is_fourteen_days_before_next_period() {
        for cycle_length in 21..=40 {
            let start = d(2025, 9, 1);
            let ovulation = ovulation_date(start, cycle_length);
            let next = next_period_date(start, cycle_length);
            assert_eq!(ovulation, start + Duration::days(cycle_length - 14));
            assert_eq!((next - ovulation).num_days(), 14);
        }
    }

    #[test]
    fn fertile_window_is_seven_days_inclusive() {
        for cycle_length in 21..=40 {
            let window = fertile_window(ovulation_date(d(2025, 9, 1), cycle_length));
            assert_eq!(window.num_days(), 7);
            assert_eq!((window.end - window.start).num_days(), 6);
        }
    }

    #[test]
    fn reference_28_day_cycle() {
        let start = d(2025, 9, 1);
        assert_eq!(ovulation_date(start, 28), d(2025, 9, 15));
        assert_eq!(fertile_window(d(2025, 9, 15)), DateRange::new(d(2025, 9, 10), d(2025, 9, 16)));
        assert_eq!(next_period_date(start, 28), d(2025, 9, 29));
    }

    #[test]
    fn reference_21_day_cycle() {
        let start = d(2025, 9, 1);
        assert_eq!(ovulation_date(start, 21), d(2025, 9, 8));
        assert_eq!(fertile_window(d(2025, 9, 8)), DateRange::new(d(2025, 9, 3), d(2025, 9, 9)));
    }

    #[test]
    fn safe_periods_never_touch_fertile_window_margin() {
        for cycle_length in 21..=40 {
            for period_length in 1..=10 {
                let start = d(2025, 9, 1);
                let fertile = fertile_window(ovulation_date(start, cycle_length));
                let (first, second) = safe_periods(start, cycle_length, period_length);
                if let Some(first) = first {
                    assert!(first.end < fertile.start - Duration::days(2));
                }
                if let Some(second) = second {
                    assert!(second.start > fertile.end + Duration::days(2));
                }
            }
        }
    }

    #[test]
    fn short_cycle_may_lose_first_safe_period() {
        // 21-day cycle, long period: fertile margin starts right after the period
        let (first, second) = safe_periods(d(2025, 9, 1), 21, 7);
        assert!(first.is_none());
        assert!(second.is_some());
    }

    #[test]
    fn phase_day_stays_in_cycle_range_far_in_future() {
        let start = d(2024, 1, 1);
        for offset in [0_i64, 5, 27, 28, 60, 365, 1000] {
            let info = current_phase(start, 28, 5, start + Duration::days(offset));
            assert!(info.day >= 1 && info.day <= 28, "day {} out of range", info.day);
        }
    }

    #[test]
    fn phase_classification_over_reference_cycle() {
        let start = d(2025, 9, 1);
        let case = |day: u32| current_phase(start, 28, 5, d(2025, 9, day));
        assert_eq!(case(3).phase, CyclePhase::Menstruation);
        assert_eq!(case(9).phase, CyclePhase::Follicular);
        assert_eq!(case(15).phase, CyclePhase::Ovulation);
        assert_eq!(case(13).phase, CyclePhase::Ovulation);
        assert_eq!(case(20).phase, CyclePhase::Luteal);
        assert_eq!(case(27).phase, CyclePhase::PreMenstruation);
    }

    #[test]
    fn fertility_and_safety_flags() {
        let start = d(2025, 9, 1);
        // Sept 12 is inside the fertile window [10, 16]
        let info = current_phase(start, 28, 5, d(2025, 9, 12));
        assert!(info.is_fertile);
        assert!(!info.is_safe);
        // Sept 6 is in the first safe period [6, 7]
        let info = current_phase(start, 28, 5, d(2025, 9, 6));
        assert!(!info.is_fertile);
        assert!(info.is_safe);
    }

    #[test]
    fn overdue_date_re_anchors_to_next_cycle() {
        // Within the same cycle but past the expected start the counter is
        // re-anchored; just before normalisation kicks in it reaches zero.
        let start = d(2025, 9, 1);
        let info = current_phase(start, 28, 5, d(2025, 9, 29));
        assert_eq!(info.days_until_period, 28);
        assert_eq!(info.day, 1);
    }

    #[test]
    fn phase_normalises_across_many_cycles() {
        let start = d(2025, 1, 6);
        // 10 full 28-day cycles later, the same day-of-cycle comes back
        let info_now = current_phase(start, 28, 5, d(2025, 1, 10));
        let info_later = current_phase(start, 28, 5, d(2025, 1, 10) + Duration::days(280));
        assert_eq!(info_now.day, info_later.day);
        assert_eq!(info_now.phase, info_later.phase);
    }
}
