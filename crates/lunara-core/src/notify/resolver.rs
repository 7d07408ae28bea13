//! Timezone-aware resolution of notification send instants.
//!
//! Combines the cycle calculator with the catalog and a user's IANA
//! timezone to turn each enabled kind into a concrete future UTC instant.
//! The user timezone is only used to interpret the wall-clock send time;
//! everything handed to the scheduler is UTC.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use tracing::{debug, warn};

use crate::cycle::{calculator, Cycle};
use crate::notify::catalog::{NotificationKind, DEFAULT_SEND_MINUTE_OF_DAY};
use crate::notify::NotificationPreference;

/// Fallback zone for unknown or unparseable timezone strings.
pub const DEFAULT_TIMEZONE: Tz = chrono_tz::Europe::Moscow;

/// Parse an IANA timezone name, falling back to [`DEFAULT_TIMEZONE`]
/// with a warning rather than failing.
pub fn parse_timezone(name: &str) -> Tz {
    match name.parse::<Tz>() {
        Ok(tz) => tz,
        Err(_) => {
            warn!(timezone = name, "unknown timezone, falling back to default");
            DEFAULT_TIMEZONE
        }
    }
}

/// Interpret `date` at `minute_of_day` local wall-clock time in `tz` and
/// normalise to UTC.
///
/// An ambiguous local time (DST fold) resolves to the earlier instant; a
/// non-existent local time (DST gap) is shifted forward one hour.
fn localize(date: NaiveDate, minute_of_day: u32, tz: Tz) -> DateTime<Utc> {
    let minute_of_day = minute_of_day.min(23 * 60 + 59);
    let time = NaiveTime::from_hms_opt(minute_of_day / 60, minute_of_day % 60, 0)
        .unwrap_or(NaiveTime::MIN);
    let naive = date.and_time(time);
    match tz.from_local_datetime(&naive) {
        chrono::LocalResult::Single(dt) => dt.with_timezone(&Utc),
        chrono::LocalResult::Ambiguous(earlier, _) => earlier.with_timezone(&Utc),
        chrono::LocalResult::None => {
            let shifted = naive + Duration::hours(1);
            match tz.from_local_datetime(&shifted).earliest() {
                Some(dt) => dt.with_timezone(&Utc),
                None => Utc.from_utc_datetime(&naive),
            }
        }
    }
}

/// The anchor date a kind's day offset is measured from.
pub fn anchor_date(kind: NotificationKind, start_date: NaiveDate, cycle_length: i64) -> NaiveDate {
    match kind {
        NotificationKind::PeriodReminder | NotificationKind::PeriodStart => {
            calculator::next_period_date(start_date, cycle_length)
        }
        NotificationKind::FertileWindowStart => {
            calculator::fertile_window(calculator::ovulation_date(start_date, cycle_length)).start
        }
        NotificationKind::OvulationDay => calculator::ovulation_date(start_date, cycle_length),
        NotificationKind::SafePeriod => {
            calculator::fertile_window(calculator::ovulation_date(start_date, cycle_length)).end
        }
    }
}

/// Resolve the send instant for one kind, or `None` when there is no
/// upcoming instance.
///
/// Instants that are not strictly in the future roll forward one cycle,
/// but only for the period kinds: the fertile-window kinds are tied to the
/// stored cycle's unique window and have no well-defined next occurrence
/// until a new cycle is logged.
pub fn resolve_send_instant(
    cycle: &Cycle,
    kind: NotificationKind,
    timezone: &str,
    custom_minute: Option<u32>,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    if !cycle.is_current {
        return None;
    }

    let tz = parse_timezone(timezone);
    let minute = custom_minute.unwrap_or(DEFAULT_SEND_MINUTE_OF_DAY);
    let base = anchor_date(kind, cycle.start_date, cycle.cycle_length);
    let mut instant = localize(base + Duration::days(kind.offset_days()), minute, tz);

    if instant <= now {
        if matches!(
            kind,
            NotificationKind::PeriodReminder | NotificationKind::PeriodStart
        ) {
            let next_base = cycle.start_date + Duration::days(2 * cycle.cycle_length);
            instant = localize(next_base + Duration::days(kind.offset_days()), minute, tz);
        }
        if instant <= now {
            debug!(%kind, "no upcoming instance, skipping");
            return None;
        }
    }

    Some(instant)
}

/// Resolve send instants for every enabled kind.
///
/// A kind with no preference row counts as enabled with the default send
/// time. Output is in catalog order; kinds without an upcoming instance
/// are omitted.
pub fn resolve_all(
    cycle: &Cycle,
    timezone: &str,
    preferences: &[NotificationPreference],
    now: DateTime<Utc>,
) -> Vec<(NotificationKind, DateTime<Utc>)> {
    let mut out = Vec::new();
    for kind in NotificationKind::ALL {
        let pref = preferences.iter().find(|p| p.kind == kind);
        if pref.is_some_and(|p| !p.is_enabled) {
            continue;
        }
        let custom_minute = pref.and_then(|p| p.time_offset);
        if let Some(instant) = resolve_send_instant(cycle, kind, timezone, custom_minute, now) {
            out.push((kind, instant));
        }
    }
    out
}

/// The single earliest upcoming notification, if any.
pub fn next_notification(
    cycle: &Cycle,
    timezone: &str,
    preferences: &[NotificationPreference],
    now: DateTime<Utc>,
) -> Option<(NotificationKind, DateTime<Utc>)> {
    resolve_all(cycle, timezone, preferences, now)
        .into_iter()
        .min_by_key(|(_, instant)| *instant)
}
