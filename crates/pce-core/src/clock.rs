//! # Factor Clock
//!
//! Calendar predicates for the decay schedule. Decay boundaries are
//! Wednesday 00:00:00 UTC instants; a schedule with a 14-day interval decays
//! on every other Wednesday.
//!
//! ```text
//!   last_decrease_time            now
//!          │                       │
//!   ───────┼───W────────W────────W─┼──────W──►
//!              │        │        │
//!              └── due boundaries (3) ─┘
//! ```
//!
//! All functions are pure.

use crate::constants::{SECONDS_PER_DAY, SECONDS_PER_MINUTE};
use crate::types::Timestamp;
use chrono::{DateTime, Datelike, Days, Utc, Weekday};

/// Whole minutes between two timestamps, zero if `end < start`
pub fn get_elapsed_minutes(start: Timestamp, end: Timestamp) -> u64 {
    end.saturating_sub(start) / SECONDS_PER_MINUTE
}

/// True if `ts` falls exactly on a Wednesday midnight
pub fn is_wednesday_midnight(ts: Timestamp) -> bool {
    ts % SECONDS_PER_DAY == 0
        && to_datetime(ts)
            .map(|dt| dt.weekday() == Weekday::Wed)
            .unwrap_or(false)
}

/// First Wednesday midnight strictly after `ts`
pub fn next_wednesday_after(ts: Timestamp) -> Timestamp {
    let Some(dt) = to_datetime(ts) else {
        return Timestamp::MAX;
    };
    let date = dt.date_naive();
    let today = date.weekday().num_days_from_monday();
    let wednesday = Weekday::Wed.num_days_from_monday();
    let mut days_ahead = (wednesday + 7 - today) % 7;
    // midnight of `date` is never after `ts`, so a Wednesday `date` means next week
    if days_ahead == 0 {
        days_ahead = 7;
    }
    date.checked_add_days(Days::new(u64::from(days_ahead)))
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .and_then(|d| u64::try_from(d.and_utc().timestamp()).ok())
        .unwrap_or(Timestamp::MAX)
}

/// True if some Wednesday midnight `t` satisfies `start < t <= end`
pub fn is_wednesday_between(start: Timestamp, end: Timestamp) -> bool {
    end > start && next_wednesday_after(start) <= end
}

/// Next decay boundary after `last`
///
/// A `last` that sits on a Wednesday midnight is a consumed boundary, so the
/// next one is a full interval later. Otherwise it is the first Wednesday
/// after `last`.
pub fn next_boundary(last: Timestamp, interval_days: u64) -> Timestamp {
    if is_wednesday_midnight(last) {
        last.saturating_add(interval_days.saturating_mul(SECONDS_PER_DAY))
    } else {
        next_wednesday_after(last)
    }
}

/// True if at least one decay boundary lies in `(start, end]`
pub fn has_decrease_time_within(start: Timestamp, end: Timestamp, interval_days: u64) -> bool {
    if end <= start {
        return false;
    }
    let interval_minutes = interval_days.saturating_mul(SECONDS_PER_DAY / SECONDS_PER_MINUTE);
    if interval_minutes > 0 && get_elapsed_minutes(start, end) >= interval_minutes {
        return true;
    }
    next_boundary(start, interval_days) <= end
}

/// Due decay boundaries in `(last, now]`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DueBoundaries {
    /// Number of boundaries crossed
    pub count: u64,
    /// Last boundary crossed (equals `last` when `count == 0`)
    pub last_boundary: Timestamp,
}

/// Count decay boundaries in `(last, now]`
pub fn count_boundaries(last: Timestamp, now: Timestamp, interval_days: u64) -> DueBoundaries {
    let none = DueBoundaries {
        count: 0,
        last_boundary: last,
    };
    if interval_days == 0 || now <= last {
        return none;
    }
    let first = next_boundary(last, interval_days);
    if first > now {
        return none;
    }
    let interval = interval_days * SECONDS_PER_DAY;
    let extra = (now - first) / interval;
    DueBoundaries {
        count: extra + 1,
        last_boundary: first + extra * interval,
    }
}

fn to_datetime(ts: Timestamp) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(i64::try_from(ts).ok()?, 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2024-01-03 00:00:00 UTC, a Wednesday
    const WED: Timestamp = 1_704_240_000;
    const DAY: Timestamp = SECONDS_PER_DAY;

    #[test]
    fn test_elapsed_minutes() {
        assert_eq!(get_elapsed_minutes(0, 59), 0);
        assert_eq!(get_elapsed_minutes(0, 60), 1);
        assert_eq!(get_elapsed_minutes(120, 60), 0);
    }

    #[test]
    fn test_wednesday_detection() {
        assert!(is_wednesday_midnight(WED));
        assert!(!is_wednesday_midnight(WED + 1));
        assert!(!is_wednesday_midnight(WED + DAY));
        assert!(is_wednesday_midnight(WED + 7 * DAY));
    }

    #[test]
    fn test_next_wednesday_after() {
        assert_eq!(next_wednesday_after(WED), WED + 7 * DAY);
        assert_eq!(next_wednesday_after(WED - 1), WED);
        assert_eq!(next_wednesday_after(WED + 3 * DAY + 500), WED + 7 * DAY);
    }

    #[test]
    fn test_is_wednesday_between() {
        assert!(is_wednesday_between(WED - 1, WED));
        assert!(!is_wednesday_between(WED, WED + 6 * DAY));
        assert!(is_wednesday_between(WED, WED + 7 * DAY));
        assert!(!is_wednesday_between(WED + DAY, WED));
    }

    #[test]
    fn test_has_decrease_time_within() {
        // Monday to Thursday crosses Wednesday midnight
        assert!(has_decrease_time_within(WED - 2 * DAY, WED + DAY, 7));
        // Thursday to Tuesday does not
        assert!(!has_decrease_time_within(WED + DAY, WED + 6 * DAY, 7));
        // From a consumed boundary, a 14-day interval skips the next Wednesday
        assert!(!has_decrease_time_within(WED, WED + 7 * DAY, 14));
        assert!(has_decrease_time_within(WED, WED + 14 * DAY, 14));
    }

    #[test]
    fn test_count_boundaries() {
        let due = count_boundaries(WED - DAY, WED + 15 * DAY, 7);
        assert_eq!(due.count, 3);
        assert_eq!(due.last_boundary, WED + 14 * DAY);

        let due = count_boundaries(WED, WED + 6 * DAY, 7);
        assert_eq!(due.count, 0);
        assert_eq!(due.last_boundary, WED);

        let due = count_boundaries(WED, WED + 28 * DAY, 14);
        assert_eq!(due.count, 2);
        assert_eq!(due.last_boundary, WED + 28 * DAY);
    }
}
