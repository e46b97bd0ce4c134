//! Due-set queries over active review plans, plus the day and week windows
//! they are built from.
//!
//! Windows are computed in a fixed UTC offset so "today" and "this week"
//! follow the user's calendar rather than UTC midnight.

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveTime, TimeZone, Utc};
use std::ops::Bound;

use crate::db::Database;
use crate::models::ReviewPlan;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    Due,
    Today,
    Overdue,
    ThisWeek,
}

impl QueryKind {
    pub const ALL: [QueryKind; 4] = [
        QueryKind::Due,
        QueryKind::Today,
        QueryKind::Overdue,
        QueryKind::ThisWeek,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueryKind::Due => "due",
            QueryKind::Today => "today",
            QueryKind::Overdue => "overdue",
            QueryKind::ThisWeek => "this_week",
        }
    }

    /// Bounds on `scheduled_at` selecting this query's plans as of `as_of`.
    pub fn bounds(
        &self,
        as_of: DateTime<Utc>,
        offset: FixedOffset,
    ) -> (Bound<DateTime<Utc>>, Bound<DateTime<Utc>>) {
        match self {
            QueryKind::Due => (Bound::Unbounded, Bound::Included(as_of)),
            QueryKind::Today => {
                let (start, end) = day_bounds(as_of, offset);
                (Bound::Included(start), Bound::Excluded(end))
            }
            QueryKind::Overdue => (Bound::Unbounded, Bound::Excluded(start_of_day(as_of, offset))),
            QueryKind::ThisWeek => {
                let (start, end) = week_bounds(as_of, offset);
                (Bound::Included(start), Bound::Included(end))
            }
        }
    }
}

/// Midnight of the calendar day containing `at`.
pub fn start_of_day(at: DateTime<Utc>, offset: FixedOffset) -> DateTime<Utc> {
    let midnight = at
        .with_timezone(&offset)
        .date_naive()
        .and_time(NaiveTime::MIN);
    let utc = midnight - Duration::seconds(offset.local_minus_utc().into());
    Utc.from_utc_datetime(&utc)
}

/// `[start, end)` of the day containing `at`.
pub fn day_bounds(at: DateTime<Utc>, offset: FixedOffset) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = start_of_day(at, offset);
    (start, start + Duration::days(1))
}

/// Monday 00:00:00 through Sunday 23:59:59 of the week containing `at`,
/// both inclusive.
pub fn week_bounds(at: DateTime<Utc>, offset: FixedOffset) -> (DateTime<Utc>, DateTime<Utc>) {
    let weekday = at.with_timezone(&offset).weekday().num_days_from_monday();
    let start = start_of_day(at, offset) - Duration::days(weekday.into());
    (start, start + Duration::days(7) - Duration::seconds(1))
}

pub fn execute(
    db: &Database,
    kind: QueryKind,
    as_of: DateTime<Utc>,
    offset: FixedOffset,
) -> rusqlite::Result<Vec<ReviewPlan>> {
    let (lower, upper) = kind.bounds(as_of, offset);
    db.active_plans(lower, upper)
}
