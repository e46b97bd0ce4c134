//! Weekly reflow for successors of overdue completions.
//!
//! When the successor of an overdue completion falls in the current week it
//! is queued one minute after the latest other plan of that week, whether
//! that is earlier or later than where the interval policy put it.

use chrono::{DateTime, Duration, FixedOffset, Utc};
use std::ops::Bound;

use super::query::{start_of_day, week_bounds};
use crate::db::Database;
use crate::models::{PlanStatus, ReviewPlan};

/// Whether completing a plan scheduled at `scheduled_at` counts as overdue.
pub fn is_overdue(scheduled_at: DateTime<Utc>, now: DateTime<Utc>, offset: FixedOffset) -> bool {
    scheduled_at < start_of_day(now, offset)
}

/// New due time for a successor at `next_at`, given the latest other plan in
/// the week. `None` leaves the successor where it is: outside the week, or
/// with nothing else queued in it.
pub fn reflowed_time(
    next_at: DateTime<Utc>,
    latest_in_week: Option<DateTime<Utc>>,
    week_start: DateTime<Utc>,
    week_end: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    if next_at < week_start || next_at > week_end {
        return None;
    }
    Some((latest_in_week? + Duration::minutes(1)).min(week_end))
}

/// Applies the reflow to a freshly inserted successor and returns it as
/// stored. Must run inside the completing transaction.
pub fn apply(
    db: &Database,
    next: ReviewPlan,
    now: DateTime<Utc>,
    offset: FixedOffset,
) -> rusqlite::Result<ReviewPlan> {
    let (week_start, week_end) = week_bounds(now, offset);
    let latest = db.latest_scheduled(
        &PlanStatus::ACTIVE,
        Bound::Included(week_start),
        Bound::Included(week_end),
        Some(next.id),
    )?;

    match reflowed_time(next.scheduled_at, latest, week_start, week_end) {
        Some(at) => {
            tracing::debug!(
                plan = next.id,
                from = %next.scheduled_at,
                to = %at,
                "reflowed successor behind this week's queue"
            );
            db.reschedule_plan(next.id, at, next.status)?;
            Ok(ReviewPlan {
                scheduled_at: at,
                ..next
            })
        }
        None => Ok(next),
    }
}
