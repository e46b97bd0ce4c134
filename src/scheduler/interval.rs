//! Interval policy: maps a plan's level and the grade just recorded to the
//! next level, and a level plus confidence to the next due date.
//!
//! Levels index a fixed table of intervals in days. Confidence only nudges the
//! interval inside the band formed by the neighbouring levels, so it can never
//! carry a plan across a full level transition.

use chrono::{DateTime, Duration, Utc};

use crate::models::Confidence;

/// Review intervals in days, indexed by level 1..=8.
pub const INTERVAL_DAYS: [i64; 8] = [1, 3, 7, 14, 30, 60, 120, 180];

pub const MIN_LEVEL: i32 = 1;
pub const MAX_LEVEL: i32 = INTERVAL_DAYS.len() as i32;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Base interval for a level. Out-of-range levels are clamped to the table.
pub fn interval_days(level: i32) -> i64 {
    let level = level.clamp(MIN_LEVEL, MAX_LEVEL);
    INTERVAL_DAYS[(level - 1) as usize]
}

pub fn next_level(current: i32, score: i32) -> i32 {
    let current = current.clamp(MIN_LEVEL, MAX_LEVEL);
    match score {
        s if s >= 4 => (current + 1).min(MAX_LEVEL),
        3 => current,
        2 => (current - 1).max(MIN_LEVEL),
        _ => MIN_LEVEL,
    }
}

/// Interval in days for `level` after scaling by `confidence`.
///
/// The result stays within `[interval(level - 1), interval(level + 1)]`; at the
/// ends of the table the level's own interval is the missing bound.
pub fn scaled_interval_days(level: i32, confidence: Confidence) -> f64 {
    let level = level.clamp(MIN_LEVEL, MAX_LEVEL);
    let base = interval_days(level) as f64;
    let floor = interval_days(level - 1) as f64;
    let ceiling = interval_days(level + 1) as f64;

    (base * confidence.interval_factor()).clamp(floor, ceiling)
}

pub fn next_due_date(
    reference: DateTime<Utc>,
    level: i32,
    confidence: Confidence,
) -> DateTime<Utc> {
    let days = scaled_interval_days(level, confidence);
    reference + Duration::seconds((days * SECONDS_PER_DAY).round() as i64)
}
