//! Review scheduling engine.
//!
//! [`Scheduler`] owns the lifecycle of review plans: creating the first plan of
//! a problem, completing plans (which spawns the successor), reordering and
//! postponing them, and serving the due-set queries through a [`QueryCache`].
//!
//! Every operation takes its reference instant explicitly. Instants are
//! truncated to whole seconds before they reach storage.

pub mod cache;
pub mod interval;
pub mod mastery;
pub mod query;
pub mod reflow;

use chrono::{DateTime, Duration, FixedOffset, Offset, SubsecRound, Utc};
use parking_lot::Mutex;
use std::ops::Bound;

pub use query::QueryKind;

use cache::QueryCache;

use crate::db::{self as store, Database, Stats};
use crate::error::{Result, SchedulerError};
use crate::models::{Confidence, PlanStatus, Problem, ReviewPlan, Tag};

const MIN_SCORE: i32 = 0;
/// Longest single postpone, ten years.
pub const MAX_POSTPONE_DAYS: i64 = 3650;
const MAX_SCORE: i32 = 5;

pub struct Scheduler {
    // Single writer: every operation runs under this lock
    db: Mutex<Database>,
    cache: QueryCache,
    offset: FixedOffset,
}

impl Scheduler {
    /// Scheduler with day boundaries at UTC midnight.
    pub fn new(db: Database) -> Self {
        Self::with_offset(db, Utc.fix())
    }

    pub fn with_offset(db: Database, offset: FixedOffset) -> Self {
        Self {
            db: Mutex::new(db),
            cache: QueryCache::default(),
            offset,
        }
    }

    // Problem operations

    /// Adds a problem together with its first review plan.
    pub fn add_problem(
        &self,
        title: &str,
        source: Option<&str>,
        tags: &[String],
        now: DateTime<Utc>,
    ) -> Result<(Problem, ReviewPlan)> {
        let now = at_second(now);
        let db = self.db.lock();
        let (problem_id, plan) = db.transaction(|db| -> Result<(i64, ReviewPlan)> {
            let problem_id = db.add_problem(title, source, tags, now)?;
            let plan = insert_initial(db, problem_id, now)?;
            Ok((problem_id, plan))
        })?;
        self.cache.clear();

        let problem = db
            .get_problem(problem_id)
            .map_err(SchedulerError::StorageReadFailed)?
            .ok_or(SchedulerError::ProblemNotFound(problem_id))?;

        tracing::info!(problem = problem_id, plan = plan.id, "added problem");
        Ok((problem, plan))
    }

    pub fn get_problem(&self, id: i64) -> Result<Option<Problem>> {
        self.db
            .lock()
            .get_problem(id)
            .map_err(SchedulerError::StorageReadFailed)
    }

    pub fn list_problems(&self, tag_filter: Option<&str>) -> Result<Vec<Problem>> {
        self.db
            .lock()
            .list_problems(tag_filter)
            .map_err(SchedulerError::StorageReadFailed)
    }

    /// Deletes a problem and, by cascade, all of its plans.
    pub fn delete_problem(&self, id: i64) -> Result<bool> {
        let db = self.db.lock();
        let deleted = db.delete_problem(id)?;
        if deleted {
            self.cache.clear();
            tracing::info!(problem = id, "deleted problem");
        }
        Ok(deleted)
    }

    pub fn update_problem_tags(&self, id: i64, tags: &[String]) -> Result<()> {
        let db = self.db.lock();
        db.transaction(|db| -> Result<()> {
            if db.get_problem(id)?.is_none() {
                return Err(SchedulerError::ProblemNotFound(id));
            }
            db.update_problem_tags(id, tags)?;
            Ok(())
        })
    }

    pub fn list_tags(&self) -> Result<Vec<Tag>> {
        self.db
            .lock()
            .list_tags()
            .map_err(SchedulerError::StorageReadFailed)
    }

    pub fn get_plan(&self, id: i64) -> Result<Option<ReviewPlan>> {
        self.db
            .lock()
            .get_plan(id)
            .map_err(SchedulerError::StorageReadFailed)
    }

    pub fn active_plan(&self, problem_id: i64) -> Result<Option<ReviewPlan>> {
        self.db
            .lock()
            .active_plan(problem_id)
            .map_err(SchedulerError::StorageReadFailed)
    }

    /// Every plan of a problem, newest first.
    pub fn plan_history(&self, problem_id: i64) -> Result<Vec<ReviewPlan>> {
        self.db
            .lock()
            .plans_for_problem(problem_id)
            .map_err(SchedulerError::StorageReadFailed)
    }

    pub fn stats(&self, as_of: DateTime<Utc>) -> Result<Stats> {
        let as_of = at_second(as_of);
        self.db
            .lock()
            .get_stats(as_of, query::start_of_day(as_of, self.offset))
            .map_err(SchedulerError::StorageReadFailed)
    }

    // Lifecycle

    pub fn create_initial(&self, problem_id: i64, now: DateTime<Utc>) -> Result<ReviewPlan> {
        let now = at_second(now);
        let db = self.db.lock();
        let plan = db.transaction(|db| insert_initial(db, problem_id, now))?;
        self.cache.clear();

        tracing::info!(problem = problem_id, plan = plan.id, due = %plan.scheduled_at, "created initial plan");
        Ok(plan)
    }

    /// Records a grade for an active plan and returns its pending successor.
    ///
    /// The status change, successor insert, weekly reflow and problem
    /// statistics are committed together or not at all.
    pub fn complete(
        &self,
        plan_id: i64,
        score: i32,
        confidence: Confidence,
        time_spent_secs: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<ReviewPlan> {
        if !(MIN_SCORE..=MAX_SCORE).contains(&score) {
            return Err(SchedulerError::InvalidScore(score));
        }
        let now = at_second(now);
        let offset = self.offset;

        let db = self.db.lock();
        let (plan, next) = db.transaction(|db| -> Result<(ReviewPlan, ReviewPlan)> {
            let plan = db
                .get_plan(plan_id)?
                .ok_or(SchedulerError::PlanNotFound(plan_id))?;
            let mut problem = db
                .get_problem(plan.problem_id)?
                .ok_or(SchedulerError::ProblemNotFound(plan.problem_id))?;

            if !db.mark_completed(plan.id, score, confidence, time_spent_secs, now)? {
                return Err(SchedulerError::PlanNotActive(plan_id));
            }

            let level = interval::next_level(plan.level, score);
            let due = at_second(interval::next_due_date(now, level, confidence));
            let mut next = db.insert_plan(plan.problem_id, level, due, now)?;
            if reflow::is_overdue(plan.scheduled_at, now, offset) {
                next = reflow::apply(db, next, now, offset)?;
            }

            mastery::apply_grade(&mut problem, score);
            mastery::apply_average(&mut problem, score, now);
            db.update_problem_stats(&problem)?;

            Ok((plan, next))
        })?;
        self.cache.clear();

        tracing::info!(
            plan = plan.id,
            problem = plan.problem_id,
            score,
            confidence = confidence.as_i32(),
            level = next.level,
            next_plan = next.id,
            due = %next.scheduled_at,
            "completed review"
        );
        Ok(next)
    }

    /// Moves a plan in today's queue behind every other pending or skipped
    /// plan of the day. Status and grade fields are untouched.
    pub fn skip(&self, plan_id: i64, as_of: DateTime<Utc>) -> Result<ReviewPlan> {
        let as_of = at_second(as_of);
        let (day_start, day_end) = query::day_bounds(as_of, self.offset);

        let db = self.db.lock();
        let plan = db.transaction(|db| -> Result<ReviewPlan> {
            let plan = db
                .get_plan(plan_id)?
                .ok_or(SchedulerError::PlanNotFound(plan_id))?;

            let queued = matches!(plan.status, PlanStatus::Pending | PlanStatus::Skipped);
            let in_today = plan.scheduled_at >= day_start && plan.scheduled_at < day_end;
            if !queued || !in_today {
                return Err(SchedulerError::NotSkippable(plan_id));
            }

            let latest = db
                .latest_scheduled(
                    &[PlanStatus::Pending, PlanStatus::Skipped],
                    Bound::Included(day_start),
                    Bound::Excluded(day_end),
                    None,
                )?
                .unwrap_or(plan.scheduled_at);
            let last_second = day_end - Duration::seconds(1);
            let target = (latest + Duration::minutes(1))
                .min(last_second)
                .max(plan.scheduled_at);

            db.reschedule_plan(plan.id, target, plan.status)?;
            Ok(ReviewPlan {
                scheduled_at: target,
                ..plan
            })
        })?;
        self.cache.clear();

        tracing::info!(plan = plan.id, due = %plan.scheduled_at, "moved plan to end of today's queue");
        Ok(plan)
    }

    /// Skips a plan for the rest of the day, marking it `skipped`.
    pub fn skip_until_tomorrow(&self, plan_id: i64, as_of: DateTime<Utc>) -> Result<ReviewPlan> {
        let as_of = at_second(as_of);
        let (_, tomorrow) = query::day_bounds(as_of, self.offset);

        let plan = self.reschedule(plan_id, PlanStatus::Skipped, |plan| {
            Ok(plan.scheduled_at.max(tomorrow))
        })?;

        tracing::info!(plan = plan.id, due = %plan.scheduled_at, "skipped plan until tomorrow");
        Ok(plan)
    }

    /// Pushes an active plan `days` days out, counting from today for plans
    /// that are already overdue.
    pub fn postpone(&self, plan_id: i64, days: i64, now: DateTime<Utc>) -> Result<ReviewPlan> {
        if !(1..=MAX_POSTPONE_DAYS).contains(&days) {
            return Err(SchedulerError::InvalidPostpone(days));
        }
        let now = at_second(now);
        let today = query::start_of_day(now, self.offset);

        let plan = self.reschedule(plan_id, PlanStatus::Postponed, |plan| {
            plan.scheduled_at
                .max(today)
                .checked_add_signed(Duration::days(days))
                .filter(|at| store::is_storable(*at))
                .ok_or(SchedulerError::InvalidPostpone(days))
        })?;

        tracing::info!(plan = plan.id, days, due = %plan.scheduled_at, "postponed plan");
        Ok(plan)
    }

    fn reschedule(
        &self,
        plan_id: i64,
        status: PlanStatus,
        target: impl FnOnce(&ReviewPlan) -> Result<DateTime<Utc>>,
    ) -> Result<ReviewPlan> {
        let db = self.db.lock();
        let plan = db.transaction(|db| -> Result<ReviewPlan> {
            let plan = db
                .get_plan(plan_id)?
                .ok_or(SchedulerError::PlanNotFound(plan_id))?;
            if !plan.is_active() {
                return Err(SchedulerError::PlanNotActive(plan_id));
            }

            let scheduled_at = target(&plan)?;
            db.reschedule_plan(plan.id, scheduled_at, status)?;
            Ok(ReviewPlan {
                scheduled_at,
                status,
                ..plan
            })
        })?;
        self.cache.clear();
        Ok(plan)
    }

    // Queries

    pub fn due(&self, as_of: DateTime<Utc>) -> Vec<ReviewPlan> {
        self.read(QueryKind::Due, as_of)
    }

    pub fn today(&self, as_of: DateTime<Utc>) -> Vec<ReviewPlan> {
        self.read(QueryKind::Today, as_of)
    }

    pub fn overdue(&self, as_of: DateTime<Utc>) -> Vec<ReviewPlan> {
        self.read(QueryKind::Overdue, as_of)
    }

    pub fn this_week(&self, as_of: DateTime<Utc>) -> Vec<ReviewPlan> {
        self.read(QueryKind::ThisWeek, as_of)
    }

    pub fn read(&self, kind: QueryKind, as_of: DateTime<Utc>) -> Vec<ReviewPlan> {
        let as_of = at_second(as_of);
        let result = self.cache.get_or_load(kind, as_of, || {
            let db = self.db.lock();
            query::execute(&db, kind, as_of, self.offset)
        });

        match result {
            Ok(plans) => plans,
            Err(e) => {
                let err = SchedulerError::StorageReadFailed(e);
                tracing::warn!(query = kind.as_str(), "{err}; returning an empty list");
                Vec::new()
            }
        }
    }

    pub fn invalidate_cache(&self) {
        self.cache.clear();
    }
}

fn insert_initial(db: &Database, problem_id: i64, now: DateTime<Utc>) -> Result<ReviewPlan> {
    if db.get_problem(problem_id)?.is_none() {
        return Err(SchedulerError::ProblemNotFound(problem_id));
    }
    if db.active_plan(problem_id)?.is_some() {
        return Err(SchedulerError::DuplicateActivePlan(problem_id));
    }

    let due = now + Duration::days(interval::interval_days(interval::MIN_LEVEL));
    Ok(db.insert_plan(problem_id, interval::MIN_LEVEL, due, now)?)
}

fn at_second(at: DateTime<Utc>) -> DateTime<Utc> {
    at.trunc_subsecs(0)
}
