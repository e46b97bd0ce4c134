use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, Result, Row, ToSql};
use std::ops::Bound;
use std::path::Path;

use crate::models::{Confidence, PlanStatus, Problem, ReviewPlan, Tag};

const PLAN_COLUMNS: &str = "id, problem_id, scheduled_at, status, level, score, confidence, \
                            time_spent_secs, created_at, completed_at";

/// Last instant (9999-12-31 23:59:59 UTC) whose stored text keeps a four-digit
/// year. Windowed queries compare timestamps as text, so later instants would
/// sort before every ordinary date.
pub const MAX_STORED_TIMESTAMP: i64 = 253_402_300_799;

pub fn is_storable(at: DateTime<Utc>) -> bool {
    at.timestamp() <= MAX_STORED_TIMESTAMP
}

const PROBLEM_COLUMNS: &str = "id, title, source, created_at, mastery, last_practiced_at, \
                               average_score, total_reviews";

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self { conn })
    }

    pub fn init(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS problems (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                source TEXT,
                created_at TEXT NOT NULL,
                mastery INTEGER NOT NULL DEFAULT 0 CHECK(mastery BETWEEN 0 AND 5),
                last_practiced_at TEXT,
                average_score REAL NOT NULL DEFAULT 0,
                total_reviews INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS tags (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE
            );

            CREATE TABLE IF NOT EXISTS problem_tags (
                problem_id INTEGER NOT NULL,
                tag_id INTEGER NOT NULL,
                PRIMARY KEY (problem_id, tag_id),
                FOREIGN KEY (problem_id) REFERENCES problems(id) ON DELETE CASCADE,
                FOREIGN KEY (tag_id) REFERENCES tags(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS review_plans (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                problem_id INTEGER NOT NULL,
                scheduled_at TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending' CHECK(status IN ('pending', 'completed', 'skipped', 'postponed')),
                level INTEGER NOT NULL CHECK(level BETWEEN 1 AND 8),
                score INTEGER CHECK(score BETWEEN 0 AND 5),
                confidence INTEGER CHECK(confidence BETWEEN 1 AND 5),
                time_spent_secs INTEGER,
                created_at TEXT NOT NULL,
                completed_at TEXT,
                FOREIGN KEY (problem_id) REFERENCES problems(id) ON DELETE CASCADE
            );

            -- At most one active plan per problem
            CREATE UNIQUE INDEX IF NOT EXISTS idx_review_plans_active
                ON review_plans(problem_id) WHERE status IN ('pending', 'skipped', 'postponed');

            CREATE INDEX IF NOT EXISTS idx_review_plans_scheduled ON review_plans(scheduled_at);
            CREATE INDEX IF NOT EXISTS idx_review_plans_problem ON review_plans(problem_id);
            CREATE INDEX IF NOT EXISTS idx_problem_tags_problem ON problem_tags(problem_id);
            CREATE INDEX IF NOT EXISTS idx_problem_tags_tag ON problem_tags(tag_id);
            "#,
        )?;

        Ok(())
    }

    /// Runs `f` inside a transaction. Any error from `f` or from the commit
    /// rolls back every write made through this database in the meantime.
    pub fn transaction<T, E>(&self, f: impl FnOnce(&Self) -> std::result::Result<T, E>) -> std::result::Result<T, E>
    where
        E: From<rusqlite::Error>,
    {
        let tx = self.conn.unchecked_transaction()?;
        let value = f(self)?;
        tx.commit()?;
        Ok(value)
    }

    #[cfg(test)]
    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    // Problem operations
    pub fn add_problem(
        &self,
        title: &str,
        source: Option<&str>,
        tags: &[String],
        created_at: DateTime<Utc>,
    ) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO problems (title, source, created_at) VALUES (?1, ?2, ?3)",
            params![title, source, created_at],
        )?;
        let problem_id = self.conn.last_insert_rowid();

        self.attach_tags(problem_id, tags)?;

        Ok(problem_id)
    }

    pub fn get_problem(&self, id: i64) -> Result<Option<Problem>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {PROBLEM_COLUMNS} FROM problems WHERE id = ?1"))?;

        match stmt.query_row(params![id], problem_from_row) {
            Ok(mut p) => {
                p.tags = self.get_problem_tags(id)?;
                Ok(Some(p))
            }
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn list_problems(&self, tag_filter: Option<&str>) -> Result<Vec<Problem>> {
        let mut problems: Vec<Problem> = if let Some(tag) = tag_filter {
            let mut stmt = self.conn.prepare(
                r#"
                SELECT DISTINCT p.id, p.title, p.source, p.created_at, p.mastery,
                       p.last_practiced_at, p.average_score, p.total_reviews
                FROM problems p
                JOIN problem_tags pt ON p.id = pt.problem_id
                JOIN tags tg ON pt.tag_id = tg.id
                WHERE tg.name = ?1
                ORDER BY p.title
                "#,
            )?;
            let rows = stmt.query_map(params![tag], problem_from_row)?;
            rows.collect::<Result<Vec<_>>>()?
        } else {
            let mut stmt = self
                .conn
                .prepare(&format!("SELECT {PROBLEM_COLUMNS} FROM problems ORDER BY title"))?;
            let rows = stmt.query_map([], problem_from_row)?;
            rows.collect::<Result<Vec<_>>>()?
        };

        for problem in &mut problems {
            problem.tags = self.get_problem_tags(problem.id)?;
        }

        Ok(problems)
    }

    pub fn delete_problem(&self, id: i64) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM problems WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    pub fn update_problem_tags(&self, problem_id: i64, tags: &[String]) -> Result<()> {
        self.conn.execute(
            "DELETE FROM problem_tags WHERE problem_id = ?1",
            params![problem_id],
        )?;
        self.attach_tags(problem_id, tags)
    }

    /// Persists the scheduler-owned performance fields of a problem.
    pub fn update_problem_stats(&self, problem: &Problem) -> Result<()> {
        self.conn.execute(
            r#"
            UPDATE problems
            SET mastery = ?1,
                last_practiced_at = ?2,
                average_score = ?3,
                total_reviews = ?4
            WHERE id = ?5
            "#,
            params![
                problem.mastery,
                problem.last_practiced_at,
                problem.average_score,
                problem.total_reviews,
                problem.id
            ],
        )?;
        Ok(())
    }

    // Tag operations
    fn attach_tags(&self, problem_id: i64, tags: &[String]) -> Result<()> {
        for tag in tags.iter().map(|t| t.trim()).filter(|t| !t.is_empty()) {
            let tag_id = self.get_or_create_tag(tag)?;
            self.conn.execute(
                "INSERT OR IGNORE INTO problem_tags (problem_id, tag_id) VALUES (?1, ?2)",
                params![problem_id, tag_id],
            )?;
        }
        Ok(())
    }

    fn get_or_create_tag(&self, name: &str) -> Result<i64> {
        let existing: Result<i64> =
            self.conn
                .query_row("SELECT id FROM tags WHERE name = ?1", params![name], |row| {
                    row.get(0)
                });

        match existing {
            Ok(id) => Ok(id),
            Err(rusqlite::Error::QueryReturnedNoRows) => {
                self.conn
                    .execute("INSERT INTO tags (name) VALUES (?1)", params![name])?;
                Ok(self.conn.last_insert_rowid())
            }
            Err(e) => Err(e),
        }
    }

    fn get_problem_tags(&self, problem_id: i64) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT tg.name
            FROM tags tg
            JOIN problem_tags pt ON tg.id = pt.tag_id
            WHERE pt.problem_id = ?1
            ORDER BY tg.name
            "#,
        )?;

        let rows = stmt.query_map(params![problem_id], |row| row.get(0))?;
        rows.collect::<Result<Vec<String>>>()
    }

    pub fn list_tags(&self) -> Result<Vec<Tag>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT tg.id, tg.name, COUNT(pt.problem_id) as problem_count
            FROM tags tg
            LEFT JOIN problem_tags pt ON tg.id = pt.tag_id
            GROUP BY tg.id, tg.name
            ORDER BY tg.name
            "#,
        )?;

        let rows = stmt.query_map([], |row| {
            Ok(Tag {
                id: row.get(0)?,
                name: row.get(1)?,
                problem_count: row.get(2)?,
            })
        })?;
        rows.collect::<Result<Vec<_>>>()
    }

    // Review plan operations
    pub fn insert_plan(
        &self,
        problem_id: i64,
        level: i32,
        scheduled_at: DateTime<Utc>,
        created_at: DateTime<Utc>,
    ) -> Result<ReviewPlan> {
        self.conn.execute(
            r#"
            INSERT INTO review_plans (problem_id, scheduled_at, status, level, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                problem_id,
                scheduled_at,
                PlanStatus::Pending.as_str(),
                level,
                created_at
            ],
        )?;

        Ok(ReviewPlan {
            id: self.conn.last_insert_rowid(),
            problem_id,
            scheduled_at,
            status: PlanStatus::Pending,
            level,
            score: None,
            confidence: None,
            time_spent_secs: None,
            created_at,
            completed_at: None,
        })
    }

    pub fn get_plan(&self, id: i64) -> Result<Option<ReviewPlan>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {PLAN_COLUMNS} FROM review_plans WHERE id = ?1"))?;

        match stmt.query_row(params![id], plan_from_row) {
            Ok(plan) => Ok(Some(plan)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn active_plan(&self, problem_id: i64) -> Result<Option<ReviewPlan>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {PLAN_COLUMNS} FROM review_plans WHERE problem_id = ?1 AND status IN ({}) LIMIT 1",
            status_list(&PlanStatus::ACTIVE)
        ))?;

        match stmt.query_row(params![problem_id], plan_from_row) {
            Ok(plan) => Ok(Some(plan)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// All plans of a problem, newest first.
    pub fn plans_for_problem(&self, problem_id: i64) -> Result<Vec<ReviewPlan>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {PLAN_COLUMNS} FROM review_plans WHERE problem_id = ?1 ORDER BY created_at DESC, id DESC"
        ))?;
        let rows = stmt.query_map(params![problem_id], plan_from_row)?;
        rows.collect::<Result<Vec<_>>>()
    }

    /// Marks an active plan completed. Returns false when the plan was not
    /// active, which leaves the row untouched.
    pub fn mark_completed(
        &self,
        plan_id: i64,
        score: i32,
        confidence: Confidence,
        time_spent_secs: Option<i64>,
        completed_at: DateTime<Utc>,
    ) -> Result<bool> {
        let rows = self.conn.execute(
            &format!(
                r#"
                UPDATE review_plans
                SET status = ?1, score = ?2, confidence = ?3, time_spent_secs = ?4, completed_at = ?5
                WHERE id = ?6 AND status IN ({})
                "#,
                status_list(&PlanStatus::ACTIVE)
            ),
            params![
                PlanStatus::Completed.as_str(),
                score,
                confidence.as_i32(),
                time_spent_secs,
                completed_at,
                plan_id
            ],
        )?;
        Ok(rows > 0)
    }

    /// Moves an active plan and sets its status. Returns false when the plan
    /// was not active.
    pub fn reschedule_plan(
        &self,
        plan_id: i64,
        scheduled_at: DateTime<Utc>,
        status: PlanStatus,
    ) -> Result<bool> {
        let rows = self.conn.execute(
            &format!(
                "UPDATE review_plans SET scheduled_at = ?1, status = ?2 WHERE id = ?3 AND status IN ({})",
                status_list(&PlanStatus::ACTIVE)
            ),
            params![scheduled_at, status.as_str(), plan_id],
        )?;
        Ok(rows > 0)
    }

    /// Active plans whose `scheduled_at` lies within the bounds, ascending.
    pub fn active_plans(
        &self,
        lower: Bound<DateTime<Utc>>,
        upper: Bound<DateTime<Utc>>,
    ) -> Result<Vec<ReviewPlan>> {
        let mut query = format!(
            "SELECT {PLAN_COLUMNS} FROM review_plans WHERE status IN ({})",
            status_list(&PlanStatus::ACTIVE)
        );
        let mut params_vec: Vec<Box<dyn ToSql>> = vec![];
        push_bounds(&mut query, &mut params_vec, lower, upper);
        query.push_str(" ORDER BY scheduled_at ASC, id ASC");

        let mut stmt = self.conn.prepare(&query)?;
        let params_refs: Vec<&dyn ToSql> = params_vec.iter().map(|b| b.as_ref()).collect();

        let rows = stmt.query_map(params_refs.as_slice(), plan_from_row)?;
        rows.collect::<Result<Vec<_>>>()
    }

    /// Latest `scheduled_at` among plans with one of `statuses` inside the
    /// bounds, ignoring `exclude`.
    pub fn latest_scheduled(
        &self,
        statuses: &[PlanStatus],
        lower: Bound<DateTime<Utc>>,
        upper: Bound<DateTime<Utc>>,
        exclude: Option<i64>,
    ) -> Result<Option<DateTime<Utc>>> {
        let mut query = format!(
            "SELECT MAX(scheduled_at) FROM review_plans WHERE status IN ({})",
            status_list(statuses)
        );
        let mut params_vec: Vec<Box<dyn ToSql>> = vec![];
        if let Some(id) = exclude {
            params_vec.push(Box::new(id));
            query.push_str(&format!(" AND id != ?{}", params_vec.len()));
        }
        push_bounds(&mut query, &mut params_vec, lower, upper);

        let params_refs: Vec<&dyn ToSql> = params_vec.iter().map(|b| b.as_ref()).collect();
        self.conn
            .query_row(&query, params_refs.as_slice(), |row| row.get(0))
    }

    pub fn get_stats(&self, as_of: DateTime<Utc>, day_start: DateTime<Utc>) -> Result<Stats> {
        let active = status_list(&PlanStatus::ACTIVE);

        let total_problems: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM problems", [], |row| row.get(0))?;

        let total_reviews: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM review_plans WHERE status = ?1",
            params![PlanStatus::Completed.as_str()],
            |row| row.get(0),
        )?;

        let mastered: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM problems WHERE mastery >= 4",
            [],
            |row| row.get(0),
        )?;

        let due_now: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM review_plans WHERE status IN ({active}) AND scheduled_at <= ?1"),
            params![as_of],
            |row| row.get(0),
        )?;

        let overdue: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM review_plans WHERE status IN ({active}) AND scheduled_at < ?1"),
            params![day_start],
            |row| row.get(0),
        )?;

        let avg_mastery: f64 = self.conn.query_row(
            "SELECT COALESCE(AVG(mastery), 0) FROM problems",
            [],
            |row| row.get(0),
        )?;

        Ok(Stats {
            total_problems,
            total_reviews,
            mastered,
            due_now,
            overdue,
            avg_mastery,
        })
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct Stats {
    pub total_problems: i64,
    pub total_reviews: i64,
    pub mastered: i64,
    pub due_now: i64,
    pub overdue: i64,
    pub avg_mastery: f64,
}

fn status_list(statuses: &[PlanStatus]) -> String {
    statuses
        .iter()
        .map(|s| format!("'{}'", s.as_str()))
        .collect::<Vec<_>>()
        .join(", ")
}

fn push_bounds(
    query: &mut String,
    params_vec: &mut Vec<Box<dyn ToSql>>,
    lower: Bound<DateTime<Utc>>,
    upper: Bound<DateTime<Utc>>,
) {
    for (bound, inclusive_op, exclusive_op) in [(lower, ">=", ">"), (upper, "<=", "<")] {
        let (op, at) = match bound {
            Bound::Included(at) => (inclusive_op, at),
            Bound::Excluded(at) => (exclusive_op, at),
            Bound::Unbounded => continue,
        };
        params_vec.push(Box::new(at));
        query.push_str(&format!(" AND scheduled_at {} ?{}", op, params_vec.len()));
    }
}

fn problem_from_row(row: &Row<'_>) -> Result<Problem> {
    Ok(Problem {
        id: row.get(0)?,
        title: row.get(1)?,
        source: row.get(2)?,
        created_at: row.get(3)?,
        tags: vec![],
        mastery: row.get(4)?,
        last_practiced_at: row.get(5)?,
        average_score: row.get(6)?,
        total_reviews: row.get(7)?,
    })
}

fn plan_from_row(row: &Row<'_>) -> Result<ReviewPlan> {
    let status_str: String = row.get(3)?;
    let status = PlanStatus::from_str(&status_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            Type::Text,
            format!("unknown plan status '{}'", status_str).into(),
        )
    })?;
    let confidence: Option<i32> = row.get(6)?;

    Ok(ReviewPlan {
        id: row.get(0)?,
        problem_id: row.get(1)?,
        scheduled_at: row.get(2)?,
        status,
        level: row.get(4)?,
        score: row.get(5)?,
        confidence: confidence.and_then(Confidence::from_i32),
        time_spent_secs: row.get(7)?,
        created_at: row.get(8)?,
        completed_at: row.get(9)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn setup_db() -> Database {
        let db = Database::open(":memory:").expect("Failed to create in-memory database");
        db.init().expect("Failed to initialize database");
        db
    }

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, hour, 0, 0).unwrap()
    }

    fn add(db: &Database, title: &str) -> i64 {
        db.add_problem(title, None, &[], at(1, 0)).unwrap()
    }

    mod init_tests {
        use super::*;

        #[test]
        fn init_creates_tables() {
            let db = setup_db();
            for table in ["problems", "tags", "problem_tags", "review_plans"] {
                let count: i64 = db
                    .conn
                    .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
                    .unwrap_or_else(|_| panic!("{table} table should exist"));
                assert_eq!(count, 0);
            }
        }

        #[test]
        fn init_is_idempotent() {
            let db = setup_db();
            add(&db, "Two Sum");

            db.init().expect("Re-init should succeed");

            assert_eq!(db.list_problems(None).unwrap().len(), 1);
        }

        #[test]
        fn file_backed_database_persists() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("drill.db");

            {
                let db = Database::open(&path).unwrap();
                db.init().unwrap();
                let id = add(&db, "LRU Cache");
                db.insert_plan(id, 1, at(2, 0), at(1, 0)).unwrap();
            }

            let db = Database::open(&path).unwrap();
            db.init().unwrap();
            let problems = db.list_problems(None).unwrap();
            assert_eq!(problems.len(), 1);
            let plan = db.active_plan(problems[0].id).unwrap().unwrap();
            assert_eq!(plan.scheduled_at, at(2, 0));
        }
    }

    mod problem_tests {
        use super::*;

        #[test]
        fn add_problem_defaults_performance_fields() {
            let db = setup_db();
            let id = db
                .add_problem("Two Sum", Some("leetcode"), &["array".to_string()], at(1, 0))
                .unwrap();

            let p = db.get_problem(id).unwrap().unwrap();
            assert_eq!(p.title, "Two Sum");
            assert_eq!(p.source.as_deref(), Some("leetcode"));
            assert_eq!(p.tags, vec!["array"]);
            assert_eq!(p.created_at, at(1, 0));
            assert_eq!(p.mastery, 0);
            assert_eq!(p.total_reviews, 0);
            assert_eq!(p.average_score, 0.0);
            assert!(p.last_practiced_at.is_none());
        }

        #[test]
        fn get_problem_not_found() {
            let db = setup_db();
            assert!(db.get_problem(999).unwrap().is_none());
        }

        #[test]
        fn list_problems_sorted_and_filtered() {
            let db = setup_db();
            db.add_problem("Zigzag", None, &["string".to_string()], at(1, 0))
                .unwrap();
            db.add_problem("Alien Dictionary", None, &["graph".to_string()], at(1, 0))
                .unwrap();

            let all = db.list_problems(None).unwrap();
            assert_eq!(all[0].title, "Alien Dictionary");
            assert_eq!(all[1].title, "Zigzag");

            let graph = db.list_problems(Some("graph")).unwrap();
            assert_eq!(graph.len(), 1);
            assert_eq!(graph[0].title, "Alien Dictionary");
        }

        #[test]
        fn blank_tags_are_ignored() {
            let db = setup_db();
            let id = db
                .add_problem("Two Sum", None, &[" ".to_string(), "hash".to_string()], at(1, 0))
                .unwrap();
            assert_eq!(db.get_problem(id).unwrap().unwrap().tags, vec!["hash"]);
        }

        #[test]
        fn update_problem_tags_replaces() {
            let db = setup_db();
            let id = db
                .add_problem("Two Sum", None, &["old".to_string()], at(1, 0))
                .unwrap();

            db.update_problem_tags(id, &["a".to_string(), "b".to_string()])
                .unwrap();

            assert_eq!(db.get_problem(id).unwrap().unwrap().tags, vec!["a", "b"]);
            let tags = db.list_tags().unwrap();
            let old = tags.iter().find(|t| t.name == "old").unwrap();
            assert_eq!(old.problem_count, 0);
        }

        #[test]
        fn update_problem_stats_persists() {
            let db = setup_db();
            let id = add(&db, "Two Sum");
            let mut p = db.get_problem(id).unwrap().unwrap();
            p.mastery = 4;
            p.average_score = 3.5;
            p.total_reviews = 2;
            p.last_practiced_at = Some(at(3, 9));

            db.update_problem_stats(&p).unwrap();

            let reloaded = db.get_problem(id).unwrap().unwrap();
            assert_eq!(reloaded.mastery, 4);
            assert_eq!(reloaded.average_score, 3.5);
            assert_eq!(reloaded.total_reviews, 2);
            assert_eq!(reloaded.last_practiced_at, Some(at(3, 9)));
        }

        #[test]
        fn delete_problem_cascades_plans() {
            let db = setup_db();
            let id = add(&db, "Two Sum");
            let plan = db.insert_plan(id, 1, at(2, 0), at(1, 0)).unwrap();

            assert!(db.delete_problem(id).unwrap());
            assert!(db.get_plan(plan.id).unwrap().is_none());
            assert!(!db.delete_problem(id).unwrap());
        }
    }

    mod plan_tests {
        use super::*;

        #[test]
        fn insert_plan_round_trips() {
            let db = setup_db();
            let id = add(&db, "Two Sum");
            let inserted = db.insert_plan(id, 3, at(5, 9), at(1, 0)).unwrap();

            let loaded = db.get_plan(inserted.id).unwrap().unwrap();
            assert_eq!(loaded, inserted);
            assert_eq!(loaded.status, PlanStatus::Pending);
            assert!(loaded.score.is_none());
            assert!(loaded.confidence.is_none());
        }

        #[test]
        fn second_active_plan_violates_unique_index() {
            let db = setup_db();
            let id = add(&db, "Two Sum");
            db.insert_plan(id, 1, at(2, 0), at(1, 0)).unwrap();

            assert!(db.insert_plan(id, 1, at(3, 0), at(1, 0)).is_err());
        }

        #[test]
        fn level_outside_table_rejected() {
            let db = setup_db();
            let id = add(&db, "Two Sum");
            assert!(db.insert_plan(id, 9, at(2, 0), at(1, 0)).is_err());
            assert!(db.insert_plan(id, 0, at(2, 0), at(1, 0)).is_err());
        }

        #[test]
        fn mark_completed_only_once() {
            let db = setup_db();
            let id = add(&db, "Two Sum");
            let plan = db.insert_plan(id, 1, at(2, 0), at(1, 0)).unwrap();

            assert!(db
                .mark_completed(plan.id, 4, Confidence::High, Some(600), at(2, 10))
                .unwrap());
            assert!(!db
                .mark_completed(plan.id, 1, Confidence::Low, None, at(2, 11))
                .unwrap());

            let loaded = db.get_plan(plan.id).unwrap().unwrap();
            assert_eq!(loaded.status, PlanStatus::Completed);
            assert_eq!(loaded.score, Some(4));
            assert_eq!(loaded.confidence, Some(Confidence::High));
            assert_eq!(loaded.time_spent_secs, Some(600));
            assert_eq!(loaded.completed_at, Some(at(2, 10)));
            assert!(db.active_plan(id).unwrap().is_none());
        }

        #[test]
        fn reschedule_ignores_completed_plans() {
            let db = setup_db();
            let id = add(&db, "Two Sum");
            let plan = db.insert_plan(id, 1, at(2, 0), at(1, 0)).unwrap();

            assert!(db
                .reschedule_plan(plan.id, at(4, 0), PlanStatus::Postponed)
                .unwrap());
            db.mark_completed(plan.id, 3, Confidence::Medium, None, at(4, 1))
                .unwrap();
            assert!(!db
                .reschedule_plan(plan.id, at(6, 0), PlanStatus::Pending)
                .unwrap());

            let loaded = db.get_plan(plan.id).unwrap().unwrap();
            assert_eq!(loaded.scheduled_at, at(4, 0));
            assert_eq!(loaded.status, PlanStatus::Completed);
        }

        #[test]
        fn plans_for_problem_newest_first() {
            let db = setup_db();
            let id = add(&db, "Two Sum");
            let first = db.insert_plan(id, 1, at(2, 0), at(1, 0)).unwrap();
            db.mark_completed(first.id, 5, Confidence::Medium, None, at(2, 1))
                .unwrap();
            let second = db.insert_plan(id, 2, at(5, 1), at(2, 1)).unwrap();

            let plans = db.plans_for_problem(id).unwrap();
            assert_eq!(
                plans.iter().map(|p| p.id).collect::<Vec<_>>(),
                vec![second.id, first.id]
            );
        }
    }

    mod window_tests {
        use super::*;

        fn seed(db: &Database) -> Vec<ReviewPlan> {
            (0..3)
                .map(|i| {
                    let id = add(db, &format!("P{i}"));
                    db.insert_plan(id, 1, at(2, 9 + i as u32), at(1, 0)).unwrap()
                })
                .collect()
        }

        #[test]
        fn active_plans_respects_bounds() {
            let db = setup_db();
            let plans = seed(&db);

            let inclusive = db
                .active_plans(Bound::Included(at(2, 9)), Bound::Included(at(2, 10)))
                .unwrap();
            assert_eq!(inclusive.len(), 2);

            let exclusive = db
                .active_plans(Bound::Excluded(at(2, 9)), Bound::Excluded(at(2, 11)))
                .unwrap();
            assert_eq!(exclusive.len(), 1);
            assert_eq!(exclusive[0].id, plans[1].id);

            let all = db.active_plans(Bound::Unbounded, Bound::Unbounded).unwrap();
            assert_eq!(all.len(), 3);
        }

        #[test]
        fn active_plans_sorted_and_skip_completed() {
            let db = setup_db();
            let plans = seed(&db);
            db.mark_completed(plans[0].id, 4, Confidence::Medium, None, at(2, 12))
                .unwrap();

            let active = db.active_plans(Bound::Unbounded, Bound::Unbounded).unwrap();
            assert_eq!(
                active.iter().map(|p| p.id).collect::<Vec<_>>(),
                vec![plans[1].id, plans[2].id]
            );
        }

        #[test]
        fn active_plans_empty_window() {
            let db = setup_db();
            seed(&db);
            let none = db
                .active_plans(Bound::Included(at(20, 0)), Bound::Unbounded)
                .unwrap();
            assert!(none.is_empty());
        }

        #[test]
        fn latest_scheduled_excludes_and_filters_status() {
            let db = setup_db();
            let plans = seed(&db);
            db.reschedule_plan(plans[2].id, at(2, 11), PlanStatus::Postponed)
                .unwrap();

            let any = db
                .latest_scheduled(&PlanStatus::ACTIVE, Bound::Unbounded, Bound::Unbounded, None)
                .unwrap();
            assert_eq!(any, Some(at(2, 11)));

            let without_postponed = db
                .latest_scheduled(
                    &[PlanStatus::Pending, PlanStatus::Skipped],
                    Bound::Unbounded,
                    Bound::Unbounded,
                    None,
                )
                .unwrap();
            assert_eq!(without_postponed, Some(at(2, 10)));

            let excluding = db
                .latest_scheduled(
                    &[PlanStatus::Pending],
                    Bound::Unbounded,
                    Bound::Unbounded,
                    Some(plans[1].id),
                )
                .unwrap();
            assert_eq!(excluding, Some(at(2, 9)));
        }

        #[test]
        fn latest_scheduled_none_when_empty() {
            let db = setup_db();
            let latest = db
                .latest_scheduled(
                    &PlanStatus::ACTIVE,
                    Bound::Included(at(2, 0)),
                    Bound::Excluded(at(2, 0) + Duration::days(1)),
                    None,
                )
                .unwrap();
            assert!(latest.is_none());
        }
    }

    mod transaction_tests {
        use super::*;

        #[test]
        fn commit_keeps_writes() {
            let db = setup_db();
            let id = db
                .transaction(|db| -> Result<i64> {
                    let id = add(db, "Two Sum");
                    db.insert_plan(id, 1, at(2, 0), at(1, 0))?;
                    Ok(id)
                })
                .unwrap();

            assert!(db.active_plan(id).unwrap().is_some());
        }

        #[test]
        fn error_rolls_back_every_write() {
            let db = setup_db();
            let id = add(&db, "Two Sum");
            let plan = db.insert_plan(id, 1, at(2, 0), at(1, 0)).unwrap();

            let result = db.transaction(|db| -> Result<()> {
                db.mark_completed(plan.id, 5, Confidence::Medium, None, at(2, 1))?;
                db.insert_plan(id, 2, at(5, 1), at(2, 1))?;
                // Level 9 violates the CHECK constraint
                db.insert_plan(id, 9, at(5, 1), at(2, 1))?;
                Ok(())
            });
            assert!(result.is_err());

            let plans = db.plans_for_problem(id).unwrap();
            assert_eq!(plans.len(), 1);
            assert_eq!(plans[0].status, PlanStatus::Pending);
        }
    }

    mod storable_tests {
        use super::*;

        #[test]
        fn year_9999_is_the_last_storable_year() {
            let last = Utc.with_ymd_and_hms(9999, 12, 31, 23, 59, 59).unwrap();
            assert_eq!(last.timestamp(), MAX_STORED_TIMESTAMP);
            assert!(is_storable(last));
            assert!(!is_storable(last + Duration::seconds(1)));
            assert!(is_storable(at(1, 0)));
        }
    }

    mod stats_tests {
        use super::*;

        #[test]
        fn stats_empty_db() {
            let db = setup_db();
            let stats = db.get_stats(at(2, 0), at(2, 0)).unwrap();
            assert_eq!(stats.total_problems, 0);
            assert_eq!(stats.total_reviews, 0);
            assert_eq!(stats.due_now, 0);
            assert_eq!(stats.overdue, 0);
            assert_eq!(stats.avg_mastery, 0.0);
        }

        #[test]
        fn stats_counts_due_and_overdue() {
            let db = setup_db();
            let a = add(&db, "A");
            let b = add(&db, "B");
            let c = add(&db, "C");
            db.insert_plan(a, 1, at(1, 9), at(1, 0)).unwrap();
            db.insert_plan(b, 1, at(3, 8), at(1, 0)).unwrap();
            db.insert_plan(c, 1, at(5, 0), at(1, 0)).unwrap();

            let stats = db.get_stats(at(3, 12), at(3, 0)).unwrap();
            assert_eq!(stats.total_problems, 3);
            assert_eq!(stats.due_now, 2);
            assert_eq!(stats.overdue, 1);
        }
    }
}
