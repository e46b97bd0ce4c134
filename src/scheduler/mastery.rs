//! Running performance statistics for a problem, updated on every completion.

use chrono::{DateTime, Utc};

use crate::models::Problem;

pub const MAX_MASTERY: i32 = 5;

pub fn apply_grade(problem: &mut Problem, score: i32) {
    problem.mastery = match score {
        5 => MAX_MASTERY,
        4 => (problem.mastery + 1).min(MAX_MASTERY),
        3 => problem.mastery,
        2 => (problem.mastery - 1).max(0),
        _ => (problem.mastery - 2).max(0),
    };
}

pub fn apply_average(problem: &mut Problem, score: i32, now: DateTime<Utc>) {
    let reviews = problem.total_reviews as f64;
    problem.average_score = (problem.average_score * reviews + score as f64) / (reviews + 1.0);
    problem.total_reviews += 1;
    problem.last_practiced_at = Some(now);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn make_problem(mastery: i32, average_score: f64, total_reviews: i64) -> Problem {
        Problem {
            id: 1,
            title: "Two Sum".to_string(),
            source: None,
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            tags: vec![],
            mastery,
            last_practiced_at: None,
            average_score,
            total_reviews,
        }
    }

    fn graded(mastery: i32, score: i32) -> i32 {
        let mut p = make_problem(mastery, 0.0, 0);
        apply_grade(&mut p, score);
        p.mastery
    }

    #[test]
    fn perfect_score_jumps_to_mastered() {
        assert_eq!(graded(0, 5), 5);
        assert_eq!(graded(3, 5), 5);
    }

    #[test]
    fn good_score_increments_and_caps() {
        assert_eq!(graded(2, 4), 3);
        assert_eq!(graded(5, 4), 5);
    }

    #[test]
    fn marginal_score_keeps_mastery() {
        assert_eq!(graded(3, 3), 3);
    }

    #[test]
    fn partial_failure_decrements_and_floors() {
        assert_eq!(graded(3, 2), 2);
        assert_eq!(graded(0, 2), 0);
    }

    #[test]
    fn hard_failure_drops_two() {
        assert_eq!(graded(3, 1), 1);
        assert_eq!(graded(3, 0), 1);
        assert_eq!(graded(1, 0), 0);
    }

    #[test]
    fn average_first_review() {
        let now = Utc.with_ymd_and_hms(2024, 1, 2, 9, 0, 0).unwrap();
        let mut p = make_problem(0, 0.0, 0);

        apply_average(&mut p, 4, now);

        assert_eq!(p.average_score, 4.0);
        assert_eq!(p.total_reviews, 1);
        assert_eq!(p.last_practiced_at, Some(now));
    }

    #[test]
    fn average_is_running_mean() {
        let now = Utc.with_ymd_and_hms(2024, 1, 2, 9, 0, 0).unwrap();
        let mut p = make_problem(0, 0.0, 0);

        for score in [5, 2, 2] {
            apply_average(&mut p, score, now);
        }

        assert_eq!(p.average_score, 3.0);
        assert_eq!(p.total_reviews, 3);
    }

    #[test]
    fn average_ignores_mastery() {
        let now = Utc.with_ymd_and_hms(2024, 1, 2, 9, 0, 0).unwrap();
        let mut p = make_problem(4, 3.0, 2);

        apply_average(&mut p, 0, now);

        assert_eq!(p.mastery, 4);
        assert_eq!(p.average_score, 2.0);
    }
}
