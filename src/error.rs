use thiserror::Error;

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Invalid score {0}: expected a grade between 0 and 5")]
    InvalidScore(i32),

    #[error("Invalid postpone of {0} days: must be between 1 and 3650")]
    InvalidPostpone(i64),

    #[error("Review plan {0} is not active")]
    PlanNotActive(i64),

    #[error("Review plan {0} is not in today's queue")]
    NotSkippable(i64),

    #[error("Problem {0} already has an active review plan")]
    DuplicateActivePlan(i64),

    #[error("Review plan not found: {0}")]
    PlanNotFound(i64),

    #[error("Problem not found: {0}")]
    ProblemNotFound(i64),

    #[error("Storage write failed: {0}")]
    StorageWriteFailed(#[source] rusqlite::Error),

    #[error("Storage read failed: {0}")]
    StorageReadFailed(#[source] rusqlite::Error),
}

impl SchedulerError {
    /// Whether retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SchedulerError::StorageWriteFailed(_))
    }
}

// Errors raised inside a write transaction (begin, statements, commit) all
// roll the transaction back, so they surface as write failures.
impl From<rusqlite::Error> for SchedulerError {
    fn from(e: rusqlite::Error) -> Self {
        SchedulerError::StorageWriteFailed(e)
    }
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
