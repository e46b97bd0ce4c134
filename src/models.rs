use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Problem {
    pub id: i64,
    pub title: String,
    pub source: Option<String>,
    pub created_at: DateTime<Utc>,
    pub tags: Vec<String>,
    // Performance fields, owned by the scheduler
    pub mastery: i32,
    pub last_practiced_at: Option<DateTime<Utc>>,
    pub average_score: f64,
    pub total_reviews: i64,
}

impl Problem {
    pub fn mastery_label(&self) -> &'static str {
        match self.mastery {
            0 => "New",
            1 => "Learning",
            2 => "Familiar",
            3 => "Comfortable",
            4 => "Proficient",
            5 => "Mastered",
            _ => "Unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlanStatus {
    Pending,
    Completed,
    Skipped,
    Postponed,
}

impl PlanStatus {
    /// Statuses a plan can be completed from.
    pub const ACTIVE: [PlanStatus; 3] = [
        PlanStatus::Pending,
        PlanStatus::Skipped,
        PlanStatus::Postponed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PlanStatus::Pending => "pending",
            PlanStatus::Completed => "completed",
            PlanStatus::Skipped => "skipped",
            PlanStatus::Postponed => "postponed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(PlanStatus::Pending),
            "completed" => Some(PlanStatus::Completed),
            "skipped" => Some(PlanStatus::Skipped),
            "postponed" => Some(PlanStatus::Postponed),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PlanStatus::Pending => "Pending",
            PlanStatus::Completed => "Completed",
            PlanStatus::Skipped => "Skipped",
            PlanStatus::Postponed => "Postponed",
        }
    }

    pub fn is_active(&self) -> bool {
        !matches!(self, PlanStatus::Completed)
    }
}

// Self-reported certainty at grading time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Confidence {
    VeryLow = 1,
    Low = 2,
    Medium = 3,
    High = 4,
    VeryHigh = 5,
}

impl Confidence {
    pub fn as_i32(&self) -> i32 {
        *self as i32
    }

    pub fn from_i32(v: i32) -> Option<Self> {
        match v {
            1 => Some(Confidence::VeryLow),
            2 => Some(Confidence::Low),
            3 => Some(Confidence::Medium),
            4 => Some(Confidence::High),
            5 => Some(Confidence::VeryHigh),
            _ => None,
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "very-low" | "very_low" | "verylow" | "1" => Some(Confidence::VeryLow),
            "low" | "2" => Some(Confidence::Low),
            "medium" | "med" | "3" => Some(Confidence::Medium),
            "high" | "4" => Some(Confidence::High),
            "very-high" | "very_high" | "veryhigh" | "5" => Some(Confidence::VeryHigh),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Confidence::VeryLow => "Very low",
            Confidence::Low => "Low",
            Confidence::Medium => "Medium",
            Confidence::High => "High",
            Confidence::VeryHigh => "Very high",
        }
    }

    /// Multiplier applied to the level's base interval.
    pub fn interval_factor(&self) -> f64 {
        match self {
            Confidence::VeryLow => 0.5,
            Confidence::Low => 0.75,
            Confidence::Medium => 1.0,
            Confidence::High => 1.25,
            Confidence::VeryHigh => 1.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewPlan {
    pub id: i64,
    pub problem_id: i64,
    pub scheduled_at: DateTime<Utc>,
    pub status: PlanStatus,
    pub level: i32,
    pub score: Option<i32>,
    pub confidence: Option<Confidence>,
    pub time_spent_secs: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ReviewPlan {
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    pub id: i64,
    pub name: String,
    pub problem_count: i64,
}

// JSON output wrapper for CLI
#[derive(Debug, Serialize)]
pub struct JsonOutput<T: Serialize> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> JsonOutput<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}
