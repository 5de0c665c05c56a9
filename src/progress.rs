use crate::scheduler::Rating;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Scheduling state for one flashcard, owned by one user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub flashcard_id: String,
    pub user_id: String,
    pub next_review_date: DateTime<Utc>,
    pub interval_days: f64,
    pub ease_factor: f64,
    pub total_reviews: u32,
    pub correct_streak: u32,
    /// None until the card has been reviewed at least once
    pub last_review_date: Option<DateTime<Utc>>,
    /// Running average of response latency in seconds
    pub average_response_time: f64,
    /// Bumped on every write; the store rejects writes built from a stale read
    pub version: u32,
}

impl ProgressRecord {
    /// A never-reviewed record that is due immediately
    pub fn unreviewed(
        user_id: &str,
        flashcard_id: &str,
        ease_factor: f64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            flashcard_id: flashcard_id.to_string(),
            user_id: user_id.to_string(),
            next_review_date: now,
            interval_days: 0.0,
            ease_factor,
            total_reviews: 0,
            correct_streak: 0,
            last_review_date: None,
            average_response_time: 0.0,
            version: 1,
        }
    }

    /// Share of reviews covered by the current streak
    pub fn accuracy(&self) -> f64 {
        self.correct_streak as f64 / self.total_reviews.max(1) as f64
    }
}

/// One completed review, kept as study history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewSession {
    /// Assigned by the store; 0 before the session is saved
    pub id: i64,
    pub flashcard_id: String,
    pub user_id: String,
    pub rating: Rating,
    pub response_time_secs: f64,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

impl ReviewSession {
    /// Session ending at `ended_at` that took `response_time_secs`
    pub fn new(
        user_id: &str,
        flashcard_id: &str,
        rating: Rating,
        response_time_secs: f64,
        ended_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: 0,
            flashcard_id: flashcard_id.to_string(),
            user_id: user_id.to_string(),
            rating,
            response_time_secs,
            started_at: ended_at - days_to_duration(response_time_secs / SECONDS_PER_DAY),
            ended_at,
        }
    }
}

pub const SECONDS_PER_DAY: f64 = 86_400.0;

/// Convert a fractional day count to a duration with millisecond precision
pub fn days_to_duration(days: f64) -> Duration {
    let millis = (days * SECONDS_PER_DAY * 1000.0).round() as i64;
    Duration::milliseconds(millis.max(-i64::MAX))
}

/// 9999-12-31T23:59:59Z, the last instant with a four-digit RFC 3339 year
const LATEST_SCHEDULE_SECS: i64 = 253_402_300_799;

/// Latest date a review can be scheduled for
pub fn latest_schedule() -> DateTime<Utc> {
    Utc.timestamp_opt(LATEST_SCHEDULE_SECS, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// `from` plus a fractional day count, saturating at [`latest_schedule`]
pub fn schedule_after(from: DateTime<Utc>, days: f64) -> DateTime<Utc> {
    let latest = latest_schedule();
    match from.checked_add_signed(days_to_duration(days)) {
        Some(at) if at <= latest => at,
        _ => latest,
    }
}
