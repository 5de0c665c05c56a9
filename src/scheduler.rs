use crate::progress::{ProgressRecord, schedule_after};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Self-assessed recall quality for one review, in ascending confidence
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rating {
    /// Forgot the answer
    Again = 1,
    /// Recalled with serious difficulty
    Hard = 2,
    /// Recalled after some hesitation
    Good = 3,
    /// Recalled instantly
    Easy = 4,
}

impl Rating {
    pub const ALL: [Rating; 4] = [Rating::Again, Rating::Hard, Rating::Good, Rating::Easy];

    /// Numeric form used in the database (1-4)
    pub fn as_u32(&self) -> u32 {
        *self as u32
    }

    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            1 => Some(Rating::Again),
            2 => Some(Rating::Hard),
            3 => Some(Rating::Good),
            4 => Some(Rating::Easy),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Rating::Again => "again",
            Rating::Hard => "hard",
            Rating::Good => "good",
            Rating::Easy => "easy",
        }
    }

    /// Anything but `Again` counts as a successful recall
    pub fn is_pass(&self) -> bool {
        *self != Rating::Again
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown rating '{0}', expected again, hard, good or easy")]
pub struct ParseRatingError(String);

impl FromStr for Rating {
    type Err = ParseRatingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "again" => Ok(Rating::Again),
            "hard" => Ok(Rating::Hard),
            "good" => Ok(Rating::Good),
            "easy" => Ok(Rating::Easy),
            _ => Err(ParseRatingError(s.to_string())),
        }
    }
}

/// Shrink applied to the interval on a lapse
const AGAIN_INTERVAL_FACTOR: f64 = 0.2;
const AGAIN_EASE_PENALTY: f64 = 0.2;
const HARD_INTERVAL_FACTOR: f64 = 1.2;
const HARD_MIN_INTERVAL_DAYS: f64 = 1.0;
const HARD_EASE_PENALTY: f64 = 0.15;
const EASY_EASE_BONUS: f64 = 0.1;
const EASY_INTERVAL_BONUS: f64 = 1.3;
/// Graduation interval multiplier for an `Easy` answer on a learning card
const EASY_GRADUATION_FACTOR: f64 = 1.5;
/// Number of samples after which the response time average stops widening
const RESPONSE_TIME_WINDOW: u32 = 10;
const FAST_RESPONSE_RATIO: f64 = 0.5;
const SLOW_RESPONSE_RATIO: f64 = 2.0;
const FAST_RESPONSE_BONUS: f64 = 1.1;
const SLOW_RESPONSE_PENALTY: f64 = 0.9;

/// Tunable scheduling parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SchedulerParams {
    /// Ease factor given to new cards
    pub default_ease_factor: f64,
    /// Ease factor never drops below this
    pub minimum_ease_factor: f64,
    /// Interval after a successful first review
    pub initial_interval_days: f64,
    /// Interval after a failed first review, and the floor for every interval
    pub minimum_interval_days: f64,
    /// Intervals below this are still learning
    pub graduation_interval_days: f64,
    /// Ceiling for every interval
    pub maximum_interval_days: f64,
}

impl Default for SchedulerParams {
    fn default() -> Self {
        Self {
            default_ease_factor: 2.5,
            minimum_ease_factor: 1.3,
            initial_interval_days: 1.0,
            minimum_interval_days: 0.1,
            graduation_interval_days: 4.0,
            maximum_interval_days: 36_500.0,
        }
    }
}

/// Modified SM-2 scheduler
#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    params: SchedulerParams,
}

impl Scheduler {
    pub fn new(params: SchedulerParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &SchedulerParams {
        &self.params
    }

    /// Schedule a card that has no progress record yet
    pub fn first_review(
        &self,
        user_id: &str,
        flashcard_id: &str,
        rating: Rating,
        response_time_secs: f64,
        now: DateTime<Utc>,
    ) -> ProgressRecord {
        let interval_days = if rating == Rating::Again {
            self.params.minimum_interval_days
        } else {
            self.params.initial_interval_days
        };
        let interval_days = interval_days.min(self.params.maximum_interval_days);

        ProgressRecord {
            flashcard_id: flashcard_id.to_string(),
            user_id: user_id.to_string(),
            next_review_date: schedule_after(now, interval_days),
            interval_days,
            ease_factor: self.params.default_ease_factor,
            total_reviews: 1,
            correct_streak: if rating.is_pass() { 1 } else { 0 },
            last_review_date: Some(now),
            average_response_time: sanitize_response_time(response_time_secs),
            version: 1,
        }
    }

    /// Schedule the next review of a card given its current progress
    pub fn review(
        &self,
        current: &ProgressRecord,
        rating: Rating,
        response_time_secs: f64,
        now: DateTime<Utc>,
    ) -> ProgressRecord {
        let response_time = sanitize_response_time(response_time_secs);
        let params = &self.params;
        let mut next = current.clone();
        next.version = current.version + 1;
        next.total_reviews += 1;
        next.last_review_date = Some(now);

        let weight = next.total_reviews.min(RESPONSE_TIME_WINDOW) as f64;
        next.average_response_time =
            (next.average_response_time * (weight - 1.0) + response_time) / weight;

        match rating {
            Rating::Again => {
                next.correct_streak = 0;
                next.interval_days =
                    (next.interval_days * AGAIN_INTERVAL_FACTOR).max(params.minimum_interval_days);
                next.ease_factor =
                    (next.ease_factor - AGAIN_EASE_PENALTY).max(params.minimum_ease_factor);
            }
            Rating::Hard => {
                next.correct_streak = 1;
                next.interval_days =
                    (next.interval_days * HARD_INTERVAL_FACTOR).max(HARD_MIN_INTERVAL_DAYS);
                next.ease_factor =
                    (next.ease_factor - HARD_EASE_PENALTY).max(params.minimum_ease_factor);
            }
            Rating::Good => {
                next.correct_streak += 1;
                next.interval_days = if next.interval_days < params.graduation_interval_days {
                    params.graduation_interval_days
                } else {
                    (next.interval_days * next.ease_factor).round()
                };
            }
            Rating::Easy => {
                next.correct_streak += 1;
                next.ease_factor += EASY_EASE_BONUS;
                next.interval_days = if next.interval_days < params.graduation_interval_days {
                    params.graduation_interval_days * EASY_GRADUATION_FACTOR
                } else {
                    (next.interval_days * next.ease_factor * EASY_INTERVAL_BONUS).round()
                };
            }
        }

        let adjustment = time_adjustment(response_time, next.average_response_time);
        next.interval_days = (next.interval_days * adjustment)
            .max(params.minimum_interval_days)
            .min(params.maximum_interval_days);
        next.next_review_date = schedule_after(now, next.interval_days);

        next
    }
}

/// Interval multiplier from how the latest response compares with the running average
pub fn time_adjustment(response_time_secs: f64, average_response_time: f64) -> f64 {
    if average_response_time <= 0.0 {
        return 1.0;
    }

    let ratio = response_time_secs / average_response_time;
    if ratio < FAST_RESPONSE_RATIO {
        FAST_RESPONSE_BONUS
    } else if ratio > SLOW_RESPONSE_RATIO {
        SLOW_RESPONSE_PENALTY
    } else {
        1.0
    }
}

fn sanitize_response_time(secs: f64) -> f64 {
    if secs.is_finite() { secs.max(0.0) } else { 0.0 }
}
