use crate::progress::{ProgressRecord, SECONDS_PER_DAY};
use crate::scheduler::SchedulerParams;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Weight of each overdue day in the priority score
const OVERDUE_WEIGHT: f64 = 10.0;
/// Weight of the ease deficit below the default ease factor
const EASE_WEIGHT: f64 = 5.0;
/// Cards with fewer reviews than this get a boost
const NEW_CARD_REVIEWS: u32 = 10;

/// Restrictions applied when building a review queue
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DueQuery {
    /// Only cards in these topics; empty means every topic
    pub topics: Vec<String>,
    /// Keep at most this many of the highest-priority cards
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DueCard {
    pub priority: f64,
    pub progress: ProgressRecord,
}

pub fn is_due(record: &ProgressRecord, now: DateTime<Utc>) -> bool {
    record.next_review_date <= now
}

/// Days past the scheduled review, zero if not yet due
pub fn overdue_days(record: &ProgressRecord, now: DateTime<Utc>) -> f64 {
    let overdue = now.signed_duration_since(record.next_review_date);
    (overdue.num_milliseconds() as f64 / 1000.0 / SECONDS_PER_DAY).max(0.0)
}

/// Urgency of a card; higher is reviewed first
pub fn priority(record: &ProgressRecord, now: DateTime<Utc>, params: &SchedulerParams) -> f64 {
    let overdue = overdue_days(record, now) * OVERDUE_WEIGHT;
    let struggling = (params.default_ease_factor - record.ease_factor) * EASE_WEIGHT;
    let newness = NEW_CARD_REVIEWS.saturating_sub(record.total_reviews) as f64;

    overdue + struggling + newness
}

/// Select the due records, filter by topic, order by priority and cap the count
pub fn due_cards(
    records: Vec<ProgressRecord>,
    topics: &HashMap<String, String>,
    query: &DueQuery,
    now: DateTime<Utc>,
    params: &SchedulerParams,
) -> Vec<DueCard> {
    let mut due: Vec<DueCard> = records
        .into_iter()
        .filter(|record| is_due(record, now))
        .filter(|record| {
            query.topics.is_empty()
                || topics
                    .get(&record.flashcard_id)
                    .is_some_and(|topic| query.topics.contains(topic))
        })
        .map(|progress| DueCard {
            priority: priority(&progress, now, params),
            progress,
        })
        .collect();

    due.sort_by(|a, b| b.priority.total_cmp(&a.priority));

    if let Some(limit) = query.limit {
        due.truncate(limit);
    }

    due
}
