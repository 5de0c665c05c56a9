//! Study statistics and dashboard aggregates.
//!
//! Calendar-day computations use the time zone of the `now` argument, so a
//! caller passing `Local::now()` gets local midnight-to-midnight days.

use crate::progress::{ProgressRecord, ReviewSession};
use crate::queue::is_due;
use crate::scheduler::Rating;
use chrono::{DateTime, Days, NaiveDate, TimeZone, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Longest streak we walk back through
const MAX_STREAK_DAYS: u32 = 365;
/// Cards reviewed at least this often with a healthy ease count as mastered
const MASTERED_MIN_REVIEWS: u32 = 3;
const MASTERED_MIN_EASE: f64 = 2.0;
const RECENT_SESSIONS: usize = 50;
const WEEK_DAYS: u64 = 7;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StudyStats {
    pub due_today: usize,
    pub reviewed_today: usize,
    pub current_streak: u32,
    pub average_accuracy: f64,
    pub total_cards: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RatingBreakdown {
    pub again: usize,
    pub hard: usize,
    pub good: usize,
    pub easy: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TopicProgress {
    pub total: usize,
    pub mastered: usize,
    pub accuracy: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyActivity {
    pub date: NaiveDate,
    pub completed: usize,
    /// Share of reviews not rated `again`
    pub accuracy: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardStats {
    pub study: StudyStats,
    pub today: RatingBreakdown,
    pub topics: BTreeMap<String, TopicProgress>,
    pub weekly: Vec<DailyActivity>,
    pub average_session_time: f64,
}

fn day_of<Tz: TimeZone>(at: &DateTime<Utc>, tz: &Tz) -> NaiveDate {
    at.with_timezone(tz).date_naive()
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Snapshot of a user's study state
pub fn study_stats<Tz: TimeZone>(
    progress: &[ProgressRecord],
    sessions: &[ReviewSession],
    now: &DateTime<Tz>,
) -> StudyStats {
    let tz = now.timezone();
    let today = now.date_naive();
    let now_utc = now.with_timezone(&Utc);

    let due_today = progress.iter().filter(|p| is_due(p, now_utc)).count();
    let reviewed_today = progress
        .iter()
        .filter_map(|p| p.last_review_date.as_ref())
        .filter(|at| day_of(at, &tz) == today)
        .count();

    StudyStats {
        due_today,
        reviewed_today,
        current_streak: current_streak(progress, sessions, now),
        average_accuracy: average_accuracy(progress),
        total_cards: progress.len(),
    }
}

/// Consecutive days, ending today, with at least one review
pub fn current_streak<Tz: TimeZone>(
    progress: &[ProgressRecord],
    sessions: &[ReviewSession],
    now: &DateTime<Tz>,
) -> u32 {
    let tz = now.timezone();
    let review_days: HashSet<NaiveDate> = progress
        .iter()
        .filter_map(|p| p.last_review_date.as_ref())
        .chain(sessions.iter().map(|s| &s.ended_at))
        .map(|at| day_of(at, &tz))
        .collect();

    let mut streak = 0;
    let mut day = now.date_naive();
    while streak < MAX_STREAK_DAYS && review_days.contains(&day) {
        streak += 1;
        match day.checked_sub_days(Days::new(1)) {
            Some(previous) => day = previous,
            None => break,
        }
    }

    streak
}

/// Mean per-card accuracy, rounded to two decimals
pub fn average_accuracy(progress: &[ProgressRecord]) -> f64 {
    if progress.is_empty() {
        return 0.0;
    }

    let sum: f64 = progress.iter().map(ProgressRecord::accuracy).sum();
    round2(sum / progress.len() as f64)
}

/// Count of each rating given on `day`
pub fn rating_breakdown<Tz: TimeZone>(
    sessions: &[ReviewSession],
    day: NaiveDate,
    tz: &Tz,
) -> RatingBreakdown {
    let mut breakdown = RatingBreakdown::default();

    for session in sessions.iter().filter(|s| day_of(&s.ended_at, tz) == day) {
        match session.rating {
            Rating::Again => breakdown.again += 1,
            Rating::Hard => breakdown.hard += 1,
            Rating::Good => breakdown.good += 1,
            Rating::Easy => breakdown.easy += 1,
        }
        breakdown.total += 1;
    }

    breakdown
}

/// Per-topic card counts, mastery and accuracy.
/// `topics` maps every flashcard id to its topic; cards without progress count toward totals only.
pub fn topic_progress(
    progress: &[ProgressRecord],
    topics: &HashMap<String, String>,
) -> BTreeMap<String, TopicProgress> {
    let by_card: HashMap<&str, &ProgressRecord> = progress
        .iter()
        .map(|p| (p.flashcard_id.as_str(), p))
        .collect();

    let mut result: BTreeMap<String, TopicProgress> = BTreeMap::new();
    for (card, topic) in topics {
        let entry = result.entry(topic.clone()).or_default();
        entry.total += 1;

        if let Some(record) = by_card.get(card.as_str()) {
            if record.total_reviews >= MASTERED_MIN_REVIEWS
                && record.ease_factor >= MASTERED_MIN_EASE
            {
                entry.mastered += 1;
            }
            entry.accuracy += record.accuracy();
        }
    }

    for entry in result.values_mut() {
        entry.accuracy = round2(entry.accuracy / entry.total as f64);
    }

    result
}

/// Reviews per day over the last week, oldest first
pub fn weekly_activity<Tz: TimeZone>(
    sessions: &[ReviewSession],
    now: &DateTime<Tz>,
) -> Vec<DailyActivity> {
    let tz = now.timezone();
    let today = now.date_naive();

    (0..WEEK_DAYS)
        .rev()
        .filter_map(|offset| today.checked_sub_days(Days::new(offset)))
        .map(|date| {
            let day = rating_breakdown(sessions, date, &tz);
            let accuracy = if day.total > 0 {
                round2((day.total - day.again) as f64 / day.total as f64)
            } else {
                0.0
            };
            DailyActivity {
                date,
                completed: day.total,
                accuracy,
            }
        })
        .collect()
}

/// Mean response time of the most recent sessions, in whole seconds
pub fn average_session_time(sessions: &[ReviewSession]) -> f64 {
    let mut recent: Vec<&ReviewSession> = sessions.iter().collect();
    recent.sort_by(|a, b| b.started_at.cmp(&a.started_at));
    recent.truncate(RECENT_SESSIONS);

    if recent.is_empty() {
        return 0.0;
    }

    let total: f64 = recent.iter().map(|s| s.response_time_secs).sum();
    (total / recent.len() as f64).round()
}

pub fn dashboard<Tz: TimeZone>(
    progress: &[ProgressRecord],
    sessions: &[ReviewSession],
    topics: &HashMap<String, String>,
    now: &DateTime<Tz>,
) -> DashboardStats {
    DashboardStats {
        study: study_stats(progress, sessions, now),
        today: rating_breakdown(sessions, now.date_naive(), &now.timezone()),
        topics: topic_progress(progress, topics),
        weekly: weekly_activity(sessions, now),
        average_session_time: average_session_time(sessions),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, FixedOffset};

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    fn reviewed_at(card: &str, last: DateTime<Utc>, total: u32, streak: u32) -> ProgressRecord {
        let mut record = ProgressRecord::unreviewed("user", card, 2.5, last + Duration::days(1));
        record.last_review_date = Some(last);
        record.total_reviews = total;
        record.correct_streak = streak;
        record.interval_days = 1.0;
        record
    }

    fn session(card: &str, rating: Rating, ended_at: DateTime<Utc>, secs: f64) -> ReviewSession {
        ReviewSession::new("user", card, rating, secs, ended_at)
    }

    #[test]
    fn test_empty_stats() {
        let stats = study_stats(&[], &[], &Utc::now());
        assert_eq!(stats, StudyStats::default());
        assert_eq!(stats.average_accuracy, 0.0);
    }

    #[test]
    fn test_reviewed_today_uses_calendar_day() {
        let now = at(2024, 3, 10, 15);
        let progress = vec![
            reviewed_at("a", at(2024, 3, 10, 0), 2, 1),
            reviewed_at("b", at(2024, 3, 10, 14), 2, 1),
            reviewed_at("c", at(2024, 3, 9, 23), 2, 1),
            ProgressRecord::unreviewed("user", "d", 2.5, now),
        ];

        let stats = study_stats(&progress, &[], &now);
        assert_eq!(stats.reviewed_today, 2);
        assert_eq!(stats.total_cards, 4);
        // only the unreviewed card is due yet
        assert_eq!(stats.due_today, 1);
    }

    #[test]
    fn test_reviewed_today_follows_time_zone() {
        // 23:30 UTC on the 9th is already the 10th at UTC+2
        let tz = FixedOffset::east_opt(2 * 3600).unwrap();
        let now = at(2024, 3, 10, 12).with_timezone(&tz);
        let last = Utc.with_ymd_and_hms(2024, 3, 9, 23, 30, 0).unwrap();
        let progress = vec![reviewed_at("a", last, 1, 1)];

        assert_eq!(study_stats(&progress, &[], &now).reviewed_today, 1);
        assert_eq!(study_stats(&progress, &[], &now.with_timezone(&Utc)).reviewed_today, 0);
    }

    #[test]
    fn test_streak_stops_at_gap() {
        let now = at(2024, 3, 10, 18);
        let progress = vec![reviewed_at("a", at(2024, 3, 10, 9), 3, 3)];
        let sessions = vec![
            session("b", Rating::Good, at(2024, 3, 9, 9), 4.0),
            session("c", Rating::Again, at(2024, 3, 8, 9), 4.0),
            session("c", Rating::Good, at(2024, 3, 6, 9), 4.0),
        ];

        assert_eq!(current_streak(&progress, &sessions, &now), 3);
    }

    #[test]
    fn test_streak_zero_without_review_today() {
        let now = at(2024, 3, 10, 18);
        let progress = vec![reviewed_at("a", at(2024, 3, 9, 9), 3, 3)];
        assert_eq!(current_streak(&progress, &[], &now), 0);
    }

    #[test]
    fn test_streak_is_capped() {
        let now = at(2024, 3, 10, 18);
        let sessions: Vec<_> = (0..400)
            .map(|d| session("a", Rating::Good, now - Duration::days(d), 1.0))
            .collect();
        assert_eq!(current_streak(&[], &sessions, &now), 365);
    }

    #[test]
    fn test_average_accuracy_rounded() {
        let last = at(2024, 3, 10, 9);
        let progress = vec![
            reviewed_at("a", last, 3, 1),
            reviewed_at("b", last, 3, 3),
            ProgressRecord::unreviewed("user", "c", 2.5, last),
        ];
        // (1/3 + 1 + 0) / 3 = 0.444..
        assert_eq!(average_accuracy(&progress), 0.44);
    }

    #[test]
    fn test_rating_breakdown_for_day() {
        let sessions = vec![
            session("a", Rating::Again, at(2024, 3, 10, 9), 4.0),
            session("a", Rating::Good, at(2024, 3, 10, 10), 4.0),
            session("b", Rating::Easy, at(2024, 3, 10, 11), 4.0),
            session("b", Rating::Hard, at(2024, 3, 9, 11), 4.0),
        ];

        let day = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        let breakdown = rating_breakdown(&sessions, day, &Utc);
        assert_eq!(
            breakdown,
            RatingBreakdown {
                again: 1,
                hard: 0,
                good: 1,
                easy: 1,
                total: 3,
            }
        );
    }

    #[test]
    fn test_topic_progress() {
        let last = at(2024, 3, 10, 9);
        let mut struggling = reviewed_at("b", last, 5, 1);
        struggling.ease_factor = 1.5;
        let progress = vec![reviewed_at("a", last, 4, 4), struggling];
        let topics: HashMap<String, String> = [("a", "arrays"), ("b", "arrays"), ("c", "graphs")]
            .into_iter()
            .map(|(card, topic)| (card.to_string(), topic.to_string()))
            .collect();

        let result = topic_progress(&progress, &topics);
        let arrays = &result["arrays"];
        assert_eq!(arrays.total, 2);
        assert_eq!(arrays.mastered, 1);
        // (1.0 + 0.2) / 2
        assert_eq!(arrays.accuracy, 0.6);

        let graphs = &result["graphs"];
        assert_eq!(graphs.total, 1);
        assert_eq!(graphs.mastered, 0);
        assert_eq!(graphs.accuracy, 0.0);
    }

    #[test]
    fn test_weekly_activity() {
        let now = at(2024, 3, 10, 18);
        let sessions = vec![
            session("a", Rating::Again, at(2024, 3, 10, 9), 4.0),
            session("a", Rating::Good, at(2024, 3, 10, 10), 4.0),
            session("b", Rating::Good, at(2024, 3, 4, 10), 4.0),
            session("b", Rating::Good, at(2024, 3, 3, 10), 4.0),
        ];

        let week = weekly_activity(&sessions, &now);
        assert_eq!(week.len(), 7);
        assert_eq!(week[0].date, NaiveDate::from_ymd_opt(2024, 3, 4).unwrap());
        assert_eq!(week[0].completed, 1);
        assert_eq!(week[0].accuracy, 1.0);
        assert_eq!(week[6].completed, 2);
        assert_eq!(week[6].accuracy, 0.5);
        assert_eq!(week[3].completed, 0);
    }

    #[test]
    fn test_average_session_time_uses_recent_sessions() {
        let now = at(2024, 3, 10, 18);
        let mut sessions: Vec<_> = (0..50)
            .map(|i| session("a", Rating::Good, now - Duration::minutes(i), 10.0))
            .collect();
        // Older than the 50 most recent
        sessions.push(session("a", Rating::Good, now - Duration::days(3), 1000.0));

        assert_eq!(average_session_time(&sessions), 10.0);
        assert_eq!(average_session_time(&[]), 0.0);
    }
}
