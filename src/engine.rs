use crate::progress::{ProgressRecord, ReviewSession};
use crate::queue::{self, DueCard, DueQuery};
use crate::scheduler::{Rating, Scheduler, SchedulerParams};
use crate::stats::{self, DashboardStats, StudyStats};
use crate::store::{ProgressStore, Result};
use chrono::{DateTime, TimeZone, Utc};
use log::{debug, info, warn};
use std::collections::HashMap;

/// Spaced-repetition engine over a progress store.
///
/// Every operation is a read, a pure computation and at most one write.
/// Store errors are returned unchanged and never retried.
pub struct Engine<S> {
    store: S,
    scheduler: Scheduler,
}

impl<S: ProgressStore> Engine<S> {
    pub fn new(store: S, params: SchedulerParams) -> Self {
        Self {
            store,
            scheduler: Scheduler::new(params),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn params(&self) -> &SchedulerParams {
        self.scheduler.params()
    }

    /// Apply one review and persist the outcome together with a session row.
    /// If the write fails nothing is stored and the error is returned.
    pub fn review(
        &mut self,
        user_id: &str,
        flashcard_id: &str,
        rating: Rating,
        response_time_secs: f64,
        now: DateTime<Utc>,
    ) -> Result<ProgressRecord> {
        let next = match self.store.progress(user_id, flashcard_id)? {
            Some(current) => self
                .scheduler
                .review(&current, rating, response_time_secs, now),
            None => self.scheduler.first_review(
                user_id,
                flashcard_id,
                rating,
                response_time_secs,
                now,
            ),
        };

        let session = ReviewSession::new(user_id, flashcard_id, rating, response_time_secs, now);
        if let Err(e) = self.store.record_review(&next, &session) {
            warn!("Failed to save review of {flashcard_id} for {user_id}: {e}");
            return Err(e);
        }

        debug!(
            "Reviewed {flashcard_id} ({rating}): interval {:.2}d, ease {:.2}, reviews {}",
            next.interval_days, next.ease_factor, next.total_reviews
        );

        Ok(next)
    }

    /// Create an immediately-due record unless one exists. Returns whether one was created.
    pub fn initialize_progress(
        &mut self,
        user_id: &str,
        flashcard_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        if self.store.progress(user_id, flashcard_id)?.is_some() {
            return Ok(false);
        }

        let record = ProgressRecord::unreviewed(
            user_id,
            flashcard_id,
            self.params().default_ease_factor,
            now,
        );
        self.store.save_progress(&record)?;
        debug!("Initialized progress for {flashcard_id} ({user_id})");

        Ok(true)
    }

    /// Put a single card back into the unreviewed state
    pub fn reset_card_progress(
        &mut self,
        user_id: &str,
        flashcard_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ProgressRecord> {
        let mut record = ProgressRecord::unreviewed(
            user_id,
            flashcard_id,
            self.params().default_ease_factor,
            now,
        );
        if let Some(current) = self.store.progress(user_id, flashcard_id)? {
            record.version = current.version + 1;
        }

        self.store.save_progress(&record)?;
        info!("Reset progress for {flashcard_id} ({user_id})");

        Ok(record)
    }

    /// Delete every progress record and review session of a user
    pub fn reset_all_progress(&mut self, user_id: &str) -> Result<()> {
        self.store.delete_user_progress(user_id)?;
        info!("Reset all progress for {user_id}");
        Ok(())
    }

    /// Due cards, highest priority first
    pub fn due_cards(
        &self,
        user_id: &str,
        query: &DueQuery,
        now: DateTime<Utc>,
    ) -> Result<Vec<DueCard>> {
        let records = self.store.all_progress(user_id)?;
        let topics = self.filter_topics(user_id, query)?;

        Ok(queue::due_cards(records, &topics, query, now, self.params()))
    }

    /// Topics of the user's cards, loaded only when `query` filters on topic
    fn filter_topics(&self, user_id: &str, query: &DueQuery) -> Result<HashMap<String, String>> {
        if query.topics.is_empty() {
            return Ok(HashMap::new());
        }
        self.store.flashcard_topics(user_id)
    }

    /// Study statistics; `due_today` honours the topic filter and daily limit of `query`
    pub fn study_stats<Tz: TimeZone>(
        &self,
        user_id: &str,
        query: &DueQuery,
        now: &DateTime<Tz>,
    ) -> Result<StudyStats> {
        let progress = self.store.all_progress(user_id)?;
        let sessions = self.store.sessions(user_id)?;
        let topics = self.filter_topics(user_id, query)?;

        let mut stats = stats::study_stats(&progress, &sessions, now);
        let utc_now = now.with_timezone(&Utc);
        stats.due_today = queue::due_cards(progress, &topics, query, utc_now, self.params()).len();

        Ok(stats)
    }

    pub fn dashboard<Tz: TimeZone>(&self, user_id: &str, now: &DateTime<Tz>) -> Result<DashboardStats> {
        let progress = self.store.all_progress(user_id)?;
        let sessions = self.store.sessions(user_id)?;
        let topics = self.store.flashcard_topics(user_id)?;

        Ok(stats::dashboard(&progress, &sessions, &topics, now))
    }
}
