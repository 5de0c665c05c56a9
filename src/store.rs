use crate::progress::{ProgressRecord, ReviewSession};
use std::collections::HashMap;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The stored record changed since it was read
    #[error(
        "Progress for card {flashcard_id} (user {user_id}) was modified concurrently: \
         expected version {expected:?}, found {found:?}"
    )]
    Conflict {
        flashcard_id: String,
        user_id: String,
        expected: Option<u32>,
        found: Option<u32>,
    },

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Persistence for per-user scheduling state and review history.
///
/// Writes are version-checked: a record with `version == n` replaces the stored
/// record only if the stored one has version `n - 1`, and is inserted only if
/// `n == 1` and nothing is stored yet. Anything else is a `StoreError::Conflict`.
pub trait ProgressStore {
    fn progress(&self, user_id: &str, flashcard_id: &str) -> Result<Option<ProgressRecord>>;

    fn all_progress(&self, user_id: &str) -> Result<Vec<ProgressRecord>>;

    fn save_progress(&mut self, record: &ProgressRecord) -> Result<()>;

    /// Save the outcome of a review together with its session, atomically
    fn record_review(&mut self, record: &ProgressRecord, session: &ReviewSession) -> Result<i64>;

    fn sessions(&self, user_id: &str) -> Result<Vec<ReviewSession>>;

    /// Topic of every flashcard the user owns, keyed by flashcard id
    fn flashcard_topics(&self, user_id: &str) -> Result<HashMap<String, String>>;

    /// Remove all progress and sessions of a user. Flashcards are kept.
    fn delete_user_progress(&mut self, user_id: &str) -> Result<()>;
}

/// Check a pending write against the version currently stored
pub fn check_version(record: &ProgressRecord, stored: Option<u32>) -> Result<()> {
    let expected = record.version.checked_sub(1).filter(|v| *v > 0);
    if stored == expected {
        Ok(())
    } else {
        Err(StoreError::Conflict {
            flashcard_id: record.flashcard_id.clone(),
            user_id: record.user_id.clone(),
            expected,
            found: stored,
        })
    }
}

/// In-memory store, used in tests and for throwaway sessions
#[derive(Debug, Default)]
pub struct MemoryStore {
    progress: HashMap<(String, String), ProgressRecord>,
    sessions: Vec<ReviewSession>,
    topics: HashMap<(String, String), String>,
    next_session_id: i64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_flashcard(&mut self, user_id: &str, flashcard_id: &str, topic: &str) {
        self.topics.insert(
            (user_id.to_string(), flashcard_id.to_string()),
            topic.to_string(),
        );
    }

    pub fn flashcard_count(&self, user_id: &str) -> usize {
        self.topics.keys().filter(|(user, _)| user == user_id).count()
    }

    fn key(user_id: &str, flashcard_id: &str) -> (String, String) {
        (user_id.to_string(), flashcard_id.to_string())
    }
}

impl ProgressStore for MemoryStore {
    fn progress(&self, user_id: &str, flashcard_id: &str) -> Result<Option<ProgressRecord>> {
        Ok(self.progress.get(&Self::key(user_id, flashcard_id)).cloned())
    }

    fn all_progress(&self, user_id: &str) -> Result<Vec<ProgressRecord>> {
        let mut records: Vec<_> = self
            .progress
            .values()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| a.flashcard_id.cmp(&b.flashcard_id));
        Ok(records)
    }

    fn save_progress(&mut self, record: &ProgressRecord) -> Result<()> {
        let key = Self::key(&record.user_id, &record.flashcard_id);
        check_version(record, self.progress.get(&key).map(|p| p.version))?;
        self.progress.insert(key, record.clone());
        Ok(())
    }

    fn record_review(&mut self, record: &ProgressRecord, session: &ReviewSession) -> Result<i64> {
        self.save_progress(record)?;

        self.next_session_id += 1;
        let mut session = session.clone();
        session.id = self.next_session_id;
        self.sessions.push(session);

        Ok(self.next_session_id)
    }

    fn sessions(&self, user_id: &str) -> Result<Vec<ReviewSession>> {
        Ok(self
            .sessions
            .iter()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect())
    }

    fn flashcard_topics(&self, user_id: &str) -> Result<HashMap<String, String>> {
        Ok(self
            .topics
            .iter()
            .filter(|((user, _), _)| user == user_id)
            .map(|((_, card), topic)| (card.clone(), topic.clone()))
            .collect())
    }

    fn delete_user_progress(&mut self, user_id: &str) -> Result<()> {
        self.progress.retain(|(user, _), _| user != user_id);
        self.sessions.retain(|s| s.user_id != user_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::Rating;
    use chrono::Utc;

    #[test]
    fn test_insert_requires_version_one() {
        let mut store = MemoryStore::new();
        let mut record = ProgressRecord::unreviewed("u1", "c1", 2.5, Utc::now());
        record.version = 2;

        let err = store.save_progress(&record).unwrap_err();
        assert!(matches!(err, StoreError::Conflict { found: None, .. }));
        assert!(store.progress("u1", "c1").unwrap().is_none());
    }

    #[test]
    fn test_stale_write_rejected() {
        let mut store = MemoryStore::new();
        let record = ProgressRecord::unreviewed("u1", "c1", 2.5, Utc::now());
        store.save_progress(&record).unwrap();

        let mut first = record.clone();
        first.version = 2;
        first.total_reviews = 1;
        store.save_progress(&first).unwrap();

        // A second writer that read version 1 loses
        let mut second = record.clone();
        second.version = 2;
        second.total_reviews = 1;
        let err = store.save_progress(&second).unwrap_err();
        assert!(matches!(
            err,
            StoreError::Conflict {
                expected: Some(1),
                found: Some(2),
                ..
            }
        ));
        assert_eq!(store.progress("u1", "c1").unwrap().unwrap().total_reviews, 1);
    }

    #[test]
    fn test_failed_review_does_not_record_session() {
        let mut store = MemoryStore::new();
        let mut record = ProgressRecord::unreviewed("u1", "c1", 2.5, Utc::now());
        record.version = 5;
        let session = ReviewSession::new("u1", "c1", Rating::Good, 3.0, Utc::now());

        assert!(store.record_review(&record, &session).is_err());
        assert!(store.sessions("u1").unwrap().is_empty());
    }

    #[test]
    fn test_delete_is_scoped_to_user() {
        let mut store = MemoryStore::new();
        let now = Utc::now();
        store.add_flashcard("u1", "c1", "arrays");
        store
            .save_progress(&ProgressRecord::unreviewed("u1", "c1", 2.5, now))
            .unwrap();
        store
            .save_progress(&ProgressRecord::unreviewed("u2", "c1", 2.5, now))
            .unwrap();

        store.delete_user_progress("u1").unwrap();

        assert!(store.all_progress("u1").unwrap().is_empty());
        assert_eq!(store.all_progress("u2").unwrap().len(), 1);
        assert_eq!(store.flashcard_count("u1"), 1);
    }
}
