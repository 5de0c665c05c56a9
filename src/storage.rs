use crate::progress::{ProgressRecord, ReviewSession, latest_schedule};
use crate::scheduler::Rating;
use crate::store::{ProgressStore, Result, StoreError, check_version};
use anyhow::Context;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::collections::HashMap;
use std::path::Path;

const PROGRESS_COLUMNS: &str = "flashcard_id, user_id, next_review_date, interval_days, ease_factor,
     total_reviews, correct_streak, last_review_date, average_response_time, version";

const SESSION_COLUMNS: &str =
    "id, flashcard_id, user_id, rating, response_time_secs, started_at, ended_at";

/// SQLite-backed progress store
pub struct Storage {
    conn: Connection,
}

impl Storage {
    /// Open or create the database
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;

        let storage = Storage { conn };
        storage
            .init_schema()
            .context("Failed to initialize database schema")?;

        Ok(storage)
    }

    pub fn open_in_memory() -> anyhow::Result<Self> {
        let storage = Storage {
            conn: Connection::open_in_memory()?,
        };
        storage.init_schema()?;
        Ok(storage)
    }

    /// Initialize database schema
    fn init_schema(&self) -> rusqlite::Result<()> {
        self.conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS flashcards (
                id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                topic TEXT NOT NULL,
                title TEXT NOT NULL DEFAULT '',
                PRIMARY KEY (user_id, id)
            );

            CREATE TABLE IF NOT EXISTS progress (
                flashcard_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                next_review_date TEXT NOT NULL,
                interval_days REAL NOT NULL,
                ease_factor REAL NOT NULL,
                total_reviews INTEGER NOT NULL DEFAULT 0,
                correct_streak INTEGER NOT NULL DEFAULT 0,
                last_review_date TEXT,
                average_response_time REAL NOT NULL DEFAULT 0,
                version INTEGER NOT NULL,
                PRIMARY KEY (user_id, flashcard_id)
            );

            CREATE TABLE IF NOT EXISTS sessions (
                id INTEGER PRIMARY KEY,
                flashcard_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                rating INTEGER NOT NULL,
                response_time_secs REAL NOT NULL,
                started_at TEXT NOT NULL,
                ended_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_progress_due ON progress(user_id, next_review_date);
            CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id, ended_at);
            ",
        )
    }

    /// Insert a flashcard or update its topic and title
    pub fn upsert_flashcard(
        &self,
        user_id: &str,
        flashcard_id: &str,
        topic: &str,
        title: &str,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT INTO flashcards (id, user_id, topic, title)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(user_id, id) DO UPDATE SET topic = ?3, title = ?4",
            params![flashcard_id, user_id, topic, title],
        )?;

        Ok(())
    }

    pub fn flashcard_count(&self, user_id: &str) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM flashcards WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn stored_version(conn: &Connection, user_id: &str, flashcard_id: &str) -> Result<Option<u32>> {
        let version = conn
            .query_row(
                "SELECT version FROM progress WHERE user_id = ?1 AND flashcard_id = ?2",
                params![user_id, flashcard_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(version)
    }

    /// Version-checked write of one record on an open connection or transaction
    fn write_progress(conn: &Connection, record: &ProgressRecord) -> Result<()> {
        let stored = Self::stored_version(conn, &record.user_id, &record.flashcard_id)?;
        check_version(record, stored)?;

        let next_review = format_timestamp(&record.next_review_date);
        let last_review = record.last_review_date.as_ref().map(format_timestamp);

        let changed = match stored {
            None => conn.execute(
                "INSERT INTO progress (flashcard_id, user_id, next_review_date, interval_days,
                    ease_factor, total_reviews, correct_streak, last_review_date,
                    average_response_time, version)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                 ON CONFLICT(user_id, flashcard_id) DO NOTHING",
                params![
                    record.flashcard_id,
                    record.user_id,
                    next_review,
                    record.interval_days,
                    record.ease_factor,
                    record.total_reviews,
                    record.correct_streak,
                    last_review,
                    record.average_response_time,
                    record.version,
                ],
            )?,
            Some(previous) => conn.execute(
                "UPDATE progress SET
                    next_review_date = ?3,
                    interval_days = ?4,
                    ease_factor = ?5,
                    total_reviews = ?6,
                    correct_streak = ?7,
                    last_review_date = ?8,
                    average_response_time = ?9,
                    version = ?10
                 WHERE flashcard_id = ?1 AND user_id = ?2 AND version = ?11",
                params![
                    record.flashcard_id,
                    record.user_id,
                    next_review,
                    record.interval_days,
                    record.ease_factor,
                    record.total_reviews,
                    record.correct_streak,
                    last_review,
                    record.average_response_time,
                    record.version,
                    previous,
                ],
            )?,
        };

        if changed == 0 {
            return Err(StoreError::Conflict {
                flashcard_id: record.flashcard_id.clone(),
                user_id: record.user_id.clone(),
                expected: stored,
                found: Self::stored_version(conn, &record.user_id, &record.flashcard_id)?,
            });
        }

        Ok(())
    }
}

impl ProgressStore for Storage {
    fn progress(&self, user_id: &str, flashcard_id: &str) -> Result<Option<ProgressRecord>> {
        let sql = format!(
            "SELECT {PROGRESS_COLUMNS} FROM progress WHERE user_id = ?1 AND flashcard_id = ?2"
        );
        let record = self
            .conn
            .query_row(&sql, params![user_id, flashcard_id], progress_from_row)
            .optional()?;

        Ok(record)
    }

    fn all_progress(&self, user_id: &str) -> Result<Vec<ProgressRecord>> {
        let sql = format!(
            "SELECT {PROGRESS_COLUMNS} FROM progress WHERE user_id = ?1 ORDER BY flashcard_id"
        );
        let mut stmt = self.conn.prepare(&sql)?;

        let records = stmt
            .query_map(params![user_id], progress_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(records)
    }

    fn save_progress(&mut self, record: &ProgressRecord) -> Result<()> {
        let tx = self.conn.transaction()?;
        Self::write_progress(&tx, record)?;
        tx.commit()?;
        Ok(())
    }

    fn record_review(&mut self, record: &ProgressRecord, session: &ReviewSession) -> Result<i64> {
        let tx = self.conn.transaction()?;
        Self::write_progress(&tx, record)?;

        tx.execute(
            "INSERT INTO sessions (flashcard_id, user_id, rating, response_time_secs,
                started_at, ended_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                session.flashcard_id,
                session.user_id,
                session.rating.as_u32(),
                session.response_time_secs,
                format_timestamp(&session.started_at),
                format_timestamp(&session.ended_at),
            ],
        )?;
        let id = tx.last_insert_rowid();

        tx.commit()?;
        Ok(id)
    }

    fn sessions(&self, user_id: &str) -> Result<Vec<ReviewSession>> {
        let sql =
            format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE user_id = ?1 ORDER BY id ASC");
        let mut stmt = self.conn.prepare(&sql)?;

        let sessions = stmt
            .query_map(params![user_id], session_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(sessions)
    }

    fn flashcard_topics(&self, user_id: &str) -> Result<HashMap<String, String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, topic FROM flashcards WHERE user_id = ?1")?;

        let topics = stmt
            .query_map(params![user_id], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<HashMap<_, _>>>()?;

        Ok(topics)
    }

    fn delete_user_progress(&mut self, user_id: &str) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM sessions WHERE user_id = ?1", params![user_id])?;
        tx.execute("DELETE FROM progress WHERE user_id = ?1", params![user_id])?;
        tx.commit()?;
        Ok(())
    }
}

/// Years past 9999 do not parse back, so later instants are stored as the latest schedule
fn format_timestamp(at: &DateTime<Utc>) -> String {
    (*at).min(latest_schedule()).to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|_| {
            rusqlite::Error::FromSqlConversionFailure(
                idx,
                Type::Text,
                Box::new(StoreError::InvalidTimestamp(raw.to_string())),
            )
        })
}

fn progress_from_row(row: &Row<'_>) -> rusqlite::Result<ProgressRecord> {
    let last_review_date = match row.get::<_, Option<String>>(7)? {
        Some(raw) => Some(parse_timestamp(7, &raw)?),
        None => None,
    };

    Ok(ProgressRecord {
        flashcard_id: row.get(0)?,
        user_id: row.get(1)?,
        next_review_date: parse_timestamp(2, &row.get::<_, String>(2)?)?,
        interval_days: row.get(3)?,
        ease_factor: row.get(4)?,
        total_reviews: row.get(5)?,
        correct_streak: row.get(6)?,
        last_review_date,
        average_response_time: row.get(8)?,
        version: row.get(9)?,
    })
}

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<ReviewSession> {
    let raw_rating: u32 = row.get(3)?;
    let rating = Rating::from_u32(raw_rating).ok_or(rusqlite::Error::IntegralValueOutOfRange(
        3,
        raw_rating as i64,
    ))?;

    Ok(ReviewSession {
        id: row.get(0)?,
        flashcard_id: row.get(1)?,
        user_id: row.get(2)?,
        rating,
        response_time_secs: row.get(4)?,
        started_at: parse_timestamp(5, &row.get::<_, String>(5)?)?,
        ended_at: parse_timestamp(6, &row.get::<_, String>(6)?)?,
    })
}
