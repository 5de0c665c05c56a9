//! Spaced-repetition scheduling for flashcard review.
//!
//! [`Scheduler`] computes the next interval and ease factor for a card from a
//! rating and response time, [`queue`] picks and orders due cards, [`stats`]
//! aggregates study statistics, and [`Engine`] ties them to a [`ProgressStore`].

pub mod config;
pub mod engine;
pub mod progress;
pub mod queue;
pub mod scheduler;
pub mod stats;
pub mod storage;
pub mod store;

pub use engine::Engine;
pub use progress::{ProgressRecord, ReviewSession};
pub use queue::{DueCard, DueQuery};
pub use scheduler::{Rating, Scheduler, SchedulerParams};
pub use stats::{DashboardStats, StudyStats};
pub use storage::Storage;
pub use store::{MemoryStore, ProgressStore, StoreError};
