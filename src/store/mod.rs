// src/store/mod.rs

//! Persistence collaborators.
//!
//! The services only ever see these traits. Two adapters exist: [`PgStore`]
//! (PostgreSQL via sqlx) and [`MemoryStore`] (process-local, used when no
//! database is configured and by the test-suite). Both provide the two
//! concurrency guarantees the moderation core relies on:
//!
//! * [`QuizRepository::apply_review`] is a conditional update keyed on the
//!   quiz still being `pending`, so two racing reviews yield one winner.
//! * [`AdminRepository::record_failed_login`] increments the counter
//!   atomically and returns the post-increment value.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    error::AppError,
    models::{
        admin::{Administrator, FailedLogin, NewAdministrator},
        audit::{AuditEntry, NewAuditEntry},
        quiz::{Difficulty, FilterSnapshot, Quiz, QuizFilters, QuizKind, QuizStats, QuizStatus},
        submission::{ClientMeta, Submission},
    },
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// A validated, normalized quiz ready to be persisted as `pending`.
#[derive(Debug, Clone)]
pub struct NewQuiz {
    pub question: String,
    pub kind: QuizKind,
    pub category: String,
    pub answers: Vec<String>,
    pub correct_answer: i32,
    pub difficulty: Difficulty,
    pub author: String,
    pub submitted_by: String,
    pub submitted_at: DateTime<Utc>,
}

/// Everything a successful review writes, applied as one unit.
#[derive(Debug, Clone)]
pub struct ReviewRecord {
    pub quiz_id: i64,
    /// `approved` or `rejected`.
    pub status: QuizStatus,
    pub reviewer_id: i64,
    pub reason: Option<String>,
    pub reviewed_at: DateTime<Utc>,
    pub audit: NewAuditEntry,
}

#[async_trait]
pub trait QuizRepository: Send + Sync {
    /// Stores a pending quiz together with its submission record.
    async fn create_quiz(&self, quiz: NewQuiz, client: ClientMeta) -> Result<Quiz, AppError>;

    async fn find_quiz(&self, id: i64) -> Result<Option<Quiz>, AppError>;

    /// Moves a `pending` quiz to its verdict, mirrors the verdict onto the
    /// submission and appends the audit entry.
    ///
    /// Returns `Ok(None)` without writing anything when the quiz is missing or
    /// no longer `pending`.
    async fn apply_review(&self, review: ReviewRecord) -> Result<Option<Quiz>, AppError>;

    /// Pending quizzes, newest first.
    async fn list_pending(&self, offset: i64, limit: i64) -> Result<Vec<Quiz>, AppError>;

    async fn count_pending(&self) -> Result<i64, AppError>;

    /// Draws one approved quiz matching `filters` uniformly at random.
    async fn sample_approved(&self, filters: &QuizFilters) -> Result<Option<Quiz>, AppError>;

    /// Bumps `served_count` and stamps `last_served_at`.
    async fn increment_served(&self, id: i64, at: DateTime<Utc>) -> Result<(), AppError>;

    /// Distinct filter values across approved quizzes.
    async fn available_filters(&self) -> Result<FilterSnapshot, AppError>;

    async fn quiz_stats(&self) -> Result<QuizStats, AppError>;

    async fn find_submission_by_quiz(&self, quiz_id: i64) -> Result<Option<Submission>, AppError>;
}

#[async_trait]
pub trait AdminRepository: Send + Sync {
    /// Case-insensitive lookup.
    async fn find_admin_by_username(&self, username: &str) -> Result<Option<Administrator>, AppError>;

    async fn find_admin(&self, id: i64) -> Result<Option<Administrator>, AppError>;

    /// Fails with `Conflict` when the username is taken.
    async fn create_admin(&self, admin: NewAdministrator) -> Result<Administrator, AppError>;

    async fn set_admin_active(&self, id: i64, active: bool) -> Result<(), AppError>;

    /// Atomically increments the failed-attempt counter. When the new value
    /// reaches `threshold`, `locked_until` is set to `lock_until`.
    async fn record_failed_login(
        &self,
        id: i64,
        threshold: i32,
        lock_until: DateTime<Utc>,
    ) -> Result<FailedLogin, AppError>;

    /// Resets the counter, clears the lock and stamps `last_login_at`.
    async fn record_successful_login(&self, id: i64, at: DateTime<Utc>) -> Result<Administrator, AppError>;
}

#[async_trait]
pub trait AuditRepository: Send + Sync {
    async fn append_audit(&self, entry: NewAuditEntry) -> Result<AuditEntry, AppError>;

    /// Entries for one resource, oldest first.
    async fn audit_for(&self, resource_type: &str, resource_id: &str) -> Result<Vec<AuditEntry>, AppError>;
}

/// The full persistence collaborator.
pub trait Store: QuizRepository + AdminRepository + AuditRepository + 'static {
    /// Short backend name for health reporting.
    fn backend(&self) -> &'static str;
}
