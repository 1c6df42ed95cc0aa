// src/models/submission.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::quiz::{QuizStatus, ReviewInfo};

/// Client details captured alongside submissions and audit entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientMeta {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Audit-facing mirror of a quiz's single review cycle.
///
/// Linked to its quiz by id only; created with the quiz and updated once,
/// in the same unit of work that reviews the quiz.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub id: i64,
    pub quiz_id: i64,
    pub submitted_by: String,
    pub submitted_at: DateTime<Utc>,
    /// `pending`, then `approved` or `rejected`.
    pub status: QuizStatus,
    pub client: ClientMeta,
    pub review: Option<ReviewInfo>,
    pub created_at: DateTime<Utc>,
}
