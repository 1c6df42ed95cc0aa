// src/models/admin.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

pub const PERM_APPROVE_QUIZZES: &str = "approve_quizzes";
pub const PERM_REJECT_QUIZZES: &str = "reject_quizzes";
pub const PERM_VIEW_PENDING_QUIZZES: &str = "view_pending_quizzes";
pub const PERM_VIEW_STATS: &str = "view_stats";

/// Everything the bootstrap administrator is allowed to do.
pub const ALL_PERMISSIONS: [&str; 4] = [
    PERM_APPROVE_QUIZZES,
    PERM_REJECT_QUIZZES,
    PERM_VIEW_PENDING_QUIZZES,
    PERM_VIEW_STATS,
];

/// Represents the 'administrators' table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Administrator {
    pub id: i64,

    /// Unique, stored lower-cased.
    pub username: String,

    /// Argon2 password hash.
    /// Skipped during serialization to prevent leaking sensitive data.
    #[serde(skip)]
    pub password_hash: String,

    pub display_name: String,
    pub is_active: bool,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub failed_login_attempts: i32,
    pub locked_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Administrator {
    pub fn is_locked_at(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.is_some_and(|until| until > now)
    }
}

/// An administrator before it is stored.
#[derive(Debug, Clone)]
pub struct NewAdministrator {
    pub username: String,
    pub password_hash: String,
    pub display_name: String,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
}

/// Counter state after a failed login was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailedLogin {
    pub attempts: i32,
    pub locked_until: Option<DateTime<Utc>>,
}

/// DTO for administrator login.
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 3, max = 50, message = "Username must be between 3 and 50 characters."))]
    pub username: String,
    #[validate(length(min = 6, max = 128, message = "Password must be between 6 and 128 characters."))]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginResponse {
    pub admin: Administrator,
    pub tokens: TokenPair,
}
