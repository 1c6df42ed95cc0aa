// src/models/audit.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::submission::ClientMeta;

/// Immutable record of an administrative action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: i64,
    /// Administrator id.
    pub actor: i64,
    /// e.g. `quiz.approve`, `admin.login`.
    pub action: String,
    pub resource_type: String,
    pub resource_id: String,
    pub description: String,
    pub client: ClientMeta,
    pub created_at: DateTime<Utc>,
}

/// An audit entry before it is appended.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAuditEntry {
    pub actor: i64,
    pub action: String,
    pub resource_type: String,
    pub resource_id: String,
    pub description: String,
    pub client: ClientMeta,
}
