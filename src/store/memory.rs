// src/store/memory.rs

use std::collections::{BTreeMap, BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::seq::IteratorRandom;
use tokio::sync::RwLock;

use super::{AdminRepository, AuditRepository, NewQuiz, QuizRepository, ReviewRecord, Store};
use crate::{
    error::AppError,
    models::{
        admin::{Administrator, FailedLogin, NewAdministrator},
        audit::{AuditEntry, NewAuditEntry},
        quiz::{
            FilterSnapshot, Quiz, QuizFilters, QuizStats, QuizStatus, ReviewInfo, ServeMetrics,
            StatusCounts, SubmissionInfo, SubmissionStats, ValueCount,
        },
        submission::{ClientMeta, Submission},
    },
};

#[derive(Default)]
struct Tables {
    quizzes: BTreeMap<i64, Quiz>,
    /// Keyed by quiz id (one submission per quiz).
    submissions: BTreeMap<i64, Submission>,
    audit: Vec<AuditEntry>,
    admins: BTreeMap<i64, Administrator>,
    next_quiz_id: i64,
    next_submission_id: i64,
    next_audit_id: i64,
    next_admin_id: i64,
}

fn next(counter: &mut i64) -> i64 {
    *counter += 1;
    *counter
}

/// Process-local store. Every mutation runs under one write lock, which gives
/// the conditional review update and the login counter their atomicity.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn append_entry(tables: &mut Tables, entry: NewAuditEntry) -> AuditEntry {
    let stored = AuditEntry {
        id: next(&mut tables.next_audit_id),
        actor: entry.actor,
        action: entry.action,
        resource_type: entry.resource_type,
        resource_id: entry.resource_id,
        description: entry.description,
        client: entry.client,
        created_at: Utc::now(),
    };
    tables.audit.push(stored.clone());
    stored
}

fn counted(counts: HashMap<String, i64>) -> Vec<ValueCount> {
    let mut values: Vec<ValueCount> = counts
        .into_iter()
        .map(|(value, count)| ValueCount { value, count })
        .collect();
    values.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.value.cmp(&b.value)));
    values
}

#[async_trait]
impl QuizRepository for MemoryStore {
    async fn create_quiz(&self, quiz: NewQuiz, client: ClientMeta) -> Result<Quiz, AppError> {
        let mut tables = self.tables.write().await;
        let id = next(&mut tables.next_quiz_id);
        let now = Utc::now();

        let stored = Quiz {
            id,
            question: quiz.question,
            kind: quiz.kind,
            category: quiz.category,
            answers: quiz.answers,
            correct_answer: quiz.correct_answer,
            difficulty: quiz.difficulty,
            author: quiz.author,
            status: QuizStatus::Pending,
            submission: SubmissionInfo {
                submitted_by: quiz.submitted_by.clone(),
                submitted_at: quiz.submitted_at,
            },
            review: None,
            metadata: ServeMetrics::default(),
            created_at: now,
            updated_at: now,
        };

        let submission = Submission {
            id: next(&mut tables.next_submission_id),
            quiz_id: id,
            submitted_by: quiz.submitted_by,
            submitted_at: quiz.submitted_at,
            status: QuizStatus::Pending,
            client,
            review: None,
            created_at: now,
        };

        tables.quizzes.insert(id, stored.clone());
        tables.submissions.insert(id, submission);
        Ok(stored)
    }

    async fn find_quiz(&self, id: i64) -> Result<Option<Quiz>, AppError> {
        Ok(self.tables.read().await.quizzes.get(&id).cloned())
    }

    async fn apply_review(&self, review: ReviewRecord) -> Result<Option<Quiz>, AppError> {
        let mut tables = self.tables.write().await;

        let info = ReviewInfo {
            reviewed_by: review.reviewer_id,
            reviewed_at: review.reviewed_at,
            decision: review.status,
            reason: review.reason,
        };

        let updated = match tables.quizzes.get_mut(&review.quiz_id) {
            Some(quiz) if quiz.status == QuizStatus::Pending => {
                quiz.status = review.status;
                quiz.review = Some(info.clone());
                quiz.updated_at = review.reviewed_at;
                quiz.clone()
            }
            _ => return Ok(None),
        };

        if let Some(submission) = tables.submissions.get_mut(&review.quiz_id) {
            submission.status = review.status;
            submission.review = Some(info);
        }

        append_entry(&mut tables, review.audit);
        Ok(Some(updated))
    }

    async fn list_pending(&self, offset: i64, limit: i64) -> Result<Vec<Quiz>, AppError> {
        let tables = self.tables.read().await;
        let mut pending: Vec<&Quiz> = tables
            .quizzes
            .values()
            .filter(|q| q.status == QuizStatus::Pending)
            .collect();
        pending.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));

        Ok(pending
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn count_pending(&self) -> Result<i64, AppError> {
        let tables = self.tables.read().await;
        Ok(tables
            .quizzes
            .values()
            .filter(|q| q.status == QuizStatus::Pending)
            .count() as i64)
    }

    async fn sample_approved(&self, filters: &QuizFilters) -> Result<Option<Quiz>, AppError> {
        let tables = self.tables.read().await;
        // Reservoir sampling: uniform without collecting the matches.
        let picked = {
            let mut rng = rand::thread_rng();
            tables
                .quizzes
                .values()
                .filter(|q| filters.matches(q))
                .choose(&mut rng)
                .cloned()
        };
        Ok(picked)
    }

    async fn increment_served(&self, id: i64, at: DateTime<Utc>) -> Result<(), AppError> {
        let mut tables = self.tables.write().await;
        let quiz = tables
            .quizzes
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Quiz {} not found", id)))?;
        quiz.metadata.served_count += 1;
        quiz.metadata.last_served_at = Some(at);
        Ok(())
    }

    async fn available_filters(&self) -> Result<FilterSnapshot, AppError> {
        let tables = self.tables.read().await;
        let mut categories = BTreeSet::new();
        let mut authors = BTreeSet::new();
        let mut difficulties = BTreeSet::new();
        let mut types = BTreeSet::new();

        for quiz in tables.quizzes.values().filter(|q| q.status == QuizStatus::Approved) {
            categories.insert(quiz.category.clone());
            authors.insert(quiz.author.clone());
            difficulties.insert(quiz.difficulty.to_string());
            types.insert(quiz.kind.to_string());
        }

        Ok(FilterSnapshot {
            categories: categories.into_iter().collect(),
            authors: authors.into_iter().collect(),
            difficulties: difficulties.into_iter().collect(),
            types: types.into_iter().collect(),
        })
    }

    async fn quiz_stats(&self) -> Result<QuizStats, AppError> {
        let tables = self.tables.read().await;
        let mut counts = StatusCounts::default();
        let mut by_difficulty: HashMap<String, i64> = HashMap::new();
        let mut by_category: HashMap<String, i64> = HashMap::new();

        for quiz in tables.quizzes.values() {
            counts.add(quiz.status, 1);
            *by_difficulty.entry(quiz.difficulty.to_string()).or_default() += 1;
            if quiz.status == QuizStatus::Approved {
                *by_category.entry(quiz.category.clone()).or_default() += 1;
            }
        }

        let submissions = SubmissionStats {
            pending: tables
                .submissions
                .values()
                .filter(|s| s.status == QuizStatus::Pending)
                .count() as i64,
            total: tables.submissions.len() as i64,
        };

        Ok(QuizStats {
            counts,
            by_difficulty: counted(by_difficulty),
            by_category: counted(by_category),
            submissions,
        })
    }

    async fn find_submission_by_quiz(&self, quiz_id: i64) -> Result<Option<Submission>, AppError> {
        Ok(self.tables.read().await.submissions.get(&quiz_id).cloned())
    }
}

#[async_trait]
impl AdminRepository for MemoryStore {
    async fn find_admin_by_username(&self, username: &str) -> Result<Option<Administrator>, AppError> {
        let needle = username.trim().to_lowercase();
        let tables = self.tables.read().await;
        Ok(tables.admins.values().find(|a| a.username == needle).cloned())
    }

    async fn find_admin(&self, id: i64) -> Result<Option<Administrator>, AppError> {
        Ok(self.tables.read().await.admins.get(&id).cloned())
    }

    async fn create_admin(&self, admin: NewAdministrator) -> Result<Administrator, AppError> {
        let username = admin.username.trim().to_lowercase();
        let mut tables = self.tables.write().await;
        if tables.admins.values().any(|a| a.username == username) {
            return Err(AppError::Conflict(format!("Username '{}' already exists", username)));
        }

        let stored = Administrator {
            id: next(&mut tables.next_admin_id),
            username,
            password_hash: admin.password_hash,
            display_name: admin.display_name,
            is_active: true,
            roles: admin.roles,
            permissions: admin.permissions,
            last_login_at: None,
            failed_login_attempts: 0,
            locked_until: None,
            created_at: Utc::now(),
        };
        tables.admins.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn set_admin_active(&self, id: i64, active: bool) -> Result<(), AppError> {
        let mut tables = self.tables.write().await;
        let admin = tables
            .admins
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound("Administrator not found".to_string()))?;
        admin.is_active = active;
        Ok(())
    }

    async fn record_failed_login(
        &self,
        id: i64,
        threshold: i32,
        lock_until: DateTime<Utc>,
    ) -> Result<FailedLogin, AppError> {
        let mut tables = self.tables.write().await;
        let admin = tables
            .admins
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound("Administrator not found".to_string()))?;

        admin.failed_login_attempts += 1;
        admin.locked_until = (admin.failed_login_attempts >= threshold).then_some(lock_until);

        Ok(FailedLogin {
            attempts: admin.failed_login_attempts,
            locked_until: admin.locked_until,
        })
    }

    async fn record_successful_login(&self, id: i64, at: DateTime<Utc>) -> Result<Administrator, AppError> {
        let mut tables = self.tables.write().await;
        let admin = tables
            .admins
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound("Administrator not found".to_string()))?;

        admin.failed_login_attempts = 0;
        admin.locked_until = None;
        admin.last_login_at = Some(at);
        Ok(admin.clone())
    }
}

#[async_trait]
impl AuditRepository for MemoryStore {
    async fn append_audit(&self, entry: NewAuditEntry) -> Result<AuditEntry, AppError> {
        let mut tables = self.tables.write().await;
        Ok(append_entry(&mut tables, entry))
    }

    async fn audit_for(&self, resource_type: &str, resource_id: &str) -> Result<Vec<AuditEntry>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables
            .audit
            .iter()
            .filter(|e| e.resource_type == resource_type && e.resource_id == resource_id)
            .cloned()
            .collect())
    }
}

impl Store for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }
}
