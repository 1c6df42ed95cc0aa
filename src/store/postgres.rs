// src/store/postgres.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder, types::Json};

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

const QUIZ_COLUMNS: &str = r#"
    id, question, type, category, answers, correct_answer, difficulty, author, status,
    submitted_by, submitted_at, reviewed_by, reviewed_at, review_decision, review_reason,
    served_count, last_served_at, created_at, updated_at
"#;

const SUBMISSION_COLUMNS: &str = r#"
    id, quiz_id, submitted_by, submitted_at, status, ip_address, user_agent,
    reviewed_by, reviewed_at, review_decision, review_reason, created_at
"#;

const ADMIN_COLUMNS: &str = r#"
    id, username, password_hash, display_name, is_active, roles, permissions,
    last_login_at, failed_login_attempts, locked_until, created_at
"#;

const AUDIT_COLUMNS: &str = r#"
    id, actor, action, resource_type, resource_id, description, ip_address, user_agent, created_at
"#;

/// Raw 'quizzes' row. Enum columns are TEXT with CHECK constraints.
#[derive(FromRow)]
struct QuizRow {
    id: i64,
    question: String,
    #[sqlx(rename = "type")]
    kind: String,
    category: String,
    answers: Json<Vec<String>>,
    correct_answer: i32,
    difficulty: String,
    author: String,
    status: String,
    submitted_by: String,
    submitted_at: DateTime<Utc>,
    reviewed_by: Option<i64>,
    reviewed_at: Option<DateTime<Utc>>,
    review_decision: Option<String>,
    review_reason: Option<String>,
    served_count: i64,
    last_served_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct SubmissionRow {
    id: i64,
    quiz_id: i64,
    submitted_by: String,
    submitted_at: DateTime<Utc>,
    status: String,
    ip_address: Option<String>,
    user_agent: Option<String>,
    reviewed_by: Option<i64>,
    reviewed_at: Option<DateTime<Utc>>,
    review_decision: Option<String>,
    review_reason: Option<String>,
    created_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct AdminRow {
    id: i64,
    username: String,
    password_hash: String,
    display_name: String,
    is_active: bool,
    roles: Vec<String>,
    permissions: Vec<String>,
    last_login_at: Option<DateTime<Utc>>,
    failed_login_attempts: i32,
    locked_until: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct AuditRow {
    id: i64,
    actor: i64,
    action: String,
    resource_type: String,
    resource_id: String,
    description: String,
    ip_address: Option<String>,
    user_agent: Option<String>,
    created_at: DateTime<Utc>,
}

fn parse<T: std::str::FromStr<Err = String>>(value: &str) -> Result<T, AppError> {
    value.parse().map_err(AppError::InternalServerError)
}

fn review_info(
    reviewed_by: Option<i64>,
    reviewed_at: Option<DateTime<Utc>>,
    decision: Option<String>,
    reason: Option<String>,
) -> Result<Option<ReviewInfo>, AppError> {
    match (reviewed_by, reviewed_at, decision) {
        (Some(reviewed_by), Some(reviewed_at), Some(decision)) => Ok(Some(ReviewInfo {
            reviewed_by,
            reviewed_at,
            decision: parse(&decision)?,
            reason,
        })),
        _ => Ok(None),
    }
}

impl TryFrom<QuizRow> for Quiz {
    type Error = AppError;

    fn try_from(row: QuizRow) -> Result<Self, Self::Error> {
        Ok(Quiz {
            id: row.id,
            question: row.question,
            kind: parse(&row.kind)?,
            category: row.category,
            answers: row.answers.0,
            correct_answer: row.correct_answer,
            difficulty: parse(&row.difficulty)?,
            author: row.author,
            status: parse(&row.status)?,
            submission: SubmissionInfo {
                submitted_by: row.submitted_by,
                submitted_at: row.submitted_at,
            },
            review: review_info(row.reviewed_by, row.reviewed_at, row.review_decision, row.review_reason)?,
            metadata: ServeMetrics {
                served_count: row.served_count,
                last_served_at: row.last_served_at,
            },
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl TryFrom<SubmissionRow> for Submission {
    type Error = AppError;

    fn try_from(row: SubmissionRow) -> Result<Self, Self::Error> {
        Ok(Submission {
            id: row.id,
            quiz_id: row.quiz_id,
            submitted_by: row.submitted_by,
            submitted_at: row.submitted_at,
            status: parse(&row.status)?,
            client: ClientMeta {
                ip_address: row.ip_address,
                user_agent: row.user_agent,
            },
            review: review_info(row.reviewed_by, row.reviewed_at, row.review_decision, row.review_reason)?,
            created_at: row.created_at,
        })
    }
}

impl From<AdminRow> for Administrator {
    fn from(row: AdminRow) -> Self {
        Administrator {
            id: row.id,
            username: row.username,
            password_hash: row.password_hash,
            display_name: row.display_name,
            is_active: row.is_active,
            roles: row.roles,
            permissions: row.permissions,
            last_login_at: row.last_login_at,
            failed_login_attempts: row.failed_login_attempts,
            locked_until: row.locked_until,
            created_at: row.created_at,
        }
    }
}

impl From<AuditRow> for AuditEntry {
    fn from(row: AuditRow) -> Self {
        AuditEntry {
            id: row.id,
            actor: row.actor,
            action: row.action,
            resource_type: row.resource_type,
            resource_id: row.resource_id,
            description: row.description,
            client: ClientMeta {
                ip_address: row.ip_address,
                user_agent: row.user_agent,
            },
            created_at: row.created_at,
        }
    }
}

/// Escapes LIKE wildcards so the author filter is a literal substring match.
fn like_pattern(needle: &str) -> String {
    let escaped = needle
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

/// Appends `WHERE status = 'approved' AND ...` for the given filters.
fn push_approved_filters(builder: &mut QueryBuilder<'_, Postgres>, filters: &QuizFilters) {
    builder.push(" WHERE status = 'approved'");

    if let Some(category) = &filters.category {
        builder.push(" AND category = ");
        builder.push_bind(category.to_lowercase());
    }
    if let Some(difficulty) = filters.difficulty {
        builder.push(" AND difficulty = ");
        builder.push_bind(difficulty.as_str());
    }
    if let Some(kind) = filters.kind {
        builder.push(" AND type = ");
        builder.push_bind(kind.as_str());
    }
    if let Some(author) = &filters.author {
        builder.push(" AND author ILIKE ");
        builder.push_bind(like_pattern(author));
    }
}

/// PostgreSQL-backed store.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn distinct_approved(&self, column: &str) -> Result<Vec<String>, AppError> {
        let sql = format!(
            "SELECT DISTINCT {column} FROM quizzes WHERE status = 'approved' ORDER BY {column}"
        );
        let values = sqlx::query_scalar::<_, String>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(values)
    }
}

#[async_trait]
impl QuizRepository for PgStore {
    async fn create_quiz(&self, quiz: NewQuiz, client: ClientMeta) -> Result<Quiz, AppError> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            r#"
            INSERT INTO quizzes
            (question, type, category, answers, correct_answer, difficulty, author, status, submitted_by, submitted_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'pending', $8, $9)
            RETURNING {QUIZ_COLUMNS}
            "#
        );
        let row: QuizRow = sqlx::query_as(&sql)
            .bind(&quiz.question)
            .bind(quiz.kind.as_str())
            .bind(&quiz.category)
            .bind(Json(&quiz.answers))
            .bind(quiz.correct_answer)
            .bind(quiz.difficulty.as_str())
            .bind(&quiz.author)
            .bind(&quiz.submitted_by)
            .bind(quiz.submitted_at)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| {
                tracing::error!("Failed to insert quiz: {:?}", e);
                AppError::from(e)
            })?;

        sqlx::query(
            r#"
            INSERT INTO submissions (quiz_id, submitted_by, submitted_at, status, ip_address, user_agent)
            VALUES ($1, $2, $3, 'pending', $4, $5)
            "#,
        )
        .bind(row.id)
        .bind(&quiz.submitted_by)
        .bind(quiz.submitted_at)
        .bind(&client.ip_address)
        .bind(&client.user_agent)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            tracing::error!("Failed to insert submission: {:?}", e);
            AppError::from(e)
        })?;

        tx.commit().await?;
        Quiz::try_from(row)
    }

    async fn find_quiz(&self, id: i64) -> Result<Option<Quiz>, AppError> {
        let sql = format!("SELECT {QUIZ_COLUMNS} FROM quizzes WHERE id = $1");
        let row: Option<QuizRow> = sqlx::query_as(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.map(Quiz::try_from).transpose()
    }

    async fn apply_review(&self, review: ReviewRecord) -> Result<Option<Quiz>, AppError> {
        let mut tx = self.pool.begin().await?;

        // Conditional update: only a still-pending quiz is moved.
        let sql = format!(
            r#"
            UPDATE quizzes
            SET status = $1,
                review_decision = $1,
                reviewed_by = $2,
                reviewed_at = $3,
                review_reason = $4,
                updated_at = $3
            WHERE id = $5 AND status = 'pending'
            RETURNING {QUIZ_COLUMNS}
            "#
        );
        let row: Option<QuizRow> = sqlx::query_as(&sql)
            .bind(review.status.as_str())
            .bind(review.reviewer_id)
            .bind(review.reviewed_at)
            .bind(&review.reason)
            .bind(review.quiz_id)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            return Ok(None);
        };

        sqlx::query(
            r#"
            UPDATE submissions
            SET status = $1,
                review_decision = $1,
                reviewed_by = $2,
                reviewed_at = $3,
                review_reason = $4
            WHERE quiz_id = $5
            "#,
        )
        .bind(review.status.as_str())
        .bind(review.reviewer_id)
        .bind(review.reviewed_at)
        .bind(&review.reason)
        .bind(review.quiz_id)
        .execute(&mut *tx)
        .await?;

        let audit = &review.audit;
        sqlx::query(
            r#"
            INSERT INTO audit_logs (actor, action, resource_type, resource_id, description, ip_address, user_agent)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(audit.actor)
        .bind(&audit.action)
        .bind(&audit.resource_type)
        .bind(&audit.resource_id)
        .bind(&audit.description)
        .bind(&audit.client.ip_address)
        .bind(&audit.client.user_agent)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Quiz::try_from(row).map(Some)
    }

    async fn list_pending(&self, offset: i64, limit: i64) -> Result<Vec<Quiz>, AppError> {
        let sql = format!(
            r#"
            SELECT {QUIZ_COLUMNS}
            FROM quizzes
            WHERE status = 'pending'
            ORDER BY created_at DESC, id DESC
            LIMIT $1 OFFSET $2
            "#
        );
        let rows: Vec<QuizRow> = sqlx::query_as(&sql)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Quiz::try_from).collect()
    }

    async fn count_pending(&self) -> Result<i64, AppError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM quizzes WHERE status = 'pending'")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn sample_approved(&self, filters: &QuizFilters) -> Result<Option<Quiz>, AppError> {
        // Count, then fetch the row at a random offset: uniform, and only one
        // row leaves the database.
        let mut count_query = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM quizzes");
        push_approved_filters(&mut count_query, filters);
        let total: i64 = count_query
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;

        if total == 0 {
            return Ok(None);
        }

        let offset = rand::thread_rng().gen_range(0..total);

        let mut pick = QueryBuilder::<Postgres>::new(format!("SELECT {QUIZ_COLUMNS} FROM quizzes"));
        push_approved_filters(&mut pick, filters);
        pick.push(" ORDER BY id LIMIT 1 OFFSET ");
        pick.push_bind(offset);
        let row: Option<QuizRow> = pick.build_query_as::<QuizRow>().fetch_optional(&self.pool).await?;

        if let Some(row) = row {
            return Quiz::try_from(row).map(Some);
        }

        // The matching set shrank between the two queries.
        let mut fallback = QueryBuilder::<Postgres>::new(format!("SELECT {QUIZ_COLUMNS} FROM quizzes"));
        push_approved_filters(&mut fallback, filters);
        fallback.push(" ORDER BY RANDOM() LIMIT 1");
        let row: Option<QuizRow> = fallback.build_query_as::<QuizRow>().fetch_optional(&self.pool).await?;
        row.map(Quiz::try_from).transpose()
    }

    async fn increment_served(&self, id: i64, at: DateTime<Utc>) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE quizzes
            SET served_count = served_count + 1,
                last_served_at = $2
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Quiz {} not found", id)));
        }
        Ok(())
    }

    async fn available_filters(&self) -> Result<FilterSnapshot, AppError> {
        let (categories, authors, difficulties, types) = tokio::try_join!(
            self.distinct_approved("category"),
            self.distinct_approved("author"),
            self.distinct_approved("difficulty"),
            self.distinct_approved("type"),
        )?;

        Ok(FilterSnapshot {
            categories,
            authors,
            difficulties,
            types,
        })
    }

    async fn quiz_stats(&self) -> Result<QuizStats, AppError> {
        let status_rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM quizzes GROUP BY status")
                .fetch_all(&self.pool)
                .await?;

        let mut counts = StatusCounts::default();
        for (status, count) in status_rows {
            counts.add(parse::<QuizStatus>(&status)?, count);
        }

        let by_difficulty: Vec<(String, i64)> = sqlx::query_as(
            "SELECT difficulty, COUNT(*) AS n FROM quizzes GROUP BY difficulty ORDER BY n DESC, difficulty",
        )
        .fetch_all(&self.pool)
        .await?;

        let by_category: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT category, COUNT(*) AS n
            FROM quizzes
            WHERE status = 'approved'
            GROUP BY category
            ORDER BY n DESC, category
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let (pending, total): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*) FILTER (WHERE status = 'pending'), COUNT(*) FROM submissions",
        )
        .fetch_one(&self.pool)
        .await?;

        let to_counts = |rows: Vec<(String, i64)>| {
            rows.into_iter()
                .map(|(value, count)| ValueCount { value, count })
                .collect()
        };

        Ok(QuizStats {
            counts,
            by_difficulty: to_counts(by_difficulty),
            by_category: to_counts(by_category),
            submissions: SubmissionStats { pending, total },
        })
    }

    async fn find_submission_by_quiz(&self, quiz_id: i64) -> Result<Option<Submission>, AppError> {
        let sql = format!("SELECT {SUBMISSION_COLUMNS} FROM submissions WHERE quiz_id = $1");
        let row: Option<SubmissionRow> = sqlx::query_as(&sql)
            .bind(quiz_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Submission::try_from).transpose()
    }
}

#[async_trait]
impl AdminRepository for PgStore {
    async fn find_admin_by_username(&self, username: &str) -> Result<Option<Administrator>, AppError> {
        let sql = format!("SELECT {ADMIN_COLUMNS} FROM administrators WHERE LOWER(username) = LOWER($1)");
        let row: Option<AdminRow> = sqlx::query_as(&sql)
            .bind(username.trim())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Administrator::from))
    }

    async fn find_admin(&self, id: i64) -> Result<Option<Administrator>, AppError> {
        let sql = format!("SELECT {ADMIN_COLUMNS} FROM administrators WHERE id = $1");
        let row: Option<AdminRow> = sqlx::query_as(&sql).bind(id).fetch_optional(&self.pool).await?;
        Ok(row.map(Administrator::from))
    }

    async fn create_admin(&self, admin: NewAdministrator) -> Result<Administrator, AppError> {
        let username = admin.username.trim().to_lowercase();
        let sql = format!(
            r#"
            INSERT INTO administrators (username, password_hash, display_name, roles, permissions)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {ADMIN_COLUMNS}
            "#
        );
        let row: AdminRow = sqlx::query_as(&sql)
            .bind(&username)
            .bind(&admin.password_hash)
            .bind(&admin.display_name)
            .bind(&admin.roles)
            .bind(&admin.permissions)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                // Postgres error code for unique violation is 23505
                if e.to_string().contains("unique constraint") || e.to_string().contains("23505") {
                    AppError::Conflict(format!("Username '{}' already exists", username))
                } else {
                    tracing::error!("Failed to create administrator: {:?}", e);
                    AppError::from(e)
                }
            })?;
        Ok(row.into())
    }

    async fn set_admin_active(&self, id: i64, active: bool) -> Result<(), AppError> {
        let result = sqlx::query("UPDATE administrators SET is_active = $1, updated_at = NOW() WHERE id = $2")
            .bind(active)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Administrator not found".to_string()));
        }
        Ok(())
    }

    async fn record_failed_login(
        &self,
        id: i64,
        threshold: i32,
        lock_until: DateTime<Utc>,
    ) -> Result<FailedLogin, AppError> {
        // Single statement: the increment and the lock decision see the same row version.
        let row: Option<(i32, Option<DateTime<Utc>>)> = sqlx::query_as(
            r#"
            UPDATE administrators
            SET failed_login_attempts = failed_login_attempts + 1,
                locked_until = CASE
                    WHEN failed_login_attempts + 1 >= $2::INTEGER THEN $3::TIMESTAMPTZ
                    ELSE NULL
                END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING failed_login_attempts, locked_until
            "#,
        )
        .bind(id)
        .bind(threshold)
        .bind(lock_until)
        .fetch_optional(&self.pool)
        .await?;

        let (attempts, locked_until) =
            row.ok_or_else(|| AppError::NotFound("Administrator not found".to_string()))?;
        Ok(FailedLogin { attempts, locked_until })
    }

    async fn record_successful_login(&self, id: i64, at: DateTime<Utc>) -> Result<Administrator, AppError> {
        let sql = format!(
            r#"
            UPDATE administrators
            SET failed_login_attempts = 0,
                locked_until = NULL,
                last_login_at = $2,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {ADMIN_COLUMNS}
            "#
        );
        let row: Option<AdminRow> = sqlx::query_as(&sql)
            .bind(id)
            .bind(at)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Administrator::from)
            .ok_or_else(|| AppError::NotFound("Administrator not found".to_string()))
    }
}

#[async_trait]
impl AuditRepository for PgStore {
    async fn append_audit(&self, entry: NewAuditEntry) -> Result<AuditEntry, AppError> {
        let sql = format!(
            r#"
            INSERT INTO audit_logs (actor, action, resource_type, resource_id, description, ip_address, user_agent)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {AUDIT_COLUMNS}
            "#
        );
        let row: AuditRow = sqlx::query_as(&sql)
            .bind(entry.actor)
            .bind(&entry.action)
            .bind(&entry.resource_type)
            .bind(&entry.resource_id)
            .bind(&entry.description)
            .bind(&entry.client.ip_address)
            .bind(&entry.client.user_agent)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.into())
    }

    async fn audit_for(&self, resource_type: &str, resource_id: &str) -> Result<Vec<AuditEntry>, AppError> {
        let sql = format!(
            "SELECT {AUDIT_COLUMNS} FROM audit_logs WHERE resource_type = $1 AND resource_id = $2 ORDER BY id"
        );
        let rows: Vec<AuditRow> = sqlx::query_as(&sql)
            .bind(resource_type)
            .bind(resource_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(AuditEntry::from).collect())
    }
}

impl Store for PgStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("ada"), "%ada%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
    }

    #[test]
    fn filters_render_in_order() {
        let filters = QuizFilters {
            category: Some("history".to_string()),
            author: Some("kemal".to_string()),
            ..Default::default()
        };
        let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM quizzes");
        push_approved_filters(&mut builder, &filters);
        assert_eq!(
            builder.sql(),
            "SELECT COUNT(*) FROM quizzes WHERE status = 'approved' AND category = $1 AND author ILIKE $2"
        );
    }
}
