// src/services/moderation.rs

//! Submission and review of quizzes.
//!
//! Review is the only way a quiz leaves `pending`. The store applies the
//! status change, the submission mirror and the audit entry as one unit, and
//! only after that unit has committed is the filter snapshot evicted, so a
//! concurrent reader cannot repopulate the cache from pre-review data.

use chrono::Utc;
use validator::Validate;

use crate::{
    error::{AppError, FieldIssue, field_issues},
    models::{
        audit::NewAuditEntry,
        quiz::{PageQuery, Pagination, PendingPage, Quiz, ReviewDecision, ReviewRequest, SubmitQuizRequest},
        submission::ClientMeta,
    },
    state::AppState,
    store::{NewQuiz, QuizRepository, ReviewRecord},
    utils::jwt::Claims,
};

/// Validates and stores a new quiz as `pending`.
///
/// Every offending field is reported, not just the first one.
pub async fn submit_quiz(
    state: &AppState,
    payload: SubmitQuizRequest,
    client: ClientMeta,
) -> Result<Quiz, AppError> {
    let payload = payload.normalized();

    let mut issues = payload
        .validate()
        .err()
        .map(|e| field_issues(&e))
        .unwrap_or_default();
    issues.extend(payload.shape_issues());
    if !issues.is_empty() {
        issues.sort_by(|a, b| a.field.cmp(&b.field));
        return Err(AppError::Validation(issues));
    }

    let now = Utc::now();
    let quiz = state
        .store
        .create_quiz(
            NewQuiz {
                question: payload.question,
                kind: payload.kind,
                category: payload.category,
                answers: payload.answers,
                correct_answer: payload.correct_answer,
                difficulty: payload.difficulty,
                submitted_by: payload.author.clone(),
                author: payload.author,
                submitted_at: now,
            },
            client,
        )
        .await?;

    state.filters.invalidate().await;

    tracing::info!(quiz_id = quiz.id, category = %quiz.category, "Quiz submitted for review");
    Ok(quiz)
}

/// Approves or rejects a pending quiz.
///
/// Checks run in this order: a supplied reason must be long enough, the quiz
/// must exist, it must still be `pending`, and a rejection must carry a reason.
pub async fn review_quiz(
    state: &AppState,
    quiz_id: i64,
    decision: ReviewDecision,
    request: &ReviewRequest,
    reviewer: &Claims,
    client: ClientMeta,
) -> Result<Quiz, AppError> {
    let reason = request.reason();
    if let Some(issue) = ReviewRequest::reason_issue(reason.as_deref()) {
        return Err(AppError::Validation(vec![issue]));
    }

    let quiz = state
        .store
        .find_quiz(quiz_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Quiz not found".to_string()))?;

    let target = decision.target_status();
    if !quiz.status.can_transition_to(target) {
        return Err(AppError::Conflict(format!(
            "Quiz has already been reviewed (status: {})",
            quiz.status
        )));
    }

    if decision == ReviewDecision::Reject && reason.is_none() {
        return Err(AppError::Validation(vec![FieldIssue::new(
            "reason",
            "A reason is required when rejecting a quiz",
        )]));
    }

    let reviewer_id = reviewer.admin_id()?;
    let record = ReviewRecord {
        quiz_id,
        status: target,
        reviewer_id,
        reason,
        reviewed_at: Utc::now(),
        audit: NewAuditEntry {
            actor: reviewer_id,
            action: decision.audit_action().to_string(),
            resource_type: "quiz".to_string(),
            resource_id: quiz_id.to_string(),
            description: format!("Quiz {} by {}", target, reviewer.username),
            client,
        },
    };

    let Some(updated) = state.store.apply_review(record).await? else {
        // Another reviewer got there between our read and the conditional write.
        tracing::warn!(quiz_id, reviewer = %reviewer.username, "Lost review race");
        return Err(AppError::Conflict("Quiz has already been reviewed".to_string()));
    };

    state.filters.invalidate().await;

    tracing::info!(
        quiz_id,
        reviewer = %reviewer.username,
        decision = %decision,
        "Quiz reviewed"
    );
    Ok(updated)
}

/// Pending quizzes, newest first.
pub async fn list_pending(state: &AppState, query: PageQuery) -> Result<PendingPage, AppError> {
    query.validate()?;

    let (quizzes, total) = tokio::try_join!(
        state.store.list_pending(query.offset(), i64::from(query.limit)),
        state.store.count_pending(),
    )?;

    Ok(PendingPage {
        quizzes,
        pagination: Pagination::new(&query, total),
    })
}
