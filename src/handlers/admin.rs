// src/handlers/admin.rs

use axum::{
    Json,
    body::Bytes,
    extract::{Extension, Path, State},
    response::IntoResponse,
};
use chrono::Utc;
use serde_json::json;

use super::AppJson;
use crate::{
    error::AppError,
    models::{
        admin::{LoginRequest, PERM_APPROVE_QUIZZES, PERM_REJECT_QUIZZES, PERM_VIEW_STATS, RefreshRequest},
        quiz::{ReviewDecision, ReviewRequest},
        submission::ClientMeta,
    },
    services::{auth, catalog, moderation},
    state::AppState,
    utils::jwt::Claims,
};

/// Authenticates an administrator and returns an access/refresh token pair.
pub async fn login(
    State(state): State<AppState>,
    client: ClientMeta,
    AppJson(payload): AppJson<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let response = auth::login(&state, payload, client, Utc::now()).await?;

    Ok(Json(json!({
        "admin": response.admin,
        "token": response.tokens.access_token,
        "refresh_token": response.tokens.refresh_token,
        "type": "Bearer"
    })))
}

/// Issues a fresh access token for a valid refresh token.
pub async fn refresh(
    State(state): State<AppState>,
    AppJson(payload): AppJson<RefreshRequest>,
) -> Result<impl IntoResponse, AppError> {
    let token = auth::refresh(&state, payload, Utc::now()).await?;

    Ok(Json(json!({
        "token": token,
        "type": "Bearer"
    })))
}

/// Catalog statistics.
/// Requires `view_stats` or a moderation permission.
pub async fn stats(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    claims.require_any(&[PERM_VIEW_STATS, PERM_APPROVE_QUIZZES, PERM_REJECT_QUIZZES])?;
    Ok(Json(catalog::stats(&state).await?))
}

/// Approves or rejects a pending quiz. `action` is `approve` or `reject`;
/// the body `{ "reason": ... }` is optional.
pub async fn review_quiz(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((quiz_id, action)): Path<(i64, String)>,
    client: ClientMeta,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let decision: ReviewDecision = action
        .parse()
        .map_err(|_| AppError::NotFound(format!("Unknown review action '{}'", action)))?;

    let permission = match decision {
        ReviewDecision::Approve => PERM_APPROVE_QUIZZES,
        ReviewDecision::Reject => PERM_REJECT_QUIZZES,
    };
    claims.require_any(&[permission])?;

    let request: ReviewRequest = if body.iter().all(u8::is_ascii_whitespace) {
        ReviewRequest::default()
    } else {
        serde_json::from_slice(&body)?
    };

    let quiz = moderation::review_quiz(&state, quiz_id, decision, &request, &claims, client).await?;

    Ok(Json(json!({
        "message": format!("Quiz {} successfully", quiz.status),
        "quiz": quiz,
    })))
}
