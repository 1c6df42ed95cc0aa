// src/handlers/quiz.rs

use axum::{
    Json,
    extract::{Extension, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;

use super::{AppJson, AppQuery};
use crate::{
    error::AppError,
    models::{
        admin::{PERM_APPROVE_QUIZZES, PERM_REJECT_QUIZZES, PERM_VIEW_PENDING_QUIZZES},
        quiz::{PageQuery, QuizFilters, SubmitQuizRequest},
        submission::ClientMeta,
    },
    services::{catalog, moderation},
    state::AppState,
    utils::jwt::Claims,
};

/// Query string of `GET /quizzes/random`. Empty values mean "any".
#[derive(Debug, Default, Deserialize)]
pub struct RandomQuizQuery {
    pub category: Option<String>,
    pub difficulty: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub author: Option<String>,
}

impl RandomQuizQuery {
    pub fn into_filters(self) -> Result<QuizFilters, AppError> {
        fn parse<T: std::str::FromStr<Err = String>>(raw: Option<String>) -> Result<Option<T>, AppError> {
            match raw.as_deref().map(str::trim) {
                None | Some("") => Ok(None),
                Some(value) => value
                    .to_lowercase()
                    .parse()
                    .map(Some)
                    .map_err(AppError::BadRequest),
            }
        }

        Ok(QuizFilters {
            category: self.category,
            difficulty: parse(self.difficulty)?,
            kind: parse(self.kind)?,
            author: self.author,
        })
    }
}

/// Submits a new quiz for review.
/// Public. Returns 201 with the pending quiz.
pub async fn submit_quiz(
    State(state): State<AppState>,
    client: ClientMeta,
    AppJson(payload): AppJson<SubmitQuizRequest>,
) -> Result<impl IntoResponse, AppError> {
    let quiz = moderation::submit_quiz(&state, payload, client).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Quiz submitted successfully and is pending review",
            "quiz": quiz,
        })),
    ))
}

/// Serves one random approved quiz, plus the filter values currently available.
pub async fn random_quiz(
    State(state): State<AppState>,
    AppQuery(query): AppQuery<RandomQuizQuery>,
) -> Result<impl IntoResponse, AppError> {
    let result = catalog::sample(&state, query.into_filters()?).await?;
    Ok(Json(result))
}

pub async fn quiz_stats(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    Ok(Json(catalog::stats(&state).await?))
}

pub async fn categories(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let categories = catalog::categories(&state).await?;
    Ok(Json(json!({ "categories": categories })))
}

/// Lists pending quizzes, newest first.
/// Requires any moderation permission.
pub async fn list_pending(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    AppQuery(page): AppQuery<PageQuery>,
) -> Result<impl IntoResponse, AppError> {
    claims.require_any(&[
        PERM_VIEW_PENDING_QUIZZES,
        PERM_APPROVE_QUIZZES,
        PERM_REJECT_QUIZZES,
    ])?;

    Ok(Json(moderation::list_pending(&state, page).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::quiz::{Difficulty, QuizKind};

    #[test]
    fn blank_query_values_are_unconstrained() {
        let filters = RandomQuizQuery {
            category: Some(String::new()),
            difficulty: Some(" ".to_string()),
            kind: None,
            author: None,
        }
        .into_filters()
        .unwrap()
        .normalized();

        assert_eq!(filters, QuizFilters::default());
    }

    #[test]
    fn enum_values_are_case_insensitive() {
        let filters = RandomQuizQuery {
            difficulty: Some("Hard".to_string()),
            kind: Some("BOOLEAN".to_string()),
            ..Default::default()
        }
        .into_filters()
        .unwrap();

        assert_eq!(filters.difficulty, Some(Difficulty::Hard));
        assert_eq!(filters.kind, Some(QuizKind::Boolean));
    }

    #[test]
    fn unknown_difficulty_is_rejected() {
        let result = RandomQuizQuery {
            difficulty: Some("legendary".to_string()),
            ..Default::default()
        }
        .into_filters();

        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }
}
