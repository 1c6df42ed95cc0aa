// src/services/catalog.rs

use crate::{
    error::AppError,
    models::quiz::{FilterSnapshot, QuizFilters, QuizStats, RandomQuiz},
    state::AppState,
    store::QuizRepository,
};

/// Draws one approved quiz matching `filters`.
///
/// No match is a normal outcome and yields `quiz: None`. A successful draw is
/// handed to the serve-count ledger; the response does not wait on the queue.
pub async fn sample(state: &AppState, filters: QuizFilters) -> Result<RandomQuiz, AppError> {
    let filters = filters.normalized();

    let snapshot = state.filters.read(state.store.as_ref()).await?;
    let quiz = state.store.sample_approved(&filters).await?;

    match &quiz {
        Some(quiz) => state.ledger.record_served(quiz.id).await,
        None => tracing::debug!(?filters, "No approved quiz matches the requested filters"),
    }

    Ok(RandomQuiz {
        quiz,
        filters: snapshot,
    })
}

pub async fn available_filters(state: &AppState) -> Result<FilterSnapshot, AppError> {
    state.filters.read(state.store.as_ref()).await
}

pub async fn categories(state: &AppState) -> Result<Vec<String>, AppError> {
    Ok(available_filters(state).await?.categories)
}

pub async fn stats(state: &AppState) -> Result<QuizStats, AppError> {
    state.store.quiz_stats().await
}
