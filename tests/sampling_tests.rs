// tests/sampling_tests.rs

mod common;

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::Utc;
use common::{
    app_with_cache, approved, async_app, moderator, multiple_choice, submit, sync_app, test_config, true_false,
};
use quiz_catalog::{
    cache::{CacheError, CacheStore, FILTER_SNAPSHOT_KEY, FilterCache, MemoryCache},
    jobs::ServeLedger,
    state::AppState,
    models::{
        audit::NewAuditEntry,
        quiz::{Difficulty, FilterSnapshot, QuizFilters, QuizKind, QuizStatus},
        submission::ClientMeta,
    },
    services::catalog,
    store::{MemoryStore, QuizRepository, ReviewRecord},
};

/// A cache backend that is always down.
struct UnreachableCache;

#[async_trait]
impl CacheStore for UnreachableCache {
    async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
        Err(CacheError::Unavailable("connection refused".to_string()))
    }

    async fn set(&self, _key: &str, _value: String, _ttl: Duration) -> Result<(), CacheError> {
        Err(CacheError::Unavailable("connection refused".to_string()))
    }

    async fn delete(&self, _key: &str) -> Result<(), CacheError> {
        Err(CacheError::Unavailable("connection refused".to_string()))
    }
}

fn by_category(category: &str) -> QuizFilters {
    QuizFilters {
        category: Some(category.to_string()),
        ..Default::default()
    }
}

#[tokio::test]
async fn no_match_is_null_not_an_error() {
    let app = sync_app();
    let reviewer = moderator(&app.state).await;
    approved(&app.state, &reviewer, multiple_choice("geography")).await;

    let result = catalog::sample(&app.state, by_category("nonexistent-category"))
        .await
        .unwrap();

    assert!(result.quiz.is_none());
    assert_eq!(result.filters.categories, vec!["geography"]);
}

#[tokio::test]
async fn empty_catalog_samples_nothing() {
    let app = sync_app();

    let result = catalog::sample(&app.state, QuizFilters::default()).await.unwrap();

    assert!(result.quiz.is_none());
    assert_eq!(result.filters, FilterSnapshot::default());
}

#[tokio::test]
async fn sample_only_returns_approved_quizzes_matching_every_filter() {
    // Arrange
    let app = sync_app();
    let reviewer = moderator(&app.state).await;
    approved(&app.state, &reviewer, true_false("history", "Ada Lovelace", Difficulty::Hard)).await;
    approved(&app.state, &reviewer, true_false("history", "Grace Hopper", Difficulty::Medium)).await;
    approved(&app.state, &reviewer, multiple_choice("science")).await;
    submit(&app.state, true_false("history", "Ada Lovelace", Difficulty::Hard)).await;

    // Act / Assert
    for _ in 0..25 {
        let quiz = catalog::sample(&app.state, by_category("  History "))
            .await
            .unwrap()
            .quiz
            .expect("an approved history quiz exists");
        assert_eq!(quiz.status, QuizStatus::Approved);
        assert_eq!(quiz.category, "history");
    }

    let filters = QuizFilters {
        author: Some("LOVE".to_string()),
        kind: Some(QuizKind::Boolean),
        ..Default::default()
    };
    for _ in 0..10 {
        let quiz = catalog::sample(&app.state, filters.clone()).await.unwrap().quiz.unwrap();
        assert_eq!(quiz.author, "Ada Lovelace");
        assert_eq!(quiz.status, QuizStatus::Approved);
    }

    let filters = QuizFilters {
        category: Some("history".to_string()),
        difficulty: Some(Difficulty::Easy),
        ..Default::default()
    };
    assert!(catalog::sample(&app.state, filters).await.unwrap().quiz.is_none());
}

#[tokio::test]
async fn author_filter_is_a_literal_substring() {
    let app = sync_app();
    let reviewer = moderator(&app.state).await;
    approved(&app.state, &reviewer, true_false("trivia", "Ada Lovelace", Difficulty::Easy)).await;

    let filters = QuizFilters {
        author: Some("%".to_string()),
        ..Default::default()
    };
    assert!(catalog::sample(&app.state, filters).await.unwrap().quiz.is_none());
}

#[tokio::test]
async fn served_count_is_recorded_inline_without_a_queue() {
    let app = sync_app();
    let reviewer = moderator(&app.state).await;
    let quiz = approved(&app.state, &reviewer, multiple_choice("geography")).await;
    assert_eq!(quiz.metadata.served_count, 0);

    let served = catalog::sample(&app.state, by_category("geography"))
        .await
        .unwrap()
        .quiz
        .unwrap();
    assert_eq!(served.id, quiz.id);

    // No worker exists, so the increment must already be visible.
    let stored = app.state.store.find_quiz(quiz.id).await.unwrap().unwrap();
    assert_eq!(stored.metadata.served_count, 1);
    assert!(stored.metadata.last_served_at.is_some());
}

#[tokio::test]
async fn served_count_is_recorded_by_the_worker() {
    let app = async_app();
    let reviewer = moderator(&app.state).await;
    let quiz = approved(&app.state, &reviewer, multiple_choice("geography")).await;

    for _ in 0..3 {
        let result = catalog::sample(&app.state, QuizFilters::default()).await.unwrap();
        assert_eq!(result.quiz.map(|q| q.id), Some(quiz.id));
    }

    // Dropping the state drops the last queue sender; the worker drains and exits.
    let store = app.store.clone();
    let worker = app.worker.expect("async app has a worker");
    drop(app.state);
    worker.shutdown().await;

    let stored = store.find_quiz(quiz.id).await.unwrap().unwrap();
    assert_eq!(stored.metadata.served_count, 3);
}

#[tokio::test]
async fn invalidation_replaces_a_stale_snapshot() {
    // Arrange
    let app = sync_app();
    let reviewer = moderator(&app.state).await;
    approved(&app.state, &reviewer, multiple_choice("alpha")).await;
    let cached = app.state.filters.read(app.state.store.as_ref()).await.unwrap();
    assert_eq!(cached.categories, vec!["alpha"]);

    // Approve behind the cache's back.
    let pending = submit(&app.state, multiple_choice("beta")).await;
    let reviewer_id = reviewer.admin_id().unwrap();
    app.state
        .store
        .apply_review(ReviewRecord {
            quiz_id: pending.id,
            status: QuizStatus::Approved,
            reviewer_id,
            reason: None,
            reviewed_at: Utc::now(),
            audit: NewAuditEntry {
                actor: reviewer_id,
                action: "quiz.approve".to_string(),
                resource_type: "quiz".to_string(),
                resource_id: pending.id.to_string(),
                description: "approved directly".to_string(),
                client: ClientMeta::default(),
            },
        })
        .await
        .unwrap()
        .expect("quiz was pending");

    let stale = app.state.filters.read(app.state.store.as_ref()).await.unwrap();
    assert_eq!(stale.categories, vec!["alpha"]);

    // Act
    app.state.filters.invalidate().await;

    // Assert
    let fresh = app.state.filters.read(app.state.store.as_ref()).await.unwrap();
    assert_eq!(fresh.categories, vec!["alpha", "beta"]);
}

#[tokio::test]
async fn invalidation_reaches_every_instance_sharing_the_backend() {
    // Arrange: two app instances over one store and one cache backend.
    let store = Arc::new(MemoryStore::new());
    let cache = Arc::new(MemoryCache::new());
    let instance = || {
        AppState::new(
            store.clone(),
            test_config(),
            FilterCache::new(cache.clone(), Duration::from_secs(3600)),
            ServeLedger::synchronous(store.clone()),
        )
    };
    let writer = instance();
    let reader = instance();
    let reviewer = moderator(&writer).await;

    approved(&writer, &reviewer, multiple_choice("alpha")).await;
    assert_eq!(catalog::categories(&reader).await.unwrap(), vec!["alpha"]);

    // Act: the other instance approves and invalidates.
    approved(&writer, &reviewer, multiple_choice("beta")).await;

    // Assert
    assert_eq!(catalog::categories(&reader).await.unwrap(), vec!["alpha", "beta"]);
}

#[tokio::test]
async fn unreachable_cache_degrades_to_recomputation() {
    let state = app_with_cache(Arc::new(UnreachableCache));
    let reviewer = moderator(&state).await;

    // Review invalidates through the broken cache and must still succeed.
    let quiz = approved(&state, &reviewer, multiple_choice("geography")).await;

    let result = catalog::sample(&state, by_category("geography")).await.unwrap();
    assert_eq!(result.quiz.map(|q| q.id), Some(quiz.id));
    assert_eq!(result.filters.categories, vec!["geography"]);

    approved(&state, &reviewer, multiple_choice("history")).await;
    assert_eq!(
        catalog::categories(&state).await.unwrap(),
        vec!["geography", "history"]
    );
}

#[tokio::test]
async fn unreadable_cached_payload_is_a_miss() {
    let app = sync_app();
    let reviewer = moderator(&app.state).await;
    approved(&app.state, &reviewer, multiple_choice("geography")).await;

    app.cache
        .set(FILTER_SNAPSHOT_KEY, "{not json".to_string(), Duration::from_secs(60))
        .await
        .unwrap();

    let snapshot = catalog::available_filters(&app.state).await.unwrap();
    assert_eq!(snapshot.categories, vec!["geography"]);

    // The recomputed snapshot replaced the garbage.
    let raw = app.cache.get(FILTER_SNAPSHOT_KEY).await.unwrap().unwrap();
    let cached: FilterSnapshot = serde_json::from_str(&raw).unwrap();
    assert_eq!(cached, snapshot);
}

#[tokio::test]
async fn stats_count_every_status() {
    let app = sync_app();
    let reviewer = moderator(&app.state).await;
    approved(&app.state, &reviewer, multiple_choice("geography")).await;
    approved(&app.state, &reviewer, multiple_choice("geography")).await;
    approved(&app.state, &reviewer, true_false("science", "Marie", Difficulty::Hard)).await;
    submit(&app.state, multiple_choice("music")).await;

    let stats = catalog::stats(&app.state).await.unwrap();

    assert_eq!(stats.counts.approved, 3);
    assert_eq!(stats.counts.pending, 1);
    assert_eq!(stats.counts.total, 4);
    assert_eq!(stats.by_category[0].value, "geography");
    assert_eq!(stats.by_category[0].count, 2);
    assert_eq!(stats.by_category.len(), 2);
    assert_eq!(stats.submissions.pending, 1);
    assert_eq!(stats.submissions.total, 4);
}
