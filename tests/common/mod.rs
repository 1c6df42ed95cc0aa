// tests/common/mod.rs
#![allow(dead_code)]

use std::{sync::Arc, time::Duration};

use quiz_catalog::{
    cache::{CacheStore, FilterCache, MemoryCache},
    config::Config,
    jobs::{JobWorker, ServeLedger},
    models::{
        admin::{ALL_PERMISSIONS, Administrator, NewAdministrator},
        quiz::{Difficulty, Quiz, QuizKind, ReviewDecision, ReviewRequest, SubmitQuizRequest},
        submission::ClientMeta,
    },
    services::moderation,
    state::AppState,
    store::{AdminRepository, MemoryStore},
    utils::{hash::hash_password, jwt::Claims},
};

pub const PASSWORD: &str = "correct-horse-battery";

/// Configuration used by every test: rate limiting off, nothing else set.
pub fn test_config() -> Config {
    Config::from_lookup(|key| match key {
        "JWT_ACCESS_SECRET" => Some("test-access-secret-for-integration-tests".to_string()),
        "JWT_REFRESH_SECRET" => Some("test-refresh-secret-for-integration-tests".to_string()),
        "RUST_LOG" => Some("error".to_string()),
        "RATE_LIMIT_MAX_REQUESTS" => Some("0".to_string()),
        _ => None,
    })
    .expect("test configuration must be valid")
}

pub struct TestApp {
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub cache: Arc<MemoryCache>,
    pub worker: Option<JobWorker>,
}

/// In-memory store, in-process cache, serve counts recorded inline.
pub fn sync_app() -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let cache = Arc::new(MemoryCache::new());
    let filters = FilterCache::new(cache.clone(), Duration::from_secs(60));
    let ledger = ServeLedger::synchronous(store.clone());

    TestApp {
        state: AppState::new(store.clone(), test_config(), filters, ledger),
        store,
        cache,
        worker: None,
    }
}

/// Like [`sync_app`] but with the background queue and worker running.
pub fn async_app() -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let cache = Arc::new(MemoryCache::new());
    let filters = FilterCache::new(cache.clone(), Duration::from_secs(60));
    let (ledger, worker) = ServeLedger::start(store.clone(), 64);

    TestApp {
        state: AppState::new(store.clone(), test_config(), filters, ledger),
        store,
        cache,
        worker: Some(worker),
    }
}

/// Store plus an arbitrary cache backend.
pub fn app_with_cache(backend: Arc<dyn CacheStore>) -> AppState {
    let store = Arc::new(MemoryStore::new());
    let filters = FilterCache::new(backend, Duration::from_secs(60));
    let ledger = ServeLedger::synchronous(store.clone());
    AppState::new(store, test_config(), filters, ledger)
}

pub fn unique(prefix: &str) -> String {
    format!("{}_{}", prefix, &uuid::Uuid::new_v4().simple().to_string()[..8])
}

pub async fn create_admin(state: &AppState, username: &str, permissions: &[&str]) -> Administrator {
    state
        .store
        .create_admin(NewAdministrator {
            username: username.to_string(),
            password_hash: hash_password(PASSWORD).unwrap(),
            display_name: username.to_string(),
            roles: vec!["admin".to_string()],
            permissions: permissions.iter().map(|p| p.to_string()).collect(),
        })
        .await
        .expect("Failed to create admin")
}

pub async fn moderator(state: &AppState) -> Claims {
    let admin = create_admin(state, &unique("mod"), &ALL_PERMISSIONS).await;
    claims_for(state, &admin)
}

pub fn claims_for(state: &AppState, admin: &Administrator) -> Claims {
    let token = state.tokens.issue_access(admin).unwrap();
    state.tokens.verify_access(&token).unwrap()
}

pub fn multiple_choice(category: &str) -> SubmitQuizRequest {
    SubmitQuizRequest {
        question: "What is the capital of Turkey?".to_string(),
        kind: QuizKind::Multiple,
        category: category.to_string(),
        answers: vec![
            "Ankara".to_string(),
            "Istanbul".to_string(),
            "Izmir".to_string(),
            "Bursa".to_string(),
        ],
        correct_answer: 0,
        author: "Ayla Demir".to_string(),
        difficulty: Difficulty::Easy,
    }
}

pub fn true_false(category: &str, author: &str, difficulty: Difficulty) -> SubmitQuizRequest {
    SubmitQuizRequest {
        question: "The Pacific is the largest ocean on Earth.".to_string(),
        kind: QuizKind::Boolean,
        category: category.to_string(),
        answers: Vec::new(),
        correct_answer: 1,
        author: author.to_string(),
        difficulty,
    }
}

pub async fn submit(state: &AppState, request: SubmitQuizRequest) -> Quiz {
    moderation::submit_quiz(state, request, ClientMeta::default())
        .await
        .expect("Failed to submit quiz")
}

pub async fn approved(state: &AppState, reviewer: &Claims, request: SubmitQuizRequest) -> Quiz {
    let quiz = submit(state, request).await;
    moderation::review_quiz(
        state,
        quiz.id,
        ReviewDecision::Approve,
        &ReviewRequest::default(),
        reviewer,
        ClientMeta::default(),
    )
    .await
    .expect("Failed to approve quiz")
}
