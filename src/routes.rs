// src/routes.rs

use std::sync::Arc;

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware,
    routing::{get, post},
};
use tower_governor::{GovernorLayer, governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor};
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::{
    config::RateLimit,
    handlers::{admin, health, quiz},
    state::AppState,
    utils::jwt::auth_middleware,
};

/// Milliseconds between token refills so that `max_requests` fit in one window.
fn replenish_period_ms(limit: &RateLimit) -> u64 {
    (limit.window_seconds.saturating_mul(1000) / u64::from(limit.max_requests.max(1))).max(1)
}

fn cors_layer(origin: &str) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    if origin.trim() == "*" {
        return cors.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = origin
        .split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", o);
                None
            }
        })
        .collect();

    cors.allow_origin(origins)
}

/// Assembles the main application router.
///
/// * Public routes: health, quiz submission and the random-quiz read path, login.
/// * Bearer-protected routes: pending listings, stats and reviews. Each handler
///   checks its own permission.
/// * Global middleware: request id, tracing, CORS and optional per-IP rate limiting.
pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.cors_origin);
    let rate_limit = state.config.rate_limit;

    let public_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .route("/quizzes", post(quiz::submit_quiz))
        .route("/quizzes/random", get(quiz::random_quiz))
        .route("/quizzes/stats", get(quiz::quiz_stats))
        .route("/quizzes/categories", get(quiz::categories))
        .route("/admin/login", post(admin::login))
        .route("/admin/refresh", post(admin::refresh));

    let protected_routes = Router::new()
        .route("/quizzes/pending", get(quiz::list_pending))
        .route("/admin/stats", get(admin::stats))
        .route("/admin/quizzes/pending", get(quiz::list_pending))
        .route("/admin/quizzes/{quiz_id}/{action}", post(admin::review_quiz))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let mut router = Router::new()
        .nest("/api", public_routes.merge(protected_routes))
        // Global Middleware (last added runs first)
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(cors);

    if let Some(limit) = rate_limit {
        // Token bucket refilling `max_requests` per window, keyed by the same
        // client address `ClientMeta` records (first forwarded hop, else peer).
        match GovernorConfigBuilder::default()
            .key_extractor(SmartIpKeyExtractor)
            .per_millisecond(replenish_period_ms(&limit))
            .burst_size(limit.max_requests)
            .finish()
        {
            Some(governor_conf) => router = router.layer(GovernorLayer::new(Arc::new(governor_conf))),
            None => tracing::warn!("Invalid rate limit settings {:?}, rate limiting disabled", limit),
        }
    }

    router.with_state(state)
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    use super::*;
    use crate::{cache::FilterCache, config::Config, jobs::ServeLedger, store::MemoryStore};

    fn state() -> AppState {
        state_with_rate_limit("0")
    }

    fn state_with_rate_limit(max_requests: &str) -> AppState {
        let config = Config::from_lookup(|key| match key {
            "JWT_ACCESS_SECRET" | "JWT_REFRESH_SECRET" => Some("x".repeat(40)),
            "RATE_LIMIT_MAX_REQUESTS" => Some(max_requests.to_string()),
            "RATE_LIMIT_WINDOW_SECONDS" => Some("60".to_string()),
            _ => None,
        })
        .unwrap();
        let store = Arc::new(MemoryStore::new());
        let ledger = ServeLedger::synchronous(store.clone());
        AppState::new(store, config, FilterCache::disabled(), ledger)
    }

    #[tokio::test]
    async fn health_is_public_and_tagged_with_a_request_id() {
        let app = create_router(state());

        let response = app
            .oneshot(Request::builder().uri("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn protected_routes_reject_missing_tokens() {
        let app = create_router(state());

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/admin/quizzes/1/approve")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    fn health_from(ip: &str) -> Request<Body> {
        Request::builder()
            .uri("/api/health")
            .header("x-forwarded-for", format!("{}, 10.0.0.1", ip))
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn rate_limit_buckets_follow_the_forwarded_client() {
        let app = create_router(state_with_rate_limit("1"));

        let first = app.clone().oneshot(health_from("203.0.113.1")).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        // Same proxy hop, different client: its own bucket.
        let other = app.clone().oneshot(health_from("203.0.113.2")).await.unwrap();
        assert_eq!(other.status(), StatusCode::OK);

        let again = app.oneshot(health_from("203.0.113.1")).await.unwrap();
        assert_eq!(again.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn replenish_period_never_overflows() {
        let huge = RateLimit {
            window_seconds: u64::MAX,
            max_requests: 1,
        };
        assert_eq!(replenish_period_ms(&huge), u64::MAX);

        let normal = RateLimit {
            window_seconds: 60,
            max_requests: 60,
        };
        assert_eq!(replenish_period_ms(&normal), 1000);

        let dense = RateLimit {
            window_seconds: 1,
            max_requests: 5000,
        };
        assert_eq!(replenish_period_ms(&dense), 1);
    }

    #[test]
    fn cors_origins_are_parsed_leniently() {
        // Invalid entries are skipped, not fatal.
        let _ = cors_layer("https://quiz.example.com, bad\norigin ,http://localhost:3000");
        let _ = cors_layer("*");
    }
}
