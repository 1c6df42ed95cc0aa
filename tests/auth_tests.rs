// tests/auth_tests.rs

mod common;

use chrono::{Duration, Utc};
use common::{PASSWORD, create_admin, sync_app, unique};
use quiz_catalog::{
    error::AppError,
    models::{
        admin::{ALL_PERMISSIONS, LoginRequest, PERM_VIEW_STATS, RefreshRequest},
        submission::ClientMeta,
    },
    services::auth,
    state::AppState,
    store::{AdminRepository, AuditRepository},
};

fn credentials(username: &str, password: &str) -> LoginRequest {
    LoginRequest {
        username: username.to_string(),
        password: password.to_string(),
    }
}

async fn attempt(state: &AppState, username: &str, password: &str, at: chrono::DateTime<Utc>) -> Result<(), AppError> {
    auth::login(state, credentials(username, password), ClientMeta::default(), at)
        .await
        .map(|_| ())
}

#[tokio::test]
async fn five_failures_lock_the_account_until_the_window_elapses() {
    // Arrange
    let app = sync_app();
    let username = unique("lock");
    let admin = create_admin(&app.state, &username, &ALL_PERMISSIONS).await;
    let now = Utc::now();

    // Act: five wrong passwords
    for _ in 0..5 {
        let err = attempt(&app.state, &username, "wrong-password", now).await.unwrap_err();
        assert!(matches!(err, AppError::AuthError(_)), "got {:?}", err);
    }

    // Assert: the right password is refused while locked
    let err = attempt(&app.state, &username, PASSWORD, now).await.unwrap_err();
    assert!(matches!(err, AppError::Locked(_)), "got {:?}", err);

    let err = attempt(&app.state, &username, PASSWORD, now + Duration::minutes(14))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Locked(_)));

    let stored = app.state.store.find_admin(admin.id).await.unwrap().unwrap();
    assert_eq!(stored.failed_login_attempts, 5);
    assert_eq!(stored.locked_until, Some(now + Duration::minutes(15)));

    // Once the window has passed the correct password works and clears the lock.
    attempt(&app.state, &username, PASSWORD, now + Duration::minutes(16))
        .await
        .unwrap();

    let stored = app.state.store.find_admin(admin.id).await.unwrap().unwrap();
    assert_eq!(stored.failed_login_attempts, 0);
    assert_eq!(stored.locked_until, None);
    assert_eq!(stored.last_login_at, Some(now + Duration::minutes(16)));
}

#[tokio::test]
async fn successful_login_resets_the_failure_counter() {
    let app = sync_app();
    let username = unique("reset");
    create_admin(&app.state, &username, &ALL_PERMISSIONS).await;
    let now = Utc::now();

    for _ in 0..4 {
        attempt(&app.state, &username, "wrong-password", now).await.unwrap_err();
    }
    attempt(&app.state, &username, PASSWORD, now).await.unwrap();

    // Four more failures are again below the threshold.
    for _ in 0..4 {
        attempt(&app.state, &username, "wrong-password", now).await.unwrap_err();
    }
    attempt(&app.state, &username, PASSWORD, now).await.unwrap();
}

#[tokio::test]
async fn concurrent_failures_are_all_counted() {
    let app = sync_app();
    let username = unique("race");
    let admin = create_admin(&app.state, &username, &ALL_PERMISSIONS).await;
    let now = Utc::now();

    let mut handles = Vec::new();
    for _ in 0..5 {
        let state = app.state.clone();
        let username = username.clone();
        handles.push(tokio::spawn(async move {
            attempt(&state, &username, "wrong-password", now).await
        }));
    }
    for handle in handles {
        assert!(handle.await.unwrap().is_err());
    }

    let stored = app.state.store.find_admin(admin.id).await.unwrap().unwrap();
    assert_eq!(stored.failed_login_attempts, 5);
    assert!(stored.is_locked_at(now));

    let err = attempt(&app.state, &username, PASSWORD, now).await.unwrap_err();
    assert!(matches!(err, AppError::Locked(_)));
}

#[tokio::test]
async fn unknown_and_inactive_accounts_are_refused() {
    let app = sync_app();
    let now = Utc::now();

    let err = attempt(&app.state, "nobody-here", PASSWORD, now).await.unwrap_err();
    assert!(matches!(err, AppError::AuthError(_)));

    let username = unique("off");
    let admin = create_admin(&app.state, &username, &ALL_PERMISSIONS).await;
    app.state.store.set_admin_active(admin.id, false).await.unwrap();

    let err = attempt(&app.state, &username, PASSWORD, now).await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    // An inactive account does not accumulate failures.
    let stored = app.state.store.find_admin(admin.id).await.unwrap().unwrap();
    assert_eq!(stored.failed_login_attempts, 0);
}

#[tokio::test]
async fn malformed_credentials_fail_validation() {
    let app = sync_app();

    let err = attempt(&app.state, "  ab ", PASSWORD, Utc::now()).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let err = attempt(&app.state, "someone", "12345", Utc::now()).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn login_is_case_insensitive_audited_and_issues_tokens() {
    // Arrange
    let app = sync_app();
    let username = unique("case");
    let admin = create_admin(&app.state, &username, &[PERM_VIEW_STATS]).await;

    // Act
    let response = auth::login(
        &app.state,
        credentials(&format!("  {}  ", username.to_uppercase()), PASSWORD),
        ClientMeta {
            ip_address: Some("198.51.100.4".to_string()),
            user_agent: None,
        },
        Utc::now(),
    )
    .await
    .unwrap();

    // Assert
    assert_eq!(response.admin.id, admin.id);

    let claims = app.state.tokens.verify_access(&response.tokens.access_token).unwrap();
    assert_eq!(claims.admin_id().unwrap(), admin.id);
    assert_eq!(claims.username, username);
    assert_eq!(claims.permissions, vec![PERM_VIEW_STATS]);
    assert_eq!(claims.roles, vec!["admin"]);

    let audit = app.state.store.audit_for("admin", &admin.id.to_string()).await.unwrap();
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].action, "admin.login");
    assert_eq!(audit[0].client.ip_address.as_deref(), Some("198.51.100.4"));
}

#[tokio::test]
async fn refresh_issues_access_tokens_for_active_accounts_only() {
    let app = sync_app();
    let username = unique("refresh");
    let admin = create_admin(&app.state, &username, &ALL_PERMISSIONS).await;
    let response = auth::login(&app.state, credentials(&username, PASSWORD), ClientMeta::default(), Utc::now())
        .await
        .unwrap();

    let token = auth::refresh(
        &app.state,
        RefreshRequest {
            refresh_token: response.tokens.refresh_token.clone(),
        },
        Utc::now(),
    )
    .await
    .unwrap();
    assert_eq!(app.state.tokens.verify_access(&token).unwrap().admin_id().unwrap(), admin.id);

    // An access token is not a refresh token.
    let err = auth::refresh(
        &app.state,
        RefreshRequest {
            refresh_token: response.tokens.access_token.clone(),
        },
        Utc::now(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::AuthError(_)));

    app.state.store.set_admin_active(admin.id, false).await.unwrap();
    let err = auth::refresh(
        &app.state,
        RefreshRequest {
            refresh_token: response.tokens.refresh_token,
        },
        Utc::now(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));
}

#[tokio::test]
async fn bootstrap_admin_is_created_once_with_every_permission() {
    let app = sync_app();
    let username = unique("root");

    let first = auth::ensure_admin(app.state.store.as_ref(), &username, PASSWORD, "Root").await.unwrap();
    let second = auth::ensure_admin(app.state.store.as_ref(), &username.to_uppercase(), "other-password", "Other")
        .await
        .unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(first.roles, vec!["admin"]);
    let mut permissions = first.permissions.clone();
    permissions.sort();
    let mut expected: Vec<String> = ALL_PERMISSIONS.iter().map(|p| p.to_string()).collect();
    expected.sort();
    assert_eq!(permissions, expected);

    // The original password still works.
    attempt(&app.state, &username, PASSWORD, Utc::now()).await.unwrap();
}
