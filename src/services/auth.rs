// src/services/auth.rs

//! Administrator login guarded by the lockout policy, token refresh and the
//! bootstrap administrator.

use chrono::{DateTime, Duration, Utc};
use validator::Validate;

use crate::{
    config::{LOGIN_LOCK_MINUTES, MAX_FAILED_LOGIN_ATTEMPTS},
    error::AppError,
    models::{
        admin::{ALL_PERMISSIONS, Administrator, LoginRequest, LoginResponse, NewAdministrator, RefreshRequest},
        audit::NewAuditEntry,
        submission::ClientMeta,
    },
    state::AppState,
    store::{AdminRepository, AuditRepository, Store},
    utils::hash::{hash_password, verify_password},
};

fn locked_error(admin: &Administrator) -> AppError {
    let until = admin
        .locked_until
        .map(|t| t.to_rfc3339())
        .unwrap_or_default();
    AppError::Locked(format!(
        "Account is temporarily locked due to too many failed login attempts. Try again after {}",
        until
    ))
}

/// Authenticates an administrator at time `now`.
///
/// Unknown user: `AuthError`. Inactive: `Forbidden`. Locked: `Locked`, even
/// when the password is right. A wrong password bumps the failure counter and
/// locks the account once it reaches the threshold.
pub async fn login(
    state: &AppState,
    payload: LoginRequest,
    client: ClientMeta,
    now: DateTime<Utc>,
) -> Result<LoginResponse, AppError> {
    let payload = LoginRequest {
        username: payload.username.trim().to_lowercase(),
        password: payload.password,
    };
    payload.validate()?;

    let admin = state
        .store
        .find_admin_by_username(&payload.username)
        .await?
        .ok_or_else(|| AppError::AuthError("Invalid credentials".to_string()))?;

    if !admin.is_active {
        return Err(AppError::Forbidden("Account is disabled".to_string()));
    }

    if admin.is_locked_at(now) {
        tracing::warn!(username = %admin.username, "Login attempt on locked account");
        return Err(locked_error(&admin));
    }

    if !verify_password(&payload.password, &admin.password_hash)? {
        let lock_until = now + Duration::minutes(LOGIN_LOCK_MINUTES);
        let failed = state
            .store
            .record_failed_login(admin.id, MAX_FAILED_LOGIN_ATTEMPTS, lock_until)
            .await?;

        if failed.locked_until.is_some() {
            tracing::warn!(
                username = %admin.username,
                attempts = failed.attempts,
                "Account locked after repeated failed logins"
            );
        } else {
            tracing::info!(username = %admin.username, attempts = failed.attempts, "Failed login");
        }
        return Err(AppError::AuthError("Invalid credentials".to_string()));
    }

    let admin = state.store.record_successful_login(admin.id, now).await?;

    state
        .store
        .append_audit(NewAuditEntry {
            actor: admin.id,
            action: "admin.login".to_string(),
            resource_type: "admin".to_string(),
            resource_id: admin.id.to_string(),
            description: format!("Administrator {} logged in", admin.username),
            client,
        })
        .await?;

    let tokens = state.tokens.issue_pair(&admin)?;

    tracing::info!(username = %admin.username, "Administrator logged in");
    Ok(LoginResponse { admin, tokens })
}

/// Exchanges a refresh token for a new access token.
///
/// The administrator is re-read so a disabled or locked account cannot keep
/// minting access tokens.
pub async fn refresh(state: &AppState, payload: RefreshRequest, now: DateTime<Utc>) -> Result<String, AppError> {
    let claims = state.tokens.verify_refresh(&payload.refresh_token)?;

    let admin = state
        .store
        .find_admin(claims.admin_id()?)
        .await?
        .ok_or_else(|| AppError::AuthError("Invalid token".to_string()))?;

    if !admin.is_active {
        return Err(AppError::Forbidden("Account is disabled".to_string()));
    }
    if admin.is_locked_at(now) {
        return Err(locked_error(&admin));
    }

    state.tokens.issue_access(&admin)
}

/// Returns the administrator named `username`, creating it with every
/// permission when it does not exist yet.
pub async fn ensure_admin(
    store: &dyn Store,
    username: &str,
    password: &str,
    display_name: &str,
) -> Result<Administrator, AppError> {
    let username = username.trim().to_lowercase();

    if let Some(existing) = store.find_admin_by_username(&username).await? {
        return Ok(existing);
    }

    tracing::info!("Seeding admin user: {}", username);
    let password_hash = hash_password(password)?;

    store
        .create_admin(NewAdministrator {
            username,
            password_hash,
            display_name: display_name.to_string(),
            roles: vec!["admin".to_string()],
            permissions: ALL_PERMISSIONS.iter().map(|p| p.to_string()).collect(),
        })
        .await
}
