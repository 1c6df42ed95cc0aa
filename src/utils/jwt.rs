// src/utils/jwt.rs

use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    body::Body,
    extract::State,
    http::{Request, header},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::{
    config::Config,
    error::AppError,
    models::admin::{Administrator, TokenPair},
};

/// JWT Claims structure.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct Claims {
    /// Subject - Stores the administrator ID (as string).
    pub sub: String,
    pub username: String,
    pub display_name: String,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
    /// Issued-at as Unix timestamp.
    pub iat: usize,
    /// Expiration time as Unix timestamp.
    pub exp: usize,
}

impl Claims {
    pub fn admin_id(&self) -> Result<i64, AppError> {
        self.sub
            .parse::<i64>()
            .map_err(|_| AppError::AuthError("Invalid token subject".to_string()))
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }

    /// Passes when the holder has at least one of `permissions`.
    pub fn require_any(&self, permissions: &[&str]) -> Result<(), AppError> {
        if permissions.iter().any(|p| self.has_permission(p)) {
            Ok(())
        } else {
            Err(AppError::Forbidden("Insufficient permissions".to_string()))
        }
    }
}

fn now_secs() -> Result<usize, AppError> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| AppError::InternalServerError(e.to_string()))?
        .as_secs() as usize)
}

/// Signs a JWT carrying the administrator's identity, roles and permissions.
pub fn sign_jwt(admin: &Administrator, secret: &str, expiration_seconds: u64) -> Result<String, AppError> {
    let iat = now_secs()?;
    let claims = Claims {
        sub: admin.id.to_string(),
        username: admin.username.clone(),
        display_name: admin.display_name.clone(),
        roles: admin.roles.clone(),
        permissions: admin.permissions.clone(),
        iat,
        exp: iat + expiration_seconds as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::InternalServerError(e.to_string()))
}

/// Verifies and decodes a JWT string.
///
/// Returns the `Claims` if valid, otherwise returns an `AppError`.
pub fn verify_jwt(token: &str, secret: &str) -> Result<Claims, AppError> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AppError::AuthError("Invalid token".to_string()))?;

    Ok(token_data.claims)
}

/// Issues and checks access/refresh tokens. Each kind has its own secret,
/// so a refresh token is never accepted as an access token.
#[derive(Clone)]
pub struct TokenService {
    access_secret: String,
    refresh_secret: String,
    access_ttl: u64,
    refresh_ttl: u64,
}

impl TokenService {
    pub fn new(config: &Config) -> Self {
        Self {
            access_secret: config.jwt_access_secret.clone(),
            refresh_secret: config.jwt_refresh_secret.clone(),
            access_ttl: config.jwt_access_expiration,
            refresh_ttl: config.jwt_refresh_expiration,
        }
    }

    pub fn issue_access(&self, admin: &Administrator) -> Result<String, AppError> {
        sign_jwt(admin, &self.access_secret, self.access_ttl)
    }

    pub fn issue_pair(&self, admin: &Administrator) -> Result<TokenPair, AppError> {
        Ok(TokenPair {
            access_token: self.issue_access(admin)?,
            refresh_token: sign_jwt(admin, &self.refresh_secret, self.refresh_ttl)?,
        })
    }

    pub fn verify_access(&self, token: &str) -> Result<Claims, AppError> {
        verify_jwt(token, &self.access_secret)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<Claims, AppError> {
        verify_jwt(token, &self.refresh_secret)
    }
}

/// Axum Middleware: Authentication.
///
/// Intercepts requests, validates the 'Authorization: Bearer <token>' header.
/// If valid, injects `Claims` into the request extensions for handlers to use.
pub async fn auth_middleware(
    State(tokens): State<TokenService>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| AppError::AuthError("Authentication token is missing".to_string()))?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::AuthError("Authentication token is malformed".to_string()))?;

    let claims = tokens.verify_access(token)?;
    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}
