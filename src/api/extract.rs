use axum::{
    extract::{FromRef, FromRequest, FromRequestParts},
    http::{header, request::Parts},
};
use chrono::Utc;

use super::AppState;
use crate::auth;
use crate::db;
use crate::error::AppError;
use crate::model::{Role, User};

/// Authenticated user extracted from the `Authorization: Bearer <jwt>` header.
///
/// The role comes from the database rather than the token, so role changes
/// take effect without waiting for the token to expire.
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

impl AuthUser {
    pub fn id(&self) -> i64 {
        self.0.id
    }

    pub fn role(&self) -> Role {
        self.0.role
    }

    pub fn is_admin(&self) -> bool {
        self.0.role == Role::Admin
    }

    /// 403 unless the user holds one of `roles`.
    pub fn require(&self, roles: &[Role]) -> Result<(), AppError> {
        if roles.contains(&self.0.role) {
            Ok(())
        } else {
            Err(AppError::forbidden("insufficient permissions"))
        }
    }
}

fn bearer(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = AppState::from_ref(state);
        let token = bearer(parts)
            .ok_or_else(|| AppError::unauthorized("missing or invalid Authorization header"))?;
        let claims = auth::verify_token(token, &state.config.auth.jwt_secret, Utc::now().timestamp())?;
        let user = db::users::get(&state.pool, claims.sub)
            .await?
            .ok_or_else(|| AppError::unauthorized("account no longer exists"))?;
        Ok(AuthUser(user))
    }
}

/// `axum::Json` whose rejections are reported as `{"error": ...}`.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

/// `axum::extract::Path` with JSON rejections.
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct ApiPath<T>(pub T);

/// `axum::extract::Query` with JSON rejections.
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct ApiQuery<T>(pub T);
