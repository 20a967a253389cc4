use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::api::{ApiJson, AppState, AuthUser};
use crate::auth;
use crate::db::users::{self, NewUser, ProfileUpdate};
use crate::error::{AppError, Result};
use crate::model::{Role, User};

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub role: Option<Role>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

fn issue(state: &AppState, user: User) -> Result<AuthResponse> {
    let token = auth::sign_token(
        user.id,
        user.role,
        &state.config.auth.jwt_secret,
        Utc::now().timestamp(),
        state.config.auth.token_ttl_seconds,
    )?;
    Ok(AuthResponse { token, user })
}

/// POST /api/auth/register: Customers and bookstore owners sign up here;
/// admins are created from the command line only.
pub async fn register(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>)> {
    let role = req.role.unwrap_or(Role::Customer);
    if role == Role::Admin {
        return Err(AppError::validation("role must be customer or bookstore_owner"));
    }
    let name = auth::validate_name("name", &req.name)?;
    let email = auth::normalize_email(&req.email)?;
    auth::validate_password(&req.password)?;
    let password_hash = auth::hash_password(&req.password)?;

    let user = users::create(
        &state.pool,
        NewUser {
            name: &name,
            email: &email,
            password_hash: &password_hash,
            role,
        },
    )
    .await?;
    info!(user_id = user.id, role = role.as_str(), "user registered");
    Ok((StatusCode::CREATED, Json(issue(&state, user)?)))
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<Json<AuthResponse>> {
    let invalid = || AppError::unauthorized("invalid email or password");
    let email = auth::normalize_email(&req.email).map_err(|_| invalid())?;
    let user = users::get_by_email(&state.pool, &email)
        .await?
        .ok_or_else(invalid)?;
    if !auth::verify_password(&user.password_hash, &req.password)? {
        return Err(invalid());
    }
    Ok(Json(issue(&state, user)?))
}

/// GET /api/auth/me
pub async fn me(user: AuthUser) -> Json<User> {
    Json(user.0)
}

/// PUT /api/auth/me: Name, phone and address; omitted fields are kept.
pub async fn update_me(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(req): ApiJson<UpdateProfileRequest>,
) -> Result<Json<User>> {
    let update = ProfileUpdate {
        name: req.name.map(|n| auth::validate_name("name", &n)).transpose()?,
        phone: req.phone.map(|p| p.trim().to_string()),
        address: req.address.map(|a| a.trim().to_string()),
    };
    Ok(Json(users::update_profile(&state.pool, user.id(), &update).await?))
}

/// PUT /api/auth/password
pub async fn change_password(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(req): ApiJson<ChangePasswordRequest>,
) -> Result<StatusCode> {
    if !auth::verify_password(&user.0.password_hash, &req.current_password)? {
        return Err(AppError::validation("current password is incorrect"));
    }
    auth::validate_password(&req.new_password)?;
    let hash = auth::hash_password(&req.new_password)?;
    users::set_password_hash(&state.pool, user.id(), &hash).await?;
    info!(user_id = user.id(), "password changed");
    Ok(StatusCode::NO_CONTENT)
}
