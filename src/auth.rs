//! Password hashing, access tokens and input validation.
//!
//! - Argon2id password hashes stored as PHC strings
//! - HS256 JWT access tokens carrying the user id and role
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use hmac::{Hmac, Mac};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::{debug, instrument};

use crate::error::{AppError, Result};
use crate::model::Role;

const JWT_HEADER: &str = r#"{"alg":"HS256","typ":"JWT"}"#;
pub const MIN_PASSWORD_LEN: usize = 8;
pub const MAX_NAME_LEN: usize = 100;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex"));

// ── Passwords ───────────────────────────────────────────────────────────────

#[instrument(skip_all)]
pub fn hash_password(password: &str) -> Result<String> {
    if password.is_empty() {
        return Err(AppError::validation("password must not be empty"));
    }
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::internal(format!("password hashing failed: {e}")))
}

/// Returns `Ok(false)` on mismatch; errors only for a corrupt stored hash.
#[instrument(skip_all)]
pub fn verify_password(stored_hash: &str, password: &str) -> Result<bool> {
    let parsed = PasswordHash::new(stored_hash)
        .map_err(|e| AppError::internal(format!("invalid stored password hash: {e}")))?;
    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => {
            debug!("password mismatch");
            Ok(false)
        }
        Err(e) => Err(AppError::internal(format!("password verification failed: {e}"))),
    }
}

// ── Tokens ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Deserialize)]
struct Header {
    alg: String,
    #[serde(default)]
    typ: Option<String>,
}

pub fn sign_token(user_id: i64, role: Role, secret: &str, now_unix: i64, ttl_secs: u64) -> Result<String> {
    let exp = i64::try_from(ttl_secs)
        .ok()
        .and_then(|ttl| now_unix.checked_add(ttl))
        .ok_or_else(|| AppError::internal("token lifetime out of range"))?;
    let claims = Claims {
        sub: user_id,
        role,
        iat: now_unix,
        exp,
    };
    let header_b64 = URL_SAFE_NO_PAD.encode(JWT_HEADER.as_bytes());
    let payload_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims)?);
    let signing_input = format!("{header_b64}.{payload_b64}");
    let sig_b64 = URL_SAFE_NO_PAD.encode(hmac_sha256(secret.as_bytes(), signing_input.as_bytes())?);
    Ok(format!("{signing_input}.{sig_b64}"))
}

pub fn verify_token(token: &str, secret: &str, now_unix: i64) -> Result<Claims> {
    let mut parts = token.split('.');
    let (Some(header), Some(payload), Some(sig), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(AppError::unauthorized("malformed token"));
    };

    let parsed: Header = URL_SAFE_NO_PAD
        .decode(header)
        .ok()
        .and_then(|raw| serde_json::from_slice(&raw).ok())
        .ok_or_else(|| AppError::unauthorized("invalid token header"))?;
    if parsed.alg != "HS256" || parsed.typ.as_deref().is_some_and(|t| t != "JWT") {
        return Err(AppError::unauthorized("unsupported token algorithm"));
    }

    let signing_input = format!("{header}.{payload}");
    let expected = hmac_sha256(secret.as_bytes(), signing_input.as_bytes())?;
    let actual = URL_SAFE_NO_PAD
        .decode(sig)
        .map_err(|_| AppError::unauthorized("invalid token signature"))?;
    if !constant_time_eq(&expected, &actual) {
        return Err(AppError::unauthorized("invalid token signature"));
    }

    let payload = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|_| AppError::unauthorized("invalid token payload"))?;
    let claims: Claims = serde_json::from_slice(&payload)
        .map_err(|_| AppError::unauthorized("invalid token payload"))?;
    if now_unix >= claims.exp {
        return Err(AppError::unauthorized("token expired"));
    }
    Ok(claims)
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let mut mac = Hmac::<Sha256>::new_from_slice(key)
        .map_err(|e| AppError::internal(format!("hmac key: {e}")))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

// ── Validation ──────────────────────────────────────────────────────────────

pub fn normalize_email(email: &str) -> Result<String> {
    let email = email.trim().to_lowercase();
    if !EMAIL_RE.is_match(&email) {
        return Err(AppError::validation("invalid email address"));
    }
    Ok(email)
}

pub fn validate_password(password: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::validation(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

/// Trimmed, non-empty, at most [`MAX_NAME_LEN`] characters.
pub fn validate_name(field: &str, value: &str) -> Result<String> {
    let value = value.trim();
    let len = value.chars().count();
    if len == 0 || len > MAX_NAME_LEN {
        return Err(AppError::validation(format!(
            "{field} must be 1-{MAX_NAME_LEN} characters"
        )));
    }
    Ok(value.to_string())
}
