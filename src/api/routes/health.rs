use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::db::Pool;
use crate::error::Result;

/// GET /api/health: Liveness plus a database round trip.
pub async fn health(State(pool): State<Pool>) -> Result<Json<Value>> {
    sqlx::query("SELECT 1").execute(&pool).await?;
    Ok(Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    })))
}
