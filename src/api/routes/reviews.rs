use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;

use crate::api::{ApiJson, ApiPath, AuthUser};
use crate::db::{self, Pool};
use crate::error::{AppError, Result};
use crate::model::Review;

#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    pub rating: i64,
    #[serde(default)]
    pub comment: Option<String>,
}

/// GET /api/books/{id}/reviews
pub async fn list(
    State(pool): State<Pool>,
    ApiPath(book_id): ApiPath<i64>,
) -> Result<Json<Vec<Review>>> {
    if db::books::get(&pool, book_id, true).await?.is_none() {
        return Err(AppError::not_found("book not found"));
    }
    Ok(Json(db::reviews::list_for_book(&pool, book_id).await?))
}

/// POST /api/books/{id}/reviews: Posting again replaces the earlier review.
pub async fn create(
    State(pool): State<Pool>,
    user: AuthUser,
    ApiPath(book_id): ApiPath<i64>,
    ApiJson(req): ApiJson<ReviewRequest>,
) -> Result<(StatusCode, Json<Review>)> {
    let review = db::reviews::upsert(&pool, user.id(), book_id, req.rating, req.comment.as_deref()).await?;
    Ok((StatusCode::CREATED, Json(review)))
}

/// DELETE /api/reviews/{id}: The author or an admin.
pub async fn delete_review(
    State(pool): State<Pool>,
    user: AuthUser,
    ApiPath(id): ApiPath<i64>,
) -> Result<StatusCode> {
    let review = db::reviews::get(&pool, id)
        .await?
        .ok_or_else(|| AppError::not_found("review not found"))?;
    if review.user_id != user.id() && !user.is_admin() {
        return Err(AppError::forbidden("not your review"));
    }
    db::reviews::delete(&pool, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
