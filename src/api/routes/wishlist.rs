use axum::{extract::State, http::StatusCode, Json};

use crate::api::{ApiPath, AuthUser};
use crate::db::{self, Pool};
use crate::error::Result;
use crate::model::WishlistEntry;

pub async fn list(State(pool): State<Pool>, user: AuthUser) -> Result<Json<Vec<WishlistEntry>>> {
    Ok(Json(db::wishlist::list(&pool, user.id()).await?))
}

/// Adding a book twice is not an error.
pub async fn add(
    State(pool): State<Pool>,
    user: AuthUser,
    ApiPath(book_id): ApiPath<i64>,
) -> Result<StatusCode> {
    db::wishlist::add(&pool, user.id(), book_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn remove(
    State(pool): State<Pool>,
    user: AuthUser,
    ApiPath(book_id): ApiPath<i64>,
) -> Result<StatusCode> {
    db::wishlist::remove(&pool, user.id(), book_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
