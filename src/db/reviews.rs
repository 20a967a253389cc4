use tracing::instrument;

use super::{books, Pool};
use crate::error::{AppError, Result};
use crate::model::Review;

const REVIEW_SELECT: &str = "SELECT r.id, r.user_id, u.name AS user_name, r.book_id, r.rating, \
     r.comment, r.verified_purchase, r.created_at FROM reviews r JOIN users u ON u.id = r.user_id";

/// Create or replace the caller's review of a book. The review is marked as
/// a verified purchase when the user has a delivered order containing it.
#[instrument(skip(pool, comment))]
pub async fn upsert(pool: &Pool, user_id: i64, book_id: i64, rating: i64, comment: Option<&str>) -> Result<Review> {
    if !(1..=5).contains(&rating) {
        return Err(AppError::validation("rating must be between 1 and 5"));
    }
    if books::get(pool, book_id, true).await?.is_none() {
        return Err(AppError::not_found("book not found"));
    }
    let comment = comment.map(str::trim).filter(|c| !c.is_empty());

    let verified: bool = sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM order_items i JOIN orders o ON o.id = i.order_id \
         WHERE o.user_id = ? AND i.book_id = ? AND o.status = 'delivered')",
    )
    .bind(user_id)
    .bind(book_id)
    .fetch_one(pool)
    .await?;

    let id: i64 = sqlx::query_scalar(
        "INSERT INTO reviews (user_id, book_id, rating, comment, verified_purchase) VALUES (?, ?, ?, ?, ?) \
         ON CONFLICT(user_id, book_id) DO UPDATE SET rating = excluded.rating, comment = excluded.comment, \
         verified_purchase = excluded.verified_purchase, created_at = CURRENT_TIMESTAMP RETURNING id",
    )
    .bind(user_id)
    .bind(book_id)
    .bind(rating)
    .bind(comment)
    .bind(verified)
    .fetch_one(pool)
    .await?;

    get(pool, id)
        .await?
        .ok_or_else(|| AppError::internal("review vanished after insert"))
}

#[instrument(skip_all)]
pub async fn get(pool: &Pool, id: i64) -> Result<Option<Review>> {
    let sql = format!("{REVIEW_SELECT} WHERE r.id = ?");
    Ok(sqlx::query_as::<_, Review>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?)
}

#[instrument(skip_all)]
pub async fn list_for_book(pool: &Pool, book_id: i64) -> Result<Vec<Review>> {
    let sql = format!("{REVIEW_SELECT} WHERE r.book_id = ? ORDER BY r.created_at DESC, r.id DESC");
    Ok(sqlx::query_as::<_, Review>(&sql)
        .bind(book_id)
        .fetch_all(pool)
        .await?)
}

#[instrument(skip_all)]
pub async fn delete(pool: &Pool, id: i64) -> Result<()> {
    let res = sqlx::query("DELETE FROM reviews WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    if res.rows_affected() == 0 {
        return Err(AppError::not_found("review not found"));
    }
    Ok(())
}
