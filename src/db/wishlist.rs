use chrono::{DateTime, Utc};
use tracing::instrument;

use super::{books, Pool};
use crate::error::{AppError, Result};
use crate::model::WishlistEntry;

/// Adding a book twice is a no-op.
#[instrument(skip_all)]
pub async fn add(pool: &Pool, user_id: i64, book_id: i64) -> Result<()> {
    if books::get(pool, book_id, true).await?.is_none() {
        return Err(AppError::not_found("book not found"));
    }
    sqlx::query("INSERT OR IGNORE INTO wishlist (user_id, book_id) VALUES (?, ?)")
        .bind(user_id)
        .bind(book_id)
        .execute(pool)
        .await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn remove(pool: &Pool, user_id: i64, book_id: i64) -> Result<()> {
    let res = sqlx::query("DELETE FROM wishlist WHERE user_id = ? AND book_id = ?")
        .bind(user_id)
        .bind(book_id)
        .execute(pool)
        .await?;
    if res.rows_affected() == 0 {
        return Err(AppError::not_found("book is not in the wishlist"));
    }
    Ok(())
}

/// Newest additions first, with full book details.
#[instrument(skip_all)]
pub async fn list(pool: &Pool, user_id: i64) -> Result<Vec<WishlistEntry>> {
    let rows: Vec<(i64, DateTime<Utc>)> = sqlx::query_as(
        "SELECT book_id, created_at FROM wishlist WHERE user_id = ? ORDER BY created_at DESC, rowid DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    let mut entries = Vec::with_capacity(rows.len());
    for (book_id, added_at) in rows {
        if let Some(book) = books::get(pool, book_id, false).await? {
            entries.push(WishlistEntry { added_at, book });
        }
    }
    Ok(entries)
}
