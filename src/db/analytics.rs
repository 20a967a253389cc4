//! Dashboard numbers for admins (whole platform) and owners (one bookstore).
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::instrument;

use super::Pool;
use crate::error::Result;

const TOP_BOOKS: i64 = 5;

#[derive(Debug, Clone, Serialize, sqlx::FromRow, PartialEq, Eq)]
pub struct TopBook {
    pub book_id: Option<i64>,
    pub title: String,
    pub quantity: i64,
    pub revenue: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow, PartialEq, Eq)]
pub struct DailySales {
    pub day: String,
    pub orders: i64,
    pub revenue: i64,
}

/// Sales figures; revenue never includes cancelled orders.
#[derive(Debug, Clone, Serialize, Default)]
pub struct Sales {
    pub book_count: i64,
    pub orders_by_status: BTreeMap<String, i64>,
    pub revenue: i64,
    pub top_books: Vec<TopBook>,
    pub daily: Vec<DailySales>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlatformOverview {
    pub users_by_role: BTreeMap<String, i64>,
    pub bookstores_by_status: BTreeMap<String, i64>,
    #[serde(flatten)]
    pub sales: Sales,
}

async fn grouped_counts(pool: &Pool, sql: &str) -> Result<BTreeMap<String, i64>> {
    let rows: Vec<(String, i64)> = sqlx::query_as(sql).fetch_all(pool).await?;
    Ok(rows.into_iter().collect())
}

/// `bookstore_id = None` covers every order, library orders included.
async fn sales(pool: &Pool, bookstore_id: Option<i64>, days: u32) -> Result<Sales> {
    let book_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM books WHERE (? IS NULL OR bookstore_id = ?)")
        .bind(bookstore_id)
        .bind(bookstore_id)
        .fetch_one(pool)
        .await?;

    let by_status: Vec<(String, i64)> = sqlx::query_as(
        "SELECT status, COUNT(*) FROM orders WHERE (? IS NULL OR bookstore_id = ?) GROUP BY status",
    )
    .bind(bookstore_id)
    .bind(bookstore_id)
    .fetch_all(pool)
    .await?;

    let revenue: i64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(total), 0) FROM orders \
         WHERE status != 'cancelled' AND (? IS NULL OR bookstore_id = ?)",
    )
    .bind(bookstore_id)
    .bind(bookstore_id)
    .fetch_one(pool)
    .await?;

    let top_books = sqlx::query_as::<_, TopBook>(
        "SELECT i.book_id, i.title, SUM(i.quantity) AS quantity, SUM(i.quantity * i.unit_price) AS revenue \
         FROM order_items i JOIN orders o ON o.id = i.order_id \
         WHERE o.status != 'cancelled' AND (? IS NULL OR o.bookstore_id = ?) \
         GROUP BY i.book_id, i.title ORDER BY quantity DESC, i.title LIMIT ?",
    )
    .bind(bookstore_id)
    .bind(bookstore_id)
    .bind(TOP_BOOKS)
    .fetch_all(pool)
    .await?;

    let daily = sqlx::query_as::<_, DailySales>(
        "SELECT substr(created_at, 1, 10) AS day, COUNT(*) AS orders, \
         COALESCE(SUM(CASE WHEN status != 'cancelled' THEN total ELSE 0 END), 0) AS revenue \
         FROM orders WHERE created_at >= datetime('now', ?) AND (? IS NULL OR bookstore_id = ?) \
         GROUP BY day ORDER BY day",
    )
    .bind(format!("-{} days", days.max(1)))
    .bind(bookstore_id)
    .bind(bookstore_id)
    .fetch_all(pool)
    .await?;

    Ok(Sales {
        book_count,
        orders_by_status: by_status.into_iter().collect(),
        revenue,
        top_books,
        daily,
    })
}

#[instrument(skip(pool))]
pub async fn platform(pool: &Pool, days: u32) -> Result<PlatformOverview> {
    Ok(PlatformOverview {
        users_by_role: grouped_counts(pool, "SELECT role, COUNT(*) FROM users GROUP BY role").await?,
        bookstores_by_status: grouped_counts(pool, "SELECT status, COUNT(*) FROM bookstores GROUP BY status").await?,
        sales: sales(pool, None, days).await?,
    })
}

#[instrument(skip(pool))]
pub async fn for_bookstore(pool: &Pool, bookstore_id: i64, days: u32) -> Result<Sales> {
    sales(pool, Some(bookstore_id), days).await
}
