use tracing::instrument;

use super::Pool;
use crate::error::{AppError, Result};
use crate::model::{Bookstore, BookstoreStatus};

const STORE_COLUMNS: &str =
    "id, owner_id, name, description, city, address, phone, logo_url, status, created_at";

#[derive(Debug, Clone, Default)]
pub struct BookstoreFields {
    pub name: Option<String>,
    pub description: Option<String>,
    pub city: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub logo_url: Option<String>,
}

fn conflict_on_duplicate(e: sqlx::Error) -> AppError {
    match AppError::from(e) {
        AppError::Conflict(_) => {
            AppError::conflict("bookstore name taken or owner already has a bookstore")
        }
        other => other,
    }
}

/// Register a new storefront for `owner_id`. It starts as `pending`.
#[instrument(skip_all)]
pub async fn apply(pool: &Pool, owner_id: i64, name: &str, fields: &BookstoreFields) -> Result<Bookstore> {
    let sql = format!(
        "INSERT INTO bookstores (owner_id, name, description, city, address, phone, logo_url) \
         VALUES (?, ?, ?, ?, ?, ?, ?) RETURNING {STORE_COLUMNS}"
    );
    sqlx::query_as::<_, Bookstore>(&sql)
        .bind(owner_id)
        .bind(name)
        .bind(fields.description.as_deref())
        .bind(fields.city.as_deref())
        .bind(fields.address.as_deref())
        .bind(fields.phone.as_deref())
        .bind(fields.logo_url.as_deref())
        .fetch_one(pool)
        .await
        .map_err(conflict_on_duplicate)
}

#[instrument(skip_all)]
pub async fn get(pool: &Pool, id: i64) -> Result<Option<Bookstore>> {
    let sql = format!("SELECT {STORE_COLUMNS} FROM bookstores WHERE id = ?");
    Ok(sqlx::query_as::<_, Bookstore>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?)
}

#[instrument(skip_all)]
pub async fn get_by_owner(pool: &Pool, owner_id: i64) -> Result<Option<Bookstore>> {
    let sql = format!("SELECT {STORE_COLUMNS} FROM bookstores WHERE owner_id = ?");
    Ok(sqlx::query_as::<_, Bookstore>(&sql)
        .bind(owner_id)
        .fetch_optional(pool)
        .await?)
}

#[instrument(skip_all)]
pub async fn update(pool: &Pool, id: i64, fields: &BookstoreFields) -> Result<Bookstore> {
    let sql = format!(
        "UPDATE bookstores SET name = COALESCE(?, name), description = COALESCE(?, description), \
         city = COALESCE(?, city), address = COALESCE(?, address), phone = COALESCE(?, phone), \
         logo_url = COALESCE(?, logo_url) WHERE id = ? RETURNING {STORE_COLUMNS}"
    );
    sqlx::query_as::<_, Bookstore>(&sql)
        .bind(fields.name.as_deref())
        .bind(fields.description.as_deref())
        .bind(fields.city.as_deref())
        .bind(fields.address.as_deref())
        .bind(fields.phone.as_deref())
        .bind(fields.logo_url.as_deref())
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(conflict_on_duplicate)?
        .ok_or_else(|| AppError::not_found("bookstore not found"))
}

/// `status = None` lists every storefront (admin view).
#[instrument(skip_all)]
pub async fn list(pool: &Pool, status: Option<BookstoreStatus>) -> Result<Vec<Bookstore>> {
    let sql = format!(
        "SELECT {STORE_COLUMNS} FROM bookstores WHERE (? IS NULL OR status = ?) ORDER BY name"
    );
    Ok(sqlx::query_as::<_, Bookstore>(&sql)
        .bind(status)
        .bind(status)
        .fetch_all(pool)
        .await?)
}

#[instrument(skip_all)]
pub async fn set_status(pool: &Pool, id: i64, status: BookstoreStatus) -> Result<Bookstore> {
    let sql = format!("UPDATE bookstores SET status = ? WHERE id = ? RETURNING {STORE_COLUMNS}");
    sqlx::query_as::<_, Bookstore>(&sql)
        .bind(status)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("bookstore not found"))
}
