use sqlx::Row;
use tracing::instrument;

use super::Pool;
use crate::cart::{Cart, CartLine, Pricing};
use crate::error::Result;

/// Load the persisted cart for `user_id`; a missing row is an empty cart.
#[instrument(skip_all)]
pub async fn load(pool: &Pool, user_id: i64, pricing: &Pricing) -> Result<Cart> {
    let row = sqlx::query("SELECT items FROM carts WHERE user_id = ?")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    let lines: Vec<CartLine> = match row {
        Some(row) => serde_json::from_str(row.get::<&str, _>("items"))?,
        None => Vec::new(),
    };
    Cart::from_lines(lines, pricing)
}

#[instrument(skip_all)]
pub async fn save(pool: &Pool, user_id: i64, cart: &Cart) -> Result<()> {
    let items = serde_json::to_string(&cart.items)?;
    sqlx::query(
        "INSERT INTO carts (user_id, items) VALUES (?, ?) \
         ON CONFLICT(user_id) DO UPDATE SET items = excluded.items, updated_at = CURRENT_TIMESTAMP",
    )
    .bind(user_id)
    .bind(items)
    .execute(pool)
    .await?;
    Ok(())
}
