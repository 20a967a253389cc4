use sqlx::{Row, Sqlite, Transaction};
use tracing::instrument;

use super::Pool;
use crate::error::{AppError, Result};
use crate::notify::{EventKind, OrderEvent};

/// A due row as stored. The payload is decoded by [`OutboxItem::event`] so a
/// row that no longer decodes can still be backed off.
#[derive(Debug, Clone)]
pub struct OutboxItem {
    pub id: i64,
    pub kind: String,
    pub attempt: i32,
    pub payload: String,
}

impl OutboxItem {
    pub fn event(&self) -> Result<OrderEvent> {
        serde_json::from_str(&self.payload).map_err(|e| {
            AppError::internal(format!("outbox {} has a corrupt payload: {e}", self.id))
        })
    }
}

/// Enqueue an event inside the caller's transaction so it commits together
/// with the state change it describes.
pub(crate) async fn enqueue_tx(tx: &mut Transaction<'_, Sqlite>, event: &OrderEvent) -> Result<i64> {
    let payload = serde_json::to_string(event)?;
    let id: i64 = sqlx::query_scalar(
        "INSERT INTO outbox (kind, ref_id, payload, attempt) VALUES (?, ?, ?, 0) RETURNING id",
    )
    .bind(event.kind.as_str())
    .bind(event.order_id)
    .bind(payload)
    .fetch_one(&mut **tx)
    .await?;
    Ok(id)
}

/// Oldest due task; placements go before status changes of the same age.
#[instrument(skip_all)]
pub async fn next_due(pool: &Pool) -> Result<Option<OutboxItem>> {
    let row = sqlx::query(
        "SELECT id, kind, payload, attempt FROM outbox WHERE datetime(due_at) <= CURRENT_TIMESTAMP \
         ORDER BY datetime(due_at) ASC, (CASE WHEN kind = ? THEN 0 ELSE 1 END), id ASC LIMIT 1",
    )
    .bind(EventKind::OrderPlaced.as_str())
    .fetch_optional(pool)
    .await?;
    let Some(row) = row else {
        return Ok(None);
    };
    Ok(Some(OutboxItem {
        id: row.get("id"),
        kind: row.get("kind"),
        attempt: row.get("attempt"),
        payload: row.get("payload"),
    }))
}

#[instrument(skip_all)]
pub async fn delete(pool: &Pool, id: i64) -> Result<()> {
    sqlx::query("DELETE FROM outbox WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Exponential backoff: 5s * 2^attempt, bounded by `max_cap_secs` when positive.
pub fn backoff_secs(attempt: i32, max_cap_secs: i64) -> i64 {
    let secs = 5_i64 * (1_i64 << attempt.clamp(0, 10));
    if max_cap_secs <= 0 {
        secs
    } else {
        secs.min(max_cap_secs)
    }
}

#[instrument(skip_all)]
pub async fn backoff(pool: &Pool, id: i64, attempt: i32, max_cap_secs: i64) -> Result<()> {
    let secs = backoff_secs(attempt, max_cap_secs);
    sqlx::query(
        "UPDATE outbox SET attempt = ?, due_at = datetime('now', ? || ' seconds') WHERE id = ?",
    )
    .bind(attempt + 1)
    .bind(secs)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn count(pool: &Pool) -> Result<i64> {
    Ok(sqlx::query_scalar("SELECT COUNT(*) FROM outbox")
        .fetch_one(pool)
        .await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_and_caps() {
        assert_eq!(backoff_secs(0, 300), 5);
        assert_eq!(backoff_secs(1, 300), 10);
        assert_eq!(backoff_secs(3, 300), 40);
        assert_eq!(backoff_secs(8, 300), 300);
        assert_eq!(backoff_secs(50, 0), 5 * 1024);
    }
}
