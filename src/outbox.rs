use anyhow::Result;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

use crate::db::{self, Pool};
use crate::notify::Notifier;

/// Deliver the next due outbox event. Returns `false` when nothing was due.
#[instrument(skip_all)]
pub async fn process_next_task(
    pool: &Pool,
    notifier: &dyn Notifier,
    max_backoff_secs: i64,
) -> Result<bool> {
    let Some(item) = db::outbox::next_due(pool).await? else {
        return Ok(false);
    };
    let event = match item.event() {
        Ok(event) => event,
        Err(err) => {
            warn!(
                %err,
                id = item.id,
                kind = %item.kind,
                attempt = item.attempt,
                "outbox task undecodable; backoff"
            );
            db::outbox::backoff(pool, item.id, item.attempt, max_backoff_secs).await?;
            return Ok(true);
        }
    };
    let kind = event.kind.as_str();
    let order_id = event.order_id;
    match notifier.deliver(&event).await {
        Ok(()) => {
            db::outbox::delete(pool, item.id).await?;
            info!(id = item.id, kind, order_id, "outbox task delivered");
        }
        Err(err) => {
            warn!(
                ?err,
                id = item.id,
                kind,
                order_id,
                attempt = item.attempt,
                "outbox task failed; backoff"
            );
            db::outbox::backoff(pool, item.id, item.attempt, max_backoff_secs).await?;
        }
    }
    Ok(true)
}

/// Single-consumer delivery loop; sleeps `poll` whenever the queue is idle.
pub async fn run_worker(pool: Pool, notifier: Box<dyn Notifier>, poll: Duration, max_backoff_secs: i64) {
    loop {
        match process_next_task(&pool, notifier.as_ref(), max_backoff_secs).await {
            Ok(true) => {}
            Ok(false) => tokio::time::sleep(poll).await,
            Err(err) => {
                error!(?err, "outbox worker error");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}
