//! Order event notifications delivered from the outbox.
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;

use crate::model::{Order, OrderStatus};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    OrderPlaced,
    OrderStatusChanged,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::OrderPlaced => "order_placed",
            EventKind::OrderStatusChanged => "order_status_changed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrderEvent {
    pub kind: EventKind,
    pub order_id: i64,
    pub reference: String,
    pub user_id: i64,
    pub bookstore_id: Option<i64>,
    pub status: OrderStatus,
    pub total: i64,
    pub occurred_at: DateTime<Utc>,
}

impl OrderEvent {
    pub fn for_order(kind: EventKind, order: &Order) -> Self {
        Self {
            kind,
            order_id: order.id,
            reference: order.reference.clone(),
            user_id: order.user_id,
            bookstore_id: order.bookstore_id,
            status: order.status,
            total: order.total,
            occurred_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, event: &OrderEvent) -> Result<()>;
}

/// Posts each event as JSON to a fixed URL. Any non-2xx status is a failure.
#[derive(Clone)]
pub struct WebhookNotifier {
    http: Client,
    url: Url,
}

impl fmt::Debug for WebhookNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookNotifier")
            .field("url", &self.url.as_str())
            .finish_non_exhaustive()
    }
}

impl WebhookNotifier {
    pub fn new(url: &str) -> Result<Self> {
        let url = Url::parse(url).context("invalid webhook URL")?;
        let http = Client::builder()
            .user_agent(concat!("mutanabbi/", env!("CARGO_PKG_VERSION")))
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { http, url })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn deliver(&self, event: &OrderEvent) -> Result<()> {
        let resp = self
            .http
            .post(self.url.clone())
            .json(event)
            .send()
            .await
            .context("webhook request failed")?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow!("webhook responded {status}: {body}"));
        }
        Ok(())
    }
}

/// Used when no webhook is configured.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn deliver(&self, event: &OrderEvent) -> Result<()> {
        info!(
            kind = event.kind.as_str(),
            order_id = event.order_id,
            reference = %event.reference,
            status = event.status.as_str(),
            "order event"
        );
        Ok(())
    }
}

/// Webhook notifier when a URL is configured, log notifier otherwise.
pub fn from_config(cfg: &crate::config::Config) -> Result<Box<dyn Notifier>> {
    match cfg.notify.webhook_url.as_deref() {
        Some(url) => Ok(Box::new(WebhookNotifier::new(url)?)),
        None => Ok(Box::new(LogNotifier)),
    }
}
