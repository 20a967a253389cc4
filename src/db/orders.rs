use serde::Deserialize;
use sqlx::{Row, Sqlite, Transaction};
use std::collections::BTreeMap;
use tracing::{info, instrument};
use uuid::Uuid;

use super::{outbox, Pool};
use crate::cart::{CartLine, Pricing};
use crate::error::{AppError, Result};
use crate::model::{
    Availability, BookSource, BookstoreStatus, Order, OrderDetail, OrderItem, OrderStatus,
    OrderStatusChange, PaymentMethod,
};
use crate::notify::{EventKind, OrderEvent};

const ORDER_COLUMNS: &str = "id, reference, user_id, bookstore_id, status, payment_method, \
     shipping_address, phone, notes, subtotal, shipping, total, created_at, updated_at";

/// Delivery details supplied at checkout.
#[derive(Debug, Clone, Deserialize)]
pub struct Checkout {
    pub shipping_address: String,
    pub phone: String,
    #[serde(default)]
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub notes: Option<String>,
}

impl Checkout {
    pub fn validated(mut self) -> Result<Self> {
        self.shipping_address = self.shipping_address.trim().to_string();
        self.phone = self.phone.trim().to_string();
        if self.shipping_address.is_empty() {
            return Err(AppError::validation("shipping_address is required"));
        }
        let digits = self.phone.chars().filter(char::is_ascii_digit).count();
        if digits < 7 || !self.phone.chars().all(|c| c.is_ascii_digit() || "+- ".contains(c)) {
            return Err(AppError::validation("phone must be a valid phone number"));
        }
        self.notes = self.notes.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
        Ok(self)
    }
}

/// Catalog state of a line at checkout time.
struct PricedLine {
    book_id: i64,
    title: String,
    unit_price: i64,
    quantity: u32,
}

fn new_reference() -> String {
    let id = Uuid::new_v4().simple().to_string().to_uppercase();
    format!("MT-{}", &id[..10])
}

async fn price_line(
    tx: &mut Transaction<'_, Sqlite>,
    line: &CartLine,
    max_quantity: u32,
) -> Result<(Option<i64>, PricedLine)> {
    let row = sqlx::query(
        "SELECT b.id, b.title, b.price, b.availability, b.source, b.bookstore_id, s.status AS store_status \
         FROM books b LEFT JOIN bookstores s ON s.id = b.bookstore_id WHERE b.id = ?",
    )
    .bind(line.book_id)
    .fetch_optional(&mut **tx)
    .await?;
    let Some(row) = row else {
        return Err(AppError::validation(format!(
            "book {} is no longer in the catalog",
            line.book_id
        )));
    };

    let title: String = row.get("title");
    let source: BookSource = row.get("source");
    let store_status: Option<BookstoreStatus> = row.get("store_status");
    if source == BookSource::Store && store_status != Some(BookstoreStatus::Approved) {
        return Err(AppError::validation(format!("\"{title}\" is not currently sold")));
    }
    let availability: Availability = row.get("availability");
    if availability != Availability::Available {
        return Err(AppError::validation(format!("\"{title}\" is not available")));
    }

    Ok((
        row.get("bookstore_id"),
        PricedLine {
            book_id: row.get("id"),
            title,
            unit_price: row.get("price"),
            quantity: line.quantity.clamp(1, max_quantity.max(1)),
        },
    ))
}

async fn record_status_tx(
    tx: &mut Transaction<'_, Sqlite>,
    order_id: i64,
    status: OrderStatus,
    changed_by: i64,
) -> Result<()> {
    sqlx::query("INSERT INTO order_status_history (order_id, status, changed_by) VALUES (?, ?, ?)")
        .bind(order_id)
        .bind(status)
        .bind(changed_by)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

/// Turn the user's cart into orders, one per bookstore (library books form
/// their own order). Prices come from the catalog, not from the cart. The
/// cart is cleared in the same transaction.
#[instrument(skip(pool, lines, checkout, pricing))]
pub async fn place_orders(
    pool: &Pool,
    user_id: i64,
    lines: &[CartLine],
    checkout: &Checkout,
    pricing: &Pricing,
) -> Result<Vec<Order>> {
    if lines.is_empty() {
        return Err(AppError::validation("cart is empty"));
    }

    let mut tx = pool.begin().await?;

    let mut groups: BTreeMap<Option<i64>, Vec<PricedLine>> = BTreeMap::new();
    for line in lines {
        let (bookstore_id, priced) = price_line(&mut tx, line, pricing.max_line_quantity).await?;
        groups.entry(bookstore_id).or_default().push(priced);
    }

    let mut placed = Vec::with_capacity(groups.len());
    for (bookstore_id, items) in groups {
        let totals = pricing.totals(items.iter().map(|l| (l.unit_price, l.quantity)))?;
        let sql = format!(
            "INSERT INTO orders (reference, user_id, bookstore_id, status, payment_method, \
             shipping_address, phone, notes, subtotal, shipping, total) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING {ORDER_COLUMNS}"
        );
        let order = sqlx::query_as::<_, Order>(&sql)
            .bind(new_reference())
            .bind(user_id)
            .bind(bookstore_id)
            .bind(OrderStatus::Pending)
            .bind(checkout.payment_method)
            .bind(&checkout.shipping_address)
            .bind(&checkout.phone)
            .bind(checkout.notes.as_deref())
            .bind(totals.subtotal)
            .bind(totals.shipping)
            .bind(totals.total)
            .fetch_one(&mut *tx)
            .await?;

        for item in &items {
            sqlx::query(
                "INSERT INTO order_items (order_id, book_id, title, unit_price, quantity) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(order.id)
            .bind(item.book_id)
            .bind(&item.title)
            .bind(item.unit_price)
            .bind(item.quantity)
            .execute(&mut *tx)
            .await?;
        }

        record_status_tx(&mut tx, order.id, OrderStatus::Pending, user_id).await?;
        outbox::enqueue_tx(&mut tx, &OrderEvent::for_order(EventKind::OrderPlaced, &order)).await?;
        placed.push(order);
    }

    sqlx::query("DELETE FROM carts WHERE user_id = ?")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    info!(user_id, orders = placed.len(), "checkout completed");
    Ok(placed)
}

#[instrument(skip_all)]
pub async fn get(pool: &Pool, id: i64) -> Result<Option<Order>> {
    let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = ?");
    Ok(sqlx::query_as::<_, Order>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?)
}

/// Order with its items and status history, for order tracking.
#[instrument(skip_all)]
pub async fn get_detail(pool: &Pool, id: i64) -> Result<Option<OrderDetail>> {
    let Some(order) = get(pool, id).await? else {
        return Ok(None);
    };
    let items = sqlx::query_as::<_, OrderItem>(
        "SELECT id, order_id, book_id, title, unit_price, quantity FROM order_items WHERE order_id = ? ORDER BY id",
    )
    .bind(id)
    .fetch_all(pool)
    .await?;
    let history = sqlx::query_as::<_, OrderStatusChange>(
        "SELECT status, changed_by, changed_at FROM order_status_history WHERE order_id = ? ORDER BY id",
    )
    .bind(id)
    .fetch_all(pool)
    .await?;
    Ok(Some(OrderDetail {
        order,
        items,
        history,
    }))
}

#[instrument(skip_all)]
pub async fn list_for_user(pool: &Pool, user_id: i64) -> Result<Vec<Order>> {
    let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = ? ORDER BY id DESC");
    Ok(sqlx::query_as::<_, Order>(&sql)
        .bind(user_id)
        .fetch_all(pool)
        .await?)
}

#[instrument(skip_all)]
pub async fn list_for_bookstore(pool: &Pool, bookstore_id: i64, status: Option<OrderStatus>) -> Result<Vec<Order>> {
    let sql = format!(
        "SELECT {ORDER_COLUMNS} FROM orders WHERE bookstore_id = ? AND (? IS NULL OR status = ?) ORDER BY id DESC"
    );
    Ok(sqlx::query_as::<_, Order>(&sql)
        .bind(bookstore_id)
        .bind(status)
        .bind(status)
        .fetch_all(pool)
        .await?)
}

#[instrument(skip_all)]
pub async fn list_all(pool: &Pool, status: Option<OrderStatus>, limit: u32, offset: u32) -> Result<(Vec<Order>, i64)> {
    let sql = format!(
        "SELECT {ORDER_COLUMNS} FROM orders WHERE (? IS NULL OR status = ?) ORDER BY id DESC LIMIT ? OFFSET ?"
    );
    let orders = sqlx::query_as::<_, Order>(&sql)
        .bind(status)
        .bind(status)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE (? IS NULL OR status = ?)")
        .bind(status)
        .bind(status)
        .fetch_one(pool)
        .await?;
    Ok((orders, total))
}

/// Move an order to `next`, recording who did it and queueing a notification.
#[instrument(skip(pool))]
pub async fn update_status(pool: &Pool, order_id: i64, next: OrderStatus, actor_id: i64) -> Result<Order> {
    transition(pool, order_id, next, actor_id, None).await
}

/// Cancel an order only if it is still pending when the write happens.
#[instrument(skip(pool))]
pub async fn cancel_pending(pool: &Pool, order_id: i64, actor_id: i64) -> Result<Order> {
    transition(pool, order_id, OrderStatus::Cancelled, actor_id, Some(OrderStatus::Pending)).await
}

/// The status check and the write happen in one transaction, and the UPDATE
/// only matches the status that was read, so a concurrent change is never
/// overwritten.
async fn transition(
    pool: &Pool,
    order_id: i64,
    next: OrderStatus,
    actor_id: i64,
    required: Option<OrderStatus>,
) -> Result<Order> {
    let mut tx = pool.begin().await?;
    let current: Option<OrderStatus> = sqlx::query_scalar("SELECT status FROM orders WHERE id = ?")
        .bind(order_id)
        .fetch_optional(&mut *tx)
        .await?;
    let Some(current) = current else {
        return Err(AppError::not_found("order not found"));
    };
    if let Some(required) = required {
        if current != required {
            return Err(AppError::conflict(format!(
                "only {} orders can be {}",
                required.as_str(),
                next.as_str()
            )));
        }
    }
    if !current.can_transition_to(next) {
        return Err(AppError::conflict(format!(
            "cannot change order from {} to {}",
            current.as_str(),
            next.as_str()
        )));
    }

    let sql = format!(
        "UPDATE orders SET status = ?, updated_at = CURRENT_TIMESTAMP \
         WHERE id = ? AND status = ? RETURNING {ORDER_COLUMNS}"
    );
    let order = sqlx::query_as::<_, Order>(&sql)
        .bind(next)
        .bind(order_id)
        .bind(current)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::conflict("order was changed concurrently, try again"))?;
    record_status_tx(&mut tx, order_id, next, actor_id).await?;
    outbox::enqueue_tx(&mut tx, &OrderEvent::for_order(EventKind::OrderStatusChanged, &order)).await?;
    tx.commit().await?;

    info!(order_id, from = current.as_str(), to = next.as_str(), "order status changed");
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkout_validation() {
        let ok = Checkout {
            shipping_address: "  شارع المتنبي، بغداد ".into(),
            phone: "+964 770 123 4567".into(),
            payment_method: PaymentMethod::CashOnDelivery,
            notes: Some("   ".into()),
        }
        .validated()
        .unwrap();
        assert_eq!(ok.shipping_address, "شارع المتنبي، بغداد");
        assert!(ok.notes.is_none());

        let bad_phone = Checkout {
            shipping_address: "x".into(),
            phone: "call me".into(),
            payment_method: PaymentMethod::CashOnDelivery,
            notes: None,
        };
        assert!(bad_phone.validated().is_err());

        let no_address = Checkout {
            shipping_address: " ".into(),
            phone: "07701234567".into(),
            payment_method: PaymentMethod::CashOnDelivery,
            notes: None,
        };
        assert!(no_address.validated().is_err());
    }

    #[test]
    fn references_are_prefixed_and_unique() {
        let a = new_reference();
        let b = new_reference();
        assert!(a.starts_with("MT-"));
        assert_eq!(a.len(), 13);
        assert_ne!(a, b);
    }
}
