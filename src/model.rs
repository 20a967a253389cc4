use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Customer,
    BookstoreOwner,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Customer => "customer",
            Role::BookstoreOwner => "bookstore_owner",
            Role::Admin => "admin",
        }
    }

    pub fn parse_role(s: &str) -> Option<Self> {
        match s {
            "customer" => Some(Role::Customer),
            "bookstore_owner" => Some(Role::BookstoreOwner),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    Available,
    Unavailable,
    ComingSoon,
}

impl Availability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Availability::Available => "available",
            Availability::Unavailable => "unavailable",
            Availability::ComingSoon => "coming_soon",
        }
    }
}

/// Where a catalog entry comes from. Library books are merged into the
/// public listing but are not attached to any bookstore.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BookSource {
    Store,
    Library,
}

impl BookSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookSource::Store => "store",
            BookSource::Library => "library",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BookstoreStatus {
    Pending,
    Approved,
    Rejected,
    Suspended,
}

impl BookstoreStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookstoreStatus::Pending => "pending",
            BookstoreStatus::Approved => "approved",
            BookstoreStatus::Rejected => "rejected",
            BookstoreStatus::Suspended => "suspended",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    /// Orders only move forward; cancellation is possible until shipping.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed)
                | (Pending, Cancelled)
                | (Confirmed, Shipped)
                | (Confirmed, Cancelled)
                | (Shipped, Delivered)
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    #[default]
    CashOnDelivery,
    CardOnDelivery,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::CashOnDelivery => "cash_on_delivery",
            PaymentMethod::CardOnDelivery => "card_on_delivery",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Bookstore {
    pub id: i64,
    pub owner_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub city: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub logo_url: Option<String>,
    pub status: BookstoreStatus,
    pub created_at: DateTime<Utc>,
}

/// A catalog entry together with its review aggregate.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Book {
    pub id: i64,
    pub bookstore_id: Option<i64>,
    pub bookstore_name: Option<String>,
    pub title: String,
    pub author: String,
    pub description: Option<String>,
    pub category: String,
    pub price: i64,
    pub cover_url: Option<String>,
    pub isbn: Option<String>,
    pub publisher: Option<String>,
    pub published_year: Option<i64>,
    pub availability: Availability,
    pub source: BookSource,
    pub average_rating: Option<f64>,
    pub review_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Order {
    pub id: i64,
    pub reference: String,
    pub user_id: i64,
    pub bookstore_id: Option<i64>,
    pub status: OrderStatus,
    pub payment_method: PaymentMethod,
    pub shipping_address: String,
    pub phone: String,
    pub notes: Option<String>,
    pub subtotal: i64,
    pub shipping: i64,
    pub total: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct OrderItem {
    pub id: i64,
    pub order_id: i64,
    pub book_id: Option<i64>,
    pub title: String,
    pub unit_price: i64,
    pub quantity: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct OrderStatusChange {
    pub status: OrderStatus,
    pub changed_by: Option<i64>,
    pub changed_at: DateTime<Utc>,
}

/// Full order view used by order tracking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub history: Vec<OrderStatusChange>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Review {
    pub id: i64,
    pub user_id: i64,
    pub user_name: String,
    pub book_id: i64,
    pub rating: i64,
    pub comment: Option<String>,
    pub verified_purchase: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WishlistEntry {
    pub added_at: DateTime<Utc>,
    pub book: Book,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
}
