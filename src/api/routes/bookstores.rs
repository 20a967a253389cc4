use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;
use tracing::info;

use crate::api::{ApiJson, ApiPath, ApiQuery, AuthUser};
use crate::auth::validate_name;
use crate::db::{self, bookstores::BookstoreFields, Pool};
use crate::error::{AppError, Result};
use crate::model::{Bookstore, BookstoreStatus, Order, OrderStatus, Role};

#[derive(Debug, Deserialize)]
pub struct BookstoreRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub city: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub logo_url: Option<String>,
}

impl BookstoreRequest {
    fn into_fields(self) -> Result<BookstoreFields> {
        let trim = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
        Ok(BookstoreFields {
            name: self.name.map(|n| validate_name("name", &n)).transpose()?,
            description: trim(self.description),
            city: trim(self.city),
            address: trim(self.address),
            phone: trim(self.phone),
            logo_url: trim(self.logo_url),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
}

/// The caller's own storefront; owners only.
pub(crate) async fn owned_store(pool: &Pool, user: &AuthUser) -> Result<Bookstore> {
    user.require(&[Role::BookstoreOwner])?;
    db::bookstores::get_by_owner(pool, user.id())
        .await?
        .ok_or_else(|| AppError::not_found("you have not registered a bookstore"))
}

/// GET /api/bookstores: Approved storefronts only.
pub async fn list(State(pool): State<Pool>) -> Result<Json<Vec<Bookstore>>> {
    Ok(Json(
        db::bookstores::list(&pool, Some(BookstoreStatus::Approved)).await?,
    ))
}

/// GET /api/bookstores/{id}
pub async fn get_bookstore(
    State(pool): State<Pool>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<Bookstore>> {
    db::bookstores::get(&pool, id)
        .await?
        .filter(|s| s.status == BookstoreStatus::Approved)
        .map(Json)
        .ok_or_else(|| AppError::not_found("bookstore not found"))
}

/// POST /api/bookstores: The store starts out pending admin approval.
pub async fn apply(
    State(pool): State<Pool>,
    user: AuthUser,
    ApiJson(req): ApiJson<BookstoreRequest>,
) -> Result<(StatusCode, Json<Bookstore>)> {
    user.require(&[Role::BookstoreOwner])?;
    let fields = req.into_fields()?;
    let name = fields
        .name
        .clone()
        .ok_or_else(|| AppError::validation("name is required"))?;
    let store = db::bookstores::apply(&pool, user.id(), &name, &fields).await?;
    info!(bookstore_id = store.id, owner_id = user.id(), "bookstore application received");
    Ok((StatusCode::CREATED, Json(store)))
}

/// GET /api/bookstores/mine
pub async fn mine(State(pool): State<Pool>, user: AuthUser) -> Result<Json<Bookstore>> {
    Ok(Json(owned_store(&pool, &user).await?))
}

/// PUT /api/bookstores/mine
pub async fn update_mine(
    State(pool): State<Pool>,
    user: AuthUser,
    ApiJson(req): ApiJson<BookstoreRequest>,
) -> Result<Json<Bookstore>> {
    let store = owned_store(&pool, &user).await?;
    let fields = req.into_fields()?;
    Ok(Json(db::bookstores::update(&pool, store.id, &fields).await?))
}

/// GET /api/bookstores/mine/orders
pub async fn my_orders(
    State(pool): State<Pool>,
    user: AuthUser,
    ApiQuery(filter): ApiQuery<OrderFilter>,
) -> Result<Json<Vec<Order>>> {
    let store = owned_store(&pool, &user).await?;
    Ok(Json(
        db::orders::list_for_bookstore(&pool, store.id, filter.status).await?,
    ))
}
