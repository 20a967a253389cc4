use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;

use super::bookstores::owned_store;
use crate::api::{ApiJson, ApiPath, AppState, AuthUser};
use crate::db::{self, orders::Checkout, Pool};
use crate::error::{AppError, Result};
use crate::model::{Order, OrderDetail, OrderStatus, Role};

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: OrderStatus,
}

async fn load_order(pool: &Pool, id: i64) -> Result<Order> {
    db::orders::get(pool, id)
        .await?
        .ok_or_else(|| AppError::not_found("order not found"))
}

/// Whether `user` runs the bookstore that fulfils `order`.
async fn fulfils(pool: &Pool, user: &AuthUser, order: &Order) -> Result<bool> {
    if user.role() != Role::BookstoreOwner {
        return Ok(false);
    }
    let store = db::bookstores::get_by_owner(pool, user.id()).await?;
    Ok(matches!((store, order.bookstore_id), (Some(s), Some(id)) if s.id == id))
}

/// POST /api/orders: checks out the cart as one order per bookstore.
pub async fn checkout(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(req): ApiJson<Checkout>,
) -> Result<(StatusCode, Json<Vec<Order>>)> {
    let checkout = req.validated()?;
    let pricing = state.config.pricing();
    let cart = db::carts::load(&state.pool, user.id(), &pricing).await?;
    let orders = db::orders::place_orders(&state.pool, user.id(), &cart.items, &checkout, &pricing).await?;
    Ok((StatusCode::CREATED, Json(orders)))
}

/// GET /api/orders: The caller's own orders.
pub async fn list_mine(State(pool): State<Pool>, user: AuthUser) -> Result<Json<Vec<Order>>> {
    Ok(Json(db::orders::list_for_user(&pool, user.id()).await?))
}

/// GET /api/orders/{id}: Order tracking for the customer, the store, or an admin.
pub async fn get_order(
    State(pool): State<Pool>,
    user: AuthUser,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<OrderDetail>> {
    let detail = db::orders::get_detail(&pool, id)
        .await?
        .ok_or_else(|| AppError::not_found("order not found"))?;
    let order = &detail.order;
    if order.user_id != user.id() && !user.is_admin() && !fulfils(&pool, &user, order).await? {
        return Err(AppError::forbidden("not your order"));
    }
    Ok(Json(detail))
}

/// POST /api/orders/{id}/cancel: Customers may cancel until the store confirms.
pub async fn cancel(
    State(pool): State<Pool>,
    user: AuthUser,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<Order>> {
    let order = load_order(&pool, id).await?;
    if order.user_id != user.id() {
        return Err(AppError::forbidden("not your order"));
    }
    Ok(Json(db::orders::cancel_pending(&pool, id, user.id()).await?))
}

/// PUT /api/orders/{id}/status: The fulfilling store or an admin. Orders
/// without a bookstore (library books) are handled by admins.
pub async fn update_status(
    State(pool): State<Pool>,
    user: AuthUser,
    ApiPath(id): ApiPath<i64>,
    ApiJson(req): ApiJson<StatusRequest>,
) -> Result<Json<Order>> {
    user.require(&[Role::BookstoreOwner, Role::Admin])?;
    let order = load_order(&pool, id).await?;
    if !user.is_admin() {
        let store = owned_store(&pool, &user).await?;
        if order.bookstore_id != Some(store.id) {
            return Err(AppError::forbidden("this order belongs to another bookstore"));
        }
    }
    Ok(Json(
        db::orders::update_status(&pool, id, req.status, user.id()).await?,
    ))
}
