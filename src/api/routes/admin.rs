//! Admin-only endpoints. Every handler starts with `require(&[Role::Admin])`.
use axum::{extract::State, Json};
use serde::Deserialize;
use tracing::info;

use super::paging;
use crate::api::{ApiJson, ApiPath, ApiQuery, AppState, AuthUser};
use crate::db::{self, Pool};
use crate::error::{AppError, Result};
use crate::model::{Bookstore, BookstoreStatus, Order, OrderStatus, Page, Role, User};

#[derive(Debug, Deserialize)]
pub struct UserFilter {
    pub role: Option<Role>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct RoleRequest {
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct StoreFilter {
    pub status: Option<BookstoreStatus>,
}

#[derive(Debug, Deserialize)]
pub struct StoreStatusRequest {
    pub status: BookstoreStatus,
}

#[derive(Debug, Deserialize)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// GET /api/admin/users
pub async fn users(
    State(state): State<AppState>,
    user: AuthUser,
    ApiQuery(filter): ApiQuery<UserFilter>,
) -> Result<Json<Page<User>>> {
    user.require(&[Role::Admin])?;
    let (page, per_page, offset) = paging(filter.page, filter.per_page, &state.config.catalog);
    let (items, total) = db::users::list(&state.pool, filter.role, per_page, offset).await?;
    Ok(Json(Page {
        items,
        total,
        page,
        per_page,
    }))
}

/// PUT /api/admin/users/{id}/role
pub async fn set_role(
    State(pool): State<Pool>,
    user: AuthUser,
    ApiPath(id): ApiPath<i64>,
    ApiJson(req): ApiJson<RoleRequest>,
) -> Result<Json<User>> {
    user.require(&[Role::Admin])?;
    if id == user.id() {
        return Err(AppError::validation("admins cannot change their own role"));
    }
    let updated = db::users::set_role(&pool, id, req.role).await?;
    info!(user_id = id, role = req.role.as_str(), by = user.id(), "role changed");
    Ok(Json(updated))
}

/// GET /api/admin/bookstores: Every storefront, optionally by status.
pub async fn bookstores(
    State(pool): State<Pool>,
    user: AuthUser,
    ApiQuery(filter): ApiQuery<StoreFilter>,
) -> Result<Json<Vec<Bookstore>>> {
    user.require(&[Role::Admin])?;
    Ok(Json(db::bookstores::list(&pool, filter.status).await?))
}

/// PUT /api/admin/bookstores/{id}/status: Approve, reject or suspend.
pub async fn set_bookstore_status(
    State(pool): State<Pool>,
    user: AuthUser,
    ApiPath(id): ApiPath<i64>,
    ApiJson(req): ApiJson<StoreStatusRequest>,
) -> Result<Json<Bookstore>> {
    user.require(&[Role::Admin])?;
    let store = db::bookstores::set_status(&pool, id, req.status).await?;
    info!(bookstore_id = id, status = req.status.as_str(), "bookstore status changed");
    Ok(Json(store))
}

/// GET /api/admin/orders
pub async fn orders(
    State(state): State<AppState>,
    user: AuthUser,
    ApiQuery(filter): ApiQuery<OrderFilter>,
) -> Result<Json<Page<Order>>> {
    user.require(&[Role::Admin])?;
    let (page, per_page, offset) = paging(filter.page, filter.per_page, &state.config.catalog);
    let (items, total) = db::orders::list_all(&state.pool, filter.status, per_page, offset).await?;
    Ok(Json(Page {
        items,
        total,
        page,
        per_page,
    }))
}
