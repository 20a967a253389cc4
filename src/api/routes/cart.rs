use axum::{extract::State, Json};
use serde::Deserialize;

use crate::api::{ApiJson, ApiPath, AppState, AuthUser};
use crate::cart::{Cart, CartAction, CartLine};
use crate::db;
use crate::error::{AppError, Result};
use crate::model::Availability;

#[derive(Debug, Deserialize)]
pub struct AddItemRequest {
    pub book_id: i64,
    #[serde(default = "one")]
    pub quantity: u32,
}

fn one() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
pub struct SetQuantityRequest {
    pub quantity: u32,
}

/// Load, reduce, persist.
async fn mutate(state: &AppState, user_id: i64, action: CartAction) -> Result<Cart> {
    let pricing = state.config.pricing();
    let mut cart = db::carts::load(&state.pool, user_id, &pricing).await?;
    cart.apply(action, &pricing)?;
    db::carts::save(&state.pool, user_id, &cart).await?;
    Ok(cart)
}

/// GET /api/cart
pub async fn get_cart(State(state): State<AppState>, user: AuthUser) -> Result<Json<Cart>> {
    let pricing = state.config.pricing();
    Ok(Json(db::carts::load(&state.pool, user.id(), &pricing).await?))
}

/// POST /api/cart/items
pub async fn add_item(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(req): ApiJson<AddItemRequest>,
) -> Result<Json<Cart>> {
    if req.quantity == 0 {
        return Err(AppError::validation("quantity must be at least 1"));
    }
    let book = db::books::get(&state.pool, req.book_id, true)
        .await?
        .ok_or_else(|| AppError::not_found("book not found"))?;
    if book.availability != Availability::Available {
        return Err(AppError::validation(format!("\"{}\" is not available", book.title)));
    }
    let line = CartLine {
        book_id: book.id,
        title: book.title,
        unit_price: book.price,
        quantity: req.quantity,
        bookstore_id: book.bookstore_id,
    };
    Ok(Json(mutate(&state, user.id(), CartAction::Add(line)).await?))
}

/// PUT /api/cart/items/{book_id}: A quantity of 0 removes the line.
pub async fn set_quantity(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(book_id): ApiPath<i64>,
    ApiJson(req): ApiJson<SetQuantityRequest>,
) -> Result<Json<Cart>> {
    let pricing = state.config.pricing();
    let cart = db::carts::load(&state.pool, user.id(), &pricing).await?;
    if !cart.contains(book_id) {
        return Err(AppError::not_found("book is not in the cart"));
    }
    let action = CartAction::SetQuantity {
        book_id,
        quantity: req.quantity,
    };
    Ok(Json(mutate(&state, user.id(), action).await?))
}

/// DELETE /api/cart/items/{book_id}
pub async fn remove_item(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(book_id): ApiPath<i64>,
) -> Result<Json<Cart>> {
    Ok(Json(
        mutate(&state, user.id(), CartAction::Remove { book_id }).await?,
    ))
}

/// DELETE /api/cart
pub async fn clear(State(state): State<AppState>, user: AuthUser) -> Result<Json<Cart>> {
    Ok(Json(mutate(&state, user.id(), CartAction::Clear).await?))
}
