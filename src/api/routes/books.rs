use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use serde::Deserialize;
use tracing::info;

use super::bookstores::owned_store;
use super::paging;
use crate::api::{ApiJson, ApiPath, ApiQuery, AppState, AuthUser};
use crate::db::{self, books::BookInput, books::BookQuery, Pool};
use crate::error::{AppError, Result};
use crate::model::{Book, BookSource, BookstoreStatus, Page, Role};
use crate::recommend::{self, Bucket};

#[derive(Debug, Deserialize)]
pub struct CreateBookRequest {
    #[serde(flatten)]
    pub book: BookInput,
    #[serde(default)]
    pub source: Option<BookSource>,
    /// Admins adding a store book name the store explicitly.
    #[serde(default)]
    pub bookstore_id: Option<i64>,
}

/// GET /api/books
pub async fn list(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<BookQuery>,
) -> Result<Json<Page<Book>>> {
    let window = paging(query.page, query.per_page, &state.config.catalog);
    Ok(Json(db::books::list(&state.pool, &query, window).await?))
}

/// GET /api/books/{id}
pub async fn get_book(State(pool): State<Pool>, ApiPath(id): ApiPath<i64>) -> Result<Json<Book>> {
    db::books::get(&pool, id, true)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found("book not found"))
}

/// GET /api/books/recommendations: Stable for the current hour.
pub async fn recommendations(State(state): State<AppState>) -> Result<Json<Vec<Bucket>>> {
    let books = db::books::available_public(&state.pool).await?;
    let seed = recommend::seed_for(Utc::now());
    Ok(Json(recommend::recommend(
        books,
        seed,
        state.config.catalog.recommendation_limit,
    )))
}

/// GET /api/categories
pub async fn categories(State(pool): State<Pool>) -> Result<Json<Vec<String>>> {
    Ok(Json(db::books::categories(&pool).await?))
}

/// POST /api/books
pub async fn create(
    State(pool): State<Pool>,
    user: AuthUser,
    ApiJson(req): ApiJson<CreateBookRequest>,
) -> Result<(StatusCode, Json<Book>)> {
    user.require(&[Role::BookstoreOwner, Role::Admin])?;
    let input = req.book.validated()?;
    let source = req.source.unwrap_or(BookSource::Store);

    let bookstore_id = match (source, user.is_admin()) {
        (BookSource::Library, true) => None,
        (BookSource::Library, false) => {
            return Err(AppError::forbidden("only admins can add library books"));
        }
        (BookSource::Store, true) => {
            let id = req
                .bookstore_id
                .ok_or_else(|| AppError::validation("bookstore_id is required"))?;
            db::bookstores::get(&pool, id)
                .await?
                .ok_or_else(|| AppError::not_found("bookstore not found"))?;
            Some(id)
        }
        (BookSource::Store, false) => {
            let store = owned_store(&pool, &user).await?;
            if store.status != BookstoreStatus::Approved {
                return Err(AppError::forbidden("bookstore is not approved yet"));
            }
            Some(store.id)
        }
    };

    let book = db::books::create(&pool, bookstore_id, source, &input).await?;
    info!(book_id = book.id, source = source.as_str(), "book created");
    Ok((StatusCode::CREATED, Json(book)))
}

/// Admins manage everything; owners manage the books of their own store.
async fn managed_book(pool: &Pool, user: &AuthUser, id: i64) -> Result<Book> {
    let book = db::books::get(pool, id, false)
        .await?
        .ok_or_else(|| AppError::not_found("book not found"))?;
    if user.is_admin() {
        return Ok(book);
    }
    user.require(&[Role::BookstoreOwner])?;
    let store = owned_store(pool, user).await?;
    if book.source == BookSource::Store && book.bookstore_id == Some(store.id) {
        Ok(book)
    } else {
        Err(AppError::forbidden("this book belongs to another bookstore"))
    }
}

/// PUT /api/books/{id}
pub async fn update(
    State(pool): State<Pool>,
    user: AuthUser,
    ApiPath(id): ApiPath<i64>,
    ApiJson(input): ApiJson<BookInput>,
) -> Result<Json<Book>> {
    managed_book(&pool, &user, id).await?;
    let input = input.validated()?;
    Ok(Json(db::books::update(&pool, id, &input).await?))
}

/// DELETE /api/books/{id}
pub async fn delete_book(
    State(pool): State<Pool>,
    user: AuthUser,
    ApiPath(id): ApiPath<i64>,
) -> Result<StatusCode> {
    managed_book(&pool, &user, id).await?;
    db::books::delete(&pool, id).await?;
    info!(book_id = id, "book deleted");
    Ok(StatusCode::NO_CONTENT)
}
