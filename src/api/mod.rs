//! HTTP surface: JSON routes under `/api`, plus the built SPA when configured.
mod cache;
mod error;
mod extract;
mod routes;

use axum::{
    extract::FromRef,
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use std::path::Path;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::Config;
use crate::db::Pool;

pub use cache::cache_policy_for;
pub use extract::{ApiJson, ApiPath, ApiQuery, AuthUser};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub pool: Pool,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(pool: Pool, config: Config) -> Self {
        Self {
            pool,
            config: Arc::new(config),
        }
    }
}

impl FromRef<AppState> for Pool {
    fn from_ref(state: &AppState) -> Self {
        state.pool.clone()
    }
}

impl FromRef<AppState> for Arc<Config> {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(routes::health::health))
        // Auth
        .route("/auth/register", post(routes::auth::register))
        .route("/auth/login", post(routes::auth::login))
        .route("/auth/me", get(routes::auth::me).put(routes::auth::update_me))
        .route("/auth/password", put(routes::auth::change_password))
        // Catalog
        .route("/books", get(routes::books::list).post(routes::books::create))
        .route("/books/recommendations", get(routes::books::recommendations))
        .route(
            "/books/{id}",
            get(routes::books::get_book)
                .put(routes::books::update)
                .delete(routes::books::delete_book),
        )
        .route(
            "/books/{id}/reviews",
            get(routes::reviews::list).post(routes::reviews::create),
        )
        .route("/reviews/{id}", delete(routes::reviews::delete_review))
        .route("/categories", get(routes::books::categories))
        // Bookstores
        .route(
            "/bookstores",
            get(routes::bookstores::list).post(routes::bookstores::apply),
        )
        .route(
            "/bookstores/mine",
            get(routes::bookstores::mine).put(routes::bookstores::update_mine),
        )
        .route("/bookstores/mine/orders", get(routes::bookstores::my_orders))
        .route("/bookstores/mine/analytics", get(routes::analytics::bookstore))
        .route("/bookstores/{id}", get(routes::bookstores::get_bookstore))
        // Cart
        .route(
            "/cart",
            get(routes::cart::get_cart).delete(routes::cart::clear),
        )
        .route("/cart/items", post(routes::cart::add_item))
        .route(
            "/cart/items/{book_id}",
            put(routes::cart::set_quantity).delete(routes::cart::remove_item),
        )
        // Orders
        .route(
            "/orders",
            get(routes::orders::list_mine).post(routes::orders::checkout),
        )
        .route("/orders/{id}", get(routes::orders::get_order))
        .route("/orders/{id}/cancel", post(routes::orders::cancel))
        .route("/orders/{id}/status", put(routes::orders::update_status))
        // Wishlist
        .route("/wishlist", get(routes::wishlist::list))
        .route(
            "/wishlist/{book_id}",
            post(routes::wishlist::add).delete(routes::wishlist::remove),
        )
        // Admin
        .route("/admin/users", get(routes::admin::users))
        .route("/admin/users/{id}/role", put(routes::admin::set_role))
        .route("/admin/bookstores", get(routes::admin::bookstores))
        .route(
            "/admin/bookstores/{id}/status",
            put(routes::admin::set_bookstore_status),
        )
        .route("/admin/orders", get(routes::admin::orders))
        .route("/admin/analytics", get(routes::analytics::platform))
}

/// Build the full application router.
pub fn router(state: AppState) -> Router {
    let mut app = Router::new().nest("/api", api_routes());

    if let Some(dir) = state.config.app.static_dir.as_deref() {
        let web_dir = Path::new(dir);
        if web_dir.exists() {
            info!("serving static files from {}", web_dir.display());
            let index_html = web_dir.join("index.html");
            app = app.fallback_service(ServeDir::new(web_dir).fallback(ServeFile::new(index_html)));
        } else {
            warn!("static_dir {} does not exist; serving API only", web_dir.display());
        }
    }

    let mut app = app
        .layer(middleware::from_fn(cache::cache_policy))
        .layer(TraceLayer::new_for_http());
    if state.config.app.cors_allow_any {
        app = app.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }
    app.with_state(state)
}
