//! `Cache-Control` for every response.
//!
//! Fingerprinted build assets are cached forever. The SPA shell and API reads
//! must be revalidated so the client always goes to the network first, and
//! mutations are never stored.
use axum::{
    extract::Request,
    http::{header, HeaderValue, Method},
    middleware::Next,
    response::Response,
};

pub const IMMUTABLE: &str = "public, max-age=31536000, immutable";
pub const NO_CACHE: &str = "no-cache";
pub const NO_STORE: &str = "no-store";

pub fn cache_policy_for(method: &Method, path: &str) -> &'static str {
    if path == "/api" || path.starts_with("/api/") {
        return if method == Method::GET || method == Method::HEAD {
            NO_CACHE
        } else {
            NO_STORE
        };
    }
    let last = path.rsplit('/').next().unwrap_or_default();
    if last.contains('.') && last != "index.html" {
        IMMUTABLE
    } else {
        NO_CACHE
    }
}

pub async fn cache_policy(req: Request, next: Next) -> Response {
    let policy = cache_policy_for(req.method(), req.uri().path());
    let mut resp = next.run(req).await;
    resp.headers_mut()
        .entry(header::CACHE_CONTROL)
        .or_insert(HeaderValue::from_static(policy));
    resp
}
