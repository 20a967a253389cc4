pub mod admin;
pub mod analytics;
pub mod auth;
pub mod books;
pub mod bookstores;
pub mod cart;
pub mod health;
pub mod orders;
pub mod reviews;
pub mod wishlist;

use crate::config::Catalog;

/// Resolve 1-based `page`/`per_page` query values into `(page, per_page, offset)`.
pub(crate) fn paging(page: Option<u32>, per_page: Option<u32>, catalog: &Catalog) -> (u32, u32, u32) {
    let page = page.unwrap_or(1).max(1);
    let per_page = per_page
        .unwrap_or(catalog.page_size)
        .clamp(1, catalog.max_page_size.max(1));
    (page, per_page, (page - 1).saturating_mul(per_page))
}
