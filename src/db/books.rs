use serde::Deserialize;
use sqlx::{QueryBuilder, Sqlite};
use tracing::instrument;

use super::Pool;
use crate::auth::validate_name;
use crate::error::{AppError, Result};
use crate::model::{Availability, Book, BookSource, Page};

const BOOK_SELECT: &str = "SELECT b.id, b.bookstore_id, s.name AS bookstore_name, b.title, b.author, \
     b.description, b.category, b.price, b.cover_url, b.isbn, b.publisher, b.published_year, \
     b.availability, b.source, \
     (SELECT AVG(r.rating) FROM reviews r WHERE r.book_id = b.id) AS average_rating, \
     (SELECT COUNT(*) FROM reviews r WHERE r.book_id = b.id) AS review_count, \
     b.created_at, b.updated_at \
     FROM books b LEFT JOIN bookstores s ON s.id = b.bookstore_id";

/// Store books are public only while their bookstore is approved; library
/// books are always public.
const PUBLIC_FILTER: &str = "(b.source = 'library' OR s.status = 'approved')";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookSort {
    #[default]
    Newest,
    PriceAsc,
    PriceDesc,
    Title,
    Rating,
}

impl BookSort {
    fn order_by(&self) -> &'static str {
        match self {
            BookSort::Newest => "b.created_at DESC, b.id DESC",
            BookSort::PriceAsc => "b.price ASC, b.id ASC",
            BookSort::PriceDesc => "b.price DESC, b.id ASC",
            BookSort::Title => "b.title ASC, b.id ASC",
            BookSort::Rating => "average_rating IS NULL, average_rating DESC, review_count DESC, b.id ASC",
        }
    }
}

/// Catalog filters, bound directly from the query string.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BookQuery {
    pub q: Option<String>,
    pub category: Option<String>,
    pub bookstore_id: Option<i64>,
    pub availability: Option<Availability>,
    pub source: Option<BookSource>,
    pub min_price: Option<i64>,
    pub max_price: Option<i64>,
    #[serde(default)]
    pub sort: BookSort,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    /// Owners and admins see books of stores that are not approved.
    #[serde(skip)]
    pub include_hidden: bool,
}

/// Highest accepted unit price, in whole IQD.
pub const MAX_PRICE: i64 = 100_000_000;

/// Editable catalog fields shared by create and update.
#[derive(Debug, Clone, Deserialize)]
pub struct BookInput {
    pub title: String,
    pub author: String,
    #[serde(default)]
    pub description: Option<String>,
    pub category: String,
    pub price: i64,
    #[serde(default)]
    pub cover_url: Option<String>,
    #[serde(default)]
    pub isbn: Option<String>,
    #[serde(default)]
    pub publisher: Option<String>,
    #[serde(default)]
    pub published_year: Option<i64>,
    #[serde(default = "default_availability")]
    pub availability: Availability,
}

fn default_availability() -> Availability {
    Availability::Available
}

impl BookInput {
    /// Trim text fields and check ranges.
    pub fn validated(mut self) -> Result<Self> {
        self.title = validate_name("title", &self.title)?;
        self.author = validate_name("author", &self.author)?;
        self.category = validate_name("category", &self.category)?;
        if !(0..=MAX_PRICE).contains(&self.price) {
            return Err(AppError::validation(format!(
                "price must be between 0 and {MAX_PRICE}"
            )));
        }
        if let Some(year) = self.published_year {
            if !(1000..=2100).contains(&year) {
                return Err(AppError::validation("published_year out of range"));
            }
        }
        self.description = self.description.map(|d| d.trim().to_string()).filter(|d| !d.is_empty());
        Ok(self)
    }
}

/// `%text%` with LIKE wildcards in `text` escaped by a backslash.
fn like_pattern(text: &str) -> String {
    let mut pattern = String::with_capacity(text.len() + 2);
    pattern.push('%');
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

fn push_filters<'a>(qb: &mut QueryBuilder<'a, Sqlite>, query: &'a BookQuery) {
    qb.push(" WHERE 1 = 1");
    if !query.include_hidden {
        qb.push(" AND ").push(PUBLIC_FILTER);
    }
    if let Some(text) = query.q.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        let pattern = like_pattern(text);
        qb.push(" AND (b.title LIKE ")
            .push_bind(pattern.clone())
            .push(" ESCAPE '\\' OR b.author LIKE ")
            .push_bind(pattern.clone())
            .push(" ESCAPE '\\' OR b.description LIKE ")
            .push_bind(pattern)
            .push(" ESCAPE '\\')");
    }
    if let Some(category) = query.category.as_deref().filter(|c| !c.is_empty()) {
        qb.push(" AND b.category = ").push_bind(category);
    }
    if let Some(store) = query.bookstore_id {
        qb.push(" AND b.bookstore_id = ").push_bind(store);
    }
    if let Some(availability) = query.availability {
        qb.push(" AND b.availability = ").push_bind(availability);
    }
    if let Some(source) = query.source {
        qb.push(" AND b.source = ").push_bind(source);
    }
    if let Some(min) = query.min_price {
        qb.push(" AND b.price >= ").push_bind(min);
    }
    if let Some(max) = query.max_price {
        qb.push(" AND b.price <= ").push_bind(max);
    }
}

/// Filtered, sorted catalog listing for an already resolved
/// `(page, per_page, offset)` window.
#[instrument(skip_all)]
pub async fn list(
    pool: &Pool,
    query: &BookQuery,
    (page, per_page, offset): (u32, u32, u32),
) -> Result<Page<Book>> {
    let mut count_qb = QueryBuilder::<Sqlite>::new(
        "SELECT COUNT(*) FROM books b LEFT JOIN bookstores s ON s.id = b.bookstore_id",
    );
    push_filters(&mut count_qb, query);
    let total: i64 = count_qb.build_query_scalar().fetch_one(pool).await?;

    let mut qb = QueryBuilder::<Sqlite>::new(BOOK_SELECT);
    push_filters(&mut qb, query);
    qb.push(" ORDER BY ").push(query.sort.order_by());
    qb.push(" LIMIT ")
        .push_bind(per_page)
        .push(" OFFSET ")
        .push_bind(offset);
    let items = qb.build_query_as::<Book>().fetch_all(pool).await?;

    Ok(Page {
        items,
        total,
        page,
        per_page,
    })
}

/// A single book; `public_only` hides books of unapproved stores.
#[instrument(skip_all)]
pub async fn get(pool: &Pool, id: i64, public_only: bool) -> Result<Option<Book>> {
    let sql = if public_only {
        format!("{BOOK_SELECT} WHERE b.id = ? AND {PUBLIC_FILTER}")
    } else {
        format!("{BOOK_SELECT} WHERE b.id = ?")
    };
    Ok(sqlx::query_as::<_, Book>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?)
}

/// Every public book that can currently be ordered.
#[instrument(skip_all)]
pub async fn available_public(pool: &Pool) -> Result<Vec<Book>> {
    let sql = format!(
        "{BOOK_SELECT} WHERE {PUBLIC_FILTER} AND b.availability = 'available' ORDER BY b.id"
    );
    Ok(sqlx::query_as::<_, Book>(&sql).fetch_all(pool).await?)
}

#[instrument(skip_all)]
pub async fn create(
    pool: &Pool,
    bookstore_id: Option<i64>,
    source: BookSource,
    input: &BookInput,
) -> Result<Book> {
    if source == BookSource::Store && bookstore_id.is_none() {
        return Err(AppError::validation("store books need a bookstore"));
    }
    let id: i64 = sqlx::query_scalar(
        "INSERT INTO books (bookstore_id, title, author, description, category, price, cover_url, \
         isbn, publisher, published_year, availability, source) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING id",
    )
    .bind(bookstore_id)
    .bind(&input.title)
    .bind(&input.author)
    .bind(input.description.as_deref())
    .bind(&input.category)
    .bind(input.price)
    .bind(input.cover_url.as_deref())
    .bind(input.isbn.as_deref())
    .bind(input.publisher.as_deref())
    .bind(input.published_year)
    .bind(input.availability)
    .bind(source)
    .fetch_one(pool)
    .await?;
    get(pool, id, false)
        .await?
        .ok_or_else(|| AppError::internal("inserted book vanished"))
}

#[instrument(skip_all)]
pub async fn update(pool: &Pool, id: i64, input: &BookInput) -> Result<Book> {
    let res = sqlx::query(
        "UPDATE books SET title = ?, author = ?, description = ?, category = ?, price = ?, \
         cover_url = ?, isbn = ?, publisher = ?, published_year = ?, availability = ?, \
         updated_at = CURRENT_TIMESTAMP WHERE id = ?",
    )
    .bind(&input.title)
    .bind(&input.author)
    .bind(input.description.as_deref())
    .bind(&input.category)
    .bind(input.price)
    .bind(input.cover_url.as_deref())
    .bind(input.isbn.as_deref())
    .bind(input.publisher.as_deref())
    .bind(input.published_year)
    .bind(input.availability)
    .bind(id)
    .execute(pool)
    .await?;
    if res.rows_affected() == 0 {
        return Err(AppError::not_found("book not found"));
    }
    get(pool, id, false)
        .await?
        .ok_or_else(|| AppError::not_found("book not found"))
}

#[instrument(skip_all)]
pub async fn delete(pool: &Pool, id: i64) -> Result<()> {
    let res = sqlx::query("DELETE FROM books WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    if res.rows_affected() == 0 {
        return Err(AppError::not_found("book not found"));
    }
    Ok(())
}

/// Distinct categories across the public catalog, alphabetically.
#[instrument(skip_all)]
pub async fn categories(pool: &Pool) -> Result<Vec<String>> {
    let sql = format!(
        "SELECT DISTINCT b.category FROM books b LEFT JOIN bookstores s ON s.id = b.bookstore_id \
         WHERE {PUBLIC_FILTER} ORDER BY b.category"
    );
    Ok(sqlx::query_scalar(&sql).fetch_all(pool).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::bookstores::{self, BookstoreFields};
    use crate::db::users::{self, NewUser};
    use crate::model::{BookstoreStatus, Role};

    async fn setup_pool() -> Pool {
        let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        pool
    }

    async fn store(pool: &Pool, email: &str, name: &str, status: BookstoreStatus) -> i64 {
        let uid = users::create(
            pool,
            NewUser {
                name: "owner",
                email,
                password_hash: "x",
                role: Role::BookstoreOwner,
            },
        )
        .await
        .unwrap()
        .id;
        let s = bookstores::apply(pool, uid, name, &BookstoreFields::default())
            .await
            .unwrap();
        bookstores::set_status(pool, s.id, status).await.unwrap();
        s.id
    }

    fn input(title: &str, category: &str, price: i64) -> BookInput {
        BookInput {
            title: title.into(),
            author: "مؤلف".into(),
            description: None,
            category: category.into(),
            price,
            cover_url: None,
            isbn: None,
            publisher: None,
            published_year: None,
            availability: Availability::Available,
        }
    }

    #[tokio::test]
    async fn public_listing_merges_library_and_hides_unapproved() {
        let pool = setup_pool().await;
        let approved = store(&pool, "a@x.com", "مكتبة أ", BookstoreStatus::Approved).await;
        let pending = store(&pool, "b@x.com", "مكتبة ب", BookstoreStatus::Pending).await;

        create(&pool, Some(approved), BookSource::Store, &input("كتاب أ", "رواية", 100)).await.unwrap();
        create(&pool, Some(pending), BookSource::Store, &input("كتاب ب", "رواية", 200)).await.unwrap();
        create(&pool, None, BookSource::Library, &input("كتاب مكتبة", "تاريخ", 300)).await.unwrap();

        let page = list(&pool, &BookQuery::default(), (1, 20, 0)).await.unwrap();
        assert_eq!(page.total, 2);
        let titles: Vec<&str> = page.items.iter().map(|b| b.title.as_str()).collect();
        assert!(titles.contains(&"كتاب أ"));
        assert!(titles.contains(&"كتاب مكتبة"));

        let library_only = BookQuery {
            source: Some(BookSource::Library),
            ..Default::default()
        };
        let page = list(&pool, &library_only, (1, 20, 0)).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].source, BookSource::Library);
        assert!(page.items[0].bookstore_id.is_none());

        let everything = BookQuery {
            include_hidden: true,
            ..Default::default()
        };
        assert_eq!(list(&pool, &everything, (1, 20, 0)).await.unwrap().total, 3);
    }

    #[tokio::test]
    async fn filters_sort_and_paginate() {
        let pool = setup_pool().await;
        let sid = store(&pool, "a@x.com", "مكتبة", BookstoreStatus::Approved).await;
        for (i, price) in [500, 100, 300, 200, 400].into_iter().enumerate() {
            create(&pool, Some(sid), BookSource::Store, &input(&format!("كتاب {i}"), "شعر", price))
                .await
                .unwrap();
        }

        let q = BookQuery {
            sort: BookSort::PriceAsc,
            ..Default::default()
        };
        let page = list(&pool, &q, (2, 2, 2)).await.unwrap();
        assert_eq!(page.total, 5);
        let prices: Vec<i64> = page.items.iter().map(|b| b.price).collect();
        assert_eq!(prices, vec![300, 400]);

        let q = BookQuery {
            min_price: Some(200),
            max_price: Some(400),
            ..Default::default()
        };
        assert_eq!(list(&pool, &q, (1, 20, 0)).await.unwrap().total, 3);

        let q = BookQuery {
            q: Some("كتاب 3".into()),
            ..Default::default()
        };
        let page = list(&pool, &q, (1, 20, 0)).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].price, 200);
    }

    #[tokio::test]
    async fn store_book_requires_store() {
        let pool = setup_pool().await;
        let err = create(&pool, None, BookSource::Store, &input("x", "y", 1))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn update_and_categories() {
        let pool = setup_pool().await;
        let sid = store(&pool, "a@x.com", "مكتبة", BookstoreStatus::Approved).await;
        let book = create(&pool, Some(sid), BookSource::Store, &input("قديم", "شعر", 100)).await.unwrap();
        create(&pool, None, BookSource::Library, &input("آخر", "تاريخ", 100)).await.unwrap();

        let mut changed = input("جديد", "فلسفة", 150);
        changed.availability = Availability::ComingSoon;
        let updated = update(&pool, book.id, &changed).await.unwrap();
        assert_eq!(updated.title, "جديد");
        assert_eq!(updated.availability, Availability::ComingSoon);

        let cats = categories(&pool).await.unwrap();
        assert_eq!(cats, vec!["تاريخ".to_string(), "فلسفة".to_string()]);

        assert!(available_public(&pool).await.unwrap().iter().all(|b| b.id != book.id));
        delete(&pool, book.id).await.unwrap();
        assert!(matches!(delete(&pool, book.id).await, Err(AppError::NotFound(_))));
    }

    #[test]
    fn like_wildcards_are_escaped() {
        assert_eq!(like_pattern("شعر"), "%شعر%");
        assert_eq!(like_pattern("100%_a\\b"), "%100\\%\\_a\\\\b%");
    }

    #[tokio::test]
    async fn search_treats_wildcards_literally() {
        let pool = setup_pool().await;
        let sid = store(&pool, "a@x.com", "مكتبة", BookstoreStatus::Approved).await;
        for title in ["خصم 100% على الشعر", "خصم 100 على الشعر", "ألف_ليلة", "ألف ليلة"] {
            create(&pool, Some(sid), BookSource::Store, &input(title, "أدب", 100))
                .await
                .unwrap();
        }

        for (q, expected) in [("100%", "خصم 100% على الشعر"), ("ألف_", "ألف_ليلة")] {
            let query = BookQuery {
                q: Some(q.into()),
                ..Default::default()
            };
            let page = list(&pool, &query, (1, 20, 0)).await.unwrap();
            assert_eq!(page.total, 1, "query {q}");
            assert_eq!(page.items[0].title, expected);
        }
    }

    #[test]
    fn input_validation() {
        assert!(input("  ", "x", 1).validated().is_err());
        assert!(input("t", "x", -1).validated().is_err());
        assert!(input("t", "x", MAX_PRICE + 1).validated().is_err());
        assert!(input("t", "x", i64::MAX).validated().is_err());
        assert!(input("t", "x", MAX_PRICE).validated().is_ok());
        let mut bad_year = input("t", "x", 1);
        bad_year.published_year = Some(3000);
        assert!(bad_year.validated().is_err());
        let ok = input("  عنوان ", "x", 0).validated().unwrap();
        assert_eq!(ok.title, "عنوان");
    }
}
