#![allow(dead_code)]

use mutanabbi::auth;
use mutanabbi::cart::{CartLine, Pricing};
use mutanabbi::config::{self, Config};
use mutanabbi::db::{self, books::BookInput, users::NewUser, Pool};
use mutanabbi::model::{Availability, Book, BookSource, Bookstore, BookstoreStatus, Role, User};

pub const PASSWORD: &str = "kalimat-sirr-99";

pub async fn setup_pool() -> Pool {
    let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    pool
}

/// Example config with nothing pointing outside the test.
pub fn test_config() -> Config {
    let mut cfg: Config = serde_yaml::from_str(config::example()).unwrap();
    cfg.app.static_dir = None;
    cfg.app.bind_addr = "127.0.0.1:0".into();
    cfg.notify.webhook_url = None;
    config::validate(&cfg).unwrap();
    cfg
}

pub fn pricing() -> Pricing {
    test_config().pricing()
}

pub async fn user(pool: &Pool, email: &str, role: Role) -> User {
    let hash = auth::hash_password(PASSWORD).unwrap();
    db::users::create(
        pool,
        NewUser {
            name: "مستخدم",
            email,
            password_hash: &hash,
            role,
        },
    )
    .await
    .unwrap()
}

pub async fn approved_store(pool: &Pool, owner_email: &str, name: &str) -> (User, Bookstore) {
    let owner = user(pool, owner_email, Role::BookstoreOwner).await;
    let store = db::bookstores::apply(pool, owner.id, name, &Default::default())
        .await
        .unwrap();
    let store = db::bookstores::set_status(pool, store.id, BookstoreStatus::Approved)
        .await
        .unwrap();
    (owner, store)
}

pub fn book_input(title: &str, category: &str, price: i64) -> BookInput {
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

pub async fn store_book(pool: &Pool, store: &Bookstore, title: &str, price: i64) -> Book {
    db::books::create(pool, Some(store.id), BookSource::Store, &book_input(title, "روايات", price))
        .await
        .unwrap()
}

pub async fn library_book(pool: &Pool, title: &str, price: i64) -> Book {
    db::books::create(pool, None, BookSource::Library, &book_input(title, "تاريخ", price))
        .await
        .unwrap()
}

pub fn line(book: &Book, quantity: u32) -> CartLine {
    CartLine {
        book_id: book.id,
        title: book.title.clone(),
        unit_price: book.price,
        quantity,
        bookstore_id: book.bookstore_id,
    }
}
