mod common;

use common::*;
use mutanabbi::cart::{Cart, CartAction};
use mutanabbi::db::{self, orders::Checkout};
use mutanabbi::error::AppError;
use mutanabbi::model::{BookstoreStatus, OrderStatus, PaymentMethod, Role};

fn checkout() -> Checkout {
    Checkout {
        shipping_address: "بغداد، شارع المتنبي".into(),
        phone: "07701234567".into(),
        payment_method: PaymentMethod::CashOnDelivery,
        notes: None,
    }
}

#[tokio::test]
async fn checkout_splits_orders_per_bookstore() {
    let pool = setup_pool().await;
    let pricing = pricing();
    let customer = user(&pool, "buyer@example.com", Role::Customer).await;
    let (_, dar) = approved_store(&pool, "dar@example.com", "دار الرافدين").await;
    let (_, maktaba) = approved_store(&pool, "maktaba@example.com", "مكتبة النهضة").await;

    let cheap = store_book(&pool, &dar, "رواية قصيرة", 10_000).await;
    let pricey = store_book(&pool, &maktaba, "موسوعة", 60_000).await;
    let old = library_book(&pool, "تاريخ بغداد", 8_000).await;

    let mut cart = Cart::default();
    cart.apply(CartAction::Add(line(&cheap, 2)), &pricing).unwrap();
    cart.apply(CartAction::Add(line(&pricey, 1)), &pricing).unwrap();
    cart.apply(CartAction::Add(line(&old, 1)), &pricing).unwrap();
    db::carts::save(&pool, customer.id, &cart).await.unwrap();
    assert_eq!(cart.totals.shipping, 2 * pricing.shipping_fee);

    // the catalog price changed after the book went into the cart
    sqlx::query("UPDATE books SET price = 12000 WHERE id = ?")
        .bind(cheap.id)
        .execute(&pool)
        .await
        .unwrap();

    let orders = db::orders::place_orders(&pool, customer.id, &cart.items, &checkout(), &pricing)
        .await
        .unwrap();
    assert_eq!(orders.len(), 3);

    let by_store = |id: Option<i64>| orders.iter().find(|o| o.bookstore_id == id).unwrap();
    let first = by_store(Some(dar.id));
    assert_eq!(first.subtotal, 24_000);
    assert_eq!(first.shipping, pricing.shipping_fee);
    assert_eq!(first.total, 24_000 + pricing.shipping_fee);

    let second = by_store(Some(maktaba.id));
    assert_eq!(second.shipping, 0);
    assert_eq!(second.total, 60_000);

    let library = by_store(None);
    assert_eq!(library.total, 8_000 + pricing.shipping_fee);

    for order in &orders {
        assert_eq!(order.status, OrderStatus::Pending);
        assert!(order.reference.starts_with("MT-"));
    }

    let detail = db::orders::get_detail(&pool, first.id).await.unwrap().unwrap();
    assert_eq!(detail.items.len(), 1);
    assert_eq!(detail.items[0].unit_price, 12_000);
    assert_eq!(detail.items[0].quantity, 2);
    assert_eq!(detail.history.len(), 1);
    assert_eq!(detail.history[0].status, OrderStatus::Pending);

    let cart = db::carts::load(&pool, customer.id, &pricing).await.unwrap();
    assert!(cart.is_empty());
    assert_eq!(db::outbox::count(&pool).await.unwrap(), 3);

    let mine = db::orders::list_for_user(&pool, customer.id).await.unwrap();
    assert_eq!(mine.len(), 3);
    let store_orders = db::orders::list_for_bookstore(&pool, dar.id, Some(OrderStatus::Pending))
        .await
        .unwrap();
    assert_eq!(store_orders.len(), 1);
}

#[tokio::test]
async fn checkout_is_all_or_nothing() {
    let pool = setup_pool().await;
    let pricing = pricing();
    let customer = user(&pool, "buyer@example.com", Role::Customer).await;
    let (_, open) = approved_store(&pool, "open@example.com", "مفتوحة").await;
    let (_, closing) = approved_store(&pool, "closing@example.com", "مغلقة").await;
    let a = store_book(&pool, &open, "أ", 5_000).await;
    let b = store_book(&pool, &closing, "ب", 5_000).await;

    let mut cart = Cart::default();
    cart.apply(CartAction::Add(line(&a, 1)), &pricing).unwrap();
    cart.apply(CartAction::Add(line(&b, 1)), &pricing).unwrap();
    db::carts::save(&pool, customer.id, &cart).await.unwrap();

    db::bookstores::set_status(&pool, closing.id, BookstoreStatus::Suspended)
        .await
        .unwrap();

    let err = db::orders::place_orders(&pool, customer.id, &cart.items, &checkout(), &pricing)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)), "{err:?}");

    let (orders, total) = db::orders::list_all(&pool, None, 50, 0).await.unwrap();
    assert!(orders.is_empty());
    assert_eq!(total, 0);
    assert_eq!(db::outbox::count(&pool).await.unwrap(), 0);
    let cart = db::carts::load(&pool, customer.id, &pricing).await.unwrap();
    assert_eq!(cart.items.len(), 2);
}

#[tokio::test]
async fn unavailable_books_and_empty_carts_are_rejected() {
    let pool = setup_pool().await;
    let pricing = pricing();
    let customer = user(&pool, "buyer@example.com", Role::Customer).await;
    let (_, store) = approved_store(&pool, "s@example.com", "متجر").await;
    let book = store_book(&pool, &store, "قريبا", 5_000).await;

    let err = db::orders::place_orders(&pool, customer.id, &[], &checkout(), &pricing)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    sqlx::query("UPDATE books SET availability = 'coming_soon' WHERE id = ?")
        .bind(book.id)
        .execute(&pool)
        .await
        .unwrap();
    let err = db::orders::place_orders(&pool, customer.id, &[line(&book, 1)], &checkout(), &pricing)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn order_lifecycle_and_verified_reviews() {
    let pool = setup_pool().await;
    let pricing = pricing();
    let customer = user(&pool, "buyer@example.com", Role::Customer).await;
    let (owner, store) = approved_store(&pool, "s@example.com", "متجر").await;
    let book = store_book(&pool, &store, "ديوان", 7_000).await;

    let orders = db::orders::place_orders(&pool, customer.id, &[line(&book, 1)], &checkout(), &pricing)
        .await
        .unwrap();
    let id = orders[0].id;

    let review = db::reviews::upsert(&pool, customer.id, book.id, 4, None).await.unwrap();
    assert!(!review.verified_purchase);

    for next in [OrderStatus::Confirmed, OrderStatus::Shipped, OrderStatus::Delivered] {
        let order = db::orders::update_status(&pool, id, next, owner.id).await.unwrap();
        assert_eq!(order.status, next);
    }

    let err = db::orders::update_status(&pool, id, OrderStatus::Cancelled, owner.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    let detail = db::orders::get_detail(&pool, id).await.unwrap().unwrap();
    let statuses: Vec<_> = detail.history.iter().map(|h| h.status).collect();
    assert_eq!(
        statuses,
        vec![
            OrderStatus::Pending,
            OrderStatus::Confirmed,
            OrderStatus::Shipped,
            OrderStatus::Delivered
        ]
    );
    assert_eq!(detail.history[1].changed_by, Some(owner.id));
    // one placement plus three status changes
    assert_eq!(db::outbox::count(&pool).await.unwrap(), 4);

    let review = db::reviews::upsert(&pool, customer.id, book.id, 5, Some("رائع"))
        .await
        .unwrap();
    assert!(review.verified_purchase);

    let sales = db::analytics::for_bookstore(&pool, store.id, 30).await.unwrap();
    assert_eq!(sales.revenue, orders[0].total);
    assert_eq!(sales.top_books.len(), 1);
    assert_eq!(sales.top_books[0].quantity, 1);
    assert_eq!(sales.orders_by_status.get("delivered"), Some(&1));
    assert_eq!(sales.daily.len(), 1);
}

#[tokio::test]
async fn cancelled_orders_do_not_count_as_revenue() {
    let pool = setup_pool().await;
    let pricing = pricing();
    let customer = user(&pool, "buyer@example.com", Role::Customer).await;
    let (_, store) = approved_store(&pool, "s@example.com", "متجر").await;
    let book = store_book(&pool, &store, "كتاب", 9_000).await;

    let first = db::orders::place_orders(&pool, customer.id, &[line(&book, 1)], &checkout(), &pricing)
        .await
        .unwrap();
    let second = db::orders::place_orders(&pool, customer.id, &[line(&book, 2)], &checkout(), &pricing)
        .await
        .unwrap();
    db::orders::update_status(&pool, first[0].id, OrderStatus::Cancelled, customer.id)
        .await
        .unwrap();

    let overview = db::analytics::platform(&pool, 7).await.unwrap();
    assert_eq!(overview.sales.revenue, second[0].total);
    assert_eq!(overview.sales.orders_by_status.get("cancelled"), Some(&1));
    assert_eq!(overview.sales.orders_by_status.get("pending"), Some(&1));
    assert_eq!(overview.users_by_role.get("customer"), Some(&1));
    assert_eq!(overview.bookstores_by_status.get("approved"), Some(&1));
    assert_eq!(overview.sales.top_books[0].quantity, 2);
}

#[tokio::test]
async fn customers_cancel_only_pending_orders() {
    let pool = setup_pool().await;
    let pricing = pricing();
    let customer = user(&pool, "buyer@example.com", Role::Customer).await;
    let (owner, store) = approved_store(&pool, "s@example.com", "متجر").await;
    let book = store_book(&pool, &store, "كتاب", 9_000).await;

    let first = db::orders::place_orders(&pool, customer.id, &[line(&book, 1)], &checkout(), &pricing)
        .await
        .unwrap();
    let cancelled = db::orders::cancel_pending(&pool, first[0].id, customer.id)
        .await
        .unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);

    // the store confirms before the customer's cancel lands
    let second = db::orders::place_orders(&pool, customer.id, &[line(&book, 1)], &checkout(), &pricing)
        .await
        .unwrap();
    db::orders::update_status(&pool, second[0].id, OrderStatus::Confirmed, owner.id)
        .await
        .unwrap();
    let err = db::orders::cancel_pending(&pool, second[0].id, customer.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)), "{err:?}");
    let order = db::orders::get(&pool, second[0].id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Confirmed);

    // stores may still cancel a confirmed order
    let order = db::orders::update_status(&pool, second[0].id, OrderStatus::Cancelled, owner.id)
        .await
        .unwrap();
    assert_eq!(order.status, OrderStatus::Cancelled);
}
