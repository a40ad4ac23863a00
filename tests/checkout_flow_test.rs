mod common;

use assert_matches::assert_matches;
use common::TestApp;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use std::sync::atomic::Ordering;
use uuid::Uuid;

use bookstore_api::{
    entities::{book::BookStatus, order_item, Book, CartItem, Order, OrderItem},
    errors::ServiceError,
    payments::PaymentProvider,
    services::carts::CartItemDelta,
};

#[tokio::test]
async fn cart_checkout_snapshots_prices_and_returns_session_url() {
    let app = TestApp::new().await;
    let user = app.seed_user("alice").await;
    let book_a = app.seed_book("book-a", 500, BookStatus::Published).await;
    let book_b = app.seed_book("book-b", 1000, BookStatus::Published).await;

    let cart_id = app
        .services
        .carts
        .update_cart(
            user.id,
            vec![
                CartItemDelta {
                    book_id: book_a,
                    quantity: 2,
                },
                CartItemDelta {
                    book_id: book_b,
                    quantity: 1,
                },
            ],
        )
        .await
        .unwrap();

    let url = app.services.checkout.checkout(&user, cart_id).await.unwrap();
    assert!(url.starts_with("https://pay.test/"));

    let orders = Order::find().all(&*app.db).await.unwrap();
    assert_eq!(orders.len(), 1);
    let order = &orders[0];
    assert_eq!(order.user_id, user.id);
    // Pending until the webhook settles it.
    assert_eq!(order.payment_status, None);
    assert_eq!(order.total_amount, None);

    let mut items = OrderItem::find()
        .filter(order_item::Column::OrderId.eq(order.id))
        .all(&*app.db)
        .await
        .unwrap();
    items.sort_by_key(|i| i.unit_price);
    assert_eq!(items.len(), 2);
    assert_eq!((items[0].unit_price, items[0].quantity, items[0].total_price), (500, 2, 1000));
    assert_eq!((items[1].unit_price, items[1].quantity, items[1].total_price), (1000, 1, 1000));
    assert_eq!(items.iter().map(|i| i.total_price).sum::<i64>(), 2000);

    // Correlation metadata is attached to the provider customer.
    let customer_id = app.provider.last_customer_id().unwrap();
    let customer = app
        .provider
        .retrieve_customer(&customer_id)
        .await
        .unwrap();
    assert_eq!(customer.metadata.get("type").map(String::as_str), Some("checkout"));
    assert_eq!(
        customer.metadata.get("orderId").map(String::as_str),
        Some(order.id.to_string().as_str())
    );
    assert_eq!(
        customer.metadata.get("userId").map(String::as_str),
        Some(user.id.to_string().as_str())
    );
}

#[tokio::test]
async fn order_prices_are_isolated_from_later_catalog_changes() {
    let app = TestApp::new().await;
    let user = app.seed_user("alice").await;
    let book_id = app.seed_book("book-a", 500, BookStatus::Published).await;

    let cart_id = app
        .services
        .carts
        .update_cart(
            user.id,
            vec![CartItemDelta {
                book_id,
                quantity: 1,
            }],
        )
        .await
        .unwrap();
    app.services.checkout.checkout(&user, cart_id).await.unwrap();

    // Reprice the book after checkout.
    let book = Book::find_by_id(book_id).one(&*app.db).await.unwrap().unwrap();
    let mut repriced: bookstore_api::entities::book::ActiveModel = book.into();
    repriced.price_sale = sea_orm::Set(9999);
    sea_orm::ActiveModelTrait::update(repriced, &*app.db)
        .await
        .unwrap();

    let items = OrderItem::find().all(&*app.db).await.unwrap();
    assert_eq!(items[0].unit_price, 500);
}

#[tokio::test]
async fn unpublished_book_rejects_whole_cart_without_creating_an_order() {
    let app = TestApp::new().await;
    let user = app.seed_user("alice").await;
    let published = app.seed_book("book-a", 500, BookStatus::Published).await;
    let unpublished = app.seed_book("book-b", 1000, BookStatus::Unpublished).await;

    let cart_id = app
        .services
        .carts
        .update_cart(
            user.id,
            vec![
                CartItemDelta {
                    book_id: published,
                    quantity: 1,
                },
                CartItemDelta {
                    book_id: unpublished,
                    quantity: 1,
                },
            ],
        )
        .await
        .unwrap();

    let err = app
        .services
        .checkout
        .checkout(&user, cart_id)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Forbidden(_));
    assert!(Order::find().all(&*app.db).await.unwrap().is_empty());
}

#[tokio::test]
async fn checkout_of_a_foreign_cart_is_forbidden() {
    let app = TestApp::new().await;
    let alice = app.seed_user("alice").await;
    let mallory = app.seed_user("mallory").await;
    let book_id = app.seed_book("book-a", 500, BookStatus::Published).await;

    let cart_id = app
        .services
        .carts
        .update_cart(
            alice.id,
            vec![CartItemDelta {
                book_id,
                quantity: 1,
            }],
        )
        .await
        .unwrap();

    let err = app
        .services
        .checkout
        .checkout(&mallory, cart_id)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Forbidden(_));
    assert!(Order::find().all(&*app.db).await.unwrap().is_empty());
}

#[tokio::test]
async fn missing_and_empty_carts_are_rejected() {
    let app = TestApp::new().await;
    let user = app.seed_user("alice").await;
    let book_id = app.seed_book("book-a", 500, BookStatus::Published).await;

    let err = app
        .services
        .checkout
        .checkout(&user, Uuid::new_v4())
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));

    // Add the item then remove it, leaving an existing but empty cart.
    let cart_id = app
        .services
        .carts
        .update_cart(
            user.id,
            vec![CartItemDelta {
                book_id,
                quantity: 1,
            }],
        )
        .await
        .unwrap();
    app.services
        .carts
        .update_cart(
            user.id,
            vec![CartItemDelta {
                book_id,
                quantity: -1,
            }],
        )
        .await
        .unwrap();

    let err = app
        .services
        .checkout
        .checkout(&user, cart_id)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidOperation(_));
}

#[tokio::test]
async fn instant_checkout_creates_a_single_line_order() {
    let app = TestApp::new().await;
    let user = app.seed_user("alice").await;
    let book_id = app.seed_book("book-a", 500, BookStatus::Published).await;

    let url = app
        .services
        .checkout
        .instant_checkout(&user, book_id)
        .await
        .unwrap();
    assert!(url.starts_with("https://pay.test/"));

    let items = OrderItem::find().all(&*app.db).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!((items[0].unit_price, items[0].quantity), (500, 1));

    let customer_id = app.provider.last_customer_id().unwrap();
    let customer = app.provider.retrieve_customer(&customer_id).await.unwrap();
    assert_eq!(
        customer.metadata.get("type").map(String::as_str),
        Some("instant-checkout")
    );
}

#[tokio::test]
async fn instant_checkout_of_unpublished_book_is_forbidden() {
    let app = TestApp::new().await;
    let user = app.seed_user("alice").await;
    let book_id = app.seed_book("book-a", 500, BookStatus::Unpublished).await;

    let err = app
        .services
        .checkout
        .instant_checkout(&user, book_id)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Forbidden(_));
    assert!(Order::find().all(&*app.db).await.unwrap().is_empty());
}

#[tokio::test]
async fn provider_failure_rolls_back_the_pending_order() {
    let app = TestApp::new().await;
    let user = app.seed_user("alice").await;
    let book_id = app.seed_book("book-a", 500, BookStatus::Published).await;
    app.provider.fail_session_creation.store(true, Ordering::SeqCst);

    let err = app
        .services
        .checkout
        .instant_checkout(&user, book_id)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::PaymentProvider(_));

    // The compensating delete leaves no orphan order behind.
    assert!(Order::find().all(&*app.db).await.unwrap().is_empty());
    assert!(OrderItem::find().all(&*app.db).await.unwrap().is_empty());
}

#[tokio::test]
async fn cart_deltas_merge_and_zero_removes_the_line() {
    let app = TestApp::new().await;
    let user = app.seed_user("alice").await;
    let book_id = app.seed_book("book-a", 500, BookStatus::Published).await;

    app.services
        .carts
        .update_cart(
            user.id,
            vec![CartItemDelta {
                book_id,
                quantity: 2,
            }],
        )
        .await
        .unwrap();
    app.services
        .carts
        .update_cart(
            user.id,
            vec![CartItemDelta {
                book_id,
                quantity: 3,
            }],
        )
        .await
        .unwrap();

    let items = CartItem::find().all(&*app.db).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].quantity, 5);

    app.services
        .carts
        .update_cart(
            user.id,
            vec![CartItemDelta {
                book_id,
                quantity: -5,
            }],
        )
        .await
        .unwrap();
    assert!(CartItem::find().all(&*app.db).await.unwrap().is_empty());

    // Removing a line that is not there is a no-op, not an error.
    app.services
        .carts
        .update_cart(
            user.id,
            vec![CartItemDelta {
                book_id: Uuid::new_v4(),
                quantity: -1,
            }],
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn cart_quantities_saturate_instead_of_wrapping() {
    let app = TestApp::new().await;
    let user = app.seed_user("alice").await;
    let book_id = app.seed_book("book-a", 500, BookStatus::Published).await;

    // Two near-max deltas would wrap to a negative sum and silently drop
    // the line; the merge must clamp instead.
    app.services
        .carts
        .update_cart(
            user.id,
            vec![CartItemDelta {
                book_id,
                quantity: i32::MAX,
            }],
        )
        .await
        .unwrap();
    app.services
        .carts
        .update_cart(
            user.id,
            vec![CartItemDelta {
                book_id,
                quantity: i32::MAX,
            }],
        )
        .await
        .unwrap();

    let items = CartItem::find().all(&*app.db).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].quantity, i32::MAX);
}
