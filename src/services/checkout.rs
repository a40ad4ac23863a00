use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use std::sync::Arc;
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::{
    auth::AuthenticatedUser,
    config::AppConfig,
    entities::{book, cart_item, order, order_item, Book, Cart, CartItem, Order, OrderItem},
    errors::ServiceError,
    events::{Event, EventSender},
    money::line_total,
    payments::{
        CheckoutKind, CheckoutMetadata, CreateSessionRequest, PaymentProvider, SessionLineItem,
    },
};

/// Builds a hosted payment session for a priced order snapshot.
///
/// The order is inserted before any provider call; if customer or session
/// creation then fails, the pending order is deleted again so no orphan
/// orders accumulate waiting for a webhook that will never arrive.
#[derive(Clone)]
pub struct CheckoutService {
    db: Arc<DatabaseConnection>,
    provider: Arc<dyn PaymentProvider>,
    event_sender: Arc<EventSender>,
    config: Arc<AppConfig>,
}

struct PricedLine {
    book_id: Uuid,
    title: String,
    unit_price: i64,
    quantity: i32,
}

impl CheckoutService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        provider: Arc<dyn PaymentProvider>,
        event_sender: Arc<EventSender>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            db,
            provider,
            event_sender,
            config,
        }
    }

    /// Cart-based checkout. The cart must exist, belong to the caller, be
    /// non-empty, and reference only published books; a single unpublished
    /// item rejects the whole cart.
    #[instrument(skip(self, user), fields(user_id = %user.id))]
    pub async fn checkout(
        &self,
        user: &AuthenticatedUser,
        cart_id: Uuid,
    ) -> Result<String, ServiceError> {
        let cart = Cart::find_by_id(cart_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Cart not found".to_string()))?;

        if cart.user_id != user.id {
            return Err(ServiceError::Forbidden(
                "Cart does not belong to the caller".to_string(),
            ));
        }

        let items = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .find_also_related(Book)
            .all(&*self.db)
            .await?;

        if items.is_empty() {
            return Err(ServiceError::InvalidOperation("Cart is empty".to_string()));
        }

        let mut lines = Vec::with_capacity(items.len());
        for (item, book) in items {
            let book = book.ok_or_else(|| {
                ServiceError::NotFound(format!("Book {} no longer exists", item.book_id))
            })?;
            Self::require_published(&book)?;
            lines.push(PricedLine {
                book_id: book.id,
                title: book.title,
                unit_price: book.price_sale,
                quantity: item.quantity,
            });
        }

        self.create_order_and_session(user, lines, CheckoutKind::Cart)
            .await
    }

    /// Instant checkout of a single book with implicit quantity 1.
    #[instrument(skip(self, user), fields(user_id = %user.id))]
    pub async fn instant_checkout(
        &self,
        user: &AuthenticatedUser,
        book_id: Uuid,
    ) -> Result<String, ServiceError> {
        let book = Book::find_by_id(book_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Book not found".to_string()))?;
        Self::require_published(&book)?;

        let lines = vec![PricedLine {
            book_id: book.id,
            title: book.title,
            unit_price: book.price_sale,
            quantity: 1,
        }];

        self.create_order_and_session(user, lines, CheckoutKind::Instant)
            .await
    }

    fn require_published(book: &book::Model) -> Result<(), ServiceError> {
        if book.status != book::BookStatus::Published {
            return Err(ServiceError::Forbidden(format!(
                "Book '{}' is not available for purchase",
                book.slug
            )));
        }
        Ok(())
    }

    /// Snapshots the lines into an order, then asks the provider for a
    /// customer and a hosted session. Returns the session redirect URL.
    async fn create_order_and_session(
        &self,
        user: &AuthenticatedUser,
        lines: Vec<PricedLine>,
        kind: CheckoutKind,
    ) -> Result<String, ServiceError> {
        let order_id = Uuid::new_v4();

        let txn = self.db.begin().await?;
        order::ActiveModel {
            id: Set(order_id),
            user_id: Set(user.id),
            stripe_customer_id: Set(None),
            payment_id: Set(None),
            total_amount: Set(None),
            payment_status: Set(None),
            payment_error_message: Set(None),
            created_at: Set(Utc::now()),
        }
        .insert(&txn)
        .await?;

        for line in &lines {
            order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                book_id: Set(line.book_id),
                unit_price: Set(line.unit_price),
                quantity: Set(line.quantity),
                total_price: Set(line_total(line.unit_price, line.quantity)),
            }
            .insert(&txn)
            .await?;
        }
        txn.commit().await?;

        let metadata = CheckoutMetadata {
            user_id: user.id,
            order_id,
            kind,
        };

        let session_url = self.build_session(user, &lines, metadata).await;

        match session_url {
            Ok(url) => {
                self.event_sender
                    .send_or_log(Event::OrderCreated {
                        order_id,
                        user_id: user.id,
                    })
                    .await;
                info!("Created checkout session for order {}", order_id);
                Ok(url)
            }
            Err(err) => {
                // Compensating cleanup: without a session there will never be
                // a webhook for this order.
                error!(
                    "Provider call failed for user {} (order {}): {}",
                    user.id, order_id, err
                );
                if let Err(cleanup) = self.remove_pending_order(order_id).await {
                    error!(
                        "Failed to delete orphaned order {}: {}",
                        order_id, cleanup
                    );
                }
                Err(err)
            }
        }
    }

    /// Deletes a pending order together with its line items. No foreign keys
    /// back these tables, so both deletes happen here, in one transaction.
    async fn remove_pending_order(&self, order_id: Uuid) -> Result<(), ServiceError> {
        let txn = self.db.begin().await?;
        OrderItem::delete_many()
            .filter(order_item::Column::OrderId.eq(order_id))
            .exec(&txn)
            .await?;
        Order::delete_by_id(order_id).exec(&txn).await?;
        txn.commit().await?;
        Ok(())
    }

    async fn build_session(
        &self,
        user: &AuthenticatedUser,
        lines: &[PricedLine],
        metadata: CheckoutMetadata,
    ) -> Result<String, ServiceError> {
        let customer = self
            .provider
            .create_customer(&user.username, &user.email, metadata)
            .await?;

        let session = self
            .provider
            .create_checkout_session(CreateSessionRequest {
                customer_id: customer.id,
                currency: self.config.currency.clone(),
                line_items: lines
                    .iter()
                    .map(|line| SessionLineItem {
                        name: line.title.clone(),
                        unit_amount: line.unit_price,
                        quantity: line.quantity,
                    })
                    .collect(),
                success_url: self.config.payment_success_url.clone(),
                cancel_url: self.config.payment_cancel_url.clone(),
            })
            .await?;

        session.url.ok_or_else(|| {
            ServiceError::PaymentProvider("session created without a redirect URL".to_string())
        })
    }
}
