use chrono::Utc;
use sea_orm::{
    sea_query::OnConflict, ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter, Set, TransactionTrait,
};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use crate::{
    entities::{
        cart, cart_item, library_entry, order, order_item, webhook_event, Cart, CartItem,
        LibraryEntry, Order, OrderItem, WebhookEvent,
    },
    events::{Event, EventSender},
    payments::{CheckoutKind, CheckoutMetadata, PaymentProvider, WebhookEventKind},
};

/// Turns asynchronous payment-provider notifications into order and
/// entitlement state.
///
/// Everything after the signature gate is logged and swallowed rather than
/// surfaced to the transport: the provider retries on its own schedule and
/// cannot act on HTTP error semantics, so a failed event is recorded with
/// enough correlation data for manual reconciliation instead.
pub struct WebhookReconciler {
    db: Arc<DatabaseConnection>,
    provider: Arc<dyn PaymentProvider>,
    event_sender: Arc<EventSender>,
}

/// What processing did to the system, mostly for logs and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Signature missing or invalid; payload never parsed, zero state change.
    SignatureRejected,
    /// Event id already in the processed ledger.
    Duplicate,
    /// Event kind carries no meaning here; acknowledged unchanged.
    Ignored,
    /// Order and entitlement state updated.
    Applied,
    /// Verified but not applicable (stale correlation, missing order,
    /// already-settled order, or a provider/database failure mid-flight).
    Dropped,
}

impl WebhookReconciler {
    pub fn new(
        db: Arc<DatabaseConnection>,
        provider: Arc<dyn PaymentProvider>,
        event_sender: Arc<EventSender>,
    ) -> Self {
        Self {
            db,
            provider,
            event_sender,
        }
    }

    /// Processes one raw webhook delivery. Infallible by design; the HTTP
    /// handler acknowledges regardless of outcome.
    #[instrument(skip_all)]
    pub async fn process(&self, payload: &[u8], signature: Option<&str>) -> ReconcileOutcome {
        let event = match self.provider.verify_webhook(payload, signature) {
            Ok(event) => event,
            Err(err) => {
                warn!("Webhook signature verification failed: {}", err);
                return ReconcileOutcome::SignatureRejected;
            }
        };

        let event_type = match &event.kind {
            WebhookEventKind::PaymentSucceeded { .. } => "payment_intent.succeeded",
            WebhookEventKind::PaymentFailed { .. } => "payment_intent.payment_failed",
            WebhookEventKind::Other { event_type } => {
                info!("Ignoring webhook event {} of type {}", event.id, event_type);
                return ReconcileOutcome::Ignored;
            }
        };

        // Exactly-once: claim the event id before any further work. A
        // conflicting insert means this delivery is a replay.
        match self.record_event(&event.id, event_type).await {
            Ok(true) => {}
            Ok(false) => {
                info!("Webhook event {} already processed", event.id);
                return ReconcileOutcome::Duplicate;
            }
            Err(err) => {
                error!("Failed to record webhook event {}: {}", event.id, err);
                return ReconcileOutcome::Dropped;
            }
        }

        match self.apply(&event.id, event.kind).await {
            Ok(outcome) => outcome,
            Err(err) => {
                error!("Failed to apply webhook event {}: {}", event.id, err);
                ReconcileOutcome::Dropped
            }
        }
    }

    /// Inserts the event id into the processed ledger. `false` means the id
    /// was already there.
    async fn record_event(&self, event_id: &str, event_type: &str) -> Result<bool, DbErr> {
        let result = WebhookEvent::insert(webhook_event::ActiveModel {
            id: Set(event_id.to_string()),
            event_type: Set(event_type.to_string()),
            order_id: Set(None),
            received_at: Set(Utc::now()),
        })
        .on_conflict(
            OnConflict::column(webhook_event::Column::Id)
                .do_nothing()
                .to_owned(),
        )
        .exec(&*self.db)
        .await;

        match result {
            Ok(_) => Ok(true),
            Err(DbErr::RecordNotInserted) => Ok(false),
            Err(err) => Err(err),
        }
    }

    async fn apply(
        &self,
        event_id: &str,
        kind: WebhookEventKind,
    ) -> Result<ReconcileOutcome, crate::errors::ServiceError> {
        let (customer_id, succeeded) = match &kind {
            WebhookEventKind::PaymentSucceeded { customer_id, .. } => (customer_id.clone(), true),
            WebhookEventKind::PaymentFailed { customer_id, .. } => (customer_id.clone(), false),
            WebhookEventKind::Other { .. } => unreachable!("filtered before apply"),
        };

        // Webhook payloads carry only the customer id; the correlation
        // metadata lives on the provider's customer record.
        let customer = self.provider.retrieve_customer(&customer_id).await?;
        let Some(metadata) = CheckoutMetadata::from_map(&customer.metadata) else {
            warn!(
                "Webhook event {}: customer {} carries no usable correlation metadata",
                event_id, customer_id
            );
            return Ok(ReconcileOutcome::Dropped);
        };

        let txn = self.db.begin().await?;

        let Some(existing) = Order::find_by_id(metadata.order_id).one(&txn).await? else {
            warn!(
                "Webhook event {}: order {} not found (deleted or stale)",
                event_id, metadata.order_id
            );
            return Ok(ReconcileOutcome::Dropped);
        };

        // Orders transition at most once; a second outcome for the same
        // order is acknowledged without effect.
        if existing.is_settled() {
            info!(
                "Webhook event {}: order {} already settled as {:?}",
                event_id, metadata.order_id, existing.payment_status
            );
            return Ok(ReconcileOutcome::Dropped);
        }

        let mut update: order::ActiveModel = existing.into();
        update.stripe_customer_id = Set(Some(customer_id.clone()));
        match &kind {
            WebhookEventKind::PaymentSucceeded {
                payment_id,
                amount_received,
                status,
                ..
            } => {
                update.payment_id = Set(Some(payment_id.clone()));
                update.total_amount = Set(Some(*amount_received));
                update.payment_status = Set(Some(status.clone()));
            }
            WebhookEventKind::PaymentFailed {
                payment_id,
                status,
                error_message,
                ..
            } => {
                update.payment_id = Set(payment_id.clone());
                update.payment_status = Set(Some(status.clone()));
                update.payment_error_message = Set(Some(error_message.clone()));
            }
            WebhookEventKind::Other { .. } => unreachable!(),
        }
        update.update(&txn).await?;

        let mut granted_books = Vec::new();
        if succeeded {
            granted_books = self.grant_entitlements(&txn, &metadata).await?;

            if metadata.kind == CheckoutKind::Cart {
                self.clear_cart(&txn, &metadata).await?;
            }
        }

        // Backfill the ledger row with the order it resolved to.
        let mut ledger: webhook_event::ActiveModel = webhook_event::ActiveModel {
            id: Set(event_id.to_string()),
            ..Default::default()
        };
        ledger.order_id = Set(Some(metadata.order_id));
        WebhookEvent::update(ledger).exec(&txn).await?;

        txn.commit().await?;

        if succeeded {
            if let WebhookEventKind::PaymentSucceeded {
                amount_received, ..
            } = kind
            {
                self.event_sender
                    .send_or_log(Event::OrderPaid {
                        order_id: metadata.order_id,
                        amount_received,
                    })
                    .await;
            }
            self.event_sender
                .send_or_log(Event::EntitlementGranted {
                    user_id: metadata.user_id,
                    order_id: metadata.order_id,
                    book_ids: granted_books,
                })
                .await;
        } else {
            self.event_sender
                .send_or_log(Event::OrderPaymentFailed {
                    order_id: metadata.order_id,
                })
                .await;
        }

        info!(
            "Webhook event {} applied to order {}",
            event_id, metadata.order_id
        );
        Ok(ReconcileOutcome::Applied)
    }

    /// Adds every book on the order to the user's library. The unique
    /// (user_id, book_id) index plus conflict-ignoring inserts give the grant
    /// set semantics.
    async fn grant_entitlements(
        &self,
        txn: &sea_orm::DatabaseTransaction,
        metadata: &CheckoutMetadata,
    ) -> Result<Vec<uuid::Uuid>, DbErr> {
        let items = OrderItem::find()
            .filter(order_item::Column::OrderId.eq(metadata.order_id))
            .all(txn)
            .await?;

        let mut book_ids = Vec::with_capacity(items.len());
        for item in items {
            book_ids.push(item.book_id);
            let insert = LibraryEntry::insert(library_entry::ActiveModel {
                id: Set(uuid::Uuid::new_v4()),
                user_id: Set(metadata.user_id),
                book_id: Set(item.book_id),
                order_id: Set(metadata.order_id),
                granted_at: Set(Utc::now()),
            })
            .on_conflict(
                OnConflict::columns([
                    library_entry::Column::UserId,
                    library_entry::Column::BookId,
                ])
                .do_nothing()
                .to_owned(),
            )
            .exec(txn)
            .await;

            match insert {
                Ok(_) | Err(DbErr::RecordNotInserted) => {}
                Err(err) => return Err(err),
            }
        }
        Ok(book_ids)
    }

    /// Empties the user's cart after a cart-type checkout succeeds. Instant
    /// checkouts skip this; there is no cart involved.
    async fn clear_cart(
        &self,
        txn: &sea_orm::DatabaseTransaction,
        metadata: &CheckoutMetadata,
    ) -> Result<(), DbErr> {
        let cart = Cart::find()
            .filter(cart::Column::UserId.eq(metadata.user_id))
            .one(txn)
            .await?;

        if let Some(cart) = cart {
            CartItem::delete_many()
                .filter(cart_item::Column::CartId.eq(cart.id))
                .exec(txn)
                .await?;
            self.event_sender
                .send_or_log(Event::CartCleared { cart_id: cart.id })
                .await;
        }
        Ok(())
    }
}
