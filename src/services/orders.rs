use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder};
use serde::Serialize;
use std::sync::Arc;
use tracing::instrument;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    entities::{library_entry, order, order_item, Book, LibraryEntry, Order, OrderItem},
    errors::ServiceError,
    money::format_minor_units,
    payments::PaymentProvider,
};

/// User-facing projections of stored orders.
///
/// The return-page lookup deliberately takes the provider's session id, not
/// an internal order id: the session id is the only handle the client ever
/// receives, so the read goes back through the provider to resolve it.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    provider: Arc<dyn PaymentProvider>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderItemView {
    pub book_id: Uuid,
    pub title: String,
    pub cover: Option<String>,
    pub qty: i32,
    pub price: String,
    pub total_price: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderView {
    pub id: Uuid,
    pub stripe_customer_id: Option<String>,
    pub payment_id: Option<String>,
    pub total_amount: String,
    pub payment_status: Option<String>,
    pub date: chrono::DateTime<chrono::Utc>,
    pub items: Vec<OrderItemView>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderSuccessView {
    pub items: Vec<OrderItemView>,
    pub total_amount: String,
}

impl OrderService {
    pub fn new(db: Arc<DatabaseConnection>, provider: Arc<dyn PaymentProvider>) -> Self {
        Self { db, provider }
    }

    /// All orders of the user, newest first, with books expanded and
    /// monetary values formatted for display.
    #[instrument(skip(self))]
    pub async fn list_orders(&self, user_id: Uuid) -> Result<Vec<OrderView>, ServiceError> {
        let orders = Order::find()
            .filter(order::Column::UserId.eq(user_id))
            .order_by_desc(order::Column::CreatedAt)
            .all(&*self.db)
            .await?;

        let mut views = Vec::with_capacity(orders.len());
        for order in orders {
            let items = self.expand_items(order.id).await?;
            views.push(OrderView {
                id: order.id,
                stripe_customer_id: order.stripe_customer_id,
                payment_id: order.payment_id,
                total_amount: format_minor_units(order.total_amount.unwrap_or(0)),
                payment_status: order.payment_status,
                date: order.created_at,
                items,
            });
        }
        Ok(views)
    }

    /// Whether the user owns the book.
    #[instrument(skip(self))]
    pub async fn check_ownership(
        &self,
        user_id: Uuid,
        book_id: Uuid,
    ) -> Result<bool, ServiceError> {
        let entry = LibraryEntry::find()
            .filter(library_entry::Column::UserId.eq(user_id))
            .filter(library_entry::Column::BookId.eq(book_id))
            .one(&*self.db)
            .await?;
        Ok(entry.is_some())
    }

    /// Return-page lookup: resolve a provider session id back to the order
    /// it paid for, via the session's customer metadata.
    #[instrument(skip(self))]
    pub async fn order_by_session(
        &self,
        user_id: Uuid,
        session_id: &str,
    ) -> Result<OrderSuccessView, ServiceError> {
        let session = self.provider.retrieve_session(session_id).await?;
        let customer_id = session
            .customer_id
            .ok_or_else(|| ServiceError::NotFound("Customer not found".to_string()))?;

        let customer = self.provider.retrieve_customer(&customer_id).await?;
        let metadata = crate::payments::CheckoutMetadata::from_map(&customer.metadata)
            .ok_or_else(|| ServiceError::NotFound("Order not found".to_string()))?;

        let order = Order::find_by_id(metadata.order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Order not found".to_string()))?;

        if order.user_id != user_id {
            return Err(ServiceError::Forbidden(
                "Order does not belong to the caller".to_string(),
            ));
        }

        let items = self.expand_items(order.id).await?;
        Ok(OrderSuccessView {
            items,
            total_amount: format_minor_units(order.total_amount.unwrap_or(0)),
        })
    }

    async fn expand_items(&self, order_id: Uuid) -> Result<Vec<OrderItemView>, ServiceError> {
        let items = OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .find_also_related(Book)
            .all(&*self.db)
            .await?;

        Ok(items
            .into_iter()
            .map(|(item, book)| {
                let (title, cover) = book
                    .map(|b| (b.title, b.cover_url))
                    .unwrap_or_else(|| ("(removed)".to_string(), None));
                OrderItemView {
                    book_id: item.book_id,
                    title,
                    cover,
                    qty: item.quantity,
                    price: format_minor_units(item.unit_price),
                    total_price: format_minor_units(item.total_price),
                }
            })
            .collect())
    }
}
