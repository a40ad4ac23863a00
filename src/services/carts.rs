use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    entities::{cart, cart_item, Cart, CartItem, CartModel},
    errors::ServiceError,
    events::{Event, EventSender},
    money::format_minor_units,
    services::catalog::PriceView,
};

/// Cart mutation and reads. One cart per user, created lazily on the first
/// update. Book existence and publishability are deliberately not checked
/// here; checkout enforces both against the current catalog.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

/// A quantity delta for one book. Deltas are merged into the existing line;
/// a resulting quantity of zero or less removes the line.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CartItemDelta {
    pub book_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CartItemView {
    pub quantity: i32,
    pub book_id: Uuid,
    pub title: String,
    pub slug: String,
    pub cover: Option<String>,
    pub price: PriceView,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CartView {
    pub id: Uuid,
    pub items: Vec<CartItemView>,
}

impl CartService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Applies quantity deltas to the user's cart, creating the cart if it
    /// does not exist yet. Returns the cart id.
    #[instrument(skip(self, deltas))]
    pub async fn update_cart(
        &self,
        user_id: Uuid,
        deltas: Vec<CartItemDelta>,
    ) -> Result<Uuid, ServiceError> {
        if deltas.is_empty() {
            return Err(ServiceError::ValidationError(
                "cart update requires at least one item".to_string(),
            ));
        }

        let txn = self.db.begin().await?;

        let cart = match Cart::find()
            .filter(cart::Column::UserId.eq(user_id))
            .one(&txn)
            .await?
        {
            Some(cart) => cart,
            None => {
                cart::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    user_id: Set(user_id),
                    created_at: Set(Utc::now()),
                    updated_at: Set(Utc::now()),
                }
                .insert(&txn)
                .await?
            }
        };

        for delta in deltas {
            let existing = CartItem::find()
                .filter(cart_item::Column::CartId.eq(cart.id))
                .filter(cart_item::Column::BookId.eq(delta.book_id))
                .one(&txn)
                .await?;

            match existing {
                Some(item) => {
                    // Client-supplied i32s; a wrapped sum would read as a
                    // negative quantity and silently drop the line.
                    let quantity = item.quantity.saturating_add(delta.quantity);
                    if quantity <= 0 {
                        CartItem::delete_by_id(item.id).exec(&txn).await?;
                    } else {
                        let mut item: cart_item::ActiveModel = item.into();
                        item.quantity = Set(quantity);
                        item.updated_at = Set(Utc::now());
                        item.update(&txn).await?;
                    }
                }
                None if delta.quantity > 0 => {
                    cart_item::ActiveModel {
                        id: Set(Uuid::new_v4()),
                        cart_id: Set(cart.id),
                        book_id: Set(delta.book_id),
                        quantity: Set(delta.quantity),
                        created_at: Set(Utc::now()),
                        updated_at: Set(Utc::now()),
                    }
                    .insert(&txn)
                    .await?;
                }
                // Removing a line that is not there is a no-op.
                None => {}
            }
        }

        let mut touched: cart::ActiveModel = cart.clone().into();
        touched.updated_at = Set(Utc::now());
        touched.update(&txn).await?;

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartUpdated {
                cart_id: cart.id,
                user_id,
            })
            .await;

        info!("Updated cart {} for user {}", cart.id, user_id);
        Ok(cart.id)
    }

    /// Returns the user's cart with catalog details expanded.
    #[instrument(skip(self))]
    pub async fn get_cart(&self, user_id: Uuid) -> Result<CartView, ServiceError> {
        let cart = self.find_cart(user_id).await?;

        let items = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .find_also_related(crate::entities::Book)
            .all(&*self.db)
            .await?;

        let views = items
            .into_iter()
            .filter_map(|(item, book)| {
                book.map(|book| CartItemView {
                    quantity: item.quantity,
                    book_id: book.id,
                    title: book.title,
                    slug: book.slug,
                    cover: book.cover_url,
                    price: PriceView {
                        mrp: format_minor_units(book.price_mrp),
                        sale: format_minor_units(book.price_sale),
                    },
                })
            })
            .collect();

        Ok(CartView {
            id: cart.id,
            items: views,
        })
    }

    pub async fn find_cart(&self, user_id: Uuid) -> Result<CartModel, ServiceError> {
        Cart::find()
            .filter(cart::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Cart not found".to_string()))
    }
}
