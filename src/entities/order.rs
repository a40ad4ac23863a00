use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A priced snapshot of a purchase attempt. Created in a pending state by the
/// checkout initiator (all payment fields null); the payment fields are
/// written exactly once, by the webhook reconciler, when the provider reports
/// an outcome. Terminal after that transition.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub user_id: Uuid,
    #[sea_orm(nullable)]
    pub stripe_customer_id: Option<String>,
    #[sea_orm(nullable)]
    pub payment_id: Option<String>,
    /// Aggregate amount received, in minor currency units.
    #[sea_orm(nullable)]
    pub total_amount: Option<i64>,
    /// Free-text status mirroring the provider ("succeeded", "failed", ...).
    #[sea_orm(nullable)]
    pub payment_status: Option<String>,
    #[sea_orm(nullable)]
    pub payment_error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order_item::Entity")]
    OrderItems,
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id"
    )]
    User,
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItems.def()
    }
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// True once the reconciler has recorded a payment outcome.
    pub fn is_settled(&self) -> bool {
        self.payment_status.is_some()
    }
}
