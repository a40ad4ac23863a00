pub mod carts;
pub mod catalog;
pub mod checkout;
pub mod orders;
pub mod reconciler;

use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::{config::AppConfig, events::EventSender, payments::PaymentProvider};

/// Aggregated services shared by the HTTP handlers.
#[derive(Clone)]
pub struct AppServices {
    pub catalog: Arc<catalog::CatalogService>,
    pub carts: Arc<carts::CartService>,
    pub checkout: Arc<checkout::CheckoutService>,
    pub orders: Arc<orders::OrderService>,
    pub reconciler: Arc<reconciler::WebhookReconciler>,
}

impl AppServices {
    pub fn new(
        db: Arc<DatabaseConnection>,
        provider: Arc<dyn PaymentProvider>,
        event_sender: Arc<EventSender>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            catalog: Arc::new(catalog::CatalogService::new(db.clone())),
            carts: Arc::new(carts::CartService::new(db.clone(), event_sender.clone())),
            checkout: Arc::new(checkout::CheckoutService::new(
                db.clone(),
                provider.clone(),
                event_sender.clone(),
                config,
            )),
            orders: Arc::new(orders::OrderService::new(db.clone(), provider.clone())),
            reconciler: Arc::new(reconciler::WebhookReconciler::new(
                db,
                provider,
                event_sender,
            )),
        }
    }
}
