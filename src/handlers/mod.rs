pub mod books;
pub mod carts;
pub mod checkout;
pub mod common;
pub mod health;
pub mod orders;
pub mod webhooks;

use axum::Router;
use std::sync::Arc;

use crate::AppState;

/// Full v1 API surface.
pub fn api_v1_routes() -> Router<Arc<AppState>> {
    Router::new()
        .nest("/books", books::routes())
        .nest("/cart", carts::routes())
        .nest("/checkout", checkout::routes())
        .nest("/orders", orders::routes())
        .nest("/webhook", webhooks::routes())
        .nest("/health", health::routes())
}
