use axum::{
    extract::{Json, State},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::AuthenticatedUser,
    errors::ServiceError,
    handlers::common::{success_response, validate_input},
    services::carts::CartItemDelta,
    AppState,
};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(update_cart))
        .route("/", get(get_cart))
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateCartRequest {
    #[validate(length(min = 1))]
    pub items: Vec<CartItemDelta>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UpdateCartResponse {
    pub cart: Uuid,
}

/// Apply quantity deltas to the caller's cart.
#[utoipa::path(
    post,
    path = "/api/v1/cart",
    request_body = UpdateCartRequest,
    responses(
        (status = 200, description = "Cart updated", body = UpdateCartResponse),
        (status = 400, description = "Empty update", body = crate::errors::ErrorResponse)
    ),
    tag = "Cart"
)]
async fn update_cart(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Json(payload): Json<UpdateCartRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;
    let cart = state
        .services
        .carts
        .update_cart(user.id, payload.items)
        .await?;
    Ok(success_response(UpdateCartResponse { cart }))
}

/// The caller's cart with catalog details expanded.
#[utoipa::path(
    get,
    path = "/api/v1/cart",
    responses(
        (status = 200, description = "Cart contents"),
        (status = 404, description = "No cart yet", body = crate::errors::ErrorResponse)
    ),
    tag = "Cart"
)]
async fn get_cart(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
) -> Result<impl IntoResponse, ServiceError> {
    let cart = state.services.carts.get_cart(user.id).await?;
    Ok(success_response(cart))
}
