use axum::{
    extract::{Json, Path, State},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    auth::AuthenticatedUser, errors::ServiceError, handlers::common::success_response, AppState,
};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/instant", post(instant_checkout))
        .route("/:cart_id", get(checkout))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CheckoutResponse {
    pub url: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct InstantCheckoutRequest {
    pub book_id: Uuid,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct InstantCheckoutResponse {
    pub checkout_url: String,
}

/// Start a cart-based checkout; returns the hosted payment redirect URL.
#[utoipa::path(
    get,
    path = "/api/v1/checkout/{cart_id}",
    params(("cart_id" = Uuid, Path, description = "Cart to check out")),
    responses(
        (status = 200, description = "Session created", body = CheckoutResponse),
        (status = 403, description = "Foreign cart or unpublished item", body = crate::errors::ErrorResponse),
        (status = 404, description = "No such cart", body = crate::errors::ErrorResponse)
    ),
    tag = "Checkout"
)]
async fn checkout(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(cart_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let url = state.services.checkout.checkout(&user, cart_id).await?;
    Ok(success_response(CheckoutResponse { url }))
}

/// Single-book purchase with implicit quantity 1.
#[utoipa::path(
    post,
    path = "/api/v1/checkout/instant",
    request_body = InstantCheckoutRequest,
    responses(
        (status = 200, description = "Session created", body = InstantCheckoutResponse),
        (status = 403, description = "Unpublished book", body = crate::errors::ErrorResponse),
        (status = 404, description = "No such book", body = crate::errors::ErrorResponse)
    ),
    tag = "Checkout"
)]
async fn instant_checkout(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Json(payload): Json<InstantCheckoutRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let checkout_url = state
        .services
        .checkout
        .instant_checkout(&user, payload.book_id)
        .await?;
    Ok(success_response(InstantCheckoutResponse { checkout_url }))
}
