use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    auth::AuthenticatedUser, errors::ServiceError, handlers::common::success_response, AppState,
};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_orders))
        .route("/check-status/:book_id", get(check_status))
        .route("/success/:session_id", post(order_success))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OwnershipResponse {
    pub status: bool,
}

/// The caller's order history, newest first.
#[utoipa::path(
    get,
    path = "/api/v1/orders",
    responses((status = 200, description = "Orders with formatted line items")),
    tag = "Orders"
)]
async fn list_orders(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
) -> Result<impl IntoResponse, ServiceError> {
    let orders = state.services.orders.list_orders(user.id).await?;
    Ok(success_response(orders))
}

/// Whether the caller owns the given book.
#[utoipa::path(
    get,
    path = "/api/v1/orders/check-status/{book_id}",
    params(("book_id" = Uuid, Path, description = "Book to check")),
    responses((status = 200, description = "Ownership flag", body = OwnershipResponse)),
    tag = "Orders"
)]
async fn check_status(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(book_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let status = state
        .services
        .orders
        .check_ownership(user.id, book_id)
        .await?;
    Ok(success_response(OwnershipResponse { status }))
}

/// Payment-return landing page lookup by provider session id. The internal
/// order id never reaches the client; this is the only read path.
#[utoipa::path(
    post,
    path = "/api/v1/orders/success/{session_id}",
    params(("session_id" = String, Path, description = "Provider checkout session id")),
    responses(
        (status = 200, description = "Order line items and total"),
        (status = 404, description = "Unknown session", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
async fn order_success(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state
        .services
        .orders
        .order_by_session(user.id, &session_id)
        .await?;
    Ok(success_response(order))
}
