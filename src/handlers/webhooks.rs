use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::post,
    Router,
};
use std::sync::Arc;

use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/", post(payment_webhook))
}

/// Payment-provider webhook sink.
///
/// The body is taken as raw bytes because the signature covers the exact
/// payload; this route must never go through a JSON extractor. The response
/// is 200 regardless of outcome: the provider retries on its own schedule
/// and an invalid signature must not read as "retry me".
#[utoipa::path(
    post,
    path = "/api/v1/webhook",
    request_body = String,
    responses((status = 200, description = "Event acknowledged")),
    tag = "Payments"
)]
async fn payment_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let signature = headers
        .get("Stripe-Signature")
        .and_then(|value| value.to_str().ok());

    state.services.reconciler.process(&body, signature).await;

    (StatusCode::OK, "ok")
}
