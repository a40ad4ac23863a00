use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::get,
    Router,
};
use std::sync::Arc;

use crate::{errors::ServiceError, handlers::common::success_response, AppState};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_books))
        .route("/:slug", get(get_book))
}

/// List the published catalog.
#[utoipa::path(
    get,
    path = "/api/v1/books",
    responses((status = 200, description = "Published books")),
    tag = "Books"
)]
async fn list_books(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ServiceError> {
    let books = state.services.catalog.list_published().await?;
    Ok(success_response(books))
}

/// Fetch a single book by slug.
#[utoipa::path(
    get,
    path = "/api/v1/books/{slug}",
    params(("slug" = String, Path, description = "Book slug")),
    responses(
        (status = 200, description = "Book"),
        (status = 404, description = "Unknown slug", body = crate::errors::ErrorResponse)
    ),
    tag = "Books"
)]
async fn get_book(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    let book = state.services.catalog.get_by_slug(&slug).await?;
    Ok(success_response(book))
}
