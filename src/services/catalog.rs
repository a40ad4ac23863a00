use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder};
use serde::Serialize;
use std::sync::Arc;
use tracing::instrument;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    entities::{book, Book, BookModel},
    errors::ServiceError,
    money::format_minor_units,
};

/// Read-only catalog lookups. Authoring and publishing live elsewhere; the
/// checkout core only ever reads price and status from here.
#[derive(Clone)]
pub struct CatalogService {
    db: Arc<DatabaseConnection>,
}

/// Price pair formatted for display.
#[derive(Debug, Serialize, ToSchema)]
pub struct PriceView {
    pub mrp: String,
    pub sale: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BookView {
    pub id: Uuid,
    pub title: String,
    pub slug: String,
    pub author: String,
    pub status: book::BookStatus,
    pub price: PriceView,
    pub cover: Option<String>,
}

impl From<BookModel> for BookView {
    fn from(book: BookModel) -> Self {
        Self {
            id: book.id,
            title: book.title,
            slug: book.slug,
            author: book.author_name,
            status: book.status,
            price: PriceView {
                mrp: format_minor_units(book.price_mrp),
                sale: format_minor_units(book.price_sale),
            },
            cover: book.cover_url,
        }
    }
}

impl CatalogService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self))]
    pub async fn list_published(&self) -> Result<Vec<BookView>, ServiceError> {
        let books = Book::find()
            .filter(book::Column::Status.eq(book::BookStatus::Published))
            .order_by_desc(book::Column::CreatedAt)
            .all(&*self.db)
            .await?;
        Ok(books.into_iter().map(BookView::from).collect())
    }

    #[instrument(skip(self))]
    pub async fn get_by_slug(&self, slug: &str) -> Result<BookView, ServiceError> {
        let book = Book::find()
            .filter(book::Column::Slug.eq(slug))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Book '{}' not found", slug)))?;
        Ok(book.into())
    }
}
