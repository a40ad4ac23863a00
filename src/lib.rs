//! bookstore-api
//!
//! Backend for digital book sales: catalog reads, per-user carts, hosted
//! checkout through a payment provider, asynchronous payment-webhook
//! reconciliation, and reader entitlements.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod migrator;
pub mod money;
pub mod payments;
pub mod services;

use sea_orm::DatabaseConnection;
use std::sync::Arc;

pub use handlers::api_v1_routes;

/// Shared application state for the HTTP layer.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<config::AppConfig>,
    pub event_sender: events::EventSender,
    pub services: services::AppServices,
}
