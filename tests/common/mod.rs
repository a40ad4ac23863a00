//! Shared test harness: in-memory SQLite with the full schema applied, and a
//! scripted in-process payment provider standing in for Stripe.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use sea_orm::{ActiveModelTrait, Database, DatabaseConnection, Set};
use sea_orm_migration::MigratorTrait;
use serde_json::Value;
use sha2::Sha256;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use bookstore_api::{
    auth::AuthenticatedUser,
    config::AppConfig,
    entities::{book, user},
    events::EventSender,
    migrator::Migrator,
    payments::{
        CheckoutMetadata, CreateSessionRequest, PaymentProvider, ProviderCustomer, ProviderError,
        ProviderSession, SignatureError, WebhookEvent, WebhookEventKind,
    },
    services::AppServices,
};

type HmacSha256 = Hmac<Sha256>;

pub const TEST_WEBHOOK_SECRET: &str = "whsec_test_secret";

/// Scripted payment provider. Customers and sessions live in memory and the
/// webhook signature scheme matches the production gateway's
/// `t=...,v1=...` HMAC format.
pub struct FakeProvider {
    customers: Mutex<HashMap<String, ProviderCustomer>>,
    sessions: Mutex<HashMap<String, ProviderSession>>,
    counter: AtomicU64,
    pub fail_customer_creation: AtomicBool,
    pub fail_session_creation: AtomicBool,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self {
            customers: Mutex::new(HashMap::new()),
            sessions: Mutex::new(HashMap::new()),
            counter: AtomicU64::new(0),
            fail_customer_creation: AtomicBool::new(false),
            fail_session_creation: AtomicBool::new(false),
        }
    }

    fn next(&self, prefix: &str) -> String {
        format!("{}_{}", prefix, self.counter.fetch_add(1, Ordering::SeqCst))
    }

    /// The most recently created customer id, i.e. the one the next webhook
    /// event should reference.
    pub fn last_customer_id(&self) -> Option<String> {
        let customers = self.customers.lock().unwrap();
        let last = self.counter.load(Ordering::SeqCst);
        (0..last)
            .rev()
            .map(|n| format!("cus_{}", n))
            .find(|id| customers.contains_key(id))
    }

    pub fn last_session_id(&self) -> Option<String> {
        let sessions = self.sessions.lock().unwrap();
        let last = self.counter.load(Ordering::SeqCst);
        (0..last)
            .rev()
            .map(|n| format!("cs_{}", n))
            .find(|id| sessions.contains_key(id))
    }

    /// Registers a customer directly, for stale-correlation scenarios.
    pub fn inject_customer(&self, metadata: HashMap<String, String>) -> String {
        let id = self.next("cus");
        self.customers.lock().unwrap().insert(
            id.clone(),
            ProviderCustomer {
                id: id.clone(),
                metadata,
            },
        );
        id
    }
}

#[async_trait]
impl PaymentProvider for FakeProvider {
    async fn create_customer(
        &self,
        _name: &str,
        _email: &str,
        metadata: CheckoutMetadata,
    ) -> Result<ProviderCustomer, ProviderError> {
        if self.fail_customer_creation.load(Ordering::SeqCst) {
            return Err(ProviderError::Request("scripted customer failure".into()));
        }
        let id = self.next("cus");
        let customer = ProviderCustomer {
            id: id.clone(),
            metadata: metadata.to_map(),
        };
        self.customers.lock().unwrap().insert(id, customer.clone());
        Ok(customer)
    }

    async fn create_checkout_session(
        &self,
        request: CreateSessionRequest,
    ) -> Result<ProviderSession, ProviderError> {
        if self.fail_session_creation.load(Ordering::SeqCst) {
            return Err(ProviderError::Request("scripted session failure".into()));
        }
        let id = self.next("cs");
        let session = ProviderSession {
            id: id.clone(),
            url: Some(format!("https://pay.test/{}", id)),
            customer_id: Some(request.customer_id),
        };
        self.sessions.lock().unwrap().insert(id, session.clone());
        Ok(session)
    }

    async fn retrieve_session(&self, session_id: &str) -> Result<ProviderSession, ProviderError> {
        self.sessions
            .lock()
            .unwrap()
            .get(session_id)
            .cloned()
            .ok_or_else(|| ProviderError::Response("no such session".into()))
    }

    async fn retrieve_customer(
        &self,
        customer_id: &str,
    ) -> Result<ProviderCustomer, ProviderError> {
        self.customers
            .lock()
            .unwrap()
            .get(customer_id)
            .cloned()
            .ok_or_else(|| ProviderError::Response("no such customer".into()))
    }

    fn verify_webhook(
        &self,
        payload: &[u8],
        signature_header: Option<&str>,
    ) -> Result<WebhookEvent, SignatureError> {
        let header = signature_header.ok_or(SignatureError::Missing)?;
        let (ts, sig) = parse_header(header)?;

        let expected = signature_for(payload, TEST_WEBHOOK_SECRET, ts);
        if sig != expected {
            return Err(SignatureError::Mismatch);
        }

        parse_test_event(payload)
    }
}

fn parse_header(header: &str) -> Result<(i64, String), SignatureError> {
    let mut ts = None;
    let mut sig = None;
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => ts = value.parse().ok(),
            Some(("v1", value)) => sig = Some(value.to_string()),
            _ => {}
        }
    }
    match (ts, sig) {
        (Some(ts), Some(sig)) => Ok((ts, sig)),
        _ => Err(SignatureError::Malformed),
    }
}

fn signature_for(payload: &[u8], secret: &str, ts: i64) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(ts.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Signs a payload the way the provider would.
pub fn sign_payload(payload: &[u8]) -> String {
    let ts = Utc::now().timestamp();
    format!(
        "t={},v1={}",
        ts,
        signature_for(payload, TEST_WEBHOOK_SECRET, ts)
    )
}

fn parse_test_event(payload: &[u8]) -> Result<WebhookEvent, SignatureError> {
    let json: Value =
        serde_json::from_slice(payload).map_err(|e| SignatureError::Payload(e.to_string()))?;
    let id = json["id"]
        .as_str()
        .ok_or_else(|| SignatureError::Payload("event without id".into()))?
        .to_string();
    let event_type = json["type"].as_str().unwrap_or("").to_string();
    let object = &json["data"]["object"];

    let kind = match event_type.as_str() {
        "payment_intent.succeeded" => WebhookEventKind::PaymentSucceeded {
            customer_id: object["customer"].as_str().unwrap_or_default().to_string(),
            payment_id: object["id"].as_str().unwrap_or_default().to_string(),
            amount_received: object["amount_received"].as_i64().unwrap_or(0),
            status: object["status"].as_str().unwrap_or("succeeded").to_string(),
        },
        "payment_intent.payment_failed" => WebhookEventKind::PaymentFailed {
            customer_id: object["customer"].as_str().unwrap_or_default().to_string(),
            payment_id: object["id"].as_str().map(str::to_string),
            status: object["status"].as_str().unwrap_or("failed").to_string(),
            error_message: object["last_payment_error"]["message"]
                .as_str()
                .unwrap_or("payment failed")
                .to_string(),
        },
        _ => WebhookEventKind::Other { event_type },
    };

    Ok(WebhookEvent { id, kind })
}

pub struct TestApp {
    pub db: Arc<DatabaseConnection>,
    pub services: AppServices,
    pub provider: Arc<FakeProvider>,
    pub config: Arc<AppConfig>,
    pub event_sender: EventSender,
}

impl TestApp {
    pub async fn new() -> Self {
        let db = Database::connect("sqlite::memory:")
            .await
            .expect("in-memory sqlite");
        Migrator::up(&db, None).await.expect("migrations");
        let db = Arc::new(db);

        let (tx, mut rx) = tokio::sync::mpsc::channel(64);
        // Drain events so senders never block.
        tokio::spawn(async move { while rx.recv().await.is_some() {} });
        let event_sender = EventSender::new(tx);

        let provider = Arc::new(FakeProvider::new());
        let config = Arc::new(test_config());

        let services = AppServices::new(
            db.clone(),
            provider.clone(),
            Arc::new(event_sender.clone()),
            config.clone(),
        );

        Self {
            db,
            services,
            provider,
            config,
            event_sender,
        }
    }

    /// The full v1 router wired to this app's state, for transport-level
    /// tests driven with `tower::ServiceExt::oneshot`.
    pub fn router(&self) -> axum::Router {
        let state = Arc::new(bookstore_api::AppState {
            db: self.db.clone(),
            config: self.config.clone(),
            event_sender: self.event_sender.clone(),
            services: self.services.clone(),
        });
        axum::Router::new()
            .nest("/api/v1", bookstore_api::api_v1_routes())
            .with_state(state)
    }

    pub async fn seed_user(&self, username: &str) -> AuthenticatedUser {
        let model = user::ActiveModel {
            id: Set(Uuid::new_v4()),
            username: Set(username.to_string()),
            email: Set(format!("{}@test.example", username)),
            password_hash: Set("argon2-hash-placeholder".to_string()),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await
        .expect("seed user");
        model.into()
    }

    pub async fn seed_book(&self, slug: &str, sale_cents: i64, status: book::BookStatus) -> Uuid {
        let id = Uuid::new_v4();
        book::ActiveModel {
            id: Set(id),
            author_name: Set("Test Author".to_string()),
            title: Set(format!("Book {}", slug)),
            slug: Set(slug.to_string()),
            status: Set(status),
            price_mrp: Set(sale_cents * 2),
            price_sale: Set(sale_cents),
            cover_url: Set(None),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await
        .expect("seed book");
        id
    }
}

fn test_config() -> AppConfig {
    AppConfig {
        database_url: "sqlite::memory:".into(),
        host: "127.0.0.1".into(),
        port: 0,
        environment: "development".into(),
        log_level: "debug".into(),
        log_json: false,
        auto_migrate: true,
        jwt_secret: "integration-test-secret".into(),
        jwt_expiration: 3600,
        stripe_secret_key: "sk_test_fake".into(),
        stripe_webhook_secret: TEST_WEBHOOK_SECRET.into(),
        webhook_tolerance_secs: 300,
        payment_success_url: "http://localhost/success".into(),
        payment_cancel_url: "http://localhost/cancel".into(),
        currency: "usd".into(),
    }
}

/// Builds a signed `payment_intent.succeeded` payload for a customer.
pub fn success_event(event_id: &str, customer_id: &str, amount: i64) -> (Vec<u8>, String) {
    let payload = serde_json::json!({
        "id": event_id,
        "type": "payment_intent.succeeded",
        "data": {"object": {
            "id": format!("pi_{}", event_id),
            "customer": customer_id,
            "amount_received": amount,
            "status": "succeeded"
        }}
    });
    let bytes = serde_json::to_vec(&payload).unwrap();
    let header = sign_payload(&bytes);
    (bytes, header)
}

/// Builds a signed `payment_intent.payment_failed` payload.
pub fn failure_event(event_id: &str, customer_id: &str, message: &str) -> (Vec<u8>, String) {
    let payload = serde_json::json!({
        "id": event_id,
        "type": "payment_intent.payment_failed",
        "data": {"object": {
            "id": format!("pi_{}", event_id),
            "customer": customer_id,
            "status": "requires_payment_method",
            "last_payment_error": {"message": message}
        }}
    });
    let bytes = serde_json::to_vec(&payload).unwrap();
    let header = sign_payload(&bytes);
    (bytes, header)
}
