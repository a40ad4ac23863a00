//! Payment provider seam.
//!
//! The checkout initiator and webhook reconciler talk to the provider only
//! through [`PaymentProvider`], so tests can substitute a scripted fake and
//! no module-level SDK singleton exists.

pub mod stripe;

use async_trait::async_trait;
use std::collections::HashMap;
use uuid::Uuid;

pub use stripe::StripeGateway;

/// Metadata attached to the provider customer at checkout time. This is the
/// sole channel by which a later webhook event is correlated back to the
/// internal order and user, so it must round-trip through the provider
/// verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckoutMetadata {
    pub user_id: Uuid,
    pub order_id: Uuid,
    pub kind: CheckoutKind,
}

/// Distinguishes a multi-item cart checkout from a single-item instant
/// purchase; decides whether the reconciler clears the cart on success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutKind {
    Cart,
    Instant,
}

impl CheckoutKind {
    pub fn as_tag(&self) -> &'static str {
        match self {
            CheckoutKind::Cart => "checkout",
            CheckoutKind::Instant => "instant-checkout",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "checkout" => Some(CheckoutKind::Cart),
            "instant-checkout" => Some(CheckoutKind::Instant),
            _ => None,
        }
    }
}

impl CheckoutMetadata {
    pub fn to_map(&self) -> HashMap<String, String> {
        HashMap::from([
            ("userId".to_string(), self.user_id.to_string()),
            ("orderId".to_string(), self.order_id.to_string()),
            ("type".to_string(), self.kind.as_tag().to_string()),
        ])
    }

    /// Parses the metadata bag echoed back by the provider. `None` when any
    /// key is missing or malformed; the reconciler treats that as a stale
    /// correlation and drops the event.
    pub fn from_map(map: &HashMap<String, String>) -> Option<Self> {
        let user_id = map.get("userId")?.parse().ok()?;
        let order_id = map.get("orderId")?.parse().ok()?;
        let kind = CheckoutKind::from_tag(map.get("type")?)?;
        Some(Self {
            user_id,
            order_id,
            kind,
        })
    }
}

/// Customer record as seen at the provider.
#[derive(Debug, Clone)]
pub struct ProviderCustomer {
    pub id: String,
    pub metadata: HashMap<String, String>,
}

/// Hosted checkout session.
#[derive(Debug, Clone)]
pub struct ProviderSession {
    pub id: String,
    pub url: Option<String>,
    pub customer_id: Option<String>,
}

/// One priced line of a hosted checkout session.
#[derive(Debug, Clone)]
pub struct SessionLineItem {
    pub name: String,
    /// Unit amount in minor currency units.
    pub unit_amount: i64,
    pub quantity: i32,
}

#[derive(Debug, Clone)]
pub struct CreateSessionRequest {
    pub customer_id: String,
    pub currency: String,
    pub line_items: Vec<SessionLineItem>,
    pub success_url: String,
    pub cancel_url: String,
}

/// A verified webhook event, already narrowed to the kinds this system acts
/// on. Everything else arrives as `Other` and is acknowledged unchanged.
#[derive(Debug, Clone)]
pub struct WebhookEvent {
    pub id: String,
    pub kind: WebhookEventKind,
}

#[derive(Debug, Clone)]
pub enum WebhookEventKind {
    PaymentSucceeded {
        customer_id: String,
        payment_id: String,
        amount_received: i64,
        status: String,
    },
    PaymentFailed {
        customer_id: String,
        payment_id: Option<String>,
        status: String,
        error_message: String,
    },
    Other {
        event_type: String,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("provider request failed: {0}")]
    Request(String),
    #[error("provider returned an unexpected response: {0}")]
    Response(String),
}

/// Raised only by signature verification; the webhook transport drops the
/// payload without retry semantics when it sees this.
#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("missing signature header")]
    Missing,
    #[error("malformed signature header")]
    Malformed,
    #[error("signature timestamp outside tolerance")]
    Expired,
    #[error("signature mismatch")]
    Mismatch,
    #[error("payload is not a valid event: {0}")]
    Payload(String),
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Creates a customer record carrying the correlation metadata.
    async fn create_customer(
        &self,
        name: &str,
        email: &str,
        metadata: CheckoutMetadata,
    ) -> Result<ProviderCustomer, ProviderError>;

    /// Creates a hosted payment session and returns its redirect URL.
    async fn create_checkout_session(
        &self,
        request: CreateSessionRequest,
    ) -> Result<ProviderSession, ProviderError>;

    async fn retrieve_session(&self, session_id: &str) -> Result<ProviderSession, ProviderError>;

    async fn retrieve_customer(&self, customer_id: &str)
        -> Result<ProviderCustomer, ProviderError>;

    /// Verifies the signature over the exact raw bytes and parses the event.
    fn verify_webhook(
        &self,
        payload: &[u8],
        signature_header: Option<&str>,
    ) -> Result<WebhookEvent, SignatureError>;
}
