//! Stripe REST client and webhook signature verification.
//!
//! Requests use the form-encoded Stripe API directly over `reqwest`; webhook
//! signatures are the `Stripe-Signature: t=...,v1=...` HMAC-SHA256 scheme
//! computed over `"{timestamp}.{raw_body}"`.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;
use std::collections::HashMap;
use tracing::warn;

use super::{
    CheckoutMetadata, CreateSessionRequest, PaymentProvider, ProviderCustomer, ProviderError,
    ProviderSession, SignatureError, WebhookEvent, WebhookEventKind,
};

type HmacSha256 = Hmac<Sha256>;

const DEFAULT_API_BASE: &str = "https://api.stripe.com/v1";

pub struct StripeGateway {
    http: reqwest::Client,
    secret_key: String,
    webhook_secret: String,
    tolerance_secs: u64,
    api_base: String,
}

impl StripeGateway {
    pub fn new(secret_key: String, webhook_secret: String, tolerance_secs: u64) -> Self {
        Self {
            http: reqwest::Client::new(),
            secret_key,
            webhook_secret,
            tolerance_secs,
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }

    /// Points the client at a different API base, for local Stripe mocks.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    async fn post_form(&self, path: &str, form: &[(String, String)]) -> Result<Value, ProviderError> {
        let response = self
            .http
            .post(format!("{}{}", self.api_base, path))
            .basic_auth(&self.secret_key, None::<&str>)
            .form(form)
            .send()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;

        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| ProviderError::Response(e.to_string()))?;

        if !status.is_success() {
            let message = body
                .pointer("/error/message")
                .and_then(Value::as_str)
                .unwrap_or("unknown provider error");
            return Err(ProviderError::Response(format!("{}: {}", status, message)));
        }
        Ok(body)
    }

    async fn get_json(&self, path: &str) -> Result<Value, ProviderError> {
        let response = self
            .http
            .get(format!("{}{}", self.api_base, path))
            .basic_auth(&self.secret_key, None::<&str>)
            .send()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;

        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| ProviderError::Response(e.to_string()))?;

        if !status.is_success() {
            return Err(ProviderError::Response(status.to_string()));
        }
        Ok(body)
    }
}

fn metadata_from_json(value: &Value) -> HashMap<String, String> {
    value
        .get("metadata")
        .and_then(Value::as_object)
        .map(|obj| {
            obj.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

fn customer_from_json(body: &Value) -> Result<ProviderCustomer, ProviderError> {
    let id = body
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| ProviderError::Response("customer without id".into()))?;
    Ok(ProviderCustomer {
        id: id.to_string(),
        metadata: metadata_from_json(body),
    })
}

fn session_from_json(body: &Value) -> Result<ProviderSession, ProviderError> {
    let id = body
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| ProviderError::Response("session without id".into()))?;
    Ok(ProviderSession {
        id: id.to_string(),
        url: body.get("url").and_then(Value::as_str).map(str::to_string),
        customer_id: body
            .get("customer")
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}

#[async_trait]
impl PaymentProvider for StripeGateway {
    async fn create_customer(
        &self,
        name: &str,
        email: &str,
        metadata: CheckoutMetadata,
    ) -> Result<ProviderCustomer, ProviderError> {
        let mut form = vec![
            ("name".to_string(), name.to_string()),
            ("email".to_string(), email.to_string()),
        ];
        for (key, value) in metadata.to_map() {
            form.push((format!("metadata[{}]", key), value));
        }

        let body = self.post_form("/customers", &form).await?;
        customer_from_json(&body)
    }

    async fn create_checkout_session(
        &self,
        request: CreateSessionRequest,
    ) -> Result<ProviderSession, ProviderError> {
        let mut form = vec![
            ("mode".to_string(), "payment".to_string()),
            ("customer".to_string(), request.customer_id),
            ("success_url".to_string(), request.success_url),
            ("cancel_url".to_string(), request.cancel_url),
            (
                "payment_method_types[0]".to_string(),
                "card".to_string(),
            ),
        ];
        for (i, item) in request.line_items.iter().enumerate() {
            form.push((format!("line_items[{}][quantity]", i), item.quantity.to_string()));
            form.push((
                format!("line_items[{}][price_data][currency]", i),
                request.currency.clone(),
            ));
            form.push((
                format!("line_items[{}][price_data][unit_amount]", i),
                item.unit_amount.to_string(),
            ));
            form.push((
                format!("line_items[{}][price_data][product_data][name]", i),
                item.name.clone(),
            ));
        }

        let body = self.post_form("/checkout/sessions", &form).await?;
        session_from_json(&body)
    }

    async fn retrieve_session(&self, session_id: &str) -> Result<ProviderSession, ProviderError> {
        let body = self
            .get_json(&format!("/checkout/sessions/{}", session_id))
            .await?;
        session_from_json(&body)
    }

    async fn retrieve_customer(
        &self,
        customer_id: &str,
    ) -> Result<ProviderCustomer, ProviderError> {
        let body = self.get_json(&format!("/customers/{}", customer_id)).await?;
        customer_from_json(&body)
    }

    fn verify_webhook(
        &self,
        payload: &[u8],
        signature_header: Option<&str>,
    ) -> Result<WebhookEvent, SignatureError> {
        let header = signature_header.ok_or(SignatureError::Missing)?;
        verify_signature(
            payload,
            header,
            &self.webhook_secret,
            self.tolerance_secs,
            chrono::Utc::now().timestamp(),
        )?;
        parse_event(payload)
    }
}

/// Checks a `t=...,v1=...` header against the HMAC of `"{t}.{payload}"`.
pub(crate) fn verify_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    tolerance_secs: u64,
    now: i64,
) -> Result<(), SignatureError> {
    let mut timestamp = "";
    let mut candidates: Vec<&str> = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value,
            Some(("v1", value)) => candidates.push(value),
            _ => {}
        }
    }
    if timestamp.is_empty() || candidates.is_empty() {
        return Err(SignatureError::Malformed);
    }

    let ts: i64 = timestamp.parse().map_err(|_| SignatureError::Malformed)?;
    if (now - ts).unsigned_abs() > tolerance_secs {
        return Err(SignatureError::Expired);
    }

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| SignatureError::Malformed)?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);
    let expected = hex::encode(mac.finalize().into_bytes());

    if candidates.iter().any(|sig| constant_time_eq(&expected, sig)) {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}

/// Parses a verified event payload into the narrowed event union. Only two
/// payment-intent outcomes carry meaning here; everything else is `Other`.
pub(crate) fn parse_event(payload: &[u8]) -> Result<WebhookEvent, SignatureError> {
    let json: Value =
        serde_json::from_slice(payload).map_err(|e| SignatureError::Payload(e.to_string()))?;

    let id = json
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| SignatureError::Payload("event without id".into()))?
        .to_string();
    let event_type = json
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();
    let object = json.pointer("/data/object").cloned().unwrap_or(Value::Null);

    let kind = match event_type.as_str() {
        "payment_intent.succeeded" => {
            let customer_id = require_str(&object, "customer")?;
            let payment_id = require_str(&object, "id")?;
            let amount_received = object
                .get("amount_received")
                .and_then(Value::as_i64)
                .ok_or_else(|| SignatureError::Payload("missing amount_received".into()))?;
            let status = object
                .get("status")
                .and_then(Value::as_str)
                .unwrap_or("succeeded")
                .to_string();
            WebhookEventKind::PaymentSucceeded {
                customer_id,
                payment_id,
                amount_received,
                status,
            }
        }
        "payment_intent.payment_failed" => {
            let customer_id = require_str(&object, "customer")?;
            let payment_id = object
                .get("id")
                .and_then(Value::as_str)
                .map(str::to_string);
            let status = object
                .get("status")
                .and_then(Value::as_str)
                .unwrap_or("failed")
                .to_string();
            let error_message = object
                .pointer("/last_payment_error/message")
                .and_then(Value::as_str)
                .unwrap_or("payment failed")
                .to_string();
            WebhookEventKind::PaymentFailed {
                customer_id,
                payment_id,
                status,
                error_message,
            }
        }
        other => {
            if other.is_empty() {
                warn!("webhook event {} carries no type", id);
            }
            WebhookEventKind::Other {
                event_type: event_type.clone(),
            }
        }
    };

    Ok(WebhookEvent { id, kind })
}

fn require_str(object: &Value, key: &str) -> Result<String, SignatureError> {
    object
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| SignatureError::Payload(format!("missing {}", key)))
}
