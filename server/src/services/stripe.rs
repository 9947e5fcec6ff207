// server/src/services/stripe.rs

//! Stripe payment intents and webhook signature verification.

use crate::config::StripeSettings;
use crate::errors::{AppError, Result as AppResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use protocol_zero_core::signing::verify_hmac_sha256_hex;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;
use tracing::{instrument, warn};

const PAYMENT_INTENTS_URL: &str = "https://api.stripe.com/v1/payment_intents";
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

pub const EVENT_PAYMENT_SUCCEEDED: &str = "payment_intent.succeeded";
pub const EVENT_PAYMENT_FAILED: &str = "payment_intent.payment_failed";

#[derive(Debug, Clone)]
pub struct IntentRequest {
  pub order_id: String,
  pub user_id: String,
  pub user_name: String,
  pub amount: f64,
  pub currency: String,
}

impl IntentRequest {
  /// Minor currency units (paise, cents).
  pub fn amount_minor(&self) -> i64 {
    (self.amount * 100.0).round() as i64
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentIntent {
  pub id: String,
  #[serde(default)]
  pub client_secret: Option<String>,
}

#[async_trait]
pub trait StripeApi: Send + Sync {
  async fn create_payment_intent(&self, request: &IntentRequest) -> AppResult<PaymentIntent>;
}

pub struct StripeClient {
  http: reqwest::Client,
  settings: StripeSettings,
}

impl StripeClient {
  pub fn new(http: reqwest::Client, settings: StripeSettings) -> Self {
    Self { http, settings }
  }
}

#[async_trait]
impl StripeApi for StripeClient {
  #[instrument(name = "stripe::create_payment_intent", skip_all, fields(order_id = %request.order_id))]
  async fn create_payment_intent(&self, request: &IntentRequest) -> AppResult<PaymentIntent> {
    let secret_key = self.settings.secret_key.as_deref().ok_or_else(|| {
      AppError::Config("Stripe is not configured. Please add STRIPE_SECRET_KEY to your environment variables.".into())
    })?;

    let form = [
      ("amount", request.amount_minor().to_string()),
      ("currency", request.currency.to_ascii_lowercase()),
      ("metadata[orderId]", request.order_id.clone()),
      ("metadata[userId]", request.user_id.clone()),
      ("metadata[userName]", request.user_name.clone()),
      ("automatic_payment_methods[enabled]", "true".to_string()),
    ];
    let response = self
      .http
      .post(PAYMENT_INTENTS_URL)
      .basic_auth(secret_key, None::<&str>)
      .form(&form)
      .send()
      .await?;

    if !response.status().is_success() {
      let status = response.status();
      let body: Value = response.json().await.unwrap_or_default();
      let message = body
        .pointer("/error/message")
        .and_then(Value::as_str)
        .unwrap_or("Failed to create payment intent")
        .to_string();
      warn!(%status, %message, "Stripe rejected the payment intent.");
      return Err(AppError::Upstream(message));
    }
    Ok(response.json::<PaymentIntent>().await?)
  }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SignatureError {
  #[error("Stripe-Signature header is malformed")]
  Malformed,
  #[error("Stripe-Signature timestamp is outside the tolerance")]
  Stale,
  #[error("No v1 signature matches the payload")]
  Mismatch,
}

/// Checks a `Stripe-Signature: t=<unix>,v1=<hex>[,v1=..]` header against the
/// raw request body: HMAC-SHA256 of `"{t}.{payload}"`, timestamps within
/// [`SIGNATURE_TOLERANCE_SECS`] of `now`.
pub fn verify_webhook_signature(
  payload: &[u8],
  header: &str,
  secret: &str,
  now: DateTime<Utc>,
) -> Result<(), SignatureError> {
  let mut timestamp: Option<i64> = None;
  let mut signatures = Vec::new();
  for part in header.split(',') {
    let Some((key, value)) = part.trim().split_once('=') else {
      continue;
    };
    match key {
      "t" => timestamp = value.parse().ok(),
      "v1" => signatures.push(value),
      _ => {}
    }
  }
  let timestamp = timestamp.ok_or(SignatureError::Malformed)?;
  if signatures.is_empty() {
    return Err(SignatureError::Malformed);
  }
  if now.timestamp().abs_diff(timestamp) > SIGNATURE_TOLERANCE_SECS.unsigned_abs() {
    return Err(SignatureError::Stale);
  }

  let mut signed = format!("{}.", timestamp).into_bytes();
  signed.extend_from_slice(payload);
  if signatures
    .iter()
    .any(|sig| verify_hmac_sha256_hex(secret.as_bytes(), &signed, sig))
  {
    Ok(())
  } else {
    Err(SignatureError::Mismatch)
  }
}

/// The subset of a webhook event the server acts on.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeEvent {
  #[serde(rename = "type")]
  pub event_type: String,
  pub data: StripeEventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeEventData {
  pub object: StripeIntentObject,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeIntentObject {
  #[serde(default)]
  pub id: String,
  #[serde(default)]
  pub metadata: HashMap<String, String>,
  #[serde(default)]
  pub last_payment_error: Option<Value>,
}

impl StripeIntentObject {
  pub fn order_id(&self) -> Option<&str> {
    self.metadata.get("orderId").map(String::as_str).filter(|id| !id.is_empty())
  }

  pub fn failure_message(&self) -> String {
    self
      .last_payment_error
      .as_ref()
      .and_then(|e| e.get("message"))
      .and_then(Value::as_str)
      .unwrap_or("Stripe payment failed")
      .to_string()
  }
}
