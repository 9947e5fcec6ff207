// core/src/signing.rs

//! HMAC-SHA256 payment tokens and payment signatures.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

pub const PAYMENT_TOKEN_TTL_MINUTES: i64 = 15;
/// How far ahead of the verifier's clock a token timestamp may be.
pub const PAYMENT_TOKEN_CLOCK_SKEW_SECS: i64 = 60;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
  #[error("Payment token is malformed")]
  Malformed,
  #[error("Payment token signature does not match")]
  BadSignature,
  #[error("Payment token has expired")]
  Expired,
  #[error("Payment token is not yet valid")]
  NotYetValid,
}

/// The signed half of a payment token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentTokenData {
  pub order_id: String,
  pub amount: f64,
  pub user_id: String,
  /// Milliseconds since the Unix epoch.
  pub timestamp: i64,
}

#[derive(Serialize, Deserialize)]
struct TokenEnvelope {
  data: PaymentTokenData,
  token: String,
}

/// Holds the server secret and produces/validates everything signed with it.
#[derive(Clone)]
pub struct PaymentSigner {
  secret: Vec<u8>,
}

impl std::fmt::Debug for PaymentSigner {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("PaymentSigner").field("secret", &"<redacted>").finish()
  }
}

impl PaymentSigner {
  pub fn new(secret: impl AsRef<[u8]>) -> Self {
    Self {
      secret: secret.as_ref().to_vec(),
    }
  }

  /// A signer keyed with 32 random bytes, for deployments without a configured secret.
  /// Tokens and signatures do not survive a restart.
  pub fn ephemeral() -> Self {
    let mut secret = [0u8; 32];
    OsRng.fill_bytes(&mut secret);
    Self::new(hex::encode(secret))
  }

  fn sign_hex(&self, message: &[u8]) -> String {
    hmac_sha256_hex(&self.secret, message)
  }

  fn verify_hex(&self, message: &[u8], signature_hex: &str) -> bool {
    verify_hmac_sha256_hex(&self.secret, message, signature_hex)
  }

  pub fn create_payment_token(&self, order_id: &str, amount: f64, user_id: &str, now: DateTime<Utc>) -> String {
    let data = PaymentTokenData {
      order_id: order_id.to_string(),
      amount,
      user_id: user_id.to_string(),
      timestamp: now.timestamp_millis(),
    };
    // Serializing a struct of strings and numbers cannot fail.
    let payload = serde_json::to_vec(&data).unwrap_or_default();
    let envelope = TokenEnvelope {
      token: self.sign_hex(&payload),
      data,
    };
    BASE64.encode(serde_json::to_vec(&envelope).unwrap_or_default())
  }

  pub fn verify_payment_token(&self, token: &str, now: DateTime<Utc>) -> Result<PaymentTokenData, TokenError> {
    let raw = BASE64.decode(token.trim()).map_err(|_| TokenError::Malformed)?;
    let envelope: TokenEnvelope = serde_json::from_slice(&raw).map_err(|_| TokenError::Malformed)?;
    let payload = serde_json::to_vec(&envelope.data).map_err(|_| TokenError::Malformed)?;

    if !self.verify_hex(&payload, &envelope.token) {
      return Err(TokenError::BadSignature);
    }

    let age = now.timestamp_millis().saturating_sub(envelope.data.timestamp);
    if age < -Duration::seconds(PAYMENT_TOKEN_CLOCK_SKEW_SECS).num_milliseconds() {
      return Err(TokenError::NotYetValid);
    }
    if age > Duration::minutes(PAYMENT_TOKEN_TTL_MINUTES).num_milliseconds() {
      return Err(TokenError::Expired);
    }
    Ok(envelope.data)
  }

  /// Hex HMAC over `orderId|paymentId|amount`.
  pub fn payment_signature(&self, order_id: &str, payment_id: &str, amount: f64) -> String {
    self.sign_hex(signature_text(order_id, payment_id, amount).as_bytes())
  }

  /// Constant-time check of a signature produced by [`PaymentSigner::payment_signature`].
  pub fn verify_payment_signature(&self, order_id: &str, payment_id: &str, amount: f64, signature: &str) -> bool {
    self.verify_hex(signature_text(order_id, payment_id, amount).as_bytes(), signature)
  }
}

/// `1.0` renders as `1` and `723.89` as `723.89`.
fn signature_text(order_id: &str, payment_id: &str, amount: f64) -> String {
  format!("{}|{}|{}", order_id, payment_id, amount)
}

/// Verifies a hex HMAC-SHA256 of `message` under `secret` in constant time.
pub fn verify_hmac_sha256_hex(secret: &[u8], message: &[u8], signature_hex: &str) -> bool {
  let Ok(expected) = hex::decode(signature_hex.trim()) else {
    return false;
  };
  match HmacSha256::new_from_slice(secret) {
    Ok(mut mac) => {
      mac.update(message);
      mac.verify_slice(&expected).is_ok()
    }
    Err(_) => false,
  }
}

pub fn hmac_sha256_hex(secret: &[u8], message: &[u8]) -> String {
  match HmacSha256::new_from_slice(secret) {
    Ok(mut mac) => {
      mac.update(message);
      hex::encode(mac.finalize().into_bytes())
    }
    Err(_) => String::new(),
  }
}
