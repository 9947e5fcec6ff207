// server/src/services/paytm.rs

//! Paytm gateway: checksum scheme, transaction initiation and order status.

use crate::config::PaytmSettings;
use crate::errors::{AppError, Result as AppResult};
use aes::Aes128;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use rand_core::{OsRng, RngCore};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use tracing::{debug, instrument};

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;

const CHECKSUM_IV: &[u8; 16] = b"@@@@&&&&####$$$$";
const SALT_LEN: usize = 4;
const CHECKSUM_FIELDS: [&str; 2] = ["CHECKSUMHASH", "SIGNATURE"];

pub const STATUS_SUCCESS: &str = "TXN_SUCCESS";
pub const STATUS_PENDING: &str = "PENDING";

fn cipher_key(merchant_key: &str) -> AppResult<&[u8]> {
  let key = merchant_key.as_bytes();
  if key.len() != 16 {
    return Err(AppError::Config("PAYTM_MERCHANT_KEY must be 16 characters".to_string()));
  }
  Ok(key)
}

/// Four base64 characters from three random bytes.
fn random_salt() -> String {
  let mut bytes = [0u8; 3];
  OsRng.fill_bytes(&mut bytes);
  BASE64.encode(bytes)
}

fn salted_hash(text: &str, salt: &str) -> String {
  let digest = Sha256::digest(format!("{}|{}", text, salt).as_bytes());
  format!("{}{}", hex::encode(digest), salt)
}

/// Checksum of an arbitrary string (Paytm sends JSON bodies signed this way).
pub fn generate_signature(text: &str, merchant_key: &str) -> AppResult<String> {
  generate_signature_with_salt(text, merchant_key, &random_salt())
}

fn generate_signature_with_salt(text: &str, merchant_key: &str, salt: &str) -> AppResult<String> {
  let key = cipher_key(merchant_key)?;
  let cipher = Aes128CbcEnc::new_from_slices(key, CHECKSUM_IV)
    .map_err(|e| AppError::Internal(format!("Paytm cipher init failed: {}", e)))?;
  let encrypted = cipher.encrypt_padded_vec_mut::<Pkcs7>(salted_hash(text, salt).as_bytes());
  Ok(BASE64.encode(encrypted))
}

/// Checks `checksum` against `text`; any decode failure counts as a mismatch.
pub fn verify_signature(text: &str, merchant_key: &str, checksum: &str) -> bool {
  let Ok(key) = cipher_key(merchant_key) else {
    return false;
  };
  let Ok(encrypted) = BASE64.decode(checksum.trim()) else {
    return false;
  };
  let Ok(cipher) = Aes128CbcDec::new_from_slices(key, CHECKSUM_IV) else {
    return false;
  };
  let Ok(decrypted) = cipher.decrypt_padded_vec_mut::<Pkcs7>(&encrypted) else {
    return false;
  };
  let Ok(hash_with_salt) = String::from_utf8(decrypted) else {
    return false;
  };
  if hash_with_salt.len() < SALT_LEN || !hash_with_salt.is_char_boundary(hash_with_salt.len() - SALT_LEN) {
    return false;
  }
  let salt = &hash_with_salt[hash_with_salt.len() - SALT_LEN..];
  salted_hash(text, salt) == hash_with_salt
}

/// Callback parameters joined the way Paytm signs them: sorted by key,
/// checksum fields removed, `null` values blanked, separated by `|`.
pub fn params_string(params: &BTreeMap<String, String>) -> String {
  params
    .iter()
    .filter(|(key, _)| !CHECKSUM_FIELDS.contains(&key.as_str()))
    .map(|(_, value)| if value.eq_ignore_ascii_case("null") { "" } else { value.as_str() })
    .collect::<Vec<_>>()
    .join("|")
}

pub fn callback_checksum(params: &BTreeMap<String, String>) -> Option<&str> {
  CHECKSUM_FIELDS
    .iter()
    .find_map(|field| params.get(*field))
    .map(String::as_str)
    .filter(|c| !c.is_empty())
}

/// Verifies a callback against its own `CHECKSUMHASH` (or `SIGNATURE`).
pub fn verify_callback(params: &BTreeMap<String, String>, merchant_key: &str) -> bool {
  match callback_checksum(params) {
    Some(checksum) => verify_signature(&params_string(params), merchant_key, checksum),
    None => false,
  }
}

/// Paytm reports `TXNDATE` as India Standard Time without an offset.
pub fn parse_txn_date(raw: &str) -> Option<DateTime<Utc>> {
  let raw = raw.trim();
  if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
    return Some(dt.with_timezone(&Utc));
  }
  let ist = FixedOffset::east_opt(5 * 3600 + 30 * 60)?;
  ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"]
    .iter()
    .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
    .and_then(|naive| ist.from_local_datetime(&naive).single())
    .map(|dt| dt.with_timezone(&Utc))
}

#[derive(Debug, Clone)]
pub struct InitiateRequest {
  pub order_id: String,
  pub amount: f64,
  pub customer_id: String,
  pub mobile: Option<String>,
  pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransactionStatus {
  pub status: String,
  pub txn_id: Option<String>,
  pub txn_date: Option<String>,
  pub message: Option<String>,
}

impl TransactionStatus {
  fn from_response(body: &Value) -> Self {
    let field = |name: &str| {
      body
        .pointer(&format!("/body/{}", name))
        .and_then(Value::as_str)
        .map(str::to_string)
        .filter(|v| !v.is_empty())
    };
    TransactionStatus {
      status: body
        .pointer("/body/resultInfo/resultStatus")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string(),
      txn_id: field("txnId"),
      txn_date: field("txnDate"),
      message: body
        .pointer("/body/resultInfo/resultMsg")
        .and_then(Value::as_str)
        .map(str::to_string),
    }
  }
}

#[async_trait]
pub trait PaytmApi: Send + Sync {
  /// Raw `initiateTransaction` response.
  async fn initiate_transaction(&self, request: &InitiateRequest) -> AppResult<Value>;

  async fn order_status(&self, order_id: &str) -> AppResult<TransactionStatus>;

  fn merchant_id(&self) -> Option<&str>;

  fn merchant_key(&self) -> Option<&str>;

  fn host(&self) -> &str;
}

pub struct PaytmClient {
  http: reqwest::Client,
  settings: PaytmSettings,
}

impl PaytmClient {
  pub fn new(http: reqwest::Client, settings: PaytmSettings) -> Self {
    Self { http, settings }
  }

  fn credentials(&self) -> AppResult<(&str, &str)> {
    match (self.settings.mid.as_deref(), self.settings.merchant_key.as_deref()) {
      (Some(mid), Some(key)) => Ok((mid, key)),
      _ => Err(AppError::Config(
        "PAYTM_MID or PAYTM_MERCHANT_KEY is not configured".to_string(),
      )),
    }
  }

  /// `{ body, head: { signature } }` with the signature over the serialized body.
  fn signed_envelope(body: &Value, merchant_key: &str) -> AppResult<Value> {
    let signature = generate_signature(&body.to_string(), merchant_key)?;
    Ok(json!({ "body": body, "head": { "signature": signature } }))
  }
}

#[async_trait]
impl PaytmApi for PaytmClient {
  #[instrument(name = "paytm::initiate_transaction", skip_all, fields(order_id = %request.order_id))]
  async fn initiate_transaction(&self, request: &InitiateRequest) -> AppResult<Value> {
    let (mid, key) = self.credentials()?;
    let callback_url = self.settings.callback_url.clone().unwrap_or_else(|| {
      format!(
        "{}/theia/paytmCallback?ORDER_ID={}",
        self.settings.host(),
        url::form_urlencoded::byte_serialize(request.order_id.as_bytes()).collect::<String>()
      )
    });

    let body = json!({
      "requestType": "Payment",
      "mid": mid,
      "websiteName": self.settings.website,
      "orderId": request.order_id,
      "callbackUrl": callback_url,
      "txnAmount": { "value": format!("{:.2}", request.amount), "currency": "INR" },
      "userInfo": {
        "custId": request.customer_id,
        "mobile": request.mobile.clone().unwrap_or_default(),
        "email": request.email.clone().unwrap_or_default(),
      },
    });
    let envelope = Self::signed_envelope(&body, key)?;

    let mut url = reqwest::Url::parse(&format!("{}/theia/api/v1/initiateTransaction", self.settings.host()))
      .map_err(|e| AppError::Internal(e.to_string()))?;
    url
      .query_pairs_mut()
      .append_pair("mid", mid)
      .append_pair("orderId", &request.order_id);

    let response = self.http.post(url).json(&envelope).send().await?;
    let data: Value = response.json().await?;
    debug!(result = ?data.pointer("/body/resultInfo"), "Paytm initiateTransaction answered.");
    Ok(data)
  }

  #[instrument(name = "paytm::order_status", skip(self))]
  async fn order_status(&self, order_id: &str) -> AppResult<TransactionStatus> {
    let (mid, key) = self.credentials()?;
    let body = json!({ "mid": mid, "orderId": order_id });
    let envelope = Self::signed_envelope(&body, key)?;
    let response = self
      .http
      .post(format!("{}/v3/order/status", self.settings.host()))
      .json(&envelope)
      .send()
      .await?;
    let data: Value = response.json().await?;
    Ok(TransactionStatus::from_response(&data))
  }

  fn merchant_id(&self) -> Option<&str> {
    self.settings.mid.as_deref()
  }

  fn merchant_key(&self) -> Option<&str> {
    self.settings.merchant_key.as_deref()
  }

  fn host(&self) -> &str {
    self.settings.host()
  }
}
