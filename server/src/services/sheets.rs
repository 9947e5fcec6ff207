// server/src/services/sheets.rs

//! Google Sheets v4 values API, authenticated as a service account.

use crate::config::GoogleSettings;
use crate::errors::{AppError, Result as AppResult};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use parking_lot::Mutex;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, instrument, warn};

const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const SHEETS_API_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const SPREADSHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";

#[async_trait]
pub trait SheetsApi: Send + Sync {
  /// Cell text of `range`; every value is rendered as a string.
  async fn get_values(&self, sheet_id: &str, range: &str) -> AppResult<Vec<Vec<String>>>;

  /// Writes a single cell with `valueInputOption=RAW`.
  async fn update_cell(&self, sheet_id: &str, range: &str, value: &str) -> AppResult<()>;

  /// Appends one row with `USER_ENTERED` / `INSERT_ROWS`.
  async fn append_row(&self, sheet_id: &str, range: &str, row: Vec<String>) -> AppResult<()>;
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
  iss: &'a str,
  scope: &'a str,
  aud: &'a str,
  iat: i64,
  exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
  access_token: String,
  #[serde(default = "default_expires_in")]
  expires_in: i64,
}

fn default_expires_in() -> i64 {
  3600
}

#[derive(Debug, Clone)]
struct CachedToken {
  access_token: String,
  refresh_after: DateTime<Utc>,
}

pub struct GoogleSheetsClient {
  http: reqwest::Client,
  settings: GoogleSettings,
  token: Mutex<Option<CachedToken>>,
}

impl GoogleSheetsClient {
  pub fn new(http: reqwest::Client, settings: GoogleSettings) -> Self {
    Self {
      http,
      settings,
      token: Mutex::new(None),
    }
  }

  fn credentials(&self) -> AppResult<(&str, &str)> {
    match (
      self.settings.service_account_email.as_deref(),
      self.settings.private_key.as_deref(),
    ) {
      (Some(email), Some(key)) => Ok((email, key)),
      _ => Err(AppError::Config("Google service account is not configured".to_string())),
    }
  }

  /// Signed RS256 assertion for the JWT-bearer grant.
  fn assertion(&self, now: DateTime<Utc>) -> AppResult<String> {
    let (email, private_key) = self.credentials()?;
    let claims = AssertionClaims {
      iss: email,
      scope: SPREADSHEETS_SCOPE,
      aud: TOKEN_URL,
      iat: now.timestamp(),
      exp: (now + Duration::hours(1)).timestamp(),
    };
    let key = EncodingKey::from_rsa_pem(private_key.as_bytes())
      .map_err(|e| AppError::Config(format!("Invalid GOOGLE_PRIVATE_KEY: {}", e)))?;
    jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &key)
      .map_err(|e| AppError::Internal(format!("Failed to sign Google assertion: {}", e)))
  }

  async fn access_token(&self) -> AppResult<String> {
    let now = Utc::now();
    let cached = self.token.lock().clone();
    if let Some(cached) = cached.filter(|c| now < c.refresh_after) {
      return Ok(cached.access_token);
    }

    debug!("Requesting a new Google access token.");
    let assertion = self.assertion(now)?;
    let response = self
      .http
      .post(TOKEN_URL)
      .form(&[
        ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
        ("assertion", assertion.as_str()),
      ])
      .send()
      .await?;
    if !response.status().is_success() {
      let status = response.status();
      let body = response.text().await.unwrap_or_default();
      warn!(%status, %body, "Google token endpoint rejected the assertion.");
      return Err(AppError::Upstream("Failed to authenticate with Google".to_string()));
    }
    let token: TokenResponse = response.json().await?;

    let cached = CachedToken {
      access_token: token.access_token.clone(),
      refresh_after: now + Duration::seconds(token.expires_in) - Duration::minutes(1),
    };
    *self.token.lock() = Some(cached);
    Ok(token.access_token)
  }

  fn values_url(sheet_id: &str, range_segment: &str) -> AppResult<Url> {
    let mut url = Url::parse(SHEETS_API_BASE).map_err(|e| AppError::Internal(e.to_string()))?;
    url
      .path_segments_mut()
      .map_err(|_| AppError::Internal("Sheets API base URL cannot carry a path".to_string()))?
      .push(sheet_id)
      .push("values")
      .push(range_segment);
    Ok(url)
  }

  async fn check(response: reqwest::Response, what: &str) -> AppResult<reqwest::Response> {
    if response.status().is_success() {
      return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    warn!(%status, %body, "Google Sheets request failed: {}", what);
    Err(AppError::Upstream(format!("Failed to {}", what)))
  }
}

fn cell_text(value: &Value) -> String {
  match value {
    Value::String(s) => s.clone(),
    Value::Null => String::new(),
    other => other.to_string(),
  }
}

#[async_trait]
impl SheetsApi for GoogleSheetsClient {
  #[instrument(name = "sheets::get_values", skip(self))]
  async fn get_values(&self, sheet_id: &str, range: &str) -> AppResult<Vec<Vec<String>>> {
    let token = self.access_token().await?;
    let url = Self::values_url(sheet_id, range)?;
    let response = self.http.get(url).bearer_auth(token).send().await?;
    let body: Value = Self::check(response, "read spreadsheet").await?.json().await?;

    let rows = body
      .get("values")
      .and_then(Value::as_array)
      .map(|rows| {
        rows
          .iter()
          .map(|row| row.as_array().map(|cells| cells.iter().map(cell_text).collect()).unwrap_or_default())
          .collect()
      })
      .unwrap_or_default();
    Ok(rows)
  }

  #[instrument(name = "sheets::update_cell", skip(self, value))]
  async fn update_cell(&self, sheet_id: &str, range: &str, value: &str) -> AppResult<()> {
    let token = self.access_token().await?;
    let mut url = Self::values_url(sheet_id, range)?;
    url.query_pairs_mut().append_pair("valueInputOption", "RAW");
    let response = self
      .http
      .put(url)
      .bearer_auth(token)
      .json(&json!({ "values": [[value]] }))
      .send()
      .await?;
    Self::check(response, "update spreadsheet").await?;
    Ok(())
  }

  #[instrument(name = "sheets::append_row", skip(self, row), fields(cells = row.len()))]
  async fn append_row(&self, sheet_id: &str, range: &str, row: Vec<String>) -> AppResult<()> {
    let token = self.access_token().await?;
    let mut url = Self::values_url(sheet_id, &format!("{}:append", range))?;
    url
      .query_pairs_mut()
      .append_pair("valueInputOption", "USER_ENTERED")
      .append_pair("insertDataOption", "INSERT_ROWS");
    let response = self
      .http
      .post(url)
      .bearer_auth(token)
      .json(&json!({ "values": [row] }))
      .send()
      .await?;
    Self::check(response, "append to spreadsheet").await?;
    Ok(())
  }
}
