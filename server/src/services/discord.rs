// server/src/services/discord.rs

//! Discord REST v10: OAuth code exchange, guild membership, membership
//! ticket threads and review notifications.

use crate::config::DiscordSettings;
use crate::errors::{AppError, Result as AppResult};
use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{info, instrument, warn};

pub const DISCORD_API_BASE: &str = "https://discord.com/api/v10";
const MAX_RATE_LIMIT_RETRIES: usize = 3;
const FORUM_CHANNEL_TYPE: u64 = 15;
const THREAD_AUTO_ARCHIVE_MINUTES: u64 = 1440;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordUser {
  pub id: String,
  pub username: String,
  #[serde(default)]
  pub global_name: Option<String>,
  #[serde(default)]
  pub email: Option<String>,
  #[serde(default)]
  pub avatar: Option<String>,
}

impl DiscordUser {
  pub fn display_name(&self) -> &str {
    self.global_name.as_deref().filter(|n| !n.is_empty()).unwrap_or(&self.username)
  }
}

#[derive(Debug, Clone)]
pub struct MembershipTicketRequest {
  pub user_id: String,
  pub order_id: String,
  pub transaction_id: String,
  pub amount: f64,
  pub currency: String,
}

impl MembershipTicketRequest {
  pub fn thread_name(&self) -> String {
    let chars: Vec<char> = self.order_id.chars().collect();
    let tail: String = chars[chars.len().saturating_sub(8)..].iter().collect();
    format!("membership-{}", tail)
  }

  pub fn content(&self) -> String {
    [
      "New membership purchase ticket opened automatically after payment.".to_string(),
      format!("User: <@{}>", self.user_id),
      format!("Order Number: {}", self.order_id),
      format!("Transaction ID: {}", self.transaction_id),
      format!("Amount: {} {:.2}", self.currency, self.amount),
      "Category: Membership Purchase".to_string(),
    ]
    .join("\n")
  }
}

#[derive(Debug, Clone)]
pub struct ReviewNotice {
  pub approved: bool,
  pub applicant_name: String,
  pub applicant_id: String,
  pub kind: String,
  pub admin_name: String,
}

impl ReviewNotice {
  pub fn content(&self) -> String {
    let verdict = if self.approved { "accepted" } else { "rejected" };
    let mention = if self.applicant_id.is_empty() {
      self.applicant_name.clone()
    } else {
      format!("<@{}>", self.applicant_id)
    };
    format!(
      "{} application of {} was {} by {}.",
      self.kind, mention, verdict, self.admin_name
    )
  }
}

#[async_trait]
pub trait DiscordApi: Send + Sync {
  /// Exchanges an OAuth authorization code for a user access token.
  async fn exchange_code(&self, code: &str) -> AppResult<String>;

  async fn current_user(&self, access_token: &str) -> AppResult<DiscordUser>;

  /// Role ids of a guild member, or `None` when the user is not in the guild.
  async fn member_roles(&self, user_id: &str) -> AppResult<Option<Vec<String>>>;

  async fn user_guild_ids(&self, access_token: &str) -> AppResult<Vec<String>>;

  async fn add_guild_member(&self, user_id: &str, access_token: &str) -> AppResult<()>;

  /// Opens the membership ticket thread and returns its Discord id.
  async fn open_membership_ticket(&self, request: &MembershipTicketRequest) -> AppResult<String>;

  async fn notify_review(&self, notice: &ReviewNotice) -> AppResult<()>;
}

/// Seconds to wait before retrying a 429, read from its JSON body.
pub fn retry_delay(body: &str) -> Duration {
  let seconds = serde_json::from_str::<Value>(body)
    .ok()
    .and_then(|v| v.get("retry_after").and_then(Value::as_f64))
    .filter(|s| s.is_finite() && *s > 0.0)
    .unwrap_or(1.0);
  Duration::from_millis((seconds * 1000.0).ceil() as u64)
}

pub struct DiscordClient {
  http: reqwest::Client,
  settings: DiscordSettings,
  api_base: String,
}

impl DiscordClient {
  pub fn new(http: reqwest::Client, settings: DiscordSettings) -> Self {
    Self {
      http,
      settings,
      api_base: DISCORD_API_BASE.to_string(),
    }
  }

  pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
    self.api_base = api_base.into();
    self
  }

  fn url(&self, path: &str) -> String {
    format!("{}{}", self.api_base, path)
  }

  fn bot_token(&self) -> AppResult<&str> {
    self
      .settings
      .bot_token
      .as_deref()
      .ok_or_else(|| AppError::Config("DISCORD_BOT_TOKEN is not configured".to_string()))
  }

  fn server_id(&self) -> AppResult<&str> {
    self
      .settings
      .server_id
      .as_deref()
      .ok_or_else(|| AppError::Config("DISCORD_SERVER_ID is not configured".to_string()))
  }

  fn bot(&self, builder: RequestBuilder) -> AppResult<RequestBuilder> {
    Ok(builder.header("Authorization", format!("Bot {}", self.bot_token()?)))
  }

  /// Sends the request built by `build`, sleeping through up to three 429s.
  /// The attempt after the last retry is returned whatever its status.
  async fn send_with_retry(&self, build: impl Fn() -> AppResult<RequestBuilder>) -> AppResult<Response> {
    for attempt in 1..=MAX_RATE_LIMIT_RETRIES {
      let response = build()?.send().await?;
      if response.status() != StatusCode::TOO_MANY_REQUESTS {
        return Ok(response);
      }
      let delay = retry_delay(&response.text().await.unwrap_or_default());
      warn!(attempt, delay_ms = delay.as_millis() as u64, "Discord rate limited, retrying.");
      tokio::time::sleep(delay).await;
    }
    Ok(build()?.send().await?)
  }

  async fn expect_json(response: Response, what: &str) -> AppResult<Value> {
    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
      return Err(AppError::RateLimited("Discord API rate limit exceeded".to_string()));
    }
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      warn!(%status, %body, "Discord request failed: {}", what);
      return Err(AppError::Upstream(format!("Failed to {}", what)));
    }
    Ok(response.json::<Value>().await?)
  }

  fn id_of(value: &Value) -> AppResult<String> {
    value
      .get("id")
      .and_then(Value::as_str)
      .map(str::to_string)
      .ok_or_else(|| AppError::Upstream("Unexpected Discord response format".to_string()))
  }
}

#[async_trait]
impl DiscordApi for DiscordClient {
  #[instrument(name = "discord::exchange_code", skip_all)]
  async fn exchange_code(&self, code: &str) -> AppResult<String> {
    let (client_id, client_secret, redirect_uri) = match (
      self.settings.client_id.as_deref(),
      self.settings.client_secret.as_deref(),
      self.settings.redirect_uri.as_deref(),
    ) {
      (Some(id), Some(secret), Some(uri)) => (id, secret, uri),
      _ => return Err(AppError::Config("Discord OAuth is not configured".to_string())),
    };

    let form = [
      ("client_id", client_id),
      ("client_secret", client_secret),
      ("grant_type", "authorization_code"),
      ("code", code),
      ("redirect_uri", redirect_uri),
    ];
    let response = self
      .send_with_retry(|| Ok(self.http.post(self.url("/oauth2/token")).form(&form)))
      .await?;
    if !response.status().is_success() {
      let status = response.status();
      warn!(%status, "Discord OAuth code exchange rejected.");
      return Err(AppError::Auth("Discord authorization failed".to_string()));
    }
    let body = response.json::<Value>().await?;
    body
      .get("access_token")
      .and_then(Value::as_str)
      .map(str::to_string)
      .ok_or_else(|| AppError::Upstream("Discord did not return an access token".to_string()))
  }

  #[instrument(name = "discord::current_user", skip_all)]
  async fn current_user(&self, access_token: &str) -> AppResult<DiscordUser> {
    let response = self
      .send_with_retry(|| Ok(self.http.get(self.url("/users/@me")).bearer_auth(access_token)))
      .await?;
    let body = Self::expect_json(response, "fetch Discord user").await?;
    serde_json::from_value(body).map_err(|e| AppError::Upstream(format!("Unexpected Discord user payload: {}", e)))
  }

  #[instrument(name = "discord::member_roles", skip(self))]
  async fn member_roles(&self, user_id: &str) -> AppResult<Option<Vec<String>>> {
    let path = format!("/guilds/{}/members/{}", self.server_id()?, user_id);
    let response = self.send_with_retry(|| self.bot(self.http.get(self.url(&path)))).await?;
    if response.status() == StatusCode::NOT_FOUND {
      return Ok(None);
    }
    let member = Self::expect_json(response, "fetch Discord member").await?;
    let roles = member
      .get("roles")
      .and_then(Value::as_array)
      .map(|roles| roles.iter().filter_map(Value::as_str).map(str::to_string).collect())
      .unwrap_or_default();
    Ok(Some(roles))
  }

  #[instrument(name = "discord::user_guild_ids", skip_all)]
  async fn user_guild_ids(&self, access_token: &str) -> AppResult<Vec<String>> {
    let response = self
      .send_with_retry(|| Ok(self.http.get(self.url("/users/@me/guilds")).bearer_auth(access_token)))
      .await?;
    let guilds = Self::expect_json(response, "fetch Discord guilds").await?;
    let guilds = guilds
      .as_array()
      .ok_or_else(|| AppError::Upstream("Unexpected Discord response format".to_string()))?;
    Ok(
      guilds
        .iter()
        .filter_map(|g| g.get("id").and_then(Value::as_str))
        .map(str::to_string)
        .collect(),
    )
  }

  #[instrument(name = "discord::add_guild_member", skip(self, access_token))]
  async fn add_guild_member(&self, user_id: &str, access_token: &str) -> AppResult<()> {
    let path = format!("/guilds/{}/members/{}", self.server_id()?, user_id);
    let body = json!({ "access_token": access_token });
    let response = self
      .send_with_retry(|| self.bot(self.http.put(self.url(&path)).json(&body)))
      .await?;
    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
      return Err(AppError::RateLimited(
        "Discord API rate limit exceeded while adding member".to_string(),
      ));
    }
    if !status.is_success() {
      // Best effort.
      let body = response.text().await.unwrap_or_default();
      warn!(%status, %body, "Failed to add member to Discord server.");
    }
    Ok(())
  }

  #[instrument(name = "discord::open_membership_ticket", skip_all, fields(order_id = %request.order_id))]
  async fn open_membership_ticket(&self, request: &MembershipTicketRequest) -> AppResult<String> {
    let channel_id = self.settings.membership_ticket_channel_id.as_str();
    let channel_path = format!("/channels/{}", channel_id);
    let channel = self
      .send_with_retry(|| self.bot(self.http.get(self.url(&channel_path))))
      .await?;
    let channel = Self::expect_json(channel, "read ticket channel metadata").await?;

    let thread_name = request.thread_name();
    let allowed_mentions = json!({ "users": [request.user_id] });

    if channel.get("type").and_then(Value::as_u64) == Some(FORUM_CHANNEL_TYPE) {
      let body = json!({
        "name": thread_name,
        "auto_archive_duration": THREAD_AUTO_ARCHIVE_MINUTES,
        "message": { "content": request.content(), "allowed_mentions": allowed_mentions },
      });
      let path = format!("/channels/{}/threads", channel_id);
      let response = self
        .send_with_retry(|| self.bot(self.http.post(self.url(&path)).json(&body)))
        .await?;
      let thread = Self::expect_json(response, "create forum membership ticket").await?;
      return Self::id_of(&thread);
    }

    let seed = json!({ "content": request.content(), "allowed_mentions": allowed_mentions });
    let messages_path = format!("/channels/{}/messages", channel_id);
    let response = self
      .send_with_retry(|| self.bot(self.http.post(self.url(&messages_path)).json(&seed)))
      .await?;
    let message_id = Self::id_of(&Self::expect_json(response, "create ticket seed message").await?)?;

    let thread_body = json!({ "name": thread_name, "auto_archive_duration": THREAD_AUTO_ARCHIVE_MINUTES });
    let thread_path = format!("/channels/{}/messages/{}/threads", channel_id, message_id);
    let response = self
      .send_with_retry(|| self.bot(self.http.post(self.url(&thread_path)).json(&thread_body)))
      .await?;
    if response.status().is_success() {
      if let Ok(thread) = response.json::<Value>().await {
        if let Ok(thread_id) = Self::id_of(&thread) {
          return Ok(thread_id);
        }
      }
    }
    info!(%message_id, "Thread creation failed, using the seed message as ticket reference.");
    Ok(message_id)
  }

  #[instrument(name = "discord::notify_review", skip_all, fields(kind = %notice.kind, approved = notice.approved))]
  async fn notify_review(&self, notice: &ReviewNotice) -> AppResult<()> {
    let Some(webhook_url) = self.settings.webhook_url.as_deref() else {
      info!("DISCORD_WEBHOOK_URL not configured, skipping review notification.");
      return Ok(());
    };
    let body = json!({ "content": notice.content() });
    let response = self.send_with_retry(|| Ok(self.http.post(webhook_url).json(&body))).await?;
    if !response.status().is_success() {
      return Err(AppError::Upstream(format!(
        "Discord webhook answered {}",
        response.status()
      )));
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn retry_delay_reads_fractional_seconds() {
    assert_eq!(retry_delay(r#"{"retry_after": 0.25}"#), Duration::from_millis(250));
    assert_eq!(retry_delay(r#"{"retry_after": 2}"#), Duration::from_secs(2));
  }

  #[test]
  fn retry_delay_defaults_to_one_second() {
    assert_eq!(retry_delay(""), Duration::from_secs(1));
    assert_eq!(retry_delay(r#"{"message": "slow down"}"#), Duration::from_secs(1));
    assert_eq!(retry_delay(r#"{"retry_after": -3}"#), Duration::from_secs(1));
  }

  #[test]
  fn thread_name_uses_last_eight_chars_of_order() {
    let request = MembershipTicketRequest {
      user_id: "42".into(),
      order_id: "ord_1_abc_0123456789abcdef".into(),
      transaction_id: "T1".into(),
      amount: 723.89,
      currency: "INR".into(),
    };
    assert_eq!(request.thread_name(), "membership-89abcdef");
    assert!(request.content().contains("Amount: INR 723.89"));
    assert!(request.content().contains("User: <@42>"));
  }
}
