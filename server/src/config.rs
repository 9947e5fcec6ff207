// server/src/config.rs

use crate::errors::{AppError, Result};
use dotenvy::dotenv;
use protocol_zero_core::application::ApplicationKind;
use std::collections::HashMap;
use std::env;
use std::fmt;

pub const DEFAULT_REQUIRED_ROLE_ID: &str = "1443336304040349927";
pub const DEFAULT_MEMBERSHIP_TICKET_CHANNEL_ID: &str = "1443336419270459483";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
  Pretty,
  Json,
}

#[derive(Clone)]
pub struct PaymentSettings {
  /// `None` means an ephemeral secret is generated at start-up.
  pub secret: Option<String>,
  pub confirm_api_key: Option<String>,
  pub verify_api_key: Option<String>,
  pub simulation_success_rate: f64,
  pub simulation_delay_ms: u64,
  pub order_expiry_minutes: i64,
  pub upi_payee_address: Option<String>,
  pub upi_payee_name: Option<String>,
}

impl PaymentSettings {
  /// Key accepted by `/api/payment/confirm`.
  pub fn confirm_key(&self) -> Option<&str> {
    self.confirm_api_key.as_deref().or(self.verify_api_key.as_deref())
  }
}

#[derive(Clone, Default)]
pub struct DiscordSettings {
  pub client_id: Option<String>,
  pub client_secret: Option<String>,
  pub redirect_uri: Option<String>,
  pub bot_token: Option<String>,
  pub server_id: Option<String>,
  pub required_role_id: String,
  pub membership_ticket_channel_id: String,
  pub webhook_url: Option<String>,
}

#[derive(Clone, Default)]
pub struct GoogleSettings {
  pub service_account_email: Option<String>,
  pub private_key: Option<String>,
  pub sheet_ids: HashMap<ApplicationKind, String>,
  pub contact_sheet_id: Option<String>,
}

impl GoogleSettings {
  pub fn sheet_id(&self, kind: ApplicationKind) -> Option<&str> {
    self.sheet_ids.get(&kind).map(String::as_str)
  }
}

#[derive(Clone, Default)]
pub struct PaytmSettings {
  pub mid: Option<String>,
  pub merchant_key: Option<String>,
  pub website: String,
  pub callback_url: Option<String>,
  pub production: bool,
}

impl PaytmSettings {
  pub fn host(&self) -> &'static str {
    if self.production {
      "https://securegw.paytm.in"
    } else {
      "https://securegw-stage.paytm.in"
    }
  }
}

#[derive(Clone, Default)]
pub struct StripeSettings {
  pub secret_key: Option<String>,
  pub webhook_secret: Option<String>,
}

#[derive(Clone)]
pub struct AppConfig {
  pub server_host: String,
  pub server_port: u16,
  pub app_base_url: String,
  pub database_url: Option<String>,
  pub log_format: LogFormat,
  pub session_secret: Option<String>,
  /// Raw JSON admin roster.
  pub admin_access: String,
  pub payment: PaymentSettings,
  pub discord: DiscordSettings,
  pub google: GoogleSettings,
  pub paytm: PaytmSettings,
  pub stripe: StripeSettings,
}

// Secrets stay out of logs.
impl fmt::Debug for AppConfig {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("AppConfig")
      .field("server_host", &self.server_host)
      .field("server_port", &self.server_port)
      .field("app_base_url", &self.app_base_url)
      .field("database", &self.database_url.as_ref().map(|_| "[REDACTED]"))
      .field("log_format", &self.log_format)
      .field("discord_bot", &self.discord.bot_token.is_some())
      .field("google_sheets", &self.google.service_account_email.is_some())
      .field("paytm", &self.paytm.mid.is_some())
      .field("stripe", &self.stripe.secret_key.is_some())
      .finish()
  }
}

impl AppConfig {
  pub fn from_env() -> Result<Self> {
    dotenv().ok();
    Self::from_lookup(|name| env::var(name).ok())
  }

  /// Builds the configuration from any variable source; blank values count as unset.
  pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
    let get_env = |var_name: &str| lookup(var_name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
    let env_or = |var_name: &str, default: &str| get_env(var_name).unwrap_or_else(|| default.to_string());

    let server_host = env_or("SERVER_HOST", "127.0.0.1");
    let server_port = env_or("SERVER_PORT", "8080")
      .parse::<u16>()
      .map_err(|e| AppError::Config(format!("Invalid SERVER_PORT: {}", e)))?;
    let app_base_url = get_env("APP_BASE_URL").unwrap_or_else(|| format!("http://{}:{}", server_host, server_port));

    let log_format = match get_env("LOG_FORMAT").as_deref() {
      Some("json") => LogFormat::Json,
      _ => LogFormat::Pretty,
    };

    let simulation_success_rate = env_or("PAYMENT_SIMULATION_SUCCESS_RATE", "0.95")
      .parse::<f64>()
      .map_err(|e| AppError::Config(format!("Invalid PAYMENT_SIMULATION_SUCCESS_RATE: {}", e)))?;
    if !(0.0..=1.0).contains(&simulation_success_rate) {
      return Err(AppError::Config(
        "PAYMENT_SIMULATION_SUCCESS_RATE must be between 0 and 1".to_string(),
      ));
    }
    let simulation_delay_ms = env_or("PAYMENT_SIMULATION_DELAY_MS", "1500")
      .parse::<u64>()
      .map_err(|e| AppError::Config(format!("Invalid PAYMENT_SIMULATION_DELAY_MS: {}", e)))?;
    let order_expiry_minutes = env_or("ORDER_EXPIRY_MINUTES", "15")
      .parse::<i64>()
      .map_err(|e| AppError::Config(format!("Invalid ORDER_EXPIRY_MINUTES: {}", e)))?;

    let payment = PaymentSettings {
      secret: get_env("PAYMENT_SECRET"),
      confirm_api_key: get_env("PAYMENT_CONFIRM_API_KEY"),
      verify_api_key: get_env("PAYMENT_VERIFY_API_KEY"),
      simulation_success_rate,
      simulation_delay_ms,
      order_expiry_minutes,
      upi_payee_address: get_env("UPI_PAYEE_ADDRESS"),
      upi_payee_name: get_env("UPI_PAYEE_NAME"),
    };

    let discord = DiscordSettings {
      client_id: get_env("DISCORD_CLIENT_ID"),
      client_secret: get_env("DISCORD_CLIENT_SECRET"),
      redirect_uri: get_env("DISCORD_REDIRECT_URI"),
      bot_token: get_env("DISCORD_BOT_TOKEN"),
      server_id: get_env("DISCORD_SERVER_ID"),
      required_role_id: env_or("DISCORD_REQUIRED_ROLE_ID", DEFAULT_REQUIRED_ROLE_ID),
      membership_ticket_channel_id: env_or("DISCORD_MEMBERSHIP_TICKET_CHANNEL_ID", DEFAULT_MEMBERSHIP_TICKET_CHANNEL_ID),
      webhook_url: get_env("DISCORD_WEBHOOK_URL"),
    };

    let sheet_ids = ApplicationKind::ALL
      .into_iter()
      .filter_map(|kind| {
        let var_name = format!("GOOGLE_{}_SHEET_ID", kind.as_str().to_ascii_uppercase());
        get_env(&var_name).map(|id| (kind, id))
      })
      .collect();
    let google = GoogleSettings {
      service_account_email: get_env("GOOGLE_SERVICE_ACCOUNT_EMAIL"),
      // Keys pasted into .env files usually carry literal "\n" sequences.
      private_key: get_env("GOOGLE_PRIVATE_KEY").map(|k| k.replace("\\n", "\n")),
      sheet_ids,
      contact_sheet_id: get_env("GOOGLE_CONTACT_SHEET_ID"),
    };

    let paytm = PaytmSettings {
      mid: get_env("PAYTM_MID"),
      merchant_key: get_env("PAYTM_MERCHANT_KEY"),
      website: env_or("PAYTM_WEBSITE", "WEBSTAGING"),
      callback_url: get_env("PAYTM_CALLBACK_URL"),
      production: get_env("PAYTM_ENV").as_deref() == Some("production"),
    };

    let stripe = StripeSettings {
      secret_key: get_env("STRIPE_SECRET_KEY"),
      webhook_secret: get_env("STRIPE_WEBHOOK_SECRET"),
    };

    let config = Self {
      server_host,
      server_port,
      app_base_url,
      database_url: get_env("DATABASE_URL"),
      log_format,
      session_secret: get_env("SESSION_SECRET"),
      admin_access: get_env("ADMIN_ACCESS").unwrap_or_default(),
      payment,
      discord,
      google,
      paytm,
      stripe,
    };
    tracing::info!(config = ?config, "Application configuration loaded.");
    Ok(config)
  }
}
