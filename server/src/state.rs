// server/src/state.rs

use crate::config::AppConfig;
use crate::errors::{AppError, Result as AppResult};
use crate::pipelines::Pipelines;
use crate::services::{
  DiscordApi, DiscordClient, GoogleSheetsClient, PaymentGateway, PaytmApi, PaytmClient, SheetsApi, SimulatedGateway,
  StripeApi, StripeClient,
};
use crate::session::SessionKeys;
use protocol_zero_core::admin::AdminDirectory;
use protocol_zero_core::store::{SharedOrderStore, SharedTicketStore};
use protocol_zero_core::PaymentSigner;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// The outbound collaborators, swappable as a group.
#[derive(Clone)]
pub struct Integrations {
  pub gateway: Arc<dyn PaymentGateway>,
  pub discord: Arc<dyn DiscordApi>,
  pub sheets: Arc<dyn SheetsApi>,
  pub stripe: Arc<dyn StripeApi>,
  pub paytm: Arc<dyn PaytmApi>,
}

impl Integrations {
  /// Real HTTP clients sharing one connection pool.
  pub fn from_config(config: &AppConfig) -> AppResult<Self> {
    let http = reqwest::Client::builder()
      .timeout(Duration::from_secs(20))
      .build()
      .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))?;

    Ok(Self {
      gateway: Arc::new(SimulatedGateway::new(
        config.payment.simulation_success_rate,
        Duration::from_millis(config.payment.simulation_delay_ms),
      )),
      discord: Arc::new(DiscordClient::new(http.clone(), config.discord.clone())),
      sheets: Arc::new(GoogleSheetsClient::new(http.clone(), config.google.clone())),
      stripe: Arc::new(StripeClient::new(http.clone(), config.stripe.clone())),
      paytm: Arc::new(PaytmClient::new(http, config.paytm.clone())),
    })
  }
}

#[derive(Clone)]
pub struct AppState {
  pub config: Arc<AppConfig>,
  pub orders: SharedOrderStore,
  pub tickets: SharedTicketStore,
  pub signer: Arc<PaymentSigner>,
  pub sessions: Arc<SessionKeys>,
  pub admins: Arc<AdminDirectory>,
  pub gateway: Arc<dyn PaymentGateway>,
  pub discord: Arc<dyn DiscordApi>,
  pub sheets: Arc<dyn SheetsApi>,
  pub stripe: Arc<dyn StripeApi>,
  pub paytm: Arc<dyn PaytmApi>,
  pub pipelines: Arc<Pipelines>,
}

impl AppState {
  pub fn new(
    config: AppConfig,
    orders: SharedOrderStore,
    tickets: SharedTicketStore,
    integrations: Integrations,
  ) -> AppResult<Self> {
    let signer = match config.payment.secret.as_deref() {
      Some(secret) => PaymentSigner::new(secret),
      None => {
        warn!("PAYMENT_SECRET not set; payment tokens will not survive a restart.");
        PaymentSigner::ephemeral()
      }
    };
    let sessions = SessionKeys::from_secret(config.session_secret.as_deref());
    let admins = AdminDirectory::from_json(&config.admin_access)
      .map_err(|e| AppError::Config(format!("Invalid ADMIN_ACCESS: {}", e)))?;

    Ok(Self {
      config: Arc::new(config),
      orders,
      tickets,
      signer: Arc::new(signer),
      sessions: Arc::new(sessions),
      admins: Arc::new(admins),
      gateway: integrations.gateway,
      discord: integrations.discord,
      sheets: integrations.sheets,
      stripe: integrations.stripe,
      paytm: integrations.paytm,
      pipelines: Arc::new(Pipelines::build()),
    })
  }
}
