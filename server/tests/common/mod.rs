// tests/common/mod.rs
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use protocol_zero_core::{MemoryOrderStore, MemoryTicketStore, PaymentMethod};
use protocol_zero_server::config::AppConfig;
use protocol_zero_server::errors::{AppError, Result as AppResult};
use protocol_zero_server::services::discord::{DiscordUser, MembershipTicketRequest, ReviewNotice};
use protocol_zero_server::services::paytm::{InitiateRequest, TransactionStatus};
use protocol_zero_server::services::stripe::{IntentRequest, PaymentIntent};
use protocol_zero_server::services::{ChargeOutcome, DiscordApi, PaymentGateway, PaytmApi, SheetsApi, StripeApi};
use protocol_zero_server::session::SessionUser;
use protocol_zero_server::state::{AppState, Integrations};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::Level;

pub const USER_ID: &str = "111111111111111111";
pub const OTHER_USER_ID: &str = "222222222222222222";
pub const ADMIN_EMAIL: &str = "ems.lead@example.com";
pub const CONFIRM_KEY: &str = "confirm-key";
pub const PAYTM_KEY: &str = "abcdefgh12345678";
pub const STRIPE_WEBHOOK_SECRET: &str = "whsec_test";
pub const SHEET_EMS: &str = "sheet-ems";
pub const SHEET_POLICE: &str = "sheet-police";
pub const SHEET_CONTACT: &str = "sheet-contact";

/// Builds the routed service for `$state`.
macro_rules! init_app {
  ($state:expr) => {
    actix_web::test::init_service(
      actix_web::App::new()
        .app_data(actix_web::web::Data::new($state.clone()))
        .configure(protocol_zero_server::web::configure_app_routes),
    )
    .await
  };
}
pub(crate) use init_app;

// --- Tracing ---
static TRACING_INIT: Lazy<()> = Lazy::new(|| {
  tracing_subscriber::fmt()
    .with_max_level(Level::DEBUG)
    .with_test_writer()
    .try_init()
    .ok();
});

pub fn setup_tracing() {
  Lazy::force(&TRACING_INIT);
}

// --- Fakes ---
pub struct FixedGateway {
  pub outcome: ChargeOutcome,
}

#[async_trait]
impl PaymentGateway for FixedGateway {
  async fn charge(&self, _order_id: &str, _amount: f64, _method: PaymentMethod) -> AppResult<ChargeOutcome> {
    Ok(self.outcome.clone())
  }
}

#[derive(Default)]
pub struct FakeDiscord {
  pub roles: Mutex<Option<Vec<String>>>,
  pub guilds: Mutex<Vec<String>>,
  pub added_members: Mutex<Vec<String>>,
  pub tickets: Mutex<Vec<MembershipTicketRequest>>,
  pub notices: Mutex<Vec<ReviewNotice>>,
}

#[async_trait]
impl DiscordApi for FakeDiscord {
  async fn exchange_code(&self, code: &str) -> AppResult<String> {
    if code == "good-code" {
      Ok("oauth-token".to_string())
    } else {
      Err(AppError::Upstream("Failed to exchange code".to_string()))
    }
  }

  async fn current_user(&self, _access_token: &str) -> AppResult<DiscordUser> {
    Ok(DiscordUser {
      id: USER_ID.to_string(),
      username: "tester".to_string(),
      global_name: Some("Test User".to_string()),
      email: Some("tester@example.com".to_string()),
      avatar: None,
    })
  }

  async fn member_roles(&self, _user_id: &str) -> AppResult<Option<Vec<String>>> {
    Ok(self.roles.lock().clone())
  }

  async fn user_guild_ids(&self, _access_token: &str) -> AppResult<Vec<String>> {
    Ok(self.guilds.lock().clone())
  }

  async fn add_guild_member(&self, user_id: &str, _access_token: &str) -> AppResult<()> {
    self.added_members.lock().push(user_id.to_string());
    Ok(())
  }

  async fn open_membership_ticket(&self, request: &MembershipTicketRequest) -> AppResult<String> {
    let mut tickets = self.tickets.lock();
    tickets.push(request.clone());
    Ok(format!("thread-{}", tickets.len()))
  }

  async fn notify_review(&self, notice: &ReviewNotice) -> AppResult<()> {
    self.notices.lock().push(notice.clone());
    Ok(())
  }
}

/// Whole sheets keyed by id, header row included.
#[derive(Default)]
pub struct FakeSheets {
  pub sheets: Mutex<HashMap<String, Vec<Vec<String>>>>,
  pub updates: Mutex<Vec<(String, String, String)>>,
  pub appends: Mutex<Vec<(String, String, Vec<String>)>>,
}

impl FakeSheets {
  pub fn put(&self, sheet_id: &str, rows: Vec<Vec<&str>>) {
    let rows = rows
      .into_iter()
      .map(|row| row.into_iter().map(str::to_string).collect())
      .collect();
    self.sheets.lock().insert(sheet_id.to_string(), rows);
  }
}

#[async_trait]
impl SheetsApi for FakeSheets {
  async fn get_values(&self, sheet_id: &str, range: &str) -> AppResult<Vec<Vec<String>>> {
    let rows = self
      .sheets
      .lock()
      .get(sheet_id)
      .cloned()
      .ok_or_else(|| AppError::Upstream("Failed to read spreadsheet".to_string()))?;
    let skip = if range.contains("!A2") { 1 } else { 0 };
    Ok(rows.into_iter().skip(skip).collect())
  }

  async fn update_cell(&self, sheet_id: &str, range: &str, value: &str) -> AppResult<()> {
    self
      .updates
      .lock()
      .push((sheet_id.to_string(), range.to_string(), value.to_string()));
    Ok(())
  }

  async fn append_row(&self, sheet_id: &str, range: &str, row: Vec<String>) -> AppResult<()> {
    self.appends.lock().push((sheet_id.to_string(), range.to_string(), row));
    Ok(())
  }
}

#[derive(Default)]
pub struct FakeStripe {
  pub requests: Mutex<Vec<IntentRequest>>,
}

#[async_trait]
impl StripeApi for FakeStripe {
  async fn create_payment_intent(&self, request: &IntentRequest) -> AppResult<PaymentIntent> {
    let mut requests = self.requests.lock();
    requests.push(request.clone());
    Ok(PaymentIntent {
      id: format!("pi_test_{}", requests.len()),
      client_secret: Some("pi_secret".to_string()),
    })
  }
}

pub struct FakePaytm {
  pub status: Mutex<TransactionStatus>,
  pub initiate_response: Mutex<Value>,
}

impl Default for FakePaytm {
  fn default() -> Self {
    Self {
      status: Mutex::new(TransactionStatus {
        status: "TXN_SUCCESS".to_string(),
        txn_id: Some("PTM-TXN-1".to_string()),
        txn_date: Some("2025-01-15 17:30:00.0".to_string()),
        message: Some("Txn Success".to_string()),
      }),
      initiate_response: Mutex::new(json!({ "body": { "txnToken": "txn-token-1" } })),
    }
  }
}

#[async_trait]
impl PaytmApi for FakePaytm {
  async fn initiate_transaction(&self, _request: &InitiateRequest) -> AppResult<Value> {
    Ok(self.initiate_response.lock().clone())
  }

  async fn order_status(&self, _order_id: &str) -> AppResult<TransactionStatus> {
    Ok(self.status.lock().clone())
  }

  fn merchant_id(&self) -> Option<&str> {
    Some("TESTMID")
  }

  fn merchant_key(&self) -> Option<&str> {
    Some(PAYTM_KEY)
  }

  fn host(&self) -> &str {
    "https://securegw-stage.paytm.in"
  }
}

// --- Harness ---
pub struct TestHarness {
  pub state: AppState,
  pub orders: Arc<MemoryOrderStore>,
  pub tickets: Arc<MemoryTicketStore>,
  pub discord: Arc<FakeDiscord>,
  pub sheets: Arc<FakeSheets>,
  pub stripe: Arc<FakeStripe>,
  pub paytm: Arc<FakePaytm>,
}

fn base_vars() -> HashMap<String, String> {
  let admins = json!([
    { "email": ADMIN_EMAIL, "discordId": "333", "designation": "ems" },
    { "email": "owner@example.com", "discordId": "444", "designation": "all" },
  ]);
  [
    ("PAYMENT_SECRET", "test-payment-secret".to_string()),
    ("SESSION_SECRET", "test-session-secret".to_string()),
    ("PAYMENT_SIMULATION_DELAY_MS", "0".to_string()),
    ("PAYMENT_CONFIRM_API_KEY", CONFIRM_KEY.to_string()),
    ("DISCORD_BOT_TOKEN", "bot-token".to_string()),
    ("DISCORD_SERVER_ID", "guild-1".to_string()),
    ("DISCORD_REQUIRED_ROLE_ID", "role-member".to_string()),
    ("GOOGLE_EMS_SHEET_ID", SHEET_EMS.to_string()),
    ("GOOGLE_POLICE_SHEET_ID", SHEET_POLICE.to_string()),
    ("GOOGLE_CONTACT_SHEET_ID", SHEET_CONTACT.to_string()),
    ("STRIPE_WEBHOOK_SECRET", STRIPE_WEBHOOK_SECRET.to_string()),
    ("ADMIN_ACCESS", admins.to_string()),
  ]
  .into_iter()
  .map(|(k, v)| (k.to_string(), v))
  .collect()
}

pub fn harness_with(outcome: ChargeOutcome, overrides: &[(&str, &str)]) -> TestHarness {
  setup_tracing();
  let mut vars = base_vars();
  for (key, value) in overrides {
    vars.insert(key.to_string(), value.to_string());
  }
  let config = AppConfig::from_lookup(|name| vars.get(name).cloned()).expect("test config");

  let orders = Arc::new(MemoryOrderStore::new());
  let tickets = Arc::new(MemoryTicketStore::new());
  let discord = Arc::new(FakeDiscord::default());
  let sheets = Arc::new(FakeSheets::default());
  let stripe = Arc::new(FakeStripe::default());
  let paytm = Arc::new(FakePaytm::default());
  let integrations = Integrations {
    gateway: Arc::new(FixedGateway { outcome }),
    discord: discord.clone(),
    sheets: sheets.clone(),
    stripe: stripe.clone(),
    paytm: paytm.clone(),
  };
  let state = AppState::new(config, orders.clone(), tickets.clone(), integrations).expect("test state");

  TestHarness {
    state,
    orders,
    tickets,
    discord,
    sheets,
    stripe,
    paytm,
  }
}

pub fn harness() -> TestHarness {
  harness_with(
    ChargeOutcome::Approved {
      payment_id: "pay_test_1".to_string(),
    },
    &[],
  )
}

pub fn session_token(state: &AppState, user_id: &str, email: Option<&str>) -> String {
  let user = SessionUser {
    id: user_id.to_string(),
    name: "Test User".to_string(),
    email: email.map(str::to_string),
    access_token: Some("oauth-token".to_string()),
  };
  state.sessions.issue(&user, Utc::now()).expect("session token")
}

pub fn bearer(token: &str) -> (&'static str, String) {
  ("Authorization", format!("Bearer {}", token))
}

pub fn silver_order_body() -> Value {
  json!({
    "amount": 723.89,
    "currency": "INR",
    "items": [{ "name": "Silver Membership", "quantity": 1, "price": 723.89 }],
  })
}
