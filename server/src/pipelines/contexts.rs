// server/src/pipelines/contexts.rs

//! Working state of each pipeline. Handlers receive these wrapped in `ContextData`.

use crate::services::stripe::StripeEvent;
use crate::services::paytm::TransactionStatus;
use crate::state::AppState;
use protocol_zero_core::{Order, OrderItem, PaymentMethod, Settlement, SupportTicket};
use std::collections::BTreeMap;

#[derive(Clone)]
pub struct CheckoutCtxData {
  pub app_state: AppState,
  pub user_id: String,
  pub user_name: String,
  pub amount: f64,
  pub currency: Option<String>,
  pub items: Vec<OrderItem>,
  pub order: Option<Order>,
  pub payment_token: Option<String>,
}

#[derive(Clone)]
pub struct ProcessCtxData {
  pub app_state: AppState,
  pub user_id: String,
  pub order_id: String,
  pub amount: f64,
  pub method: PaymentMethod,
  pub payment_token: Option<String>,
  pub order: Option<Order>,
  pub payment_id: Option<String>,
  pub signature: Option<String>,
  /// Set when the gateway declined; the run stops after recording it.
  pub failure: Option<String>,
}

#[derive(Clone)]
pub struct CompletionCtxData {
  pub app_state: AppState,
  pub order_id: String,
  /// Consumed by `mark_completed`.
  pub settlement: Option<Settlement>,
  pub order: Option<Order>,
  /// `false` when the order had already been completed before this run.
  pub first_completion: bool,
  pub ticket: Option<SupportTicket>,
  pub ticket_created: bool,
  pub discord_thread_id: Option<String>,
}

impl CompletionCtxData {
  pub fn new(app_state: AppState, order_id: impl Into<String>, settlement: Settlement) -> Self {
    Self {
      app_state,
      order_id: order_id.into(),
      settlement: Some(settlement),
      order: None,
      first_completion: false,
      ticket: None,
      ticket_created: false,
      discord_thread_id: None,
    }
  }
}

#[derive(Clone)]
pub struct StripeWebhookCtxData {
  pub app_state: AppState,
  pub payload: Vec<u8>,
  pub signature_header: Option<String>,
  pub event: Option<StripeEvent>,
  pub order_id: Option<String>,
  pub order: Option<Order>,
}

#[derive(Clone)]
pub struct PaytmCallbackCtxData {
  pub app_state: AppState,
  pub params: BTreeMap<String, String>,
  pub order_id: String,
  pub txn_status: Option<TransactionStatus>,
  pub order: Option<Order>,
}
