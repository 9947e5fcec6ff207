// core/src/order.rs

//! Membership payment orders and their status lifecycle.

use crate::error::{CoreError, CoreResult};
use crate::ids;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_ORDER_EXPIRY_MINUTES: i64 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
  Pending,
  Processing,
  Completed,
  Failed,
  Cancelled,
}

impl OrderStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      OrderStatus::Pending => "pending",
      OrderStatus::Processing => "processing",
      OrderStatus::Completed => "completed",
      OrderStatus::Failed => "failed",
      OrderStatus::Cancelled => "cancelled",
    }
  }

  pub fn is_terminal(self) -> bool {
    matches!(self, OrderStatus::Completed | OrderStatus::Failed | OrderStatus::Cancelled)
  }
}

impl fmt::Display for OrderStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
  Card,
  Upi,
  Wallet,
  Netbanking,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
  pub name: String,
  pub quantity: u32,
  pub price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
  pub order_id: String,
  pub amount: f64,
  pub currency: String,
  pub items: Vec<OrderItem>,
  pub user_id: String,
  pub user_name: String,
  pub status: OrderStatus,
  pub created_at: DateTime<Utc>,
  pub expires_at: DateTime<Utc>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub payment_id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub payment_method: Option<PaymentMethod>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub verified_at: Option<DateTime<Utc>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub user_reported_txn_id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub user_reported_at: Option<DateTime<Utc>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub stripe_payment_intent_id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub ticket_id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub failure_reason: Option<String>,
}

/// Input for a fresh order, already validated by checkout.
#[derive(Debug, Clone)]
pub struct NewOrder {
  pub amount: f64,
  pub currency: String,
  pub items: Vec<OrderItem>,
  pub user_id: String,
  pub user_name: String,
}

/// Evidence that an order has been paid, from whichever channel reported it.
#[derive(Debug, Clone, Default)]
pub struct Settlement {
  /// Overrides the stored payment id. When absent the existing one is kept,
  /// or a new internal reference is generated.
  pub payment_id: Option<String>,
  /// Only applied when the order has no method recorded yet.
  pub method: Option<PaymentMethod>,
  pub verified_at: Option<DateTime<Utc>>,
  pub reported_txn_id: Option<String>,
  pub stripe_payment_intent_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
  Applied,
  AlreadyCompleted,
}

impl Order {
  pub fn new(new_order: NewOrder, now: DateTime<Utc>, expiry: Duration) -> Self {
    Order {
      order_id: ids::order_id(&new_order.user_id, now),
      amount: new_order.amount,
      currency: new_order.currency,
      items: new_order.items,
      user_id: new_order.user_id,
      user_name: new_order.user_name,
      status: OrderStatus::Pending,
      created_at: now,
      expires_at: now + expiry,
      payment_id: None,
      payment_method: None,
      verified_at: None,
      user_reported_txn_id: None,
      user_reported_at: None,
      stripe_payment_intent_id: None,
      ticket_id: None,
      failure_reason: None,
    }
  }

  pub fn is_owned_by(&self, user_id: &str) -> bool {
    self.user_id == user_id
  }

  pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
    now > self.expires_at
  }

  /// Guards the user-driven payment entry points (process, Paytm initiate,
  /// Stripe intent, self-report).
  pub fn ensure_payable(&self, now: DateTime<Utc>) -> CoreResult<()> {
    match self.status {
      OrderStatus::Pending | OrderStatus::Processing => {}
      OrderStatus::Completed => return Err(CoreError::validation("This order has already been paid")),
      from => {
        return Err(CoreError::InvalidTransition { action: "pay", from });
      }
    }
    if self.is_expired_at(now) {
      return Err(CoreError::OrderExpired {
        order_id: self.order_id.clone(),
      });
    }
    Ok(())
  }

  pub fn mark_processing(&mut self, method: Option<PaymentMethod>) -> CoreResult<()> {
    match self.status {
      OrderStatus::Pending | OrderStatus::Processing => {
        self.status = OrderStatus::Processing;
        if method.is_some() {
          self.payment_method = method;
        }
        Ok(())
      }
      from => Err(CoreError::InvalidTransition {
        action: "start processing",
        from,
      }),
    }
  }

  /// Moves the order to `completed`.
  ///
  /// Completing a completed order changes nothing and reports
  /// [`Completion::AlreadyCompleted`]; a cancelled order cannot be completed.
  pub fn complete(&mut self, settlement: Settlement, now: DateTime<Utc>) -> CoreResult<Completion> {
    match self.status {
      OrderStatus::Completed => return Ok(Completion::AlreadyCompleted),
      OrderStatus::Cancelled => {
        return Err(CoreError::InvalidTransition {
          action: "complete",
          from: OrderStatus::Cancelled,
        })
      }
      OrderStatus::Pending | OrderStatus::Processing | OrderStatus::Failed => {}
    }

    let payment_id = settlement
      .payment_id
      .or_else(|| self.payment_id.take())
      .unwrap_or_else(|| ids::payment_id(&self.order_id, now));
    self.payment_id = Some(payment_id);

    if self.payment_method.is_none() {
      self.payment_method = settlement.method;
    }
    if let Some(txn) = settlement.reported_txn_id {
      self.user_reported_txn_id = Some(txn);
      self.user_reported_at = Some(now);
    }
    if let Some(intent) = settlement.stripe_payment_intent_id {
      self.stripe_payment_intent_id = Some(intent);
    }
    self.verified_at = Some(settlement.verified_at.unwrap_or(now));
    self.failure_reason = None;
    self.status = OrderStatus::Completed;
    Ok(Completion::Applied)
  }

  /// Returns `false` when the order was already completed and the failure was ignored.
  pub fn fail(&mut self, reason: impl Into<String>) -> CoreResult<bool> {
    match self.status {
      OrderStatus::Pending | OrderStatus::Processing => {
        self.status = OrderStatus::Failed;
        self.failure_reason = Some(reason.into());
        Ok(true)
      }
      OrderStatus::Completed | OrderStatus::Failed => Ok(false),
      OrderStatus::Cancelled => Err(CoreError::InvalidTransition {
        action: "fail",
        from: OrderStatus::Cancelled,
      }),
    }
  }

  pub fn cancel(&mut self) -> CoreResult<()> {
    match self.status {
      OrderStatus::Pending | OrderStatus::Processing => {
        self.status = OrderStatus::Cancelled;
        Ok(())
      }
      from => Err(CoreError::InvalidTransition { action: "cancel", from }),
    }
  }

  /// The timestamp the payment is considered to have happened at.
  pub fn paid_at(&self) -> DateTime<Utc> {
    self.verified_at.or(self.user_reported_at).unwrap_or(self.created_at)
  }

  /// Paid by the provider's word or by the user's own report.
  pub fn has_payment_reference(&self) -> bool {
    self.payment_id.is_some() || self.user_reported_txn_id.is_some()
  }
}

/// The most recent order of `user_id` that carries a payment reference and
/// was neither failed nor cancelled.
pub fn latest_paid_order<'a>(orders: impl IntoIterator<Item = &'a Order>, user_id: &str) -> Option<&'a Order> {
  orders
    .into_iter()
    .filter(|o| o.user_id == user_id)
    .filter(|o| !matches!(o.status, OrderStatus::Failed | OrderStatus::Cancelled))
    .filter(|o| o.has_payment_reference())
    .max_by_key(|o| o.paid_at())
}
