// core/src/ticket.rs
use crate::ids;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
  Open,
  InProgress,
  Resolved,
  Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketCategory {
  Membership,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportTicket {
  pub ticket_id: String,
  pub category: TicketCategory,
  pub subject: String,
  pub description: String,
  pub order_id: String,
  pub transaction_id: String,
  pub amount: f64,
  pub currency: String,
  pub user_id: String,
  pub status: TicketStatus,
  pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct MembershipPurchase<'a> {
  pub user_id: &'a str,
  pub order_id: &'a str,
  pub transaction_id: &'a str,
  pub amount: f64,
  pub currency: &'a str,
}

impl SupportTicket {
  /// The ticket opened automatically once a membership payment is verified.
  pub fn for_membership(purchase: MembershipPurchase<'_>, now: DateTime<Utc>) -> Self {
    SupportTicket {
      ticket_id: ids::ticket_id(now),
      category: TicketCategory::Membership,
      subject: format!("Membership purchase payment confirmation - {}", purchase.order_id),
      description: format!(
        "Auto-created after successful payment. TXN: {}, ORDER: {}",
        purchase.transaction_id, purchase.order_id
      ),
      order_id: purchase.order_id.to_string(),
      transaction_id: purchase.transaction_id.to_string(),
      amount: purchase.amount,
      currency: purchase.currency.to_string(),
      user_id: purchase.user_id.to_string(),
      status: TicketStatus::Open,
      created_at: now,
    }
  }
}
