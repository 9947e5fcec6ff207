// server/src/services/gateway.rs

//! Card/UPI/wallet charge processor used by `/api/payment/process`.

use crate::errors::Result as AppResult;
use async_trait::async_trait;
use chrono::Utc;
use protocol_zero_core::{ids, PaymentMethod};
use rand_core::{OsRng, RngCore};
use std::time::Duration;
use tracing::{info, instrument, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum ChargeOutcome {
  Approved { payment_id: String },
  Declined { reason: String },
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
  async fn charge(&self, order_id: &str, amount: f64, method: PaymentMethod) -> AppResult<ChargeOutcome>;
}

/// Stands in for a real processor: waits `delay`, then approves with probability `success_rate`.
#[derive(Debug, Clone)]
pub struct SimulatedGateway {
  success_rate: f64,
  delay: Duration,
}

impl SimulatedGateway {
  pub fn new(success_rate: f64, delay: Duration) -> Self {
    Self {
      success_rate: success_rate.clamp(0.0, 1.0),
      delay,
    }
  }

  fn roll(&self) -> bool {
    let sample = f64::from(OsRng.next_u32()) / f64::from(u32::MAX);
    sample < self.success_rate || self.success_rate >= 1.0
  }
}

#[async_trait]
impl PaymentGateway for SimulatedGateway {
  #[instrument(name = "gateway::charge", skip(self), fields(simulated = true))]
  async fn charge(&self, order_id: &str, amount: f64, method: PaymentMethod) -> AppResult<ChargeOutcome> {
    if !self.delay.is_zero() {
      tokio::time::sleep(self.delay).await;
    }

    if self.roll() {
      let payment_id = ids::payment_id(order_id, Utc::now());
      info!(%payment_id, "Simulated charge approved.");
      Ok(ChargeOutcome::Approved { payment_id })
    } else {
      warn!("Simulated charge declined.");
      Ok(ChargeOutcome::Declined {
        reason: "Payment processing failed. Please try again.".to_string(),
      })
    }
  }
}
