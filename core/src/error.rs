// core/src/error.rs
use crate::order::OrderStatus;
use anyhow::Error as AnyhowError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
  /// Client input that can never succeed as sent.
  #[error("{0}")]
  Validation(String),

  #[error("{entity} not found: {id}")]
  NotFound { entity: &'static str, id: String },

  #[error("{0}")]
  Forbidden(String),

  #[error("Cannot {action} an order that is {from}")]
  InvalidTransition { action: &'static str, from: OrderStatus },

  #[error("Order has expired. Please create a new order.")]
  OrderExpired { order_id: String },

  #[error("Storage failure. Source: {source}")]
  Storage {
    #[source]
    source: AnyhowError,
  },
}

impl CoreError {
  pub fn validation(msg: impl Into<String>) -> Self {
    CoreError::Validation(msg.into())
  }

  pub fn order_not_found(order_id: impl Into<String>) -> Self {
    CoreError::NotFound {
      entity: "Order",
      id: order_id.into(),
    }
  }
}

impl From<AnyhowError> for CoreError {
  fn from(err: AnyhowError) -> Self {
    CoreError::Storage { source: err }
  }
}

pub type CoreResult<T, E = CoreError> = std::result::Result<T, E>;
