// core/src/checkout.rs

//! Validation of a checkout request before an order is created.

use crate::error::{CoreError, CoreResult};
use crate::membership;
use crate::order::OrderItem;

pub const MIN_AMOUNT: f64 = 1.0;
pub const MAX_AMOUNT: f64 = 1_000_000.0;
pub const SUPPORTED_CURRENCIES: [&str; 3] = ["INR", "USD", "EUR"];
pub const DEFAULT_CURRENCY: &str = "INR";

const AMOUNT_TOLERANCE: f64 = 0.01;

pub fn round_to_cents(amount: f64) -> f64 {
  (amount * 100.0).round() / 100.0
}

/// Checks bounds and returns the amount rounded to two decimals.
pub fn validate_amount(amount: f64) -> CoreResult<f64> {
  if !amount.is_finite() || amount <= 0.0 {
    return Err(CoreError::validation("Invalid payment amount"));
  }
  if amount < MIN_AMOUNT {
    return Err(CoreError::validation("Minimum payment amount is ₹1.00"));
  }
  if amount > MAX_AMOUNT {
    return Err(CoreError::validation("Maximum payment amount is ₹10,00,000.00"));
  }
  Ok(round_to_cents(amount))
}

pub fn normalize_currency(currency: Option<&str>) -> CoreResult<String> {
  let currency = currency.map(str::trim).filter(|c| !c.is_empty()).unwrap_or(DEFAULT_CURRENCY);
  let upper = currency.to_ascii_uppercase();
  if SUPPORTED_CURRENCIES.contains(&upper.as_str()) {
    Ok(upper)
  } else {
    Err(CoreError::validation(format!("Unsupported currency: {}", currency)))
  }
}

/// Items must be present, have positive quantities, use catalogue prices for
/// catalogue memberships, and add up to `amount`.
pub fn validate_items(items: &[OrderItem], amount: f64) -> CoreResult<()> {
  if items.is_empty() {
    return Err(CoreError::validation("Invalid items. At least one item is required."));
  }

  let mut total = 0.0;
  for item in items {
    if item.name.trim().is_empty() {
      return Err(CoreError::validation("Every item needs a name"));
    }
    if item.quantity == 0 {
      return Err(CoreError::validation(format!("Invalid quantity for {}", item.name)));
    }
    if !item.price.is_finite() || item.price < 0.0 {
      return Err(CoreError::validation(format!("Invalid price for {}", item.name)));
    }
    if let Some(tier) = membership::find_by_name(&item.name) {
      if (tier.price - item.price).abs() > AMOUNT_TOLERANCE {
        return Err(CoreError::validation(format!("Price mismatch for {}", item.name)));
      }
    }
    total += item.price * f64::from(item.quantity);
  }

  if (round_to_cents(total) - amount).abs() > AMOUNT_TOLERANCE {
    return Err(CoreError::validation("Order amount does not match the items"));
  }
  Ok(())
}
