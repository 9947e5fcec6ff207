// core/src/ids.rs

//! Identifier generation for orders, payments and support tickets.

use chrono::{DateTime, Utc};
use rand_core::{OsRng, RngCore};

const BASE36: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// `ord_<millis>_<first 8 chars of user id>_<16 hex>`
pub fn order_id(user_id: &str, now: DateTime<Utc>) -> String {
  format!(
    "ord_{}_{}_{}",
    now.timestamp_millis(),
    char_slice(user_id, 0, 8),
    random_hex(8)
  )
}

/// `pay_<millis>_<chars 4..12 of order id>_<16 hex>`
pub fn payment_id(order_id: &str, now: DateTime<Utc>) -> String {
  format!(
    "pay_{}_{}_{}",
    now.timestamp_millis(),
    char_slice(order_id, 4, 12),
    random_hex(8)
  )
}

/// `TKT-<millis>-<6 upper-case base36 chars>`
pub fn ticket_id(now: DateTime<Utc>) -> String {
  let suffix: String = (0..6)
    .map(|_| BASE36[(OsRng.next_u32() % BASE36.len() as u32) as usize] as char)
    .collect();
  format!("TKT-{}-{}", now.timestamp_millis(), suffix)
}

pub fn random_hex(num_bytes: usize) -> String {
  let mut buf = vec![0u8; num_bytes];
  OsRng.fill_bytes(&mut buf);
  hex::encode(buf)
}

/// Character-based substring clamped to the input length.
fn char_slice(s: &str, start: usize, end: usize) -> String {
  s.chars().skip(start).take(end.saturating_sub(start)).collect()
}
