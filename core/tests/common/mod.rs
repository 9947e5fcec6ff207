// tests/common/mod.rs
#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use once_cell::sync::Lazy;
use protocol_zero_core::pipeline::{ContextData, Handler, PipelineControl, PipelineError};
use protocol_zero_core::{NewOrder, Order, OrderItem};
use tracing::Level;

// --- Pipeline test context ---
#[derive(Clone, Debug, Default)]
pub struct TestContext {
  pub counter: i32,
  pub message: String,
  pub steps_executed: Vec<String>,
  pub should_stop_at: Option<String>,
}

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum TestError {
  #[error("Pipeline error: {0}")]
  Pipeline(String),

  #[error("Test handler failed: {0}")]
  Handler(String),
}

impl From<PipelineError> for TestError {
  fn from(err: PipelineError) -> Self {
    TestError::Pipeline(err.to_string())
  }
}

pub fn create_simple_handler(step_name: &'static str, message_to_append: &'static str) -> Handler<TestContext, TestError> {
  Box::new(move |ctx: ContextData<TestContext>| {
    Box::pin(async move {
      let mut guard = ctx.write();
      guard.counter += 1;
      guard.message.push_str(message_to_append);
      guard.steps_executed.push(step_name.to_string());
      if guard.should_stop_at.as_deref() == Some(step_name) {
        return Ok(PipelineControl::Stop);
      }
      Ok(PipelineControl::Continue)
    })
  })
}

pub fn create_failing_handler(step_name: &'static str, error_message: &'static str) -> Handler<TestContext, TestError> {
  Box::new(move |ctx: ContextData<TestContext>| {
    Box::pin(async move {
      ctx.write().steps_executed.push(step_name.to_string());
      Err(TestError::Handler(error_message.to_string()))
    })
  })
}

// --- Order fixtures ---
pub fn fixed_now() -> DateTime<Utc> {
  Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap()
}

pub fn membership_items() -> Vec<OrderItem> {
  vec![OrderItem {
    name: "Silver Membership".to_string(),
    quantity: 1,
    price: 723.89,
  }]
}

pub fn pending_order(user_id: &str, now: DateTime<Utc>) -> Order {
  Order::new(
    NewOrder {
      amount: 723.89,
      currency: "INR".to_string(),
      items: membership_items(),
      user_id: user_id.to_string(),
      user_name: "tester".to_string(),
    },
    now,
    Duration::minutes(15),
  )
}

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
