// server/src/pipelines/mod.rs

//! The server's workflows, built once at start-up and shared through `AppState`.

use crate::errors::AppError;
use protocol_zero_core::Pipeline;

pub mod common_steps;
pub mod contexts;

pub mod checkout_pipeline;
pub mod completion_pipeline;
pub mod paytm_callback_pipeline;
pub mod process_pipeline;
pub mod stripe_webhook_pipeline;

use contexts::{CheckoutCtxData, CompletionCtxData, PaytmCallbackCtxData, ProcessCtxData, StripeWebhookCtxData};

pub struct Pipelines {
  pub checkout: Pipeline<CheckoutCtxData, AppError>,
  pub process: Pipeline<ProcessCtxData, AppError>,
  pub completion: Pipeline<CompletionCtxData, AppError>,
  pub stripe_webhook: Pipeline<StripeWebhookCtxData, AppError>,
  pub paytm_callback: Pipeline<PaytmCallbackCtxData, AppError>,
}

impl Pipelines {
  pub fn build() -> Self {
    tracing::info!("Building application pipelines...");
    let pipelines = Self {
      checkout: checkout_pipeline::build(),
      process: process_pipeline::build(),
      completion: completion_pipeline::build(),
      stripe_webhook: stripe_webhook_pipeline::build(),
      paytm_callback: paytm_callback_pipeline::build(),
    };
    tracing::info!("All application pipelines built.");
    pipelines
  }
}
