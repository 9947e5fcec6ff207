// server/src/pipelines/checkout_pipeline.rs
use crate::errors::{AppError, Result as AppResult};
use crate::pipelines::contexts::CheckoutCtxData;
use chrono::{Duration, Utc};
use protocol_zero_core::checkout::{normalize_currency, validate_amount, validate_items};
use protocol_zero_core::{ContextData, NewOrder, Order, Pipeline, PipelineControl};
use tracing::{info, instrument};

pub fn build() -> Pipeline<CheckoutCtxData, AppError> {
  let mut p = Pipeline::<CheckoutCtxData, AppError>::new(
    "checkout",
    &[
      ("validate_request", false),
      ("create_order_record", false),
      ("issue_payment_token", false),
    ],
  );
  p.on("validate_request", validate_request);
  p.on("create_order_record", create_order_record);
  p.on("issue_payment_token", issue_payment_token);
  p
}

#[instrument(name = "checkout::validate_request", skip_all, err)]
async fn validate_request(ctx_data: ContextData<CheckoutCtxData>) -> AppResult<PipelineControl> {
  ctx_data.update(|ctx| -> AppResult<()> {
    let amount = validate_amount(ctx.amount)?;
    let currency = normalize_currency(ctx.currency.as_deref())?;
    validate_items(&ctx.items, amount)?;
    ctx.amount = amount;
    ctx.currency = Some(currency);
    Ok(())
  })?;
  Ok(PipelineControl::Continue)
}

#[instrument(name = "checkout::create_order_record", skip_all, err)]
async fn create_order_record(ctx_data: ContextData<CheckoutCtxData>) -> AppResult<PipelineControl> {
  let (app_state, new_order) = ctx_data.with(|ctx| {
    (
      ctx.app_state.clone(),
      NewOrder {
        amount: ctx.amount,
        currency: ctx.currency.clone().unwrap_or_default(),
        items: ctx.items.clone(),
        user_id: ctx.user_id.clone(),
        user_name: ctx.user_name.clone(),
      },
    )
  });

  let expiry = Duration::minutes(app_state.config.payment.order_expiry_minutes);
  let order = Order::new(new_order, Utc::now(), expiry);
  app_state.orders.insert(order.clone()).await?;
  info!(order_id = %order.order_id, amount = order.amount, currency = %order.currency, "Order created.");

  ctx_data.update(|ctx| ctx.order = Some(order));
  Ok(PipelineControl::Continue)
}

#[instrument(name = "checkout::issue_payment_token", skip_all, err)]
async fn issue_payment_token(ctx_data: ContextData<CheckoutCtxData>) -> AppResult<PipelineControl> {
  ctx_data.update(|ctx| -> AppResult<()> {
    let order = ctx
      .order
      .as_ref()
      .ok_or_else(|| AppError::Internal("Order missing before token issue".to_string()))?;
    let token = ctx
      .app_state
      .signer
      .create_payment_token(&order.order_id, order.amount, &order.user_id, Utc::now());
    ctx.payment_token = Some(token);
    Ok(())
  })?;
  Ok(PipelineControl::Continue)
}
