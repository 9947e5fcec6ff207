// server/src/pipelines/stripe_webhook_pipeline.rs
use crate::errors::{AppError, Result as AppResult};
use crate::pipelines::common_steps::{acknowledge_cancelled, fail_order, settle_order};
use crate::pipelines::contexts::StripeWebhookCtxData;
use crate::services::stripe::{verify_webhook_signature, StripeEvent, EVENT_PAYMENT_FAILED, EVENT_PAYMENT_SUCCEEDED};
use chrono::Utc;
use protocol_zero_core::{ContextData, PaymentMethod, Pipeline, PipelineControl, Settlement};
use tracing::{info, instrument, warn};

pub fn build() -> Pipeline<StripeWebhookCtxData, AppError> {
  let mut p = Pipeline::<StripeWebhookCtxData, AppError>::new(
    "stripe_webhook",
    &[
      ("verify_signature", false),
      ("parse_event", false),
      ("apply_event", false),
    ],
  );
  p.on("verify_signature", verify_signature);
  p.on("parse_event", parse_event);
  p.skip_if("apply_event", |ctx| ctx.order_id.is_none());
  p.on("apply_event", apply_event);
  p
}

#[instrument(name = "stripe_webhook::verify_signature", skip_all, err)]
async fn verify_signature(ctx_data: ContextData<StripeWebhookCtxData>) -> AppResult<PipelineControl> {
  ctx_data.with(|ctx| -> AppResult<()> {
    let header = ctx
      .signature_header
      .as_deref()
      .ok_or_else(|| AppError::Validation("Missing signature".to_string()))?;
    let secret = ctx
      .app_state
      .config
      .stripe
      .webhook_secret
      .as_deref()
      .ok_or_else(|| AppError::Config("STRIPE_WEBHOOK_SECRET is not configured".to_string()))?;
    verify_webhook_signature(&ctx.payload, header, secret, Utc::now()).map_err(|e| {
      warn!(reason = %e, "Stripe webhook signature rejected.");
      AppError::Validation("Invalid signature".to_string())
    })
  })?;
  Ok(PipelineControl::Continue)
}

#[instrument(name = "stripe_webhook::parse_event", skip_all, err)]
async fn parse_event(ctx_data: ContextData<StripeWebhookCtxData>) -> AppResult<PipelineControl> {
  ctx_data.update(|ctx| -> AppResult<()> {
    let event: StripeEvent = serde_json::from_slice(&ctx.payload)
      .map_err(|e| AppError::Validation(format!("Invalid webhook payload: {}", e)))?;

    let handled = matches!(event.event_type.as_str(), EVENT_PAYMENT_SUCCEEDED | EVENT_PAYMENT_FAILED);
    ctx.order_id = match (handled, event.data.object.order_id()) {
      (true, Some(order_id)) => Some(order_id.to_string()),
      (true, None) => {
        warn!(event_type = %event.event_type, intent = %event.data.object.id, "Stripe event without orderId metadata.");
        None
      }
      (false, _) => {
        info!(event_type = %event.event_type, "Stripe event acknowledged without action.");
        None
      }
    };
    ctx.event = Some(event);
    Ok(())
  })?;
  Ok(PipelineControl::Continue)
}

#[instrument(name = "stripe_webhook::apply_event", skip_all, err)]
async fn apply_event(ctx_data: ContextData<StripeWebhookCtxData>) -> AppResult<PipelineControl> {
  let (app_state, event, order_id) = ctx_data.with(|ctx| {
    (ctx.app_state.clone(), ctx.event.clone(), ctx.order_id.clone().unwrap_or_default())
  });
  let event = event.ok_or_else(|| AppError::Internal("Stripe event missing before apply".to_string()))?;
  let intent = &event.data.object;

  if app_state.orders.get(&order_id).await?.is_none() {
    warn!(%order_id, intent = %intent.id, "Stripe event for an unknown order ignored.");
    return Ok(PipelineControl::Continue);
  }

  let succeeded = event.event_type == EVENT_PAYMENT_SUCCEEDED;
  let payment_ref = succeeded.then(|| intent.id.clone());
  if let Some(order) = acknowledge_cancelled(&app_state, &order_id, payment_ref).await? {
    ctx_data.update(|ctx| ctx.order = Some(order));
    return Ok(PipelineControl::Continue);
  }

  let order = if succeeded {
    let settlement = Settlement {
      payment_id: Some(intent.id.clone()),
      method: Some(PaymentMethod::Card),
      stripe_payment_intent_id: Some(intent.id.clone()),
      ..Settlement::default()
    };
    settle_order(&app_state, &order_id, settlement).await?.order
  } else {
    fail_order(&app_state, &order_id, intent.failure_message()).await?
  };

  info!(%order_id, status = %order.status, event_type = %event.event_type, "Stripe event applied.");
  ctx_data.update(|ctx| ctx.order = Some(order));
  Ok(PipelineControl::Continue)
}
