// server/src/pipelines/process_pipeline.rs

//! `process_payment`: token check, order checks, gateway charge, signature.

use crate::errors::{AppError, Result as AppResult};
use crate::pipelines::common_steps::{fail_order, load_owned_order};
use crate::pipelines::contexts::ProcessCtxData;
use crate::services::ChargeOutcome;
use chrono::Utc;
use protocol_zero_core::{ContextData, Order, Pipeline, PipelineControl};
use tracing::{info, instrument, warn};

const AMOUNT_TOLERANCE: f64 = 0.01;

pub fn build() -> Pipeline<ProcessCtxData, AppError> {
  let mut p = Pipeline::<ProcessCtxData, AppError>::new(
    "process_payment",
    &[
      ("verify_payment_token", false),
      ("load_order", false),
      ("charge_gateway", false),
      ("sign_payment", false),
    ],
  );
  p.skip_if("verify_payment_token", |ctx| ctx.payment_token.is_none());
  p.on("verify_payment_token", verify_payment_token);
  p.on("load_order", load_order);
  p.on("charge_gateway", charge_gateway);
  p.on("sign_payment", sign_payment);
  p
}

#[instrument(name = "process::verify_payment_token", skip_all, err)]
async fn verify_payment_token(ctx_data: ContextData<ProcessCtxData>) -> AppResult<PipelineControl> {
  ctx_data.with(|ctx| -> AppResult<()> {
    let token = ctx.payment_token.as_deref().unwrap_or_default();
    let data = ctx.app_state.signer.verify_payment_token(token, Utc::now()).map_err(|e| {
      warn!(reason = %e, "Payment token rejected.");
      AppError::Validation("Invalid or expired payment token".to_string())
    })?;
    if data.order_id != ctx.order_id {
      return Err(AppError::Validation("Payment token does not match order".to_string()));
    }
    Ok(())
  })?;
  Ok(PipelineControl::Continue)
}

#[instrument(name = "process::load_order", skip_all, err)]
async fn load_order(ctx_data: ContextData<ProcessCtxData>) -> AppResult<PipelineControl> {
  let (app_state, order_id, user_id, amount) = ctx_data.with(|ctx| {
    (ctx.app_state.clone(), ctx.order_id.clone(), ctx.user_id.clone(), ctx.amount)
  });

  let order = load_owned_order(&app_state, &order_id, &user_id).await?;
  order.ensure_payable(Utc::now())?;
  if (order.amount - amount).abs() > AMOUNT_TOLERANCE {
    return Err(AppError::Validation("Payment amount does not match order amount".to_string()));
  }

  ctx_data.update(|ctx| ctx.order = Some(order));
  Ok(PipelineControl::Continue)
}

#[instrument(name = "process::charge_gateway", skip_all, err)]
async fn charge_gateway(ctx_data: ContextData<ProcessCtxData>) -> AppResult<PipelineControl> {
  let (app_state, order_id, amount, method) =
    ctx_data.with(|ctx| (ctx.app_state.clone(), ctx.order_id.clone(), ctx.amount, ctx.method));

  match app_state.gateway.charge(&order_id, amount, method).await? {
    ChargeOutcome::Approved { payment_id } => {
      let stored_payment_id = payment_id.clone();
      let order = app_state
        .orders
        .update(
          &order_id,
          Box::new(move |o: &mut Order| {
            o.mark_processing(Some(method))?;
            o.payment_id = Some(stored_payment_id);
            Ok(())
          }),
        )
        .await?;
      info!(%order_id, %payment_id, "Gateway approved payment.");
      ctx_data.update(|ctx| {
        ctx.payment_id = Some(payment_id);
        ctx.order = Some(order);
      });
      Ok(PipelineControl::Continue)
    }
    ChargeOutcome::Declined { reason } => {
      let order = fail_order(&app_state, &order_id, reason.clone()).await?;
      warn!(%order_id, %reason, "Gateway declined payment.");
      ctx_data.update(|ctx| {
        ctx.failure = Some(reason);
        ctx.order = Some(order);
      });
      Ok(PipelineControl::Stop)
    }
  }
}

#[instrument(name = "process::sign_payment", skip_all, err)]
async fn sign_payment(ctx_data: ContextData<ProcessCtxData>) -> AppResult<PipelineControl> {
  ctx_data.update(|ctx| -> AppResult<()> {
    let (order, payment_id) = match (ctx.order.as_ref(), ctx.payment_id.as_deref()) {
      (Some(order), Some(payment_id)) => (order, payment_id),
      _ => return Err(AppError::Internal("Payment details missing before signing".to_string())),
    };
    let signature = ctx
      .app_state
      .signer
      .payment_signature(&order.order_id, payment_id, order.amount);
    ctx.signature = Some(signature);
    Ok(())
  })?;
  Ok(PipelineControl::Continue)
}
