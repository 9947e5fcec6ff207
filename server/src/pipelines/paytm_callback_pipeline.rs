// server/src/pipelines/paytm_callback_pipeline.rs
use crate::errors::{AppError, Result as AppResult};
use crate::pipelines::common_steps::{acknowledge_cancelled, fail_order, load_order, settle_order};
use crate::pipelines::contexts::PaytmCallbackCtxData;
use crate::services::paytm::{parse_txn_date, verify_callback, STATUS_PENDING, STATUS_SUCCESS};
use chrono::Utc;
use protocol_zero_core::{ContextData, Order, PaymentMethod, Pipeline, PipelineControl, Settlement};
use tracing::{info, instrument, warn};

pub fn build() -> Pipeline<PaytmCallbackCtxData, AppError> {
  let mut p = Pipeline::<PaytmCallbackCtxData, AppError>::new(
    "paytm_callback",
    &[
      ("verify_checksum", false),
      ("fetch_status", false),
      ("apply_status", false),
    ],
  );
  p.on("verify_checksum", verify_checksum);
  p.on("fetch_status", fetch_status);
  p.on("apply_status", apply_status);
  p
}

#[instrument(name = "paytm_callback::verify_checksum", skip_all, err)]
async fn verify_checksum(ctx_data: ContextData<PaytmCallbackCtxData>) -> AppResult<PipelineControl> {
  ctx_data.with(|ctx| -> AppResult<()> {
    let merchant_key = ctx.app_state.paytm.merchant_key().ok_or_else(|| {
      AppError::Config("PAYTM_MID or PAYTM_MERCHANT_KEY is not configured".to_string())
    })?;
    if !verify_callback(&ctx.params, merchant_key) {
      warn!(order_id = %ctx.order_id, "Paytm callback checksum rejected.");
      return Err(AppError::Validation("Invalid checksum".to_string()));
    }
    Ok(())
  })?;
  Ok(PipelineControl::Continue)
}

#[instrument(name = "paytm_callback::fetch_status", skip_all, err)]
async fn fetch_status(ctx_data: ContextData<PaytmCallbackCtxData>) -> AppResult<PipelineControl> {
  let (app_state, order_id) = ctx_data.with(|ctx| (ctx.app_state.clone(), ctx.order_id.clone()));

  // Unknown orders are rejected before asking Paytm.
  load_order(&app_state, &order_id).await?;
  let status = app_state.paytm.order_status(&order_id).await?;
  info!(%order_id, paytm_status = %status.status, "Paytm order status fetched.");

  ctx_data.update(|ctx| ctx.txn_status = Some(status));
  Ok(PipelineControl::Continue)
}

#[instrument(name = "paytm_callback::apply_status", skip_all, err)]
async fn apply_status(ctx_data: ContextData<PaytmCallbackCtxData>) -> AppResult<PipelineControl> {
  let (app_state, order_id, status, callback_txn_id, callback_txn_date) = ctx_data.with(|ctx| {
    (
      ctx.app_state.clone(),
      ctx.order_id.clone(),
      ctx.txn_status.clone(),
      ctx.params.get("TXNID").cloned().filter(|v| !v.is_empty()),
      ctx.params.get("TXNDATE").cloned().filter(|v| !v.is_empty()),
    )
  });
  let status = status.ok_or_else(|| AppError::Internal("Paytm status missing before apply".to_string()))?;

  let payment_ref = (status.status == STATUS_SUCCESS)
    .then(|| status.txn_id.clone().or_else(|| callback_txn_id.clone()))
    .flatten();
  if let Some(order) = acknowledge_cancelled(&app_state, &order_id, payment_ref).await? {
    ctx_data.update(|ctx| ctx.order = Some(order));
    return Ok(PipelineControl::Continue);
  }

  let order = match status.status.as_str() {
    STATUS_SUCCESS => {
      let settlement = Settlement {
        payment_id: status.txn_id.clone().or(callback_txn_id),
        method: Some(PaymentMethod::Upi),
        verified_at: Some(
          status
            .txn_date
            .as_deref()
            .or(callback_txn_date.as_deref())
            .and_then(parse_txn_date)
            .unwrap_or_else(Utc::now),
        ),
        ..Settlement::default()
      };
      settle_order(&app_state, &order_id, settlement).await?.order
    }
    STATUS_PENDING => {
      app_state
        .orders
        .update(
          &order_id,
          Box::new(|o: &mut Order| {
            if o.status.is_terminal() {
              return Ok(());
            }
            o.mark_processing(Some(PaymentMethod::Upi))
          }),
        )
        .await?
    }
    _ => {
      let reason = status
        .message
        .clone()
        .unwrap_or_else(|| format!("Paytm reported {}", status.status));
      fail_order(&app_state, &order_id, reason).await?
    }
  };

  info!(%order_id, status = %order.status, "Paytm callback applied.");
  ctx_data.update(|ctx| ctx.order = Some(order));
  Ok(PipelineControl::Continue)
}
