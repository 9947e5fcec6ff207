// server/src/pipelines/common_steps.rs

//! Order operations shared by several pipelines and handlers.

use crate::errors::{AppError, Result as AppResult};
use crate::pipelines::contexts::CompletionCtxData;
use crate::state::AppState;
use protocol_zero_core::{ContextData, Order, OrderStatus, PipelineResult, Settlement, SupportTicket};
use tracing::{info, instrument, warn};

/// What a completion run left behind.
#[derive(Debug, Clone)]
pub struct SettledOrder {
  pub order: Order,
  pub ticket: Option<SupportTicket>,
  pub first_completion: bool,
}

pub async fn load_order(app_state: &AppState, order_id: &str) -> AppResult<Order> {
  app_state
    .orders
    .get(order_id)
    .await?
    .ok_or_else(|| AppError::NotFound("Order not found".to_string()))
}

/// Loads an order and checks that `user_id` placed it.
pub async fn load_owned_order(app_state: &AppState, order_id: &str, user_id: &str) -> AppResult<Order> {
  let order = load_order(app_state, order_id).await?;
  if !order.is_owned_by(user_id) {
    warn!(%order_id, "Order accessed by a different user.");
    return Err(AppError::Forbidden("Unauthorized access to this order".to_string()));
  }
  Ok(order)
}

/// Runs the completion pipeline for `order_id`. Safe to call repeatedly.
#[instrument(name = "common_step::settle_order", skip(app_state, settlement))]
pub async fn settle_order(app_state: &AppState, order_id: &str, settlement: Settlement) -> AppResult<SettledOrder> {
  let ctx_data = ContextData::new(CompletionCtxData::new(app_state.clone(), order_id, settlement));

  match app_state.pipelines.completion.run(ctx_data.clone()).await? {
    PipelineResult::Completed => {}
    PipelineResult::Stopped => {
      warn!(%order_id, "Completion pipeline stopped early.");
    }
  }

  let final_ctx = ctx_data.snapshot();
  let order = final_ctx
    .order
    .ok_or_else(|| AppError::Internal("Payment completed, but order details are unavailable.".to_string()))?;
  info!(
    %order_id,
    first_completion = final_ctx.first_completion,
    ticket_created = final_ctx.ticket_created,
    "Order settled."
  );
  Ok(SettledOrder {
    order,
    ticket: final_ctx.ticket,
    first_completion: final_ctx.first_completion,
  })
}

/// Marks an order failed; an already completed order is left alone.
#[instrument(name = "common_step::fail_order", skip(app_state, reason))]
pub async fn fail_order(app_state: &AppState, order_id: &str, reason: String) -> AppResult<Order> {
  let order = app_state
    .orders
    .update(
      order_id,
      Box::new(move |o: &mut Order| {
        if !o.fail(reason)? {
          info!(status = %o.status, "Failure ignored for settled order.");
        }
        Ok(())
      }),
    )
    .await?;
  Ok(order)
}

/// Provider events for a cancelled order are acknowledged but not applied.
/// A reported payment reference is kept on the order for reconciliation.
/// Returns `None` when the order is not cancelled.
#[instrument(name = "common_step::acknowledge_cancelled", skip(app_state, payment_ref))]
pub async fn acknowledge_cancelled(
  app_state: &AppState,
  order_id: &str,
  payment_ref: Option<String>,
) -> AppResult<Option<Order>> {
  if load_order(app_state, order_id).await?.status != OrderStatus::Cancelled {
    return Ok(None);
  }
  let order = app_state
    .orders
    .update(
      order_id,
      Box::new(move |o: &mut Order| {
        if o.status == OrderStatus::Cancelled && o.payment_id.is_none() {
          o.payment_id = payment_ref;
        }
        Ok(())
      }),
    )
    .await?;
  warn!(
    %order_id,
    payment_id = order.payment_id.as_deref(),
    "Provider event for a cancelled order acknowledged without applying it."
  );
  Ok(Some(order))
}
