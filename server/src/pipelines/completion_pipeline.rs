// server/src/pipelines/completion_pipeline.rs

//! `complete_payment`: moves an order to completed and opens its membership ticket once.

use crate::errors::{AppError, Result as AppResult};
use crate::pipelines::contexts::CompletionCtxData;
use crate::services::discord::MembershipTicketRequest;
use chrono::Utc;
use protocol_zero_core::ticket::MembershipPurchase;
use protocol_zero_core::{Completion, ContextData, Order, Pipeline, PipelineControl, SupportTicket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, instrument, warn};

pub fn build() -> Pipeline<CompletionCtxData, AppError> {
  let mut p = Pipeline::<CompletionCtxData, AppError>::new(
    "complete_payment",
    &[
      ("mark_completed", false),
      ("record_support_ticket", false),
      ("open_discord_ticket", true),
    ],
  );

  p.on("mark_completed", mark_completed);

  p.skip_if("record_support_ticket", |ctx| {
    ctx.order.as_ref().map_or(true, |o| o.ticket_id.is_some())
  });
  p.on("record_support_ticket", record_support_ticket);

  p.skip_if("open_discord_ticket", |ctx| {
    !ctx.ticket_created || ctx.app_state.config.discord.bot_token.is_none()
  });
  p.on("open_discord_ticket", open_discord_ticket);

  p
}

#[instrument(name = "completion::mark_completed", skip_all, err)]
async fn mark_completed(ctx_data: ContextData<CompletionCtxData>) -> AppResult<PipelineControl> {
  let (app_state, order_id, settlement) = ctx_data.update(|ctx| {
    (
      ctx.app_state.clone(),
      ctx.order_id.clone(),
      ctx.settlement.take().unwrap_or_default(),
    )
  });

  let applied = Arc::new(AtomicBool::new(false));
  let applied_flag = Arc::clone(&applied);
  let now = Utc::now();
  let order = app_state
    .orders
    .update(
      &order_id,
      Box::new(move |o: &mut Order| {
        let outcome = o.complete(settlement, now)?;
        applied_flag.store(outcome == Completion::Applied, Ordering::SeqCst);
        Ok(())
      }),
    )
    .await?;
  let first_completion = applied.load(Ordering::SeqCst);

  let existing_ticket = match order.ticket_id.as_deref() {
    Some(ticket_id) => app_state.tickets.get(ticket_id).await?,
    None => None,
  };

  info!(%order_id, first_completion, payment_id = ?order.payment_id, "Order marked completed.");
  ctx_data.update(|ctx| {
    ctx.first_completion = first_completion;
    ctx.ticket = existing_ticket;
    ctx.order = Some(order);
  });
  Ok(PipelineControl::Continue)
}

#[instrument(name = "completion::record_support_ticket", skip_all, err)]
async fn record_support_ticket(ctx_data: ContextData<CompletionCtxData>) -> AppResult<PipelineControl> {
  let (app_state, order) = ctx_data.with(|ctx| (ctx.app_state.clone(), ctx.order.clone()));
  let order = order.ok_or_else(|| AppError::Internal("Order missing before ticket creation".to_string()))?;

  let transaction_id = order
    .user_reported_txn_id
    .clone()
    .or_else(|| order.payment_id.clone())
    .unwrap_or_default();
  let ticket = SupportTicket::for_membership(
    MembershipPurchase {
      user_id: &order.user_id,
      order_id: &order.order_id,
      transaction_id: &transaction_id,
      amount: order.amount,
      currency: &order.currency,
    },
    Utc::now(),
  );

  // Link first; whoever links the order owns the ticket.
  let linked = Arc::new(AtomicBool::new(false));
  let linked_flag = Arc::clone(&linked);
  let ticket_id = ticket.ticket_id.clone();
  let updated = app_state
    .orders
    .update(
      &order.order_id,
      Box::new(move |o: &mut Order| {
        if o.ticket_id.is_none() {
          o.ticket_id = Some(ticket_id);
          linked_flag.store(true, Ordering::SeqCst);
        }
        Ok(())
      }),
    )
    .await?;

  if linked.load(Ordering::SeqCst) {
    app_state.tickets.insert(ticket.clone()).await?;
    info!(ticket_id = %ticket.ticket_id, order_id = %order.order_id, "Membership support ticket created.");
    ctx_data.update(|ctx| {
      ctx.ticket = Some(ticket);
      ctx.ticket_created = true;
      ctx.order = Some(updated);
    });
  } else {
    let existing = match updated.ticket_id.as_deref() {
      Some(id) => app_state.tickets.get(id).await?,
      None => None,
    };
    ctx_data.update(|ctx| {
      ctx.ticket = existing;
      ctx.order = Some(updated);
    });
  }
  Ok(PipelineControl::Continue)
}

#[instrument(name = "completion::open_discord_ticket", skip_all)]
async fn open_discord_ticket(ctx_data: ContextData<CompletionCtxData>) -> AppResult<PipelineControl> {
  let (app_state, ticket) = ctx_data.with(|ctx| (ctx.app_state.clone(), ctx.ticket.clone()));
  let Some(ticket) = ticket else {
    return Ok(PipelineControl::Continue);
  };

  let request = MembershipTicketRequest {
    user_id: ticket.user_id.clone(),
    order_id: ticket.order_id.clone(),
    transaction_id: ticket.transaction_id.clone(),
    amount: ticket.amount,
    currency: ticket.currency.clone(),
  };
  match app_state.discord.open_membership_ticket(&request).await {
    Ok(thread_id) => {
      info!(%thread_id, ticket_id = %ticket.ticket_id, "Discord membership ticket opened.");
      ctx_data.update(|ctx| ctx.discord_thread_id = Some(thread_id));
    }
    Err(e) => {
      warn!(error = %e, ticket_id = %ticket.ticket_id, "Failed to open Discord membership ticket.");
    }
  }
  Ok(PipelineControl::Continue)
}
