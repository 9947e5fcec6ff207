// server/src/web/handlers/stripe_handlers.rs

use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use protocol_zero_core::{ContextData, Order, PipelineResult};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, instrument};

use crate::errors::{AppError, Result as AppResult};
use crate::pipelines::common_steps::load_owned_order;
use crate::pipelines::contexts::StripeWebhookCtxData;
use crate::services::stripe::IntentRequest;
use crate::session::AuthenticatedUser;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateIntentPayload {
  pub order_id: Option<String>,
}

#[instrument(name = "handler::stripe_create_intent", skip(app_state, payload, user), fields(user_id = %user.id))]
pub async fn create_intent_handler(
  app_state: web::Data<AppState>,
  payload: web::Json<CreateIntentPayload>,
  user: AuthenticatedUser,
) -> AppResult<HttpResponse> {
  let order_id = payload
    .into_inner()
    .order_id
    .map(|id| id.trim().to_string())
    .filter(|id| !id.is_empty())
    .ok_or_else(|| AppError::Validation("orderId is required".to_string()))?;

  let order = load_owned_order(&app_state, &order_id, &user.id).await?;
  order.ensure_payable(Utc::now())?;

  let intent = app_state
    .stripe
    .create_payment_intent(&IntentRequest {
      order_id: order.order_id.clone(),
      user_id: user.id.clone(),
      user_name: order.user_name.clone(),
      amount: order.amount,
      currency: order.currency.clone(),
    })
    .await?;

  let intent_id = intent.id.clone();
  app_state
    .orders
    .update(
      &order_id,
      Box::new(move |o: &mut Order| {
        o.stripe_payment_intent_id = Some(intent_id);
        Ok(())
      }),
    )
    .await?;
  info!(%order_id, payment_intent = %intent.id, "Stripe payment intent created.");

  Ok(HttpResponse::Ok().json(json!({
    "success": true,
    "paymentIntentId": intent.id,
    "clientSecret": intent.client_secret,
  })))
}

#[instrument(name = "handler::stripe_webhook", skip_all)]
pub async fn webhook_handler(
  app_state: web::Data<AppState>,
  req: HttpRequest,
  body: web::Bytes,
) -> AppResult<HttpResponse> {
  let signature_header = req
    .headers()
    .get("stripe-signature")
    .and_then(|v| v.to_str().ok())
    .map(str::to_string);

  let ctx_data = ContextData::new(StripeWebhookCtxData {
    app_state: app_state.get_ref().clone(),
    payload: body.to_vec(),
    signature_header,
    event: None,
    order_id: None,
    order: None,
  });

  match app_state.pipelines.stripe_webhook.run(ctx_data.clone()).await? {
    PipelineResult::Completed | PipelineResult::Stopped => {
      let final_ctx = ctx_data.snapshot();
      debug!(
        event_type = final_ctx.event.as_ref().map(|e| e.event_type.as_str()),
        order_id = final_ctx.order_id.as_deref(),
        "Stripe webhook handled."
      );
      Ok(HttpResponse::Ok().json(json!({ "received": true })))
    }
  }
}
