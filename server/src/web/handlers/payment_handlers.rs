// server/src/web/handlers/payment_handlers.rs

use actix_web::{web, HttpRequest, HttpResponse};
use chrono::{DateTime, Utc};
use protocol_zero_core::order::latest_paid_order;
use protocol_zero_core::upi::{self, UpiOptions};
use protocol_zero_core::{ContextData, Order, OrderItem, OrderStatus, PaymentMethod, PipelineResult, Settlement};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, instrument, warn};

use crate::errors::{AppError, Result as AppResult};
use crate::pipelines::common_steps::{load_owned_order, settle_order};
use crate::pipelines::contexts::{CheckoutCtxData, ProcessCtxData};
use crate::session::AuthenticatedUser;
use crate::state::AppState;

/// Checks `x-api-key` when a key is configured; open otherwise.
pub(crate) fn require_api_key(req: &HttpRequest, expected: Option<&str>) -> AppResult<()> {
  let Some(expected) = expected else {
    return Ok(());
  };
  let provided = req.headers().get("x-api-key").and_then(|v| v.to_str().ok());
  if provided != Some(expected) {
    warn!("Request rejected: invalid API key.");
    return Err(AppError::Auth("Invalid API key".to_string()));
  }
  Ok(())
}

fn required(value: Option<String>, message: &str) -> AppResult<String> {
  value
    .map(|v| v.trim().to_string())
    .filter(|v| !v.is_empty())
    .ok_or_else(|| AppError::Validation(message.to_string()))
}

// --- create-order ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderPayload {
  pub amount: Option<f64>,
  pub items: Option<Vec<OrderItem>>,
  pub currency: Option<String>,
}

#[instrument(name = "handler::create_order", skip(app_state, payload, user), fields(user_id = %user.id))]
pub async fn create_order_handler(
  app_state: web::Data<AppState>,
  payload: web::Json<CreateOrderPayload>,
  user: AuthenticatedUser,
) -> AppResult<HttpResponse> {
  let payload = payload.into_inner();
  let amount = payload
    .amount
    .ok_or_else(|| AppError::Validation("Invalid payment amount".to_string()))?;
  let user_name = [Some(user.name.as_str()), user.email.as_deref()]
    .into_iter()
    .flatten()
    .map(str::trim)
    .find(|n| !n.is_empty())
    .unwrap_or("Customer")
    .to_string();

  let ctx_data = ContextData::new(CheckoutCtxData {
    app_state: app_state.get_ref().clone(),
    user_id: user.id.clone(),
    user_name,
    amount,
    currency: payload.currency,
    items: payload.items.unwrap_or_default(),
    order: None,
    payment_token: None,
  });

  match app_state.pipelines.checkout.run(ctx_data.clone()).await? {
    PipelineResult::Completed => {
      let final_ctx = ctx_data.snapshot();
      let (order, token) = match (final_ctx.order, final_ctx.payment_token) {
        (Some(order), Some(token)) => (order, token),
        _ => return Err(AppError::Internal("Checkout completed without an order.".to_string())),
      };
      info!(order_id = %order.order_id, "Checkout order ready for payment.");
      Ok(HttpResponse::Ok().json(json!({
        "orderId": order.order_id,
        "amount": order.amount,
        "currency": order.currency,
        "paymentToken": token,
        "expiresAt": order.expires_at,
      })))
    }
    PipelineResult::Stopped => Err(AppError::Internal("Checkout was halted.".to_string())),
  }
}

// --- process ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessPaymentPayload {
  pub order_id: Option<String>,
  pub amount: Option<f64>,
  pub currency: Option<String>,
  pub method: Option<PaymentMethod>,
  pub payment_details: Option<Value>,
  pub payment_token: Option<String>,
}

#[instrument(name = "handler::process_payment", skip(app_state, payload, user), fields(user_id = %user.id))]
pub async fn process_payment_handler(
  app_state: web::Data<AppState>,
  payload: web::Json<ProcessPaymentPayload>,
  user: AuthenticatedUser,
) -> AppResult<HttpResponse> {
  let payload = payload.into_inner();
  let (order_id, amount, method) = match (payload.order_id, payload.amount, payload.method) {
    (Some(order_id), Some(amount), Some(method)) if !order_id.trim().is_empty() && amount != 0.0 => {
      (order_id.trim().to_string(), amount, method)
    }
    _ => return Err(AppError::Validation("Missing required payment details".to_string())),
  };

  let ctx_data = ContextData::new(ProcessCtxData {
    app_state: app_state.get_ref().clone(),
    user_id: user.id.clone(),
    order_id: order_id.clone(),
    amount,
    method,
    payment_token: payload.payment_token.filter(|t| !t.trim().is_empty()),
    order: None,
    payment_id: None,
    signature: None,
    failure: None,
  });

  let result = app_state.pipelines.process.run(ctx_data.clone()).await?;
  let final_ctx = ctx_data.snapshot();
  match result {
    PipelineResult::Stopped => {
      let error = final_ctx
        .failure
        .unwrap_or_else(|| "Payment processing failed".to_string());
      warn!(%order_id, %error, "Payment not processed.");
      Ok(HttpResponse::BadRequest().json(json!({ "success": false, "error": error })))
    }
    PipelineResult::Completed => {
      let (payment_id, signature) = match (final_ctx.payment_id, final_ctx.signature) {
        (Some(payment_id), Some(signature)) => (payment_id, signature),
        _ => return Err(AppError::Internal("Payment processed without a signature.".to_string())),
      };
      Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "paymentId": payment_id,
        "orderId": order_id,
        "signature": signature,
        "message": "Payment processed successfully",
      })))
    }
  }
}

// --- verify ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPaymentPayload {
  pub order_id: Option<String>,
  pub payment_id: Option<String>,
  pub signature: Option<String>,
}

#[instrument(name = "handler::verify_payment", skip(app_state, payload, user), fields(user_id = %user.id))]
pub async fn verify_payment_handler(
  app_state: web::Data<AppState>,
  payload: web::Json<VerifyPaymentPayload>,
  user: AuthenticatedUser,
) -> AppResult<HttpResponse> {
  let payload = payload.into_inner();
  let missing = "Missing payment details";
  let order_id = required(payload.order_id, missing)?;
  let payment_id = required(payload.payment_id, missing)?;
  let signature = required(payload.signature, missing)?;

  let order = load_owned_order(&app_state, &order_id, &user.id).await?;
  if !app_state
    .signer
    .verify_payment_signature(&order_id, &payment_id, order.amount, &signature)
  {
    warn!(%order_id, "Payment signature mismatch.");
    return Err(AppError::Validation("Invalid payment signature".to_string()));
  }

  let settled = settle_order(
    &app_state,
    &order_id,
    Settlement {
      payment_id: Some(payment_id.clone()),
      ..Settlement::default()
    },
  )
  .await?;

  let ticket = settled.ticket.map(|t| {
    json!({
      "ticketId": t.ticket_id,
      "category": t.category,
      "status": t.status,
    })
  });
  Ok(HttpResponse::Ok().json(json!({
    "verified": true,
    "paymentId": payment_id,
    "orderId": order_id,
    "amount": settled.order.amount,
    "currency": settled.order.currency,
    "transactionId": payment_id,
    "ticket": ticket,
    "message": "Payment verified successfully",
  })))
}

// --- status ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderQuery {
  pub order_id: Option<String>,
}

fn status_view(order: &Order) -> Value {
  json!({
    "orderId": order.order_id,
    "status": order.status,
    "amount": order.amount,
    "currency": order.currency,
    "createdAt": order.created_at,
    "expiresAt": order.expires_at,
    "paymentId": order.payment_id,
    "transactionId": order.user_reported_txn_id,
    "userReportedAt": order.user_reported_at,
    "paymentMethod": order.payment_method,
    "ticketId": order.ticket_id,
  })
}

#[instrument(name = "handler::payment_status", skip(app_state, query, user), fields(user_id = %user.id))]
pub async fn payment_status_handler(
  app_state: web::Data<AppState>,
  query: web::Query<OrderQuery>,
  user: AuthenticatedUser,
) -> AppResult<HttpResponse> {
  let order_id = required(query.into_inner().order_id, "Order ID is required")?;
  let order = load_owned_order(&app_state, &order_id, &user.id).await?;
  Ok(HttpResponse::Ok().json(status_view(&order)))
}

// --- report-payment ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportPaymentPayload {
  pub order_id: Option<String>,
  pub transaction_id: Option<String>,
}

#[instrument(name = "handler::report_payment", skip(app_state, payload, user), fields(user_id = %user.id))]
pub async fn report_payment_handler(
  app_state: web::Data<AppState>,
  payload: web::Json<ReportPaymentPayload>,
  user: AuthenticatedUser,
) -> AppResult<HttpResponse> {
  let payload = payload.into_inner();
  let order_id = required(payload.order_id, "orderId is required")?;
  let transaction_id = required(payload.transaction_id, "transactionId is required")?;

  let order = load_owned_order(&app_state, &order_id, &user.id).await?;
  if order.status != OrderStatus::Completed {
    order.ensure_payable(Utc::now())?;
  }

  let settled = settle_order(
    &app_state,
    &order_id,
    Settlement {
      method: Some(PaymentMethod::Upi),
      reported_txn_id: Some(transaction_id.clone()),
      ..Settlement::default()
    },
  )
  .await?;
  let order = settled.order;
  info!(%order_id, "User reported a UPI payment.");

  Ok(HttpResponse::Ok().json(json!({
    "success": true,
    "orderId": order.order_id,
    "transactionId": order.user_reported_txn_id.unwrap_or(transaction_id),
    "paymentId": order.payment_id,
    "status": order.status,
    "reportedAt": order.user_reported_at,
  })))
}

// --- confirm ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmPaymentPayload {
  pub order_id: Option<String>,
  pub transaction_id: Option<String>,
  pub paid_at: Option<String>,
}

#[instrument(name = "handler::confirm_payment", skip_all)]
pub async fn confirm_payment_handler(
  app_state: web::Data<AppState>,
  req: HttpRequest,
  payload: web::Json<ConfirmPaymentPayload>,
) -> AppResult<HttpResponse> {
  require_api_key(&req, app_state.config.payment.confirm_key())?;

  let payload = payload.into_inner();
  let order_id = required(payload.order_id, "orderId is required")?;
  let transaction_id = required(payload.transaction_id, "transactionId is required")?;
  let paid_at = match payload.paid_at.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
    Some(raw) => Some(
      DateTime::parse_from_rfc3339(raw)
        .map_err(|_| AppError::Validation("paidAt must be an ISO-8601 timestamp".to_string()))?
        .with_timezone(&Utc),
    ),
    None => None,
  };

  let settled = settle_order(
    &app_state,
    &order_id,
    Settlement {
      payment_id: Some(transaction_id),
      method: Some(PaymentMethod::Upi),
      verified_at: paid_at,
      ..Settlement::default()
    },
  )
  .await?;
  let order = settled.order;
  info!(%order_id, first_completion = settled.first_completion, "Payment confirmed.");

  Ok(HttpResponse::Ok().json(json!({
    "success": true,
    "orderId": order.order_id,
    "transactionId": order.payment_id,
    "paidAt": order.verified_at,
    "status": order.status,
  })))
}

// --- verify-user-payment ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyUserPaymentPayload {
  pub discord_user_id: Option<String>,
}

#[instrument(name = "handler::verify_user_payment", skip_all)]
pub async fn verify_user_payment_handler(
  app_state: web::Data<AppState>,
  req: HttpRequest,
  payload: web::Json<VerifyUserPaymentPayload>,
) -> AppResult<HttpResponse> {
  require_api_key(&req, app_state.config.payment.verify_api_key.as_deref())?;
  let discord_user_id = required(payload.into_inner().discord_user_id, "discordUserId is required")?;

  let orders = app_state.orders.list_for_user(&discord_user_id).await?;
  let Some(latest) = latest_paid_order(&orders, &discord_user_id) else {
    return Ok(HttpResponse::Ok().json(json!({ "success": true, "paid": false })));
  };

  let confirmed = latest.status == OrderStatus::Completed;
  let reported = latest.user_reported_txn_id.is_some();
  Ok(HttpResponse::Ok().json(json!({
    "success": true,
    "paid": confirmed || reported,
    "paymentReported": reported,
    "paymentConfirmed": confirmed,
    "status": latest.status,
    "orderId": latest.order_id,
    "transactionId": latest.user_reported_txn_id.as_ref().or(latest.payment_id.as_ref()),
    "paymentId": latest.payment_id,
    "paidAt": latest.paid_at(),
    "amount": latest.amount,
  })))
}

// --- cancel ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelOrderPayload {
  pub order_id: Option<String>,
}

#[instrument(name = "handler::cancel_order", skip(app_state, payload, user), fields(user_id = %user.id))]
pub async fn cancel_order_handler(
  app_state: web::Data<AppState>,
  payload: web::Json<CancelOrderPayload>,
  user: AuthenticatedUser,
) -> AppResult<HttpResponse> {
  let order_id = required(payload.into_inner().order_id, "orderId is required")?;
  load_owned_order(&app_state, &order_id, &user.id).await?;

  let order = app_state
    .orders
    .update(&order_id, Box::new(|o: &mut Order| o.cancel()))
    .await?;
  info!(%order_id, "Order cancelled by its owner.");
  Ok(HttpResponse::Ok().json(json!({
    "success": true,
    "orderId": order.order_id,
    "status": order.status,
  })))
}

// --- upi ---

#[instrument(name = "handler::upi_link", skip(app_state, query, user), fields(user_id = %user.id))]
pub async fn upi_link_handler(
  app_state: web::Data<AppState>,
  query: web::Query<OrderQuery>,
  user: AuthenticatedUser,
) -> AppResult<HttpResponse> {
  let order_id = required(query.into_inner().order_id, "Order ID is required")?;
  let order = load_owned_order(&app_state, &order_id, &user.id).await?;

  let payment = &app_state.config.payment;
  let options = UpiOptions {
    payee_address: payment.upi_payee_address.clone(),
    payee_name: payment.upi_payee_name.clone(),
    currency: Some(order.currency.clone()),
    transaction_note: Some(format!("Order {}", order.order_id)),
    transaction_ref: Some(order.order_id.clone()),
  };
  Ok(HttpResponse::Ok().json(json!({
    "orderId": order.order_id,
    "amount": order.amount,
    "currency": order.currency,
    "upiUri": upi::payment_uri(order.amount, &options),
    "qrCodeUrl": upi::qr_code_url(order.amount, &options, upi::DEFAULT_QR_SIZE),
    "expiresAt": order.expires_at,
  })))
}
