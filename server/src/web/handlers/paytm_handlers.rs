// server/src/web/handlers/paytm_handlers.rs

use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use protocol_zero_core::{ContextData, Order, PaymentMethod, PipelineResult};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::{info, instrument, warn};

use crate::errors::{AppError, Result as AppResult};
use crate::pipelines::common_steps::load_owned_order;
use crate::pipelines::contexts::PaytmCallbackCtxData;
use crate::services::paytm::InitiateRequest;
use crate::session::AuthenticatedUser;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiatePayload {
  pub order_id: Option<String>,
  pub mobile: Option<String>,
  pub email: Option<String>,
}

#[instrument(name = "handler::paytm_initiate", skip(app_state, payload, user), fields(user_id = %user.id))]
pub async fn initiate_handler(
  app_state: web::Data<AppState>,
  payload: web::Json<InitiatePayload>,
  user: AuthenticatedUser,
) -> AppResult<HttpResponse> {
  let payload = payload.into_inner();
  let order_id = payload
    .order_id
    .map(|id| id.trim().to_string())
    .filter(|id| !id.is_empty())
    .ok_or_else(|| AppError::Validation("orderId is required".to_string()))?;

  let order = load_owned_order(&app_state, &order_id, &user.id).await?;
  order.ensure_payable(Utc::now())?;

  let request = InitiateRequest {
    order_id: order.order_id.clone(),
    amount: order.amount,
    customer_id: user.id.clone(),
    mobile: payload.mobile,
    email: payload.email.or_else(|| user.email.clone()),
  };
  let response = app_state.paytm.initiate_transaction(&request).await?;

  let Some(txn_token) = response.pointer("/body/txnToken").and_then(Value::as_str) else {
    let message = response
      .pointer("/body/resultInfo/resultMsg")
      .and_then(Value::as_str)
      .unwrap_or("Failed to initiate Paytm payment")
      .to_string();
    warn!(%order_id, %message, "Paytm did not issue a transaction token.");
    return Err(AppError::Validation(message));
  };

  app_state
    .orders
    .update(
      &order_id,
      Box::new(|o: &mut Order| o.mark_processing(Some(PaymentMethod::Upi))),
    )
    .await?;
  info!(%order_id, "Paytm transaction initiated.");

  Ok(HttpResponse::Ok().json(json!({
    "success": true,
    "orderId": order.order_id,
    "txnToken": txn_token,
    "mid": app_state.paytm.merchant_id(),
    "amount": order.amount,
    "paytmHost": app_state.paytm.host(),
  })))
}

fn stringify(value: &Value) -> String {
  match value {
    Value::String(s) => s.clone(),
    Value::Null => String::new(),
    other => other.to_string(),
  }
}

/// Paytm posts either form fields or JSON; both flatten to string pairs.
/// A body opening with `{` is read as JSON whatever the content type says.
pub fn parse_callback_params(content_type: &str, body: &[u8]) -> AppResult<BTreeMap<String, String>> {
  let looks_like_json = body.iter().find(|b| !b.is_ascii_whitespace()) == Some(&b'{');
  if content_type.contains("application/json") || looks_like_json {
    let value: Value = serde_json::from_slice(body)
      .map_err(|e| AppError::Validation(format!("Invalid callback payload: {}", e)))?;
    let object = value
      .as_object()
      .ok_or_else(|| AppError::Validation("Invalid callback payload".to_string()))?;
    return Ok(object.iter().map(|(k, v)| (k.clone(), stringify(v))).collect());
  }
  Ok(url::form_urlencoded::parse(body).into_owned().collect())
}

#[instrument(name = "handler::paytm_callback", skip_all)]
pub async fn callback_handler(
  app_state: web::Data<AppState>,
  req: HttpRequest,
  body: web::Bytes,
) -> AppResult<HttpResponse> {
  let content_type = req
    .headers()
    .get(actix_web::http::header::CONTENT_TYPE)
    .and_then(|v| v.to_str().ok())
    .unwrap_or_default();
  let params = parse_callback_params(content_type, &body)?;

  let order_id = params
    .get("ORDERID")
    .or_else(|| params.get("ORDER_ID"))
    .map(|id| id.trim().to_string())
    .filter(|id| !id.is_empty())
    .ok_or_else(|| AppError::Validation("Missing ORDERID".to_string()))?;

  let ctx_data = ContextData::new(PaytmCallbackCtxData {
    app_state: app_state.get_ref().clone(),
    params,
    order_id: order_id.clone(),
    txn_status: None,
    order: None,
  });

  match app_state.pipelines.paytm_callback.run(ctx_data.clone()).await? {
    PipelineResult::Completed => {
      let order = ctx_data
        .snapshot()
        .order
        .ok_or_else(|| AppError::Internal("Paytm callback finished without an order.".to_string()))?;
      Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "orderId": order.order_id,
        "status": order.status,
        "transactionId": order.payment_id,
        "paidAt": order.verified_at,
      })))
    }
    PipelineResult::Stopped => Err(AppError::Internal("Paytm callback was halted.".to_string())),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn json_callback_values_become_strings() {
    let params = parse_callback_params(
      "application/json; charset=utf-8",
      br#"{"ORDERID":"ord_1","TXNAMOUNT":499.0,"STATUS":"TXN_SUCCESS","GATEWAYNAME":null}"#,
    )
    .unwrap();
    assert_eq!(params["ORDERID"], "ord_1");
    assert_eq!(params["TXNAMOUNT"], "499.0");
    assert_eq!(params["GATEWAYNAME"], "");
  }

  #[test]
  fn form_callback_is_decoded() {
    let params = parse_callback_params(
      "application/x-www-form-urlencoded",
      b"ORDERID=ord_2&CHECKSUMHASH=a%2Bb%3D&RESPMSG=Txn+Success",
    )
    .unwrap();
    assert_eq!(params["ORDERID"], "ord_2");
    assert_eq!(params["CHECKSUMHASH"], "a+b=");
    assert_eq!(params["RESPMSG"], "Txn Success");
  }

  #[test]
  fn json_body_is_detected_without_a_json_content_type() {
    let body = br#" {"ORDERID":"ord_3","STATUS":"TXN_SUCCESS"}"#;
    for content_type in ["", "application/x-www-form-urlencoded", "text/plain"] {
      let params = parse_callback_params(content_type, body).unwrap();
      assert_eq!(params["ORDERID"], "ord_3");
      assert_eq!(params["STATUS"], "TXN_SUCCESS");
    }
  }

  #[test]
  fn json_callback_must_be_an_object() {
    assert!(parse_callback_params("application/json", b"[1,2]").is_err());
  }
}
