// tests/payment_flow_tests.rs
mod common;

use actix_web::http::StatusCode;
use actix_web::test::{self, TestRequest};
use chrono::{Duration, Utc};
use common::*;
use protocol_zero_core::{Order, OrderStatus, OrderStore, TicketStore};
use protocol_zero_server::services::ChargeOutcome;
use serde_json::{json, Value};
use serial_test::serial;

macro_rules! create_order {
  ($app:expr, $token:expr) => {{
    let req = TestRequest::post()
      .uri("/api/payment/create-order")
      .insert_header(bearer($token))
      .set_json(silver_order_body())
      .to_request();
    let resp = test::call_service(&$app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    body
  }};
}

macro_rules! confirm {
  ($app:expr, $order_id:expr, $txn:expr) => {{
    let req = TestRequest::post()
      .uri("/api/payment/confirm")
      .insert_header(("x-api-key", CONFIRM_KEY))
      .set_json(json!({ "orderId": $order_id, "transactionId": $txn }))
      .to_request();
    test::call_service(&$app, req).await
  }};
}

#[actix_web::test]
#[serial]
async fn test_checkout_process_verify_and_status() {
  let h = harness();
  let app = init_app!(h.state);
  let token = session_token(&h.state, USER_ID, Some("tester@example.com"));

  let created = create_order!(app, &token);
  let order_id = created["orderId"].as_str().unwrap().to_string();
  assert!(order_id.starts_with("ord_"), "unexpected id {}", order_id);
  assert_eq!(created["amount"], json!(723.89));
  assert_eq!(created["currency"], "INR");

  let req = TestRequest::post()
    .uri("/api/payment/process")
    .insert_header(bearer(&token))
    .set_json(json!({
      "orderId": order_id,
      "amount": 723.89,
      "currency": "INR",
      "method": "upi",
      "paymentToken": created["paymentToken"],
    }))
    .to_request();
  let resp = test::call_service(&app, req).await;
  assert_eq!(resp.status(), StatusCode::OK);
  let processed: Value = test::read_body_json(resp).await;
  assert_eq!(processed["success"], true);
  assert_eq!(processed["paymentId"], "pay_test_1");
  assert_eq!(
    h.orders.get(&order_id).await.unwrap().unwrap().status,
    OrderStatus::Processing
  );

  let req = TestRequest::post()
    .uri("/api/payment/verify")
    .insert_header(bearer(&token))
    .set_json(json!({
      "orderId": order_id,
      "paymentId": processed["paymentId"],
      "signature": processed["signature"],
    }))
    .to_request();
  let resp = test::call_service(&app, req).await;
  assert_eq!(resp.status(), StatusCode::OK);
  let verified: Value = test::read_body_json(resp).await;
  assert_eq!(verified["verified"], true);
  assert_eq!(verified["transactionId"], "pay_test_1");
  assert_eq!(verified["ticket"]["category"], "membership");
  assert_eq!(verified["ticket"]["status"], "open");
  assert_eq!(h.discord.tickets.lock().len(), 1);

  let req = TestRequest::get()
    .uri(&format!("/api/payment/status?orderId={}", order_id))
    .insert_header(bearer(&token))
    .to_request();
  let resp = test::call_service(&app, req).await;
  assert_eq!(resp.status(), StatusCode::OK);
  let status: Value = test::read_body_json(resp).await;
  assert_eq!(status["status"], "completed");
  assert_eq!(status["paymentId"], "pay_test_1");
  assert_eq!(status["ticketId"], verified["ticket"]["ticketId"]);
}

#[actix_web::test]
#[serial]
async fn test_tampered_signature_is_rejected() {
  let h = harness();
  let app = init_app!(h.state);
  let token = session_token(&h.state, USER_ID, None);
  let created = create_order!(app, &token);

  let req = TestRequest::post()
    .uri("/api/payment/verify")
    .insert_header(bearer(&token))
    .set_json(json!({
      "orderId": created["orderId"],
      "paymentId": "pay_forged",
      "signature": "00".repeat(32),
    }))
    .to_request();
  let resp = test::call_service(&app, req).await;
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
  let body: Value = test::read_body_json(resp).await;
  assert_eq!(body["error"], "Invalid payment signature");
  assert!(h.tickets.is_empty());
}

#[actix_web::test]
#[serial]
async fn test_declined_charge_fails_the_order() {
  let reason = "Payment processing failed. Please try again.";
  let h = harness_with(ChargeOutcome::Declined { reason: reason.to_string() }, &[]);
  let app = init_app!(h.state);
  let token = session_token(&h.state, USER_ID, None);
  let created = create_order!(app, &token);
  let order_id = created["orderId"].as_str().unwrap().to_string();

  let req = TestRequest::post()
    .uri("/api/payment/process")
    .insert_header(bearer(&token))
    .set_json(json!({ "orderId": order_id, "amount": 723.89, "method": "card" }))
    .to_request();
  let resp = test::call_service(&app, req).await;
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
  let body: Value = test::read_body_json(resp).await;
  assert_eq!(body["success"], false);
  assert_eq!(body["error"], reason);

  let order = h.orders.get(&order_id).await.unwrap().unwrap();
  assert_eq!(order.status, OrderStatus::Failed);
  assert_eq!(order.failure_reason.as_deref(), Some(reason));
}

#[actix_web::test]
#[serial]
async fn test_repeated_confirm_opens_a_single_ticket() {
  let h = harness();
  let app = init_app!(h.state);
  let token = session_token(&h.state, USER_ID, None);
  let created = create_order!(app, &token);
  let order_id = created["orderId"].as_str().unwrap().to_string();

  let first = confirm!(app, order_id, "UPI-REF-1");
  assert_eq!(first.status(), StatusCode::OK);
  let first: Value = test::read_body_json(first).await;
  assert_eq!(first["status"], "completed");
  assert_eq!(first["transactionId"], "UPI-REF-1");

  let second = confirm!(app, order_id, "UPI-REF-2");
  assert_eq!(second.status(), StatusCode::OK);
  let second: Value = test::read_body_json(second).await;
  assert_eq!(second["transactionId"], "UPI-REF-1");

  assert_eq!(h.tickets.list_for_order(&order_id).await.unwrap().len(), 1);
  assert_eq!(h.discord.tickets.lock().len(), 1);
}

#[actix_web::test]
#[serial]
async fn test_confirm_requires_the_configured_api_key() {
  let h = harness();
  let app = init_app!(h.state);
  let token = session_token(&h.state, USER_ID, None);
  let created = create_order!(app, &token);

  let req = TestRequest::post()
    .uri("/api/payment/confirm")
    .insert_header(("x-api-key", "wrong"))
    .set_json(json!({ "orderId": created["orderId"], "transactionId": "UPI-REF-1" }))
    .to_request();
  let resp = test::call_service(&app, req).await;
  assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
  let body: Value = test::read_body_json(resp).await;
  assert_eq!(body["error"], "Invalid API key");
}

#[actix_web::test]
#[serial]
async fn test_expired_order_cannot_be_paid() {
  let h = harness();
  let app = init_app!(h.state);
  let token = session_token(&h.state, USER_ID, None);
  let created = create_order!(app, &token);
  let order_id = created["orderId"].as_str().unwrap().to_string();
  h.orders
    .update(
      &order_id,
      Box::new(|o: &mut Order| {
        o.expires_at = Utc::now() - Duration::minutes(1);
        Ok(())
      }),
    )
    .await
    .unwrap();

  let req = TestRequest::post()
    .uri("/api/payment/process")
    .insert_header(bearer(&token))
    .set_json(json!({
      "orderId": order_id,
      "amount": 723.89,
      "method": "upi",
      "paymentToken": created["paymentToken"],
    }))
    .to_request();
  let resp = test::call_service(&app, req).await;
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

  let req = TestRequest::post()
    .uri("/api/payment/report-payment")
    .insert_header(bearer(&token))
    .set_json(json!({ "orderId": order_id, "transactionId": "UPI-REF-9" }))
    .to_request();
  let resp = test::call_service(&app, req).await;
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
  assert_eq!(h.orders.get(&order_id).await.unwrap().unwrap().status, OrderStatus::Pending);
}

#[actix_web::test]
#[serial]
async fn test_report_payment_then_lookup_by_discord_user() {
  let h = harness();
  let app = init_app!(h.state);
  let token = session_token(&h.state, USER_ID, None);
  let created = create_order!(app, &token);
  let order_id = created["orderId"].as_str().unwrap().to_string();

  let req = TestRequest::post()
    .uri("/api/payment/report-payment")
    .insert_header(bearer(&token))
    .set_json(json!({ "orderId": order_id, "transactionId": "  UPI-REF-7  " }))
    .to_request();
  let resp = test::call_service(&app, req).await;
  assert_eq!(resp.status(), StatusCode::OK);
  let reported: Value = test::read_body_json(resp).await;
  assert_eq!(reported["transactionId"], "UPI-REF-7");
  assert_eq!(reported["status"], "completed");

  let req = TestRequest::post()
    .uri("/api/payment/verify-user-payment")
    .set_json(json!({ "discordUserId": USER_ID }))
    .to_request();
  let resp = test::call_service(&app, req).await;
  let lookup: Value = test::read_body_json(resp).await;
  assert_eq!(lookup["paid"], true);
  assert_eq!(lookup["paymentReported"], true);
  assert_eq!(lookup["orderId"], order_id.as_str());
  assert_eq!(lookup["transactionId"], "UPI-REF-7");

  let req = TestRequest::post()
    .uri("/api/payment/verify-user-payment")
    .set_json(json!({ "discordUserId": OTHER_USER_ID }))
    .to_request();
  let resp = test::call_service(&app, req).await;
  let lookup: Value = test::read_body_json(resp).await;
  assert_eq!(lookup, json!({ "success": true, "paid": false }));
}

#[actix_web::test]
#[serial]
async fn test_orders_are_private_to_their_owner() {
  let h = harness();
  let app = init_app!(h.state);
  let owner = session_token(&h.state, USER_ID, None);
  let stranger = session_token(&h.state, OTHER_USER_ID, None);
  let created = create_order!(app, &owner);
  let order_id = created["orderId"].as_str().unwrap().to_string();

  let req = TestRequest::get()
    .uri(&format!("/api/payment/status?orderId={}", order_id))
    .insert_header(bearer(&stranger))
    .to_request();
  let resp = test::call_service(&app, req).await;
  assert_eq!(resp.status(), StatusCode::FORBIDDEN);

  let req = TestRequest::post()
    .uri("/api/payment/cancel")
    .insert_header(bearer(&stranger))
    .set_json(json!({ "orderId": order_id }))
    .to_request();
  let resp = test::call_service(&app, req).await;
  assert_eq!(resp.status(), StatusCode::FORBIDDEN);

  let req = TestRequest::get()
    .uri("/api/payment/status?orderId=ord_missing")
    .insert_header(bearer(&owner))
    .to_request();
  let resp = test::call_service(&app, req).await;
  assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
#[serial]
async fn test_cancelled_order_rejects_payment() {
  let h = harness();
  let app = init_app!(h.state);
  let token = session_token(&h.state, USER_ID, None);
  let created = create_order!(app, &token);
  let order_id = created["orderId"].as_str().unwrap().to_string();

  let req = TestRequest::post()
    .uri("/api/payment/cancel")
    .insert_header(bearer(&token))
    .set_json(json!({ "orderId": order_id }))
    .to_request();
  let resp = test::call_service(&app, req).await;
  assert_eq!(resp.status(), StatusCode::OK);
  let cancelled: Value = test::read_body_json(resp).await;
  assert_eq!(cancelled["status"], "cancelled");

  let req = TestRequest::post()
    .uri("/api/payment/process")
    .insert_header(bearer(&token))
    .set_json(json!({ "orderId": order_id, "amount": 723.89, "method": "upi" }))
    .to_request();
  let resp = test::call_service(&app, req).await;
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
#[serial]
async fn test_upi_link_for_order() {
  let h = harness_with(
    ChargeOutcome::Approved { payment_id: "pay_test_1".to_string() },
    &[("UPI_PAYEE_ADDRESS", "protocolzero@upi")],
  );
  let app = init_app!(h.state);
  let token = session_token(&h.state, USER_ID, None);
  let created = create_order!(app, &token);

  let req = TestRequest::get()
    .uri(&format!("/api/payment/upi?orderId={}", created["orderId"].as_str().unwrap()))
    .insert_header(bearer(&token))
    .to_request();
  let resp = test::call_service(&app, req).await;
  assert_eq!(resp.status(), StatusCode::OK);
  let body: Value = test::read_body_json(resp).await;
  let uri = body["upiUri"].as_str().unwrap();
  assert!(uri.starts_with("upi://pay?"), "unexpected uri {}", uri);
  assert!(uri.contains("am=723.89"));
  assert!(body["qrCodeUrl"].as_str().unwrap().starts_with("https://"));
}

#[actix_web::test]
#[serial]
async fn test_create_order_validation() {
  let h = harness();
  let app = init_app!(h.state);

  let req = TestRequest::post()
    .uri("/api/payment/create-order")
    .set_json(silver_order_body())
    .to_request();
  let resp = test::call_service(&app, req).await;
  assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

  let token = session_token(&h.state, USER_ID, None);
  let req = TestRequest::post()
    .uri("/api/payment/create-order")
    .insert_header(bearer(&token))
    .set_json(json!({ "items": [] }))
    .to_request();
  let resp = test::call_service(&app, req).await;
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
  let body: Value = test::read_body_json(resp).await;
  assert_eq!(body["error"], "Invalid payment amount");

  let req = TestRequest::post()
    .uri("/api/payment/create-order")
    .insert_header(bearer(&token))
    .set_json(json!({ "amount": 723.89 }))
    .to_request();
  let resp = test::call_service(&app, req).await;
  let body: Value = test::read_body_json(resp).await;
  assert_eq!(body["error"], "Invalid items. At least one item is required.");
  assert!(h.orders.is_empty());
}
