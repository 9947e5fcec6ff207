// server/src/web/handlers/catalog_handlers.rs

use actix_web::HttpResponse;
use protocol_zero_core::membership::MEMBERSHIPS;
use serde_json::json;

pub async fn health_handler() -> HttpResponse {
  HttpResponse::Ok().json(json!({ "status": "ok" }))
}

pub async fn memberships_handler() -> HttpResponse {
  HttpResponse::Ok().json(json!({ "memberships": MEMBERSHIPS }))
}
