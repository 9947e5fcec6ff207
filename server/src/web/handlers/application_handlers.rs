// server/src/web/handlers/application_handlers.rs

use actix_web::{web, HttpResponse};
use chrono::{SecondsFormat, Utc};
use protocol_zero_core::application::ApplicationKind;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{info, instrument};

use crate::errors::{AppError, Result as AppResult};
use crate::session::AuthenticatedUser;
use crate::state::AppState;

const CONTACT_RANGE: &str = "Sheet1!A:C";

fn timestamp() -> String {
  Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Appends one submitted form as a row of the kind's spreadsheet.
#[instrument(name = "handler::submit_application", skip(app_state, user, form))]
pub async fn submit_application_handler(
  app_state: web::Data<AppState>,
  path: web::Path<String>,
  user: Option<AuthenticatedUser>,
  form: web::Json<Value>,
) -> AppResult<HttpResponse> {
  let user = user.ok_or_else(|| AppError::Auth("You must be logged in to submit an application".to_string()))?;
  let form: Map<String, Value> = match form.into_inner() {
    Value::Object(map) => map,
    _ => return Err(AppError::Validation("Invalid form data".to_string())),
  };
  let kind: ApplicationKind = path.into_inner().parse()?;
  let sheet_id = app_state
    .config
    .google
    .sheet_id(kind)
    .ok_or_else(|| AppError::Validation("Invalid application type".to_string()))?;

  let row = kind.layout().submission_row(&timestamp(), &user.name, &form);
  let cells = row.len();
  app_state.sheets.append_row(sheet_id, "Sheet1!A1", row).await?;
  info!(%kind, user_id = %user.id, cells, "Application submitted.");

  Ok(HttpResponse::Ok().json(json!({
    "success": true,
    "message": "Application submitted successfully",
  })))
}

#[derive(Debug, Deserialize)]
pub struct ContactPayload {
  #[serde(default)]
  pub username: String,
  #[serde(default)]
  pub message: String,
}

impl ContactPayload {
  fn validate(&self) -> AppResult<()> {
    if self.username.trim().chars().count() < 2 {
      return Err(AppError::Validation("Username must be at least 2 characters".to_string()));
    }
    if self.message.trim().chars().count() < 10 {
      return Err(AppError::Validation("Message must be at least 10 characters".to_string()));
    }
    Ok(())
  }
}

#[instrument(name = "handler::contact", skip_all)]
pub async fn contact_handler(
  app_state: web::Data<AppState>,
  payload: web::Json<ContactPayload>,
) -> AppResult<HttpResponse> {
  let payload = payload.into_inner();
  payload.validate()?;
  let sheet_id = app_state
    .config
    .google
    .contact_sheet_id
    .as_deref()
    .ok_or_else(|| AppError::Config("GOOGLE_CONTACT_SHEET_ID is not configured".to_string()))?;

  let row = vec![
    timestamp(),
    payload.username.trim().to_string(),
    payload.message.trim().to_string(),
  ];
  app_state.sheets.append_row(sheet_id, CONTACT_RANGE, row).await?;
  info!("Contact message recorded.");
  Ok(HttpResponse::Ok().json(json!({ "success": true })))
}
