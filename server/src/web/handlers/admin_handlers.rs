// server/src/web/handlers/admin_handlers.rs

use actix_web::{web, HttpResponse};
use chrono::{SecondsFormat, Utc};
use futures_util::future::join_all;
use protocol_zero_core::admin::AdminAccess;
use protocol_zero_core::application::layout::{cell_ref, find_row_number};
use protocol_zero_core::application::{Application, ApplicationKind, ApplicationStatus};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument, warn};

use crate::errors::{AppError, Result as AppResult};
use crate::services::discord::ReviewNotice;
use crate::session::AuthenticatedUser;
use crate::state::AppState;

/// Resolves the caller's roster entry: 401 without a signed-in e-mail, 403 when not listed.
fn admin_access<'a>(app_state: &'a AppState, user: Option<&AuthenticatedUser>) -> AppResult<&'a AdminAccess> {
  let email = user
    .and_then(|u| u.email.as_deref())
    .filter(|e| !e.trim().is_empty())
    .ok_or_else(|| AppError::Auth("You must be logged in to access this page".to_string()))?;
  app_state.admins.lookup(email).ok_or_else(|| {
    warn!("Signed-in user is not on the admin roster.");
    AppError::Forbidden("You do not have permission to access this page".to_string())
  })
}

#[instrument(name = "handler::admin_check", skip_all)]
pub async fn check_handler(app_state: web::Data<AppState>, user: Option<AuthenticatedUser>) -> HttpResponse {
  let Some(email) = user.as_ref().and_then(|u| u.email.clone()) else {
    return HttpResponse::Unauthorized().json(json!({
      "isAdmin": false,
      "error": "Not authenticated",
      "details": "No session or email found",
    }));
  };
  match app_state.admins.lookup(&email) {
    Some(access) => HttpResponse::Ok().json(json!({
      "isAdmin": true,
      "designation": access.designation,
      "discordId": access.discord_id,
      "email": access.email,
    })),
    None => HttpResponse::Forbidden().json(json!({
      "isAdmin": false,
      "error": "Not authorized",
      "details": "User not found in admin list",
    })),
  }
}

async fn fetch_kind(app_state: &AppState, kind: ApplicationKind) -> Vec<Application> {
  let Some(sheet_id) = app_state.config.google.sheet_id(kind) else {
    warn!(%kind, "No spreadsheet configured for application type.");
    return Vec::new();
  };
  let layout = kind.layout();
  match app_state.sheets.get_values(sheet_id, &layout.read_range()).await {
    Ok(rows) => {
      let applications = layout.parse_rows(&rows);
      info!(%kind, count = applications.len(), "Applications fetched.");
      applications
    }
    Err(e) => {
      warn!(%kind, error = %e, "Failed to fetch applications.");
      Vec::new()
    }
  }
}

/// Every application the admin's designation covers, in a fixed section order.
#[instrument(name = "handler::admin_list_applications", skip_all)]
pub async fn list_applications_handler(
  app_state: web::Data<AppState>,
  user: Option<AuthenticatedUser>,
) -> AppResult<HttpResponse> {
  let access = admin_access(&app_state, user.as_ref())?;

  let kinds: Vec<ApplicationKind> = ApplicationKind::ALL
    .into_iter()
    .filter(|kind| access.can_access_section(*kind))
    .collect();
  let sections = join_all(kinds.into_iter().map(|kind| fetch_kind(&app_state, kind))).await;
  let applications: Vec<Application> = sections.into_iter().flatten().collect();

  Ok(HttpResponse::Ok().json(json!({ "success": true, "applications": applications })))
}

#[derive(Debug, Deserialize)]
pub struct ReviewPayload {
  pub id: String,
  #[serde(rename = "type")]
  pub kind: String,
  pub status: ApplicationStatus,
}

#[instrument(name = "handler::admin_review_application", skip_all, fields(kind = %payload.kind))]
pub async fn review_application_handler(
  app_state: web::Data<AppState>,
  user: Option<AuthenticatedUser>,
  payload: web::Json<ReviewPayload>,
) -> AppResult<HttpResponse> {
  let access = admin_access(&app_state, user.as_ref())?;
  let payload = payload.into_inner();
  let kind: ApplicationKind = payload.kind.parse()?;
  if !access.can_access_section(kind) {
    return Err(AppError::Forbidden(
      "You do not have permission to modify this type of application".to_string(),
    ));
  }
  let sheet_id = app_state
    .config
    .google
    .sheet_id(kind)
    .ok_or_else(|| AppError::Config(format!("Invalid application type: {}", kind)))?;
  let layout = kind.layout();

  let rows = app_state.sheets.get_values(sheet_id, &layout.lookup_range()).await?;
  let row_number = find_row_number(&rows, &payload.id)
    .ok_or_else(|| AppError::NotFound("Application not found".to_string()))?;
  let row = &rows[row_number - 1];
  let applicant_name = row.get(1).cloned().unwrap_or_default();
  let applicant_id = row.get(2).cloned().unwrap_or_default();

  let admin_name = user.as_ref().map(|u| u.name.clone()).unwrap_or_default();
  let reviewed_at = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
  let sheets = &app_state.sheets;
  sheets
    .update_cell(sheet_id, &cell_ref(layout.status_index, row_number), payload.status.as_str())
    .await?;
  sheets
    .update_cell(sheet_id, &cell_ref(layout.reviewed_by_index(), row_number), &admin_name)
    .await?;
  sheets
    .update_cell(sheet_id, &cell_ref(layout.reviewed_at_index(), row_number), &reviewed_at)
    .await?;
  info!(application_id = %payload.id, status = %payload.status, "Application reviewed.");

  let discord = &app_state.config.discord;
  if discord.server_id.is_some() || discord.webhook_url.is_some() {
    let notice = ReviewNotice {
      approved: payload.status == ApplicationStatus::Approved,
      applicant_name,
      applicant_id,
      kind: kind.as_str().to_string(),
      admin_name,
    };
    if let Err(e) = app_state.discord.notify_review(&notice).await {
      warn!(error = %e, "Failed to send review notification.");
    }
  } else {
    warn!("DISCORD_SERVER_ID not configured, skipping review notification.");
  }

  Ok(HttpResponse::Ok().json(json!({ "success": true })))
}
