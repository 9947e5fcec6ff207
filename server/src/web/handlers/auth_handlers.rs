// server/src/web/handlers/auth_handlers.rs

use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument};

use crate::errors::{AppError, Result as AppResult};
use crate::session::{AuthenticatedUser, SessionUser};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct OAuthCallbackQuery {
  pub code: Option<String>,
}

/// Finishes Discord OAuth and hands back a signed session.
#[instrument(name = "handler::discord_oauth_callback", skip_all)]
pub async fn discord_callback_handler(
  app_state: web::Data<AppState>,
  query: web::Query<OAuthCallbackQuery>,
) -> AppResult<HttpResponse> {
  let code = query
    .into_inner()
    .code
    .filter(|c| !c.trim().is_empty())
    .ok_or_else(|| AppError::Validation("Missing authorization code".to_string()))?;

  let access_token = app_state.discord.exchange_code(&code).await?;
  let profile = app_state.discord.current_user(&access_token).await?;

  let user = SessionUser {
    id: profile.id.clone(),
    name: profile.display_name().to_string(),
    email: profile.email.clone(),
    access_token: Some(access_token),
  };
  let token = app_state.sessions.issue(&user, Utc::now())?;
  info!(user_id = %user.id, "Discord sign-in completed.");

  Ok(HttpResponse::Ok().json(json!({
    "token": token,
    "user": {
      "id": user.id,
      "name": user.name,
      "email": user.email,
      "image": profile.avatar,
    },
  })))
}

#[instrument(name = "handler::session", skip_all, fields(user_id = %user.id))]
pub async fn session_handler(user: AuthenticatedUser) -> AppResult<HttpResponse> {
  Ok(HttpResponse::Ok().json(json!({ "user": user.0 })))
}
