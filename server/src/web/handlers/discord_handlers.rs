// server/src/web/handlers/discord_handlers.rs

use actix_web::{web, HttpResponse};
use serde_json::json;
use tracing::{debug, info, instrument};

use crate::errors::{AppError, Result as AppResult};
use crate::session::AuthenticatedUser;
use crate::state::AppState;

/// Whether the member holds the configured membership role. Non-members do not.
#[instrument(name = "handler::discord_check_role", skip(app_state, user), fields(user_id = %user.id))]
pub async fn check_role_handler(app_state: web::Data<AppState>, user: AuthenticatedUser) -> AppResult<HttpResponse> {
  let required_role = &app_state.config.discord.required_role_id;
  let has_role = match app_state.discord.member_roles(&user.id).await? {
    Some(roles) => roles.iter().any(|role| role == required_role),
    None => {
      debug!("User is not a member of the guild.");
      false
    }
  };
  Ok(HttpResponse::Ok().json(json!({ "hasRole": has_role })))
}

/// Adds the user to the guild with their OAuth token when they are not already in it.
#[instrument(name = "handler::discord_server_join", skip(app_state, user), fields(user_id = %user.id))]
pub async fn server_join_handler(app_state: web::Data<AppState>, user: AuthenticatedUser) -> AppResult<HttpResponse> {
  let access_token = user
    .access_token
    .as_deref()
    .ok_or_else(|| AppError::Auth("Unauthorized".to_string()))?;
  let server_id = app_state
    .config
    .discord
    .server_id
    .as_deref()
    .ok_or_else(|| AppError::Config("DISCORD_SERVER_ID is not configured".to_string()))?;

  let guilds = app_state.discord.user_guild_ids(access_token).await?;
  if !guilds.iter().any(|id| id == server_id) {
    app_state.discord.add_guild_member(&user.id, access_token).await?;
    info!("User added to the Discord server.");
  }
  Ok(HttpResponse::Ok().json(json!({ "success": true, "isInServer": true })))
}
