// server/src/session.rs

//! Signed bearer sessions issued after Discord OAuth, and the extractor that reads them.

use crate::errors::{AppError, Result as AppResult};
use crate::state::AppState;
use actix_web::{web, FromRequest, HttpRequest};
use chrono::{DateTime, Duration, Utc};
use futures_util::future::{ready, Ready};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use protocol_zero_core::ids;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

pub const SESSION_TTL_DAYS: i64 = 7;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
  /// Discord user id.
  pub sub: String,
  pub name: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub email: Option<String>,
  /// Discord OAuth token, needed to join the guild on the user's behalf.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub access_token: Option<String>,
  pub iat: i64,
  pub exp: i64,
  pub jti: String,
}

pub struct SessionKeys {
  encoding: EncodingKey,
  decoding: DecodingKey,
}

impl SessionKeys {
  pub fn new(secret: &[u8]) -> Self {
    Self {
      encoding: EncodingKey::from_secret(secret),
      decoding: DecodingKey::from_secret(secret),
    }
  }

  /// Falls back to a random key; sessions then end with the process.
  pub fn from_secret(secret: Option<&str>) -> Self {
    match secret {
      Some(secret) => Self::new(secret.as_bytes()),
      None => {
        warn!("SESSION_SECRET not set; using a random session key.");
        Self::new(ids::random_hex(32).as_bytes())
      }
    }
  }

  pub fn issue(&self, user: &SessionUser, now: DateTime<Utc>) -> AppResult<String> {
    let claims = SessionClaims {
      sub: user.id.clone(),
      name: user.name.clone(),
      email: user.email.clone(),
      access_token: user.access_token.clone(),
      iat: now.timestamp(),
      exp: (now + Duration::days(SESSION_TTL_DAYS)).timestamp(),
      jti: Uuid::new_v4().to_string(),
    };
    encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
      .map_err(|e| AppError::Internal(format!("Failed to sign session: {}", e)))
  }

  pub fn verify(&self, token: &str) -> AppResult<SessionClaims> {
    decode::<SessionClaims>(token, &self.decoding, &Validation::new(Algorithm::HS256))
      .map(|data| data.claims)
      .map_err(|e| {
        debug!(error = %e, "Session token rejected.");
        AppError::Auth("Unauthorized".to_string())
      })
  }
}

/// The signed-in Discord user.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
  pub id: String,
  pub name: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub email: Option<String>,
  #[serde(skip)]
  pub access_token: Option<String>,
}

impl From<SessionClaims> for SessionUser {
  fn from(claims: SessionClaims) -> Self {
    SessionUser {
      id: claims.sub,
      name: claims.name,
      email: claims.email,
      access_token: claims.access_token,
    }
  }
}

/// Extractor requiring `Authorization: Bearer <session>`.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub SessionUser);

impl std::ops::Deref for AuthenticatedUser {
  type Target = SessionUser;

  fn deref(&self) -> &SessionUser {
    &self.0
  }
}

fn bearer_token(req: &HttpRequest) -> Option<&str> {
  req
    .headers()
    .get(actix_web::http::header::AUTHORIZATION)?
    .to_str()
    .ok()?
    .strip_prefix("Bearer ")
    .map(str::trim)
    .filter(|t| !t.is_empty())
}

impl FromRequest for AuthenticatedUser {
  type Error = AppError;
  type Future = Ready<Result<Self, Self::Error>>;

  fn from_request(req: &HttpRequest, _payload: &mut actix_web::dev::Payload) -> Self::Future {
    let Some(state) = req.app_data::<web::Data<AppState>>() else {
      return ready(Err(AppError::Internal("Application state missing".to_string())));
    };
    let Some(token) = bearer_token(req) else {
      return ready(Err(AppError::Auth("Unauthorized".to_string())));
    };
    ready(state.sessions.verify(token).map(|claims| AuthenticatedUser(claims.into())))
  }
}
