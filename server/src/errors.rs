// server/src/errors.rs

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use protocol_zero_core::pipeline::PipelineError;
use protocol_zero_core::CoreError;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
  #[error("{0}")]
  Validation(String),

  #[error("{0}")]
  Auth(String),

  #[error("{0}")]
  Forbidden(String),

  #[error("{0}")]
  NotFound(String),

  #[error("Configuration Error: {0}")]
  Config(String),

  #[error("Database Error: {0}")]
  Sqlx(#[from] sqlx::Error),

  #[error("Outbound HTTP Error: {0}")]
  Http(#[from] reqwest::Error),

  /// An external service answered, but not with what we needed.
  #[error("{0}")]
  Upstream(String),

  /// Discord kept rate limiting after every retry.
  #[error("{0}")]
  RateLimited(String),

  #[error("Workflow Error: {source}")]
  Workflow {
    #[from]
    source: PipelineError,
  },

  #[error("{0}")]
  Internal(String),
}

impl From<CoreError> for AppError {
  fn from(err: CoreError) -> Self {
    match err {
      CoreError::Validation(msg) => AppError::Validation(msg),
      CoreError::NotFound { entity, .. } => AppError::NotFound(format!("{} not found", entity)),
      CoreError::Forbidden(msg) => AppError::Forbidden(msg),
      e @ CoreError::InvalidTransition { .. } => AppError::Validation(e.to_string()),
      e @ CoreError::OrderExpired { .. } => AppError::Validation(e.to_string()),
      CoreError::Storage { source } => AppError::Internal(format!("Storage failure: {:#}", source)),
    }
  }
}

impl From<anyhow::Error> for AppError {
  fn from(err: anyhow::Error) -> Self {
    match err.downcast::<sqlx::Error>() {
      Ok(sqlx_err) => AppError::Sqlx(sqlx_err),
      Err(other) => AppError::Internal(format!("{:#}", other)),
    }
  }
}

impl ResponseError for AppError {
  fn status_code(&self) -> StatusCode {
    match self {
      AppError::Validation(_) => StatusCode::BAD_REQUEST,
      AppError::Auth(_) => StatusCode::UNAUTHORIZED,
      AppError::Forbidden(_) => StatusCode::FORBIDDEN,
      AppError::NotFound(_) => StatusCode::NOT_FOUND,
      AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
      AppError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
      AppError::Config(_) | AppError::Sqlx(_) | AppError::Http(_) | AppError::Workflow { .. } | AppError::Internal(_) => {
        StatusCode::INTERNAL_SERVER_ERROR
      }
    }
  }

  fn error_response(&self) -> HttpResponse {
    let status = self.status_code();
    if status.is_server_error() {
      tracing::error!(application_error = %self, status = status.as_u16(), "Responding with error");
    } else {
      tracing::warn!(application_error = %self, status = status.as_u16(), "Responding with error");
    }

    let message = match self {
      AppError::Sqlx(_) => "Database operation failed".to_string(),
      AppError::Http(_) => "External service request failed".to_string(),
      AppError::Workflow { .. } => "Workflow processing error".to_string(),
      AppError::Config(_) => "Configuration issue".to_string(),
      other => other.to_string(),
    };
    HttpResponse::build(status).json(json!({ "success": false, "error": message }))
  }
}

pub type Result<T, E = AppError> = std::result::Result<T, E>;
