// server/src/main.rs

use actix_web::{web as actix_data, App, HttpServer};
use protocol_zero_core::store::{SharedOrderStore, SharedTicketStore};
use protocol_zero_core::{MemoryOrderStore, MemoryTicketStore};
use protocol_zero_server::config::{AppConfig, LogFormat};
use protocol_zero_server::db::{self, PgOrderStore, PgTicketStore};
use protocol_zero_server::state::{AppState, Integrations};
use protocol_zero_server::web::configure_app_routes;
use sqlx::postgres::PgPoolOptions;
use std::io;
use std::sync::Arc;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

fn init_tracing(format: LogFormat) {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
  let builder = tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_span_events(FmtSpan::CLOSE);
  match format {
    LogFormat::Json => builder.json().init(),
    LogFormat::Pretty => builder.init(),
  }
}

fn startup_error(context: &str, err: impl std::fmt::Display) -> io::Error {
  tracing::error!(error = %err, "{}", context);
  io::Error::new(io::ErrorKind::Other, format!("{}: {}", context, err))
}

#[actix_web::main]
async fn main() -> io::Result<()> {
  let app_config = match AppConfig::from_env() {
    Ok(cfg) => {
      init_tracing(cfg.log_format);
      cfg
    }
    Err(e) => {
      init_tracing(LogFormat::Pretty);
      return Err(startup_error("Failed to load application configuration", e));
    }
  };
  tracing::info!(config = ?app_config, "Starting Protocol: Zero server...");

  let (orders, tickets): (SharedOrderStore, SharedTicketStore) = match app_config.database_url.as_deref() {
    Some(database_url) => {
      let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
        .map_err(|e| startup_error("Failed to connect to the database", e))?;
      db::postgres::ensure_schema(&pool)
        .await
        .map_err(|e| startup_error("Failed to prepare the database schema", format!("{:#}", e)))?;
      tracing::info!("Successfully connected to the database.");
      (Arc::new(PgOrderStore::new(pool.clone())), Arc::new(PgTicketStore::new(pool)))
    }
    None => {
      tracing::warn!("DATABASE_URL not set; orders and tickets are kept in memory.");
      (Arc::new(MemoryOrderStore::new()), Arc::new(MemoryTicketStore::new()))
    }
  };

  let integrations =
    Integrations::from_config(&app_config).map_err(|e| startup_error("Failed to build service clients", e))?;
  let server_address = format!("{}:{}", app_config.server_host, app_config.server_port);
  let app_state = AppState::new(app_config, orders, tickets, integrations)
    .map_err(|e| startup_error("Failed to build application state", e))?;

  tracing::info!("Attempting to bind server to {}...", server_address);
  HttpServer::new(move || {
    App::new()
      .app_data(actix_data::Data::new(app_state.clone()))
      .wrap(tracing_actix_web::TracingLogger::default())
      .configure(configure_app_routes)
  })
  .bind(&server_address)?
  .run()
  .await
}
