// server/src/web/routes.rs

use actix_web::{web, Error as ActixError, HttpRequest};

use crate::errors::AppError;
use crate::web::handlers::{
  admin_handlers, application_handlers, auth_handlers, catalog_handlers, discord_handlers, payment_handlers,
  paytm_handlers, stripe_handlers,
};

fn json_error(err: actix_web::error::JsonPayloadError, _req: &HttpRequest) -> ActixError {
  AppError::Validation(format!("Invalid request body: {}", err)).into()
}

fn query_error(err: actix_web::error::QueryPayloadError, _req: &HttpRequest) -> ActixError {
  AppError::Validation(format!("Invalid query string: {}", err)).into()
}

/// Mounts every route under `/api`. Called from `main.rs` and the integration tests.
pub fn configure_app_routes(cfg: &mut web::ServiceConfig) {
  cfg
    .app_data(web::JsonConfig::default().error_handler(json_error))
    .app_data(web::QueryConfig::default().error_handler(query_error))
    .service(
      web::scope("/api")
        .route("/health", web::get().to(catalog_handlers::health_handler))
        .route("/memberships", web::get().to(catalog_handlers::memberships_handler))
        .route("/contact", web::post().to(application_handlers::contact_handler))
        .service(
          web::scope("/auth")
            .route("/discord/callback", web::get().to(auth_handlers::discord_callback_handler))
            .route("/session", web::get().to(auth_handlers::session_handler)),
        )
        .service(
          web::scope("/payment")
            .route("/create-order", web::post().to(payment_handlers::create_order_handler))
            .route("/process", web::post().to(payment_handlers::process_payment_handler))
            .route("/verify", web::post().to(payment_handlers::verify_payment_handler))
            .route("/status", web::get().to(payment_handlers::payment_status_handler))
            .route("/report-payment", web::post().to(payment_handlers::report_payment_handler))
            .route("/confirm", web::post().to(payment_handlers::confirm_payment_handler))
            .route(
              "/verify-user-payment",
              web::post().to(payment_handlers::verify_user_payment_handler),
            )
            .route("/cancel", web::post().to(payment_handlers::cancel_order_handler))
            .route("/upi", web::get().to(payment_handlers::upi_link_handler))
            .route("/paytm/initiate", web::post().to(paytm_handlers::initiate_handler))
            .route("/paytm/callback", web::post().to(paytm_handlers::callback_handler))
            .route("/stripe/create-intent", web::post().to(stripe_handlers::create_intent_handler))
            .route("/stripe/webhook", web::post().to(stripe_handlers::webhook_handler)),
        )
        .service(
          web::scope("/discord")
            .route("/check-role", web::get().to(discord_handlers::check_role_handler))
            .route("/server-join", web::post().to(discord_handlers::server_join_handler)),
        )
        .service(
          web::scope("/admin")
            .route("/check", web::get().to(admin_handlers::check_handler))
            .route("/applications", web::get().to(admin_handlers::list_applications_handler))
            .route("/applications", web::put().to(admin_handlers::review_application_handler)),
        )
        .route(
          "/applications/{kind}/submit",
          web::post().to(application_handlers::submit_application_handler),
        ),
    );
}
