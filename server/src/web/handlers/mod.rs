// server/src/web/handlers/mod.rs

pub mod admin_handlers;
pub mod application_handlers;
pub mod auth_handlers;
pub mod catalog_handlers;
pub mod discord_handlers;
pub mod payment_handlers;
pub mod paytm_handlers;
pub mod stripe_handlers;
