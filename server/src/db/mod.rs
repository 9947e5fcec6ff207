// server/src/db/mod.rs

//! Postgres-backed order and ticket stores, used when `DATABASE_URL` is set.

pub mod postgres;

pub use postgres::{PgOrderStore, PgTicketStore};
