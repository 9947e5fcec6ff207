// server/src/db/postgres.rs

use anyhow::Context;
use async_trait::async_trait;
use protocol_zero_core::store::{OrderMutation, OrderStore, TicketStore};
use protocol_zero_core::{CoreError, CoreResult, Order, SupportTicket};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use tracing::{debug, instrument};

const SCHEMA: &[&str] = &[
  r#"CREATE TABLE IF NOT EXISTS payment_orders (
    order_id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    status TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    data JSONB NOT NULL
  )"#,
  "CREATE INDEX IF NOT EXISTS payment_orders_user_id_idx ON payment_orders (user_id)",
  r#"CREATE TABLE IF NOT EXISTS support_tickets (
    ticket_id TEXT PRIMARY KEY,
    order_id TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL,
    data JSONB NOT NULL
  )"#,
  "CREATE INDEX IF NOT EXISTS support_tickets_order_id_idx ON support_tickets (order_id)",
];

/// Creates the tables if they do not exist yet.
pub async fn ensure_schema(pool: &PgPool) -> anyhow::Result<()> {
  for statement in SCHEMA {
    sqlx::query(statement)
      .execute(pool)
      .await
      .context("Failed to apply schema statement")?;
  }
  Ok(())
}

#[derive(Debug, FromRow)]
struct OrderRow {
  data: Json<Order>,
}

#[derive(Debug, FromRow)]
struct TicketRow {
  data: Json<SupportTicket>,
}

fn storage(err: sqlx::Error, what: &'static str) -> CoreError {
  CoreError::from(anyhow::Error::new(err).context(what))
}

/// Orders stored as JSONB documents keyed by `order_id`.
#[derive(Debug, Clone)]
pub struct PgOrderStore {
  pool: PgPool,
}

impl PgOrderStore {
  pub fn new(pool: PgPool) -> Self {
    Self { pool }
  }
}

#[async_trait]
impl OrderStore for PgOrderStore {
  #[instrument(name = "pg::insert_order", skip_all, fields(order_id = %order.order_id))]
  async fn insert(&self, order: Order) -> CoreResult<()> {
    sqlx::query(
      "INSERT INTO payment_orders (order_id, user_id, status, created_at, data) VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(&order.order_id)
    .bind(&order.user_id)
    .bind(order.status.as_str())
    .bind(order.created_at)
    .bind(Json(&order))
    .execute(&self.pool)
    .await
    .map_err(|e| storage(e, "insert order"))?;
    Ok(())
  }

  async fn get(&self, order_id: &str) -> CoreResult<Option<Order>> {
    let row = sqlx::query_as::<_, OrderRow>("SELECT data FROM payment_orders WHERE order_id = $1")
      .bind(order_id)
      .fetch_optional(&self.pool)
      .await
      .map_err(|e| storage(e, "load order"))?;
    Ok(row.map(|r| r.data.0))
  }

  /// Row-locks the order for the duration of the mutation.
  #[instrument(name = "pg::update_order", skip(self, mutation))]
  async fn update(&self, order_id: &str, mutation: OrderMutation) -> CoreResult<Order> {
    let mut tx = self.pool.begin().await.map_err(|e| storage(e, "begin transaction"))?;

    let row = sqlx::query_as::<_, OrderRow>("SELECT data FROM payment_orders WHERE order_id = $1 FOR UPDATE")
      .bind(order_id)
      .fetch_optional(&mut *tx)
      .await
      .map_err(|e| storage(e, "lock order"))?;
    let mut order = row.ok_or_else(|| CoreError::order_not_found(order_id))?.data.0;

    // Dropping `tx` on error rolls the transaction back.
    mutation(&mut order)?;

    sqlx::query("UPDATE payment_orders SET status = $2, data = $3, updated_at = now() WHERE order_id = $1")
      .bind(order_id)
      .bind(order.status.as_str())
      .bind(Json(&order))
      .execute(&mut *tx)
      .await
      .map_err(|e| storage(e, "update order"))?;
    tx.commit().await.map_err(|e| storage(e, "commit order update"))?;

    debug!(status = %order.status, "Order updated.");
    Ok(order)
  }

  async fn list_for_user(&self, user_id: &str) -> CoreResult<Vec<Order>> {
    let rows = sqlx::query_as::<_, OrderRow>(
      "SELECT data FROM payment_orders WHERE user_id = $1 ORDER BY created_at DESC",
    )
    .bind(user_id)
    .fetch_all(&self.pool)
    .await
    .map_err(|e| storage(e, "list orders"))?;
    Ok(rows.into_iter().map(|r| r.data.0).collect())
  }
}

#[derive(Debug, Clone)]
pub struct PgTicketStore {
  pool: PgPool,
}

impl PgTicketStore {
  pub fn new(pool: PgPool) -> Self {
    Self { pool }
  }
}

#[async_trait]
impl TicketStore for PgTicketStore {
  #[instrument(name = "pg::insert_ticket", skip_all, fields(ticket_id = %ticket.ticket_id))]
  async fn insert(&self, ticket: SupportTicket) -> CoreResult<()> {
    sqlx::query("INSERT INTO support_tickets (ticket_id, order_id, created_at, data) VALUES ($1, $2, $3, $4)")
      .bind(&ticket.ticket_id)
      .bind(&ticket.order_id)
      .bind(ticket.created_at)
      .bind(Json(&ticket))
      .execute(&self.pool)
      .await
      .map_err(|e| storage(e, "insert ticket"))?;
    Ok(())
  }

  async fn get(&self, ticket_id: &str) -> CoreResult<Option<SupportTicket>> {
    let row = sqlx::query_as::<_, TicketRow>("SELECT data FROM support_tickets WHERE ticket_id = $1")
      .bind(ticket_id)
      .fetch_optional(&self.pool)
      .await
      .map_err(|e| storage(e, "load ticket"))?;
    Ok(row.map(|r| r.data.0))
  }

  async fn list_for_order(&self, order_id: &str) -> CoreResult<Vec<SupportTicket>> {
    let rows = sqlx::query_as::<_, TicketRow>(
      "SELECT data FROM support_tickets WHERE order_id = $1 ORDER BY created_at",
    )
    .bind(order_id)
    .fetch_all(&self.pool)
    .await
    .map_err(|e| storage(e, "list tickets"))?;
    Ok(rows.into_iter().map(|r| r.data.0).collect())
  }
}
