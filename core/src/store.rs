// core/src/store.rs

//! Persistence seams for orders and support tickets, with in-memory implementations.

use crate::error::{CoreError, CoreResult};
use crate::order::Order;
use crate::ticket::SupportTicket;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// A change applied to one order atomically. An `Err` leaves the stored order untouched.
pub type OrderMutation = Box<dyn FnOnce(&mut Order) -> CoreResult<()> + Send>;

#[async_trait]
pub trait OrderStore: Send + Sync {
  async fn insert(&self, order: Order) -> CoreResult<()>;

  async fn get(&self, order_id: &str) -> CoreResult<Option<Order>>;

  /// Applies `mutation` under exclusive access to the order and returns the stored result.
  async fn update(&self, order_id: &str, mutation: OrderMutation) -> CoreResult<Order>;

  async fn list_for_user(&self, user_id: &str) -> CoreResult<Vec<Order>>;
}

#[async_trait]
pub trait TicketStore: Send + Sync {
  async fn insert(&self, ticket: SupportTicket) -> CoreResult<()>;

  async fn get(&self, ticket_id: &str) -> CoreResult<Option<SupportTicket>>;

  async fn list_for_order(&self, order_id: &str) -> CoreResult<Vec<SupportTicket>>;
}

pub type SharedOrderStore = Arc<dyn OrderStore>;
pub type SharedTicketStore = Arc<dyn TicketStore>;

/// Process-lifetime order map. Contents are lost on restart.
#[derive(Debug, Default)]
pub struct MemoryOrderStore {
  orders: RwLock<HashMap<String, Order>>,
}

impl MemoryOrderStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn len(&self) -> usize {
    self.orders.read().len()
  }

  pub fn is_empty(&self) -> bool {
    self.orders.read().is_empty()
  }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
  async fn insert(&self, order: Order) -> CoreResult<()> {
    self.orders.write().insert(order.order_id.clone(), order);
    Ok(())
  }

  async fn get(&self, order_id: &str) -> CoreResult<Option<Order>> {
    Ok(self.orders.read().get(order_id).cloned())
  }

  async fn update(&self, order_id: &str, mutation: OrderMutation) -> CoreResult<Order> {
    let mut orders = self.orders.write();
    let current = orders
      .get(order_id)
      .ok_or_else(|| CoreError::order_not_found(order_id))?;

    let mut next = current.clone();
    mutation(&mut next)?;
    orders.insert(order_id.to_string(), next.clone());
    Ok(next)
  }

  async fn list_for_user(&self, user_id: &str) -> CoreResult<Vec<Order>> {
    Ok(
      self
        .orders
        .read()
        .values()
        .filter(|o| o.user_id == user_id)
        .cloned()
        .collect(),
    )
  }
}

#[derive(Debug, Default)]
pub struct MemoryTicketStore {
  tickets: RwLock<HashMap<String, SupportTicket>>,
}

impl MemoryTicketStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn len(&self) -> usize {
    self.tickets.read().len()
  }

  pub fn is_empty(&self) -> bool {
    self.tickets.read().is_empty()
  }
}

#[async_trait]
impl TicketStore for MemoryTicketStore {
  async fn insert(&self, ticket: SupportTicket) -> CoreResult<()> {
    self.tickets.write().insert(ticket.ticket_id.clone(), ticket);
    Ok(())
  }

  async fn get(&self, ticket_id: &str) -> CoreResult<Option<SupportTicket>> {
    Ok(self.tickets.read().get(ticket_id).cloned())
  }

  async fn list_for_order(&self, order_id: &str) -> CoreResult<Vec<SupportTicket>> {
    Ok(
      self
        .tickets
        .read()
        .values()
        .filter(|t| t.order_id == order_id)
        .cloned()
        .collect(),
    )
  }
}
