// core/src/lib.rs

//! Domain core of the Protocol: Zero community server.
//!
//! - [`order`]: membership payment orders and their lifecycle.
//! - [`checkout`]: amount, currency and basket validation.
//! - [`signing`]: HMAC payment tokens and signatures.
//! - [`ticket`] and [`store`]: support tickets and the persistence seams.
//! - [`application`]: whitelist/department applications and their sheet layouts.
//! - [`admin`]: admin roster and section designations.
//! - [`pipeline`]: the async step engine the server builds its workflows on.

pub mod admin;
pub mod application;
pub mod checkout;
pub mod error;
pub mod ids;
pub mod membership;
pub mod order;
pub mod pipeline;
pub mod signing;
pub mod store;
pub mod ticket;
pub mod upi;

pub use crate::error::{CoreError, CoreResult};
pub use crate::order::{Completion, NewOrder, Order, OrderItem, OrderStatus, PaymentMethod, Settlement};
pub use crate::pipeline::{ContextData, Pipeline, PipelineControl, PipelineError, PipelineResult};
pub use crate::signing::PaymentSigner;
pub use crate::store::{MemoryOrderStore, MemoryTicketStore, OrderStore, TicketStore};
pub use crate::ticket::SupportTicket;
