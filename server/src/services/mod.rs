// server/src/services/mod.rs

//! Outbound integrations. Each one sits behind a trait so tests and
//! alternative deployments can swap the implementation held in `AppState`.

pub mod discord;
pub mod gateway;
pub mod paytm;
pub mod sheets;
pub mod stripe;

pub use discord::{DiscordApi, DiscordClient};
pub use gateway::{ChargeOutcome, PaymentGateway, SimulatedGateway};
pub use paytm::{PaytmApi, PaytmClient};
pub use sheets::{GoogleSheetsClient, SheetsApi};
pub use stripe::{StripeApi, StripeClient};
