//! Resilience-aware service-call gateway.
//!
//! Every outbound call goes through [`Gateway::invoke`] under a named
//! [`Policy`]: rate limiting, circuit breaking, per-attempt timeouts and
//! retries with backoff are applied in a fixed order.

pub mod admin;
pub mod config;
pub mod error;
pub mod gateway;
pub mod lifecycle;
pub mod observability;
pub mod policy;
pub mod resilience;

pub use config::schema::GatewayConfig;
pub use error::{AttemptError, GatewayError, LastFailure};
pub use gateway::Gateway;
pub use lifecycle::Shutdown;
pub use policy::{Policy, PolicyRegistry};
