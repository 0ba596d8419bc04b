//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → policies applied to the PolicyRegistry
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → PolicyRegistry::apply swaps the policy table atomically
//! ```
//!
//! # Design Decisions
//! - Host sections have defaults; policy fields are all explicit
//! - Validation separates syntactic (serde) from semantic checks
//! - An invalid reload is logged and ignored; the running policies stay

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{AdminConfig, GatewayConfig, ObservabilityConfig};
