//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Gateway, breakers, limiter, config reloads produce:
//!     → tracing events (structured fields, one span per invocation)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → logging.rs subscriber (stdout)
//!     → Prometheus scrape endpoint (optional)
//! ```

pub mod logging;
pub mod metrics;
