//! Structured logging.
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - `RUST_LOG` wins over the configured level when set

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global tracing subscriber.
///
/// Falls back to `resilience_gateway=<level>` when `RUST_LOG` is unset.
pub fn init_logging(level: &str) {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("resilience_gateway={level},tower_http=info").into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
