//! Read-only admin API.
//!
//! # Routes
//! - `GET /admin/status`: version and summary counts
//! - `GET /admin/policies`: registered policies
//! - `GET /admin/breakers`: circuit breaker snapshots
//! - `GET /admin/limits`: token bucket levels
//!
//! All routes require `Authorization: Bearer <api_key>`.

pub mod auth;
pub mod handlers;

use axum::{middleware, routing::get, Router};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;

use crate::gateway::Gateway;
use self::auth::admin_auth_middleware;
use self::handlers::*;

/// Shared state for admin handlers.
#[derive(Clone)]
pub struct AdminState {
    pub gateway: Arc<Gateway>,
    pub api_key: Arc<str>,
}

impl AdminState {
    pub fn new(gateway: Arc<Gateway>, api_key: &str) -> Self {
        Self {
            gateway,
            api_key: Arc::from(api_key),
        }
    }
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/policies", get(get_policies))
        .route("/admin/breakers", get(get_breakers))
        .route("/admin/limits", get(get_limits))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the admin API until the shutdown signal fires.
pub async fn serve(
    listener: TcpListener,
    state: AdminState,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<(), std::io::Error> {
    let addr = listener.local_addr()?;
    tracing::info!(address = %addr, "Admin API listening");

    axum::serve(listener, setup_admin_router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await?;

    tracing::info!("Admin API stopped");
    Ok(())
}
