//! OS signal handling.

/// Wait for Ctrl+C.
///
/// If the handler cannot be installed the error is logged and the function
/// returns, so the host still shuts down instead of hanging.
pub async fn wait_for_shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutdown signal received"),
        Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl+C, shutting down"),
    }
}
