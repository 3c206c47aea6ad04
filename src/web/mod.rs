//! Web server: WebSocket telemetry stream, API endpoints, and static viewer.

pub mod config;
pub mod handlers;
pub mod router;
pub mod state;
pub mod websocket;

// Re-export commonly used items
pub use config::WebConfig;
pub use router::create_app;
pub use state::AppState;

use crate::error::{Result, SystemError};
use crate::session::TelemetryHub;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

/// Bind the listener described by `config`.
pub async fn bind(config: &WebConfig) -> Result<TcpListener> {
    let addr = config
        .bind_address()
        .parse::<SocketAddr>()
        .map_err(|e| SystemError::config_error(format!("Invalid bind address: {}", e)))?;

    TcpListener::bind(addr)
        .await
        .map_err(|e| SystemError::web_server_error(format!("Failed to bind to {}: {}", addr, e)))
}

/// Serve on an already-bound listener until the hub is shut down.
pub async fn serve(listener: TcpListener, config: WebConfig, hub: Arc<TelemetryHub>) -> Result<()> {
    let addr = listener.local_addr()?;
    let mut shutdown = hub.shutdown_signal();
    let app = create_app(&config, AppState::new(hub, config.max_websocket_connections));

    info!("Server monitor listening on http://{}", addr);
    info!("WebSocket endpoint: ws://{}/ws", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
        })
        .await
        .map_err(|e| SystemError::web_server_error(format!("Server error: {}", e)))?;

    info!("Web server stopped");
    Ok(())
}

/// Bind and serve in one step.
pub async fn start_web_server(config: WebConfig, hub: Arc<TelemetryHub>) -> Result<()> {
    let listener = bind(&config).await?;
    serve(listener, config, hub).await
}
