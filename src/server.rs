//! Terminal gateway HTTP server

use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::response::{Html, IntoResponse};
use axum::routing::get;
use axum::Router;
use futures::StreamExt;
use tokio::net::TcpListener;
use tracing::{debug, info};

use crate::bridge::{SessionBridge, SessionRequest};
use crate::config::ServerConfig;
use crate::exec::ExecConnector;
use crate::{Error, Result};

const HOME_PAGE: &str = include_str!("../static/home.html");

/// Shared state for handlers
#[derive(Clone)]
pub struct AppState {
    /// Bridge shared by all sessions
    pub bridge: Arc<SessionBridge>,
    /// Inbound WebSocket message limit
    pub max_message_size: usize,
}

/// Build the router
pub fn router(bridge: Arc<SessionBridge>) -> Router {
    let state = AppState {
        max_message_size: bridge.config().max_message_size,
        bridge,
    };

    Router::new()
        // Bundled xterm.js client
        .route("/", get(|| async { Html(HOME_PAGE) }))
        // Health check
        .route("/healthz", get(|| async { "ok" }))
        // Terminal sessions, parameters in the query string
        .route("/ws", get(ws_handler))
        .with_state(state)
}

/// Start the gateway and serve until the listener fails
pub async fn start_server(config: ServerConfig, connector: Arc<dyn ExecConnector>) -> Result<()> {
    config.bridge.validate()?;
    let bridge = Arc::new(SessionBridge::new(connector, config.bridge));
    let app = router(bridge);

    let listener = TcpListener::bind(config.addr)
        .await
        .map_err(|e| Error::config(format!("failed to bind {}: {}", config.addr, e)))?;

    info!(addr = %config.addr, "Starting terminal gateway");

    axum::serve(listener, app)
        .await
        .map_err(|e| Error::internal(format!("server error: {}", e)))?;

    Ok(())
}

async fn ws_handler(
    State(state): State<AppState>,
    Query(request): Query<SessionRequest>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.max_message_size(state.max_message_size)
        .on_upgrade(move |socket| async move {
            let (sink, stream) = socket.split();
            // Failures were already reported to the client and logged
            if let Err(e) = state.bridge.run(request, sink, stream).await {
                debug!(error = %e, "Terminal session did not start");
            }
        })
}
