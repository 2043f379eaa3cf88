//! HTTP server assembly and lifecycle.

use anyhow::Result;
use std::time::Duration;

use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

use super::identify_routes::make_identify_routes;
use super::metrics;
use super::state::ServerState;

#[derive(Serialize)]
struct ServerStats {
    pub name: &'static str,
    pub version: &'static str,
    pub uptime: String,
}

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

async fn home(State(state): State<ServerState>) -> impl IntoResponse {
    Json(ServerStats {
        name: "reelsong-server",
        version: env!("CARGO_PKG_VERSION"),
        uptime: format_uptime(state.start_time.elapsed()),
    })
}

/// Build the application router.
pub fn make_app(state: ServerState) -> Router {
    Router::new()
        .route("/", get(home))
        .nest("/api/v1", make_identify_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the HTTP server and the metrics server until shutdown.
pub async fn run_server(
    state: ServerState,
    port: u16,
    metrics_port: u16,
    shutdown: CancellationToken,
) -> Result<()> {
    // Metrics on a separate port so it is never exposed with the API.
    let metrics_app = Router::new().route("/metrics", get(metrics::metrics_handler));
    let metrics_listener =
        tokio::net::TcpListener::bind(("0.0.0.0", metrics_port)).await?;
    let metrics_shutdown = shutdown.clone();
    tokio::spawn(async move {
        let _ = axum::serve(metrics_listener, metrics_app)
            .with_graceful_shutdown(metrics_shutdown.cancelled_owned())
            .await;
    });

    let app = make_app(state);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!("Serving at port {} (metrics at {})", port, metrics_port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    info!("Server stopped");
    Ok(())
}
