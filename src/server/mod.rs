//! HTTP surface of the agent.
//!
//! A single JSON endpoint carries every catalog action; replies always come
//! back as 200 with the outcome (including protocol errors) in the body, so
//! transport status only ever reflects transport problems.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::router::{AgentRequest, AgentResponse, RequestRouter};

#[derive(Clone)]
struct ServerState {
    request_router: Arc<RequestRouter>,
    start_time: Instant,
}

#[derive(Serialize)]
struct ServerStats {
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

async fn home(State(state): State<ServerState>) -> Json<ServerStats> {
    Json(ServerStats {
        uptime: format_uptime(state.start_time.elapsed()),
    })
}

async fn handle_action(
    State(state): State<ServerState>,
    Json(request): Json<AgentRequest>,
) -> Json<AgentResponse> {
    Json(state.request_router.handle(request).await)
}

pub fn make_router(request_router: Arc<RequestRouter>) -> Router {
    let state = ServerState {
        request_router,
        start_time: Instant::now(),
    };
    Router::new()
        .route("/", get(home))
        .route("/appliances", post(handle_action))
        .with_state(state)
}

pub async fn run_server(
    request_router: Arc<RequestRouter>,
    port: u16,
    cancellation_token: CancellationToken,
) -> Result<()> {
    let app = make_router(request_router);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .with_context(|| format!("failed to bind port {port}"))?;
    info!("listening on port {}", port);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancellation_token.cancelled().await })
        .await
        .context("server error")?;
    info!("server stopped");
    Ok(())
}
