//! HTTP ingress: the connector posts inbound activities here.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::net::TcpListener;

use desk_core::{Activity, TurnContext};

use crate::bot::DeskBot;
use crate::connector::ChannelFactory;

const MESSAGES_ENDPOINT: &str = "/api/messages";
const HEALTH_ENDPOINT: &str = "/healthz";

#[derive(Clone)]
pub struct AppState {
    pub bot: Arc<DeskBot>,
    pub channels: Arc<dyn ChannelFactory>,
}

async fn handle_messages(
    State(state): State<AppState>,
    Json(activity): Json<Activity>,
) -> StatusCode {
    let channel = state.channels.channel_for(&activity);
    let ctx = TurnContext::new(activity, channel);
    state.bot.process(&ctx).await;
    StatusCode::OK
}

async fn handle_health() -> StatusCode {
    StatusCode::OK
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(MESSAGES_ENDPOINT, post(handle_messages))
        .route(HEALTH_ENDPOINT, get(handle_health))
        .with_state(state)
}

pub async fn run_server(bind: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind ingress server on {bind}"))?;
    let local_addr = listener
        .local_addr()
        .context("failed to resolve bound ingress address")?;
    tracing::info!(addr = %local_addr, endpoint = MESSAGES_ENDPOINT, "ingress listening");
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("ingress server exited unexpectedly")
}
