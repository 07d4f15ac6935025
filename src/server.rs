use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
    routing::get,
    Router,
};
use serde::Serialize;

use crate::{
    alerts::Notifier,
    config::Config,
    telemetry::TelemetrySnapshot,
    tracker::commands::{get_client_config, get_latest, get_movement, ingest_report},
    AppState,
};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

pub const LIVE_EVENT: &str = "newData";

#[derive(Serialize)]
struct LiveEvent<'a> {
    event: &'static str,
    data: &'a TelemetrySnapshot,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/data", get(get_latest).post(ingest_report))
        .route("/api/movement", get(get_movement))
        .route("/api/config", get(get_client_config))
        .route("/ws", get(live_updates))
        .with_state(state)
}

/// `GET /ws`
async fn live_updates(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| observe(socket, state))
}

async fn observe(mut socket: WebSocket, state: AppState) {
    let mut subscriber = state.tracker.subscribe();
    let observer_id = subscriber.id();
    log_info!("New client connected ({})", observer_id);

    loop {
        tokio::select! {
            next = subscriber.recv() => {
                let Some(snapshot) = next else {
                    break;
                };
                let payload = LiveEvent {
                    event: LIVE_EVENT,
                    data: &snapshot,
                };
                let text = match serde_json::to_string(&payload) {
                    Ok(text) => text,
                    Err(err) => {
                        log_warn!("failed to encode snapshot for {}: {}", observer_id, err);
                        continue;
                    }
                };
                if socket.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
            _ = state.shutdown.cancelled() => {
                let _ = socket.send(Message::Close(None)).await;
                break;
            }
        }
    }

    state.tracker.hub().unsubscribe(&observer_id);
    log_info!("Client disconnected ({})", observer_id);
}

pub async fn serve(config: Config, notifier: Arc<dyn Notifier>) -> Result<()> {
    let addr = config.socket_addr()?;
    let state = AppState::new(config, notifier);
    let shutdown = state.shutdown.clone();

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    log_info!("Server is running on {}", addr);

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log_info!("shutdown requested");
            signal_token.cancel();
        }
    });

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("server terminated with an error")
}
