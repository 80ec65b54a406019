//! Fan-out server
//!
//! Serves the chart assets, pushes periodic L3 snapshots to every connected
//! browser, and handles the control commands the UI sends back over the same
//! WebSocket.

use std::sync::Arc;

use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::State,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use tower_http::services::ServeDir;

use crate::AppState;

type WsSender = Arc<Mutex<SplitSink<WebSocket, Message>>>;

/// Control command sent by the UI
#[derive(Debug, Deserialize)]
struct ControlMessage {
    #[serde(rename = "type")]
    msg_type: String,
    symbol: Option<String>,
    kmeans_mode: Option<bool>,
    num_clusters: Option<usize>,
}

/// Build the application router
pub fn router(state: Arc<AppState>) -> Router {
    let static_dir = state.config.static_dir.clone();
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .fallback_service(ServeDir::new(static_dir))
        .with_state(state)
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (sender, mut receiver) = socket.split();
    let sender: WsSender = Arc::new(Mutex::new(sender));

    info!("browser connected");

    let broadcast = tokio::spawn(broadcast_loop(sender.clone(), state.clone()));

    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => handle_control(&text, &sender, &state).await,
            Ok(Message::Close(_)) => {
                info!("browser disconnected");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "WebSocket read error");
                break;
            }
        }
    }

    broadcast.abort();
}

/// Push the top-N snapshot at the configured cadence until the send fails
async fn broadcast_loop(sender: WsSender, state: Arc<AppState>) {
    let mut interval = tokio::time::interval(std::time::Duration::from_millis(
        state.config.broadcast_interval_ms,
    ));

    loop {
        interval.tick().await;
        let snapshot = state
            .book
            .read()
            .await
            .build_snapshot(state.config.top_levels);

        let message = serde_json::json!({
            "type": "l3_update",
            "data": snapshot,
        });

        if send_json(&sender, &message).await.is_err() {
            return;
        }
    }
}

/// Dispatch one control command and reply on the same socket
async fn handle_control(raw: &str, sender: &WsSender, state: &Arc<AppState>) {
    let msg: ControlMessage = match serde_json::from_str(raw) {
        Ok(msg) => msg,
        Err(e) => {
            warn!(error = %e, "malformed control message");
            return;
        }
    };

    match msg.msg_type.as_str() {
        "switch_symbol" => {
            let Some(symbol) = msg.symbol.filter(|s| !s.is_empty()) else {
                send_error(sender, "switch_symbol requires a symbol").await;
                return;
            };
            info!(symbol = %symbol, "switching symbol");
            state.switch_symbol(&symbol).await;
            let reply = serde_json::json!({
                "type": "symbol_switched",
                "symbol": symbol,
            });
            let _ = send_json(sender, &reply).await;
        }

        "toggle_kmeans" => {
            let mut book = state.book.write().await;
            if let Some(enabled) = msg.kmeans_mode {
                book.set_kmeans_enabled(enabled);
                info!(enabled, "K-means mode set");
            }
            if let Some(clusters) = msg.num_clusters {
                if let Err(e) = book.set_num_clusters(clusters) {
                    drop(book);
                    send_error(sender, &e.to_string()).await;
                    return;
                }
                info!(clusters, "cluster count set");
            }
            let (enabled, clusters) = book.clustering_info();
            drop(book);

            let reply = serde_json::json!({
                "type": "kmeans_updated",
                "kmeans_mode": enabled,
                "num_clusters": clusters,
            });
            let _ = send_json(sender, &reply).await;
        }

        "get_clustering_info" => {
            let (enabled, clusters) = state.book.read().await.clustering_info();
            let reply = serde_json::json!({
                "type": "clustering_info",
                "kmeans_mode": enabled,
                "num_clusters": clusters,
            });
            let _ = send_json(sender, &reply).await;
        }

        "refresh_precision" => {
            let symbol = state.book.read().await.symbol().to_string();
            let precision = state.precision.resolve(&symbol).await;
            state.book.write().await.set_precision(precision);

            let reply = serde_json::json!({
                "type": "precision_refreshed",
                "message": "precision information updated",
            });
            let _ = send_json(sender, &reply).await;
        }

        "get_precision_info" => {
            let precision = state.book.read().await.precision().clone();
            let reply = serde_json::json!({
                "type": "precision_info",
                "precision": precision,
            });
            let _ = send_json(sender, &reply).await;
        }

        other => {
            debug!(msg_type = %other, "ignoring unknown control message");
        }
    }
}

async fn send_error(sender: &WsSender, message: &str) {
    let reply = serde_json::json!({
        "type": "error",
        "message": message,
    });
    let _ = send_json(sender, &reply).await;
}

async fn send_json(
    sender: &WsSender,
    value: &serde_json::Value,
) -> Result<(), axum::Error> {
    let text = value.to_string();
    sender.lock().await.send(Message::Text(text)).await
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "component": "l3book",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn metrics() -> String {
    use prometheus::{Encoder, TextEncoder};
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
