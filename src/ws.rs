//! WebSocket server + REST endpoints for the worker hub.

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

use crate::context::CallContext;
use crate::hub::{Hub, WorkerAdapter};
use crate::tools::{ToolError, ToolRegistry};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<Hub>,
    pub adapter: WorkerAdapter,
    pub tools: Arc<ToolRegistry>,
}

/// Build the Axum router with the hub WebSocket and REST routes.
pub fn hub_routes(hub: Arc<Hub>, tools: Arc<ToolRegistry>) -> Router {
    let state = AppState {
        adapter: WorkerAdapter::new(Arc::clone(&hub)),
        hub,
        tools,
    };

    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .route("/api/workers", get(list_workers))
        .route("/api/workers/{id}", get(get_worker))
        .route("/api/workers/{id}/command", post(send_command))
        .route("/api/workers/{id}/status", post(query_status))
        .route("/api/tools", get(list_tools))
        .route("/api/tools/{name}", post(call_tool))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "worker-hub",
        "connections": state.hub.registry().len().await,
        "workers": state.hub.store().len().await,
    }))
}

// ── WebSocket ───────────────────────────────────────────────────────────

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    debug!("WebSocket client connecting");
    ws.on_upgrade(|socket| handle_socket(socket, state.hub))
}

async fn handle_socket(mut socket: WebSocket, hub: Arc<Hub>) {
    let (conn, mut outbound) = hub.connect().await;
    let closed = conn.close_token();

    loop {
        tokio::select! {
            // Closed by the sweeper or a slow-observer eviction
            _ = closed.cancelled() => {
                debug!(conn_id = %conn.id, "Connection closed by hub");
                let _ = socket.send(Message::Close(None)).await;
                break;
            }

            // Drain the outbound queue
            frame = outbound.recv() => {
                let Some(frame) = frame else { break };
                if socket.send(Message::Text(frame.to_string().into())).await.is_err() {
                    debug!(conn_id = %conn.id, "Client disconnected during send");
                    break;
                }
            }

            // Inbound frames, handled in arrival order
            result = socket.recv() => {
                match result {
                    Some(Ok(Message::Text(text))) => {
                        hub.dispatch(&conn, text.as_str()).await;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        hub.registry().touch(conn.id).await;
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(conn_id = %conn.id, error = %e, "WebSocket error");
                        break;
                    }
                    _ => {
                        hub.registry().touch(conn.id).await;
                    }
                }
            }
        }
    }

    hub.disconnect(conn.id).await;
    info!(conn_id = %conn.id, "WebSocket connection closed");
}

// ── Workers ─────────────────────────────────────────────────────────────

async fn list_workers(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.adapter.list_workers().await)
}

async fn get_worker(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    match state.adapter.get_worker_state(&id).await {
        Some(worker) => (StatusCode::OK, Json(serde_json::json!(worker))),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": "Worker not found"})),
        ),
    }
}

#[derive(Deserialize)]
struct CommandRequest {
    command: String,
    #[serde(default)]
    parameters: Option<serde_json::Value>,
}

async fn send_command(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<CommandRequest>,
) -> impl IntoResponse {
    if body.command.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"sent": false, "error": "Command name is required"})),
        );
    }

    if state
        .adapter
        .send_command(&id, &body.command, body.parameters)
        .await
    {
        (StatusCode::OK, Json(serde_json::json!({"sent": true})))
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"sent": false, "error": "Worker not connected"})),
        )
    }
}

async fn query_status(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    Json(state.adapter.query_status(&id).await)
}

// ── Tools ───────────────────────────────────────────────────────────────

async fn list_tools(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.tools.tool_definitions().await)
}

async fn call_tool(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Bytes,
) -> impl IntoResponse {
    let params: serde_json::Value = if body.is_empty() {
        serde_json::json!({})
    } else {
        match serde_json::from_slice(&body) {
            Ok(params) => params,
            Err(e) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(serde_json::json!({"error": format!("Invalid JSON body: {}", e)})),
                );
            }
        }
    };

    let Some(tool) = state.tools.get(&name).await else {
        let err = ToolError::NotFound(name);
        return (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": err.to_string()})),
        );
    };

    let ctx = CallContext::new("rest").with_metadata(serde_json::json!({"tool": name}));
    match tool.execute(params, &ctx).await {
        Ok(output) => (StatusCode::OK, Json(serde_json::json!(output))),
        Err(e) => {
            warn!(tool = %name, call_id = %ctx.call_id, error = %e, "Tool call failed");
            let status = match e {
                ToolError::NotFound(_) => StatusCode::NOT_FOUND,
                ToolError::InvalidParameters(_) => StatusCode::BAD_REQUEST,
                ToolError::ExecutionFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (status, Json(serde_json::json!({"error": e.to_string()})))
        }
    }
}
