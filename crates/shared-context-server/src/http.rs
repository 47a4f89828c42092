//! HTTP + WebSocket transport: framed JSON over HTTP for tool
//! calls and resource reads, plus a WebSocket upgrade for the Notification
//! Hub's push channel. Bearer tokens are validated once per request/connect.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use axum::extract::{Path, Query, State, WebSocketUpgrade};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use shared_context_protocol::{CoreError, Identity};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

use crate::app::App;
use crate::{resources, tools};

pub fn router(app: Arc<App>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/tools/{name}", post(call_tool))
        .route("/resources", get(read_resource))
        .route("/ws", get(websocket_upgrade))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app)
}

async fn healthz(State(app): State<Arc<App>>) -> impl IntoResponse {
    match app.storage.ping().await {
        Ok(()) => (StatusCode::OK, Json(json!({"status": "ok"}))),
        Err(err) => (StatusCode::SERVICE_UNAVAILABLE, Json(json!({"status": "unavailable", "error": err.message}))),
    }
}

async fn authenticate(app: &App, headers: &HeaderMap) -> Result<Identity, Value> {
    let token = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| CoreError::unauthenticated("missing bearer token"));

    match token {
        Ok(token) => app
            .tokens
            .validate(token)
            .await
            .map_err(|err| serde_json::to_value(shared_context_protocol::WireError::from(&err)).unwrap_or(json!({"success": false}))),
        Err(err) => Err(serde_json::to_value(shared_context_protocol::WireError::from(&err)).unwrap_or(json!({"success": false}))),
    }
}

async fn call_tool(State(app): State<Arc<App>>, Path(name): Path<String>, headers: HeaderMap, Json(args): Json<Value>) -> impl IntoResponse {
    match authenticate(&app, &headers).await {
        Ok(identity) => Json(tools::dispatch(&app, &identity, &name, args).await),
        Err(err) => Json(err),
    }
}

#[derive(Debug, Deserialize)]
struct ResourceQuery {
    uri: String,
}

async fn read_resource(State(app): State<Arc<App>>, headers: HeaderMap, Query(query): Query<ResourceQuery>) -> impl IntoResponse {
    match authenticate(&app, &headers).await {
        Ok(identity) => match resources::read(&app, &identity, &query.uri).await {
            Ok(value) => Json(json!({"success": true, "resource": value})),
            Err(err) => Json(serde_json::to_value(shared_context_protocol::WireError::from(&err)).unwrap_or(json!({"success": false}))),
        },
        Err(err) => Json(err),
    }
}

#[derive(Debug, Deserialize)]
struct WsQuery {
    uri: String,
    token: String,
}

async fn websocket_upgrade(State(app): State<Arc<App>>, Query(query): Query<WsQuery>, ws: WebSocketUpgrade) -> impl IntoResponse {
    if app.tokens.validate(&query.token).await.is_err() {
        return (StatusCode::UNAUTHORIZED, "invalid token").into_response();
    }
    ws.on_upgrade(move |socket| handle_socket(socket, app, query.uri))
}

/// Per-connection task: forwards hub events to the client and answers pings
/// with pongs; closes after two missed heartbeats.
async fn handle_socket(socket: WebSocket, app: Arc<App>, uri: String) {
    let mut receiver = app.hub.subscribe(&uri).await;
    let (mut sink, mut stream) = socket.split();

    let mut missed_pongs = 0u8;
    let mut heartbeat = tokio::time::interval(Duration::from_secs(30));

    loop {
        tokio::select! {
            event = receiver.recv() => {
                let Some(event) = event else { break };
                let payload = serde_json::to_string(&event).unwrap_or_default();
                if sink.send(WsMessage::Text(payload.into())).await.is_err() {
                    break;
                }
            }
            _ = heartbeat.tick() => {
                missed_pongs += 1;
                if missed_pongs > 2 {
                    debug!(uri, "closing websocket after missed heartbeats");
                    break;
                }
                if sink.send(WsMessage::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
            }
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(WsMessage::Pong(_))) => missed_pongs = 0,
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Err(err)) => {
                        warn!(uri, error = %err, "websocket read error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }
}
