// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Log read and follow handlers.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::error::ApiError;
use crate::logs::LogFilter;
use crate::state::AppState;
use crate::ws::auth;

use super::ok_json;

/// `GET /logs` — paginated read with the full filter surface.
pub async fn read(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<LogFilter>,
) -> Response {
    if let Err(msg) = filter.validate(state.logs.settings().page_max_limit) {
        return ApiError::InvalidFilter.to_http_response(msg).into_response();
    }
    match state.logs.read(&filter).await {
        Ok(page) => ok_json(page),
        Err(e) => ApiError::Internal.to_http_response(e.to_string()).into_response(),
    }
}

/// `GET /logs/ws` — catch-up then live follow over a WebSocket.
pub async fn follow_ws(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<LogFilter>,
    Query(query): Query<crate::ws::WsQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    // Node-scoped endpoint: token from header or query, nodeId claim.
    let header_token = auth::bearer(headers.get("authorization").and_then(|v| v.to_str().ok()));
    let Some(token) = header_token.or(query.token.as_deref()) else {
        return ApiError::Unauthorized.to_http_response("missing bearer token").into_response();
    };
    let claims = match state.verifier.verify(token).await {
        Ok(claims) => claims,
        Err(e) => return ApiError::Unauthorized.to_http_response(e.to_string()).into_response(),
    };
    if !claims.authorizes_node(&state.config.node_id) {
        return ApiError::Forbidden
            .to_http_response("token is not scoped to this node")
            .into_response();
    }
    if let Err(msg) = filter.validate(state.logs.settings().page_max_limit) {
        return ApiError::InvalidFilter.to_http_response(msg).into_response();
    }

    ws.on_upgrade(move |socket| follow_connection(state, filter, socket)).into_response()
}

async fn follow_connection(state: Arc<AppState>, filter: LogFilter, socket: WebSocket) {
    let (mut tx, mut rx) = socket.split();
    let (entry_tx, mut entry_rx) = mpsc::channel(64);
    let cancel = state.shutdown.child_token();

    let stream_cancel = cancel.clone();
    let logs = Arc::clone(&state.logs);
    let streamer = tokio::spawn(async move {
        if let Err(e) = crate::logs::stream::stream(&logs, &filter, entry_tx, stream_cancel).await {
            tracing::warn!(err = %e, "log stream ended with error");
        }
    });

    loop {
        tokio::select! {
            entry = entry_rx.recv() => {
                let Some(entry) = entry else { break };
                let Ok(json) = serde_json::to_string(&entry) else { continue };
                if tx.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
            msg = rx.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }

    // Dropping the receiver makes the follower's next send fail, which
    // ends the stream task within its cancellation deadline.
    cancel.cancel();
    drop(entry_rx);
    let _ = streamer.await;
}
