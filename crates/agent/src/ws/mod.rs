// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket gateway: authenticated upgrades routed to PTY or ACP
//! sessions, with ping/pong liveness and per-connection send loops.

pub mod auth;
pub mod frames;

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, Query, State, WebSocketUpgrade};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use base64::Engine;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::time::Instant;

use crate::acp::{AcpEvent, AcpSession, AgentKind, PromptError};
use crate::error::ApiError;
use crate::pty::{AttachError, PtyOutput, PtySession};
use crate::state::AppState;
use frames::{GatewayError, PtyClientFrame, ServerFrame};

/// Query parameters accepted on WebSocket upgrades.
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Short-lived bearer, for clients that cannot set headers.
    pub token: Option<String>,
    /// PTY only: steal the attachment from the current viewer.
    #[serde(default)]
    pub takeover: bool,
    /// ACP only, for `new` sessions.
    #[serde(default, rename = "agentType")]
    pub agent_type: Option<String>,
}

/// Validate origin + token and resolve the claims, or produce the denial
/// response.
async fn authenticate(
    state: &AppState,
    headers: &HeaderMap,
    query: &WsQuery,
    workspace_id: &str,
) -> Result<(), Response> {
    if let Some(origin) = headers.get("origin").and_then(|v| v.to_str().ok()) {
        if !auth::origin_allowed(origin, &state.config.allowed_origins()) {
            return Err(ApiError::Forbidden.to_http_response("origin not allowed").into_response());
        }
    }

    let header_token =
        auth::bearer(headers.get("authorization").and_then(|v| v.to_str().ok()));
    let token = header_token.or(query.token.as_deref());
    let Some(token) = token else {
        return Err(ApiError::Unauthorized.to_http_response("missing bearer token").into_response());
    };
    let claims = match state.verifier.verify(token).await {
        Ok(claims) => claims,
        Err(e) => {
            return Err(ApiError::Unauthorized.to_http_response(e.to_string()).into_response());
        }
    };
    if !claims.authorizes_workspace(workspace_id) {
        return Err(ApiError::Forbidden
            .to_http_response("token is not scoped to this workspace")
            .into_response());
    }
    Ok(())
}

// -- PTY ----------------------------------------------------------------------

/// `GET /workspaces/:id/terminals/:sid/ws`
pub async fn pty_ws_handler(
    State(state): State<Arc<AppState>>,
    Path((workspace_id, session_id)): Path<(String, String)>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    if let Err(denied) = authenticate(&state, &headers, &query, &workspace_id).await {
        return denied;
    }
    let workspace = match state.workspaces.get(&workspace_id) {
        Ok(ws) => ws,
        Err(e) => return crate::error::error_response(&e).into_response(),
    };
    let Some(session) = workspace.ptys.get(&session_id) else {
        return ApiError::NotFound.to_http_response("terminal session not found").into_response();
    };

    let ping = state.config.acp_ping_interval();
    let pong = state.config.acp_pong_timeout();
    ws.on_upgrade(move |socket| pty_connection(socket, session, query.takeover, ping, pong))
        .into_response()
}

async fn pty_connection(
    socket: WebSocket,
    session: Arc<PtySession>,
    takeover: bool,
    ping_interval: std::time::Duration,
    pong_timeout: std::time::Duration,
) {
    let (mut tx, mut rx) = socket.split();

    let mut attachment = match session.attach(takeover) {
        Ok(attachment) => attachment,
        Err(AttachError::Conflict) => {
            let err = GatewayError::new(
                ApiError::AttachmentConflict,
                "another viewer is attached; reconnect with takeover=true",
            );
            let _ = send_json(&mut tx, &err).await;
            let _ = tx.close().await;
            return;
        }
    };

    // Ring replay strictly precedes live bytes.
    if !attachment.replay.is_empty() {
        let frame = ServerFrame::Output {
            data: base64::engine::general_purpose::STANDARD.encode(&attachment.replay),
        };
        if send_json(&mut tx, &frame).await.is_err() {
            session.detach(attachment.viewer_id);
            return;
        }
    }

    let mut ping = tokio::time::interval(ping_interval);
    ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut last_pong = Instant::now();

    loop {
        tokio::select! {
            output = attachment.output.recv() => {
                match output {
                    Some(PtyOutput::Data(data)) => {
                        let frame = ServerFrame::Output {
                            data: base64::engine::general_purpose::STANDARD.encode(&data),
                        };
                        if send_json(&mut tx, &frame).await.is_err() {
                            break;
                        }
                    }
                    Some(PtyOutput::Detached { reason }) => {
                        let _ = send_json(&mut tx, &ServerFrame::Detached { reason: reason.to_owned() }).await;
                        break;
                    }
                    Some(PtyOutput::Exited { status }) => {
                        let _ = send_json(&mut tx, &ServerFrame::Exited {
                            code: status.code,
                            signal: status.signal,
                        }).await;
                        break;
                    }
                    None => break,
                }
            }
            _ = ping.tick() => {
                if last_pong.elapsed() > ping_interval + pong_timeout {
                    tracing::debug!(session_id = %session.id, "pong timeout, disconnecting viewer");
                    break;
                }
                if tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
            }
            msg = rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<PtyClientFrame>(&text) {
                            Ok(PtyClientFrame::Input { data }) => {
                                if let Ok(bytes) = base64::engine::general_purpose::STANDARD.decode(&data) {
                                    let _ = session.write_input(bytes.into()).await;
                                }
                            }
                            Ok(PtyClientFrame::Resize { cols, rows }) => {
                                if let Err(e) = session.resize(cols, rows) {
                                    tracing::debug!(err = %e, "resize failed");
                                }
                            }
                            Err(_) => {
                                let err = GatewayError::new(ApiError::BadRequest, "invalid frame");
                                if send_json(&mut tx, &err).await.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                    Some(Ok(Message::Binary(data))) => {
                        let _ = session.write_input(bytes::Bytes::from(data)).await;
                    }
                    Some(Ok(Message::Pong(_))) => last_pong = Instant::now(),
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
        }
    }

    session.detach(attachment.viewer_id);
}

// -- ACP ----------------------------------------------------------------------

/// `GET /workspaces/:id/agent-sessions/:sid/ws` (`sid` may be `new`).
pub async fn acp_ws_handler(
    State(state): State<Arc<AppState>>,
    Path((workspace_id, session_id)): Path<(String, String)>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    if let Err(denied) = authenticate(&state, &headers, &query, &workspace_id).await {
        return denied;
    }
    let workspace = match state.workspaces.get(&workspace_id) {
        Ok(ws) => ws,
        Err(e) => return crate::error::error_response(&e).into_response(),
    };

    let session = if session_id == "new" {
        let kind = query
            .agent_type
            .as_deref()
            .and_then(AgentKind::parse)
            .unwrap_or(AgentKind::ClaudeCode);
        match workspace.acp.register(None, kind, false) {
            Ok(session) => session,
            Err(e) => return crate::error::error_response(&e).into_response(),
        }
    } else {
        match workspace.acp.get(&session_id) {
            Some(session) => session,
            None => {
                return ApiError::NotFound
                    .to_http_response("agent session not found")
                    .into_response()
            }
        }
    };

    let ping = state.config.acp_ping_interval();
    let pong = state.config.acp_pong_timeout();
    ws.on_upgrade(move |socket| acp_connection(socket, session, ping, pong)).into_response()
}

async fn acp_connection(
    socket: WebSocket,
    session: Arc<AcpSession>,
    ping_interval: std::time::Duration,
    pong_timeout: std::time::Duration,
) {
    let (mut tx, mut rx) = socket.split();
    let attachment = session.attach();
    let mut events = attachment.events;

    // session_state, then the ordered replay, then the live phase.
    let state_frame = ServerFrame::SessionState {
        status: attachment.status.as_str().to_owned(),
        agent_type: session.kind.as_str().to_owned(),
        replay_count: attachment.replay.len(),
    };
    if send_json(&mut tx, &state_frame).await.is_err() {
        return;
    }
    if !attachment.replay.is_empty() {
        for frame in &attachment.replay {
            if send_raw(&mut tx, frame).await.is_err() {
                return;
            }
        }
        if send_json(&mut tx, &ServerFrame::SessionReplayComplete).await.is_err() {
            return;
        }
    }

    let mut ping = tokio::time::interval(ping_interval);
    ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut last_pong = Instant::now();

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Ok(AcpEvent::Message(frame)) => {
                        if send_raw(&mut tx, &frame).await.is_err() {
                            break;
                        }
                    }
                    Ok(AcpEvent::Status { status, error }) => {
                        let frame = ServerFrame::AgentStatus {
                            status: status.as_str().to_owned(),
                            agent_type: session.kind.as_str().to_owned(),
                            error,
                        };
                        if send_json(&mut tx, &frame).await.is_err() {
                            break;
                        }
                    }
                    Ok(AcpEvent::PromptDone) => {
                        if send_json(&mut tx, &ServerFrame::SessionPromptDone).await.is_err() {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        // A viewer that cannot keep up is disconnected; the
                        // session is unaffected.
                        tracing::warn!(session_id = %session.id, skipped, "viewer lagged, dropping");
                        break;
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
            _ = ping.tick() => {
                if last_pong.elapsed() > ping_interval + pong_timeout {
                    tracing::debug!(session_id = %session.id, "pong timeout, disconnecting viewer");
                    break;
                }
                if tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
            }
            msg = rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if handle_acp_client_frame(&session, &text, &mut tx).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => last_pong = Instant::now(),
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
        }
    }
}

/// Viewer traffic: prompts and cancels are intercepted (one active
/// prompter rule), everything else passes through to the agent.
async fn handle_acp_client_frame(
    session: &AcpSession,
    text: &str,
    tx: &mut SplitSink<WebSocket, Message>,
) -> anyhow::Result<()> {
    let Ok(frame) = serde_json::from_str::<serde_json::Value>(text) else {
        let err = GatewayError::new(ApiError::BadRequest, "invalid JSON-RPC frame");
        return send_json(tx, &err).await;
    };

    let method = frame.get("method").and_then(|m| m.as_str()).unwrap_or_default();
    let profile = session.kind.profile();

    if method == profile.prompt_method {
        let text = prompt_text(&frame).unwrap_or_default();
        match session.prompt(&text) {
            Ok(()) => Ok(()),
            Err(PromptError::Busy) => {
                let err = GatewayError::new(ApiError::Busy, "a prompt is already in progress");
                send_json(tx, &err).await
            }
            Err(PromptError::NotReady(status)) => {
                let err = GatewayError::new(
                    ApiError::Conflict,
                    format!("session is {}", status.as_str()),
                );
                send_json(tx, &err).await
            }
            Err(PromptError::Closed) => {
                let err = GatewayError::new(ApiError::UpstreamError, "agent process is not running");
                send_json(tx, &err).await
            }
        }
    } else if method == profile.cancel_method {
        let _ = session.cancel_prompt().await;
        Ok(())
    } else {
        if let Err(e) = session.send_raw(frame).await {
            let err = GatewayError::new(ApiError::UpstreamError, e.to_string());
            return send_json(tx, &err).await;
        }
        Ok(())
    }
}

/// Concatenated text blocks of a client prompt request.
fn prompt_text(frame: &serde_json::Value) -> Option<String> {
    let blocks = frame.get("params")?.get("prompt")?.as_array()?;
    let mut out = String::new();
    for block in blocks {
        if let Some(text) = block.get("text").and_then(|t| t.as_str()) {
            out.push_str(text);
        }
    }
    Some(out)
}

async fn send_json<T: serde::Serialize>(
    tx: &mut SplitSink<WebSocket, Message>,
    value: &T,
) -> anyhow::Result<()> {
    let json = serde_json::to_string(value)?;
    tx.send(Message::Text(json.into())).await.map_err(|e| anyhow::anyhow!("ws send: {e}"))
}

async fn send_raw(
    tx: &mut SplitSink<WebSocket, Message>,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    let json = serde_json::to_string(value)?;
    tx.send(Message::Text(json.into())).await.map_err(|e| anyhow::anyhow!("ws send: {e}"))
}

#[cfg(test)]
#[path = "ws_tests.rs"]
mod tests;
