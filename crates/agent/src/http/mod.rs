// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Management HTTP surface: thin handlers over the workspace, session,
//! log, and system subsystems.

pub mod files;
pub mod git;
pub mod logs;
pub mod sessions;
pub mod system;
pub mod terminals;
pub mod workspaces;

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderValue, Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::error::ApiError;
use crate::state::AppState;
use crate::ws;

/// Routing headers owned by the gateway. Client-supplied values are
/// stripped; the authoritative values are injected after authentication.
pub const NODE_ID_HEADER: &str = "x-sam-node-id";
pub const WORKSPACE_ID_HEADER: &str = "x-sam-workspace-id";

/// Build the axum `Router` with every management route.
pub fn build_router(state: Arc<AppState>) -> Router {
    let timeout = state.config.http_request_timeout();
    Router::new()
        // Health (no auth)
        .route("/health", get(system::health))
        // Workspaces
        .route("/workspaces", post(workspaces::create).get(workspaces::list))
        .route("/workspaces/{id}", get(workspaces::get).delete(workspaces::remove))
        .route("/workspaces/{id}/stop", post(workspaces::stop))
        .route("/workspaces/{id}/restart", post(workspaces::restart))
        .route("/workspaces/{id}/events", get(workspaces::events))
        // ACP sessions
        .route(
            "/workspaces/{id}/agent-sessions",
            post(sessions::register).get(sessions::list),
        )
        .route("/workspaces/{id}/agent-sessions/{sid}", delete(sessions::remove))
        .route("/workspaces/{id}/agent-sessions/{sid}/start", post(sessions::start))
        .route("/workspaces/{id}/agent-sessions/{sid}/cancel", post(sessions::cancel))
        .route("/workspaces/{id}/agent-sessions/{sid}/ws", get(ws::acp_ws_handler))
        // Terminals
        .route(
            "/workspaces/{id}/terminals",
            post(terminals::create).get(terminals::list),
        )
        .route("/workspaces/{id}/terminals/{sid}", delete(terminals::remove))
        .route("/workspaces/{id}/terminals/{sid}/ws", get(ws::pty_ws_handler))
        // Files and git
        .route("/workspaces/{id}/files", get(files::files))
        .route("/workspaces/{id}/git/status", get(git::status))
        .route("/workspaces/{id}/git/branches", get(git::branches))
        .route("/workspaces/{id}/git/file", get(git::file))
        .route("/workspaces/{id}/git/diff", get(git::diff))
        .route("/workspaces/{id}/git/worktrees", get(git::worktrees))
        // Logs
        .route("/logs", get(logs::read))
        .route("/logs/ws", get(logs::follow_ws))
        // Node
        .route("/system", get(system::info))
        .route("/events", get(system::events))
        // Internal: called by the installed git credential helper.
        .route("/git/credentials", post(git::credentials))
        // Middleware
        .layer(middleware::from_fn_with_state(state.clone(), auth_layer))
        .layer(TimeoutLayer::new(timeout))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bearer-JWT authentication for management routes.
///
/// Exempt: `/health` (liveness), `/git/credentials` (callback-token auth
/// in the handler), and WebSocket upgrades (query-token auth in the
/// handler, since browsers cannot set headers on upgrade requests).
pub async fn auth_layer(
    State(state): State<Arc<AppState>>,
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let path = req.uri().path().to_owned();
    if path == "/health" || path == "/git/credentials" || path.ends_with("/ws") {
        return next.run(req).await;
    }

    // Client-supplied routing headers are never trusted.
    req.headers_mut().remove(NODE_ID_HEADER);
    req.headers_mut().remove(WORKSPACE_ID_HEADER);

    let token = ws::auth::bearer(
        req.headers().get("authorization").and_then(|v| v.to_str().ok()),
    );
    let Some(token) = token else {
        return deny(ApiError::Unauthorized, "missing bearer token");
    };
    let claims = match state.verifier.verify(token).await {
        Ok(claims) => claims,
        Err(e) => return deny(ApiError::Unauthorized, &e.to_string()),
    };

    // A workspace-scoped route requires the matching workspaceId claim;
    // node-scoped routes accept a nodeId or any workspace claim.
    if let Some(workspace_id) = workspace_path_id(&path) {
        if !claims.authorizes_workspace(workspace_id) {
            return deny(ApiError::Forbidden, "token is not scoped to this workspace");
        }
        if let Ok(value) = HeaderValue::from_str(workspace_id) {
            req.headers_mut().insert(WORKSPACE_ID_HEADER, value);
        }
    } else if !claims.authorizes_node(&state.config.node_id) {
        return deny(ApiError::Forbidden, "token is not scoped to this node");
    }
    if let Ok(value) = HeaderValue::from_str(&state.config.node_id) {
        req.headers_mut().insert(NODE_ID_HEADER, value);
    }

    next.run(req).await
}

/// `/workspaces/{id}/...` -> `id`.
fn workspace_path_id(path: &str) -> Option<&str> {
    let rest = path.strip_prefix("/workspaces/")?;
    let id = rest.split('/').next()?;
    (!id.is_empty()).then_some(id)
}

fn deny(code: ApiError, message: &str) -> Response {
    let (status, body) = code.to_http_response(message);
    (status, body).into_response()
}

/// Map a subsystem error onto the HTTP response envelope.
pub fn fail(e: anyhow::Error) -> Response {
    crate::error::error_response(&e).into_response()
}

/// 200 with a JSON body.
pub fn ok_json<T: serde::Serialize>(body: T) -> Response {
    axum::Json(body).into_response()
}

/// 201 with a JSON body.
pub fn created_json<T: serde::Serialize>(body: T) -> Response {
    (StatusCode::CREATED, axum::Json(body)).into_response()
}

/// 202 with a JSON body.
pub fn accepted_json<T: serde::Serialize>(body: T) -> Response {
    (StatusCode::ACCEPTED, axum::Json(body)).into_response()
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;
