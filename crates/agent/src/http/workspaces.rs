// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace lifecycle handlers.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;

use crate::state::AppState;
use crate::workspace::{CreateWorkspace, WorkspaceResponse};

use super::{created_json, fail, ok_json};

/// `POST /workspaces`
pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateWorkspace>,
) -> Response {
    match state.workspaces.create(req) {
        Ok(workspace) => created_json(WorkspaceResponse::from(workspace.as_ref())),
        Err(e) => fail(e),
    }
}

/// `GET /workspaces`
pub async fn list(State(state): State<Arc<AppState>>) -> Response {
    ok_json(state.workspaces.list())
}

/// `GET /workspaces/:id`
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(workspace_id): Path<String>,
) -> Response {
    match state.workspaces.get(&workspace_id) {
        Ok(workspace) => ok_json(WorkspaceResponse::from(workspace.as_ref())),
        Err(e) => fail(e),
    }
}

/// `POST /workspaces/:id/stop`
pub async fn stop(
    State(state): State<Arc<AppState>>,
    Path(workspace_id): Path<String>,
) -> Response {
    match state.workspaces.stop(&workspace_id).await {
        Ok(()) => ok_json(serde_json::json!({ "stopped": true })),
        Err(e) => fail(e),
    }
}

/// `POST /workspaces/:id/restart`
pub async fn restart(
    State(state): State<Arc<AppState>>,
    Path(workspace_id): Path<String>,
) -> Response {
    match state.workspaces.restart(&workspace_id).await {
        Ok(()) => ok_json(serde_json::json!({ "restarted": true })),
        Err(e) => fail(e),
    }
}

/// `DELETE /workspaces/:id`
pub async fn remove(
    State(state): State<Arc<AppState>>,
    Path(workspace_id): Path<String>,
) -> Response {
    match state.workspaces.delete(&workspace_id).await {
        Ok(()) => ok_json(serde_json::json!({ "deleted": true })),
        Err(e) => fail(e),
    }
}

/// `GET /workspaces/:id/events`
pub async fn events(
    State(state): State<Arc<AppState>>,
    Path(workspace_id): Path<String>,
) -> Response {
    match state.workspaces.get(&workspace_id) {
        Ok(workspace) => ok_json(workspace.events.snapshot()),
        Err(e) => fail(e),
    }
}
