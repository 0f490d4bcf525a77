// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Terminal session handlers; the interactive path is the WebSocket in
//! [`crate::ws`].

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use serde::Deserialize;

use crate::error::{ApiError, ApiFailure};
use crate::state::AppState;

use super::{created_json, fail, ok_json};

#[derive(Debug, Deserialize)]
pub struct CreateTerminal {
    #[serde(default = "default_cols")]
    pub cols: u16,
    #[serde(default = "default_rows")]
    pub rows: u16,
    #[serde(default)]
    pub shell: Option<String>,
}

fn default_cols() -> u16 {
    120
}
fn default_rows() -> u16 {
    32
}

/// `POST /workspaces/:id/terminals`
pub async fn create(
    State(state): State<Arc<AppState>>,
    Path(workspace_id): Path<String>,
    Json(req): Json<CreateTerminal>,
) -> Response {
    let workspace = match state.workspaces.get(&workspace_id) {
        Ok(workspace) => workspace,
        Err(e) => return fail(e),
    };
    match workspace.ptys.create(req.cols, req.rows, req.shell).await {
        Ok(session) => created_json(serde_json::json!({
            "sessionId": session.id,
            "cols": req.cols,
            "rows": req.rows,
        })),
        Err(e) => fail(e),
    }
}

/// `GET /workspaces/:id/terminals`
pub async fn list(
    State(state): State<Arc<AppState>>,
    Path(workspace_id): Path<String>,
) -> Response {
    match state.workspaces.get(&workspace_id) {
        Ok(workspace) => ok_json(workspace.ptys.list()),
        Err(e) => fail(e),
    }
}

/// `DELETE /workspaces/:id/terminals/:sid`
pub async fn remove(
    State(state): State<Arc<AppState>>,
    Path((workspace_id, session_id)): Path<(String, String)>,
) -> Response {
    let workspace = match state.workspaces.get(&workspace_id) {
        Ok(workspace) => workspace,
        Err(e) => return fail(e),
    };
    if workspace.ptys.close(&session_id).await {
        ok_json(serde_json::json!({ "closed": true }))
    } else {
        fail(ApiFailure::new(ApiError::NotFound, format!("terminal {session_id} not found")))
    }
}
