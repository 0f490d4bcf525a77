// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! ACP session handlers.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use serde::Deserialize;

use crate::acp::AgentKind;
use crate::error::{ApiError, ApiFailure};
use crate::state::AppState;

use super::{accepted_json, created_json, fail, ok_json};

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default, rename = "sessionId")]
    pub session_id: Option<String>,
    #[serde(rename = "agentType")]
    pub agent_type: String,
    #[serde(default)]
    pub persistent: bool,
}

#[derive(Debug, Deserialize)]
pub struct StartRequest {
    #[serde(rename = "agentType")]
    pub agent_type: String,
    #[serde(default, rename = "initialPrompt")]
    pub initial_prompt: Option<String>,
}

fn parse_kind(raw: &str) -> anyhow::Result<AgentKind> {
    AgentKind::parse(raw)
        .ok_or_else(|| ApiFailure::new(ApiError::BadRequest, format!("unknown agent type {raw:?}")))
}

/// `POST /workspaces/:id/agent-sessions` — register a record, no process.
pub async fn register(
    State(state): State<Arc<AppState>>,
    Path(workspace_id): Path<String>,
    Json(req): Json<RegisterRequest>,
) -> Response {
    let result = (|| {
        let workspace = state.workspaces.get(&workspace_id)?;
        let kind = parse_kind(&req.agent_type)?;
        workspace.acp.register(req.session_id.clone(), kind, req.persistent)
    })();
    match result {
        Ok(session) => created_json(serde_json::json!({
            "sessionId": session.id,
            "agentType": session.kind.as_str(),
            "status": session.status().as_str(),
        })),
        Err(e) => fail(e),
    }
}

/// `GET /workspaces/:id/agent-sessions`
pub async fn list(
    State(state): State<Arc<AppState>>,
    Path(workspace_id): Path<String>,
) -> Response {
    match state.workspaces.get(&workspace_id) {
        Ok(workspace) => ok_json(workspace.acp.list()),
        Err(e) => fail(e),
    }
}

/// `POST /workspaces/:id/agent-sessions/:sid/start` — create the
/// subprocess and deliver the initial prompt. Work continues
/// asynchronously; the call is accepted, not completed.
pub async fn start(
    State(state): State<Arc<AppState>>,
    Path((workspace_id, session_id)): Path<(String, String)>,
    Json(req): Json<StartRequest>,
) -> Response {
    let workspace = match state.workspaces.get(&workspace_id) {
        Ok(workspace) => workspace,
        Err(e) => return fail(e),
    };
    let kind = match parse_kind(&req.agent_type) {
        Ok(kind) => kind,
        Err(e) => return fail(e),
    };
    match workspace.acp.start(&session_id, kind, req.initial_prompt).await {
        Ok(session) => accepted_json(serde_json::json!({
            "sessionId": session.id,
            "status": session.status().as_str(),
        })),
        Err(e) => fail(e),
    }
}

/// `POST /workspaces/:id/agent-sessions/:sid/cancel`
pub async fn cancel(
    State(state): State<Arc<AppState>>,
    Path((workspace_id, session_id)): Path<(String, String)>,
) -> Response {
    let workspace = match state.workspaces.get(&workspace_id) {
        Ok(workspace) => workspace,
        Err(e) => return fail(e),
    };
    match workspace.acp.cancel(&session_id).await {
        Ok(true) => ok_json(serde_json::json!({ "cancelled": true })),
        Ok(false) => {
            fail(ApiFailure::new(ApiError::NotFound, format!("agent session {session_id} not found")))
        }
        Err(e) => fail(e),
    }
}

/// `DELETE /workspaces/:id/agent-sessions/:sid`
pub async fn remove(
    State(state): State<Arc<AppState>>,
    Path((workspace_id, session_id)): Path<(String, String)>,
) -> Response {
    let workspace = match state.workspaces.get(&workspace_id) {
        Ok(workspace) => workspace,
        Err(e) => return fail(e),
    };
    if workspace.acp.remove(&session_id).await {
        ok_json(serde_json::json!({ "removed": true }))
    } else {
        fail(ApiFailure::new(ApiError::NotFound, format!("agent session {session_id} not found")))
    }
}
