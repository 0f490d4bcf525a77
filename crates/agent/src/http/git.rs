// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Read-only git surface, executed inside the devcontainer, plus the
//! internal credential endpoint used by the installed helper.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::error::{ApiError, ApiFailure};
use crate::state::AppState;
use crate::workspace::Workspace;
use crate::ws::auth;

use super::{fail, ok_json};

#[derive(Debug, Deserialize)]
pub struct GitQuery {
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default, rename = "ref")]
    pub git_ref: Option<String>,
}

/// Run git with the given args inside the workspace's devcontainer and
/// capture stdout. Every value is its own argv entry.
async fn container_git(
    state: &AppState,
    workspace: &Workspace,
    git_args: &[&str],
) -> anyhow::Result<String> {
    let container_id = state.containers.container_id(&workspace.label_value).await?;
    let user = state.containers.effective_user(&container_id).await?;

    let mut args: Vec<&str> =
        vec!["exec", "-u", &user, "-w", &workspace.container_workdir, &container_id, "git"];
    args.extend_from_slice(git_args);

    let output = tokio::process::Command::new("docker").args(&args).output().await?;
    if !output.status.success() {
        return Err(ApiFailure::new(
            ApiError::UpstreamError,
            format!("git failed: {}", String::from_utf8_lossy(&output.stderr).trim()),
        ));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// A ref or path that is safe to hand to git as a value argument.
fn validate_git_value(value: &str, what: &str) -> anyhow::Result<()> {
    if value.is_empty() || value.len() > 512 || value.starts_with('-') {
        return Err(ApiFailure::new(ApiError::BadRequest, format!("invalid {what}")));
    }
    if value.chars().any(|c| c.is_control()) {
        return Err(ApiFailure::new(ApiError::BadRequest, format!("invalid {what}")));
    }
    Ok(())
}

macro_rules! get_workspace {
    ($state:expr, $id:expr) => {
        match $state.workspaces.get(&$id) {
            Ok(workspace) => workspace,
            Err(e) => return fail(e),
        }
    };
}

/// `GET /workspaces/:id/git/status`
pub async fn status(
    State(state): State<Arc<AppState>>,
    Path(workspace_id): Path<String>,
) -> Response {
    let workspace = get_workspace!(state, workspace_id);
    match container_git(&state, &workspace, &["status", "--porcelain=v2", "--branch"]).await {
        Ok(out) => ok_json(serde_json::json!({ "raw": out })),
        Err(e) => fail(e),
    }
}

/// `GET /workspaces/:id/git/branches`
pub async fn branches(
    State(state): State<Arc<AppState>>,
    Path(workspace_id): Path<String>,
) -> Response {
    let workspace = get_workspace!(state, workspace_id);
    match container_git(
        &state,
        &workspace,
        &["branch", "-a", "--format=%(refname:short)\t%(objectname:short)\t%(HEAD)"],
    )
    .await
    {
        Ok(out) => {
            let branches: Vec<serde_json::Value> = out
                .lines()
                .filter_map(|line| {
                    let mut parts = line.split('\t');
                    let name = parts.next()?;
                    let commit = parts.next().unwrap_or_default();
                    let head = parts.next() == Some("*");
                    Some(serde_json::json!({ "name": name, "commit": commit, "current": head }))
                })
                .collect();
            ok_json(serde_json::json!({ "branches": branches }))
        }
        Err(e) => fail(e),
    }
}

/// `GET /workspaces/:id/git/file?path=&ref=`
pub async fn file(
    State(state): State<Arc<AppState>>,
    Path(workspace_id): Path<String>,
    Query(query): Query<GitQuery>,
) -> Response {
    let workspace = get_workspace!(state, workspace_id);
    let Some(path) = query.path else {
        return fail(ApiFailure::new(ApiError::BadRequest, "path is required"));
    };
    if let Err(e) = validate_git_value(&path, "path") {
        return fail(e);
    }
    let git_ref = query.git_ref.unwrap_or_else(|| "HEAD".to_owned());
    if let Err(e) = validate_git_value(&git_ref, "ref") {
        return fail(e);
    }
    let spec = format!("{git_ref}:{path}");
    match container_git(&state, &workspace, &["show", &spec]).await {
        Ok(out) => ok_json(serde_json::json!({ "path": path, "ref": git_ref, "content": out })),
        Err(e) => fail(e),
    }
}

/// `GET /workspaces/:id/git/diff?path=&ref=`
pub async fn diff(
    State(state): State<Arc<AppState>>,
    Path(workspace_id): Path<String>,
    Query(query): Query<GitQuery>,
) -> Response {
    let workspace = get_workspace!(state, workspace_id);
    let mut args: Vec<String> = vec!["diff".to_owned()];
    if let Some(ref git_ref) = query.git_ref {
        if let Err(e) = validate_git_value(git_ref, "ref") {
            return fail(e);
        }
        args.push(git_ref.clone());
    }
    if let Some(ref path) = query.path {
        if let Err(e) = validate_git_value(path, "path") {
            return fail(e);
        }
        args.push("--".to_owned());
        args.push(path.clone());
    }
    let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
    match container_git(&state, &workspace, &arg_refs).await {
        Ok(out) => ok_json(serde_json::json!({ "diff": out })),
        Err(e) => fail(e),
    }
}

/// `GET /workspaces/:id/git/worktrees`
pub async fn worktrees(
    State(state): State<Arc<AppState>>,
    Path(workspace_id): Path<String>,
) -> Response {
    let workspace = get_workspace!(state, workspace_id);
    match container_git(&state, &workspace, &["worktree", "list", "--porcelain"]).await {
        Ok(out) => ok_json(serde_json::json!({ "raw": out })),
        Err(e) => fail(e),
    }
}

/// `POST /git/credentials` — called by the credential helper installed in
/// the devcontainer, authenticated with the node's own callback bearer.
/// The credential fill is proxied from the Control Plane.
pub async fn credentials(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let presented = auth::bearer(headers.get("authorization").and_then(|v| v.to_str().ok()));
    let expected = state.callback_token.read().clone();
    let authorized = matches!(
        (presented, expected.as_deref()),
        (Some(presented), Some(expected)) if auth::constant_time_eq(presented, expected)
    );
    if !authorized {
        return ApiError::Unauthorized.to_http_response("invalid callback token").into_response();
    }

    let Some(workspace_id) = state.node_workspace_id.read().clone() else {
        return ApiError::Conflict
            .to_http_response("node has no bootstrapped workspace")
            .into_response();
    };
    let Some(token) = expected else {
        return ApiError::Unauthorized.to_http_response("invalid callback token").into_response();
    };

    let url = format!(
        "{}/api/workspaces/{workspace_id}/git-credentials",
        state.config.control_plane_base()
    );
    let client = reqwest::Client::new();
    let result = client
        .post(&url)
        .bearer_auth(&token)
        .header("content-type", "text/plain")
        .body(body)
        .send()
        .await;

    match result {
        Ok(resp) if resp.status().is_success() => {
            let fill: serde_json::Value = resp.json().await.unwrap_or_default();
            let username = fill.get("username").and_then(|v| v.as_str()).unwrap_or_default();
            let password = fill.get("password").and_then(|v| v.as_str()).unwrap_or_default();
            // git credential fill format.
            format!("username={username}\npassword={password}\n").into_response()
        }
        Ok(resp) => ApiError::UpstreamError
            .to_http_response(format!("control plane returned {}", resp.status()))
            .into_response(),
        Err(e) => ApiError::UpstreamError.to_http_response(e.to_string()).into_response(),
    }
}

#[cfg(test)]
#[path = "git_tests.rs"]
mod tests;
