// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Node-level handlers: liveness, system facts, event log.

use std::sync::Arc;

use axum::extract::State;
use axum::response::Response;

use crate::report::heartbeat;
use crate::state::AppState;

use super::ok_json;

/// `GET /health` — unauthenticated liveness probe.
pub async fn health(State(state): State<Arc<AppState>>) -> Response {
    ok_json(serde_json::json!({
        "status": "running",
        "nodeId": state.config.node_id,
        "uptimeSecs": state.started_at.elapsed().as_secs(),
        "workspaces": state.workspaces.list().len(),
    }))
}

/// `GET /system` — CPU, memory, disk, containers, versions.
pub async fn info(State(state): State<Arc<AppState>>) -> Response {
    let (system, disks) = tokio::task::spawn_blocking(heartbeat::collect_system_facts)
        .await
        .unwrap_or_else(|_| (serde_json::json!({}), serde_json::json!([])));
    let containers = heartbeat::docker_containers().await;
    let docker_version = version_of("docker", &["--version"]).await;
    let git_version = version_of("git", &["--version"]).await;

    ok_json(serde_json::json!({
        "nodeId": state.config.node_id,
        "agentVersion": env!("CARGO_PKG_VERSION"),
        "uptimeSecs": state.started_at.elapsed().as_secs(),
        "system": system,
        "disks": disks,
        "docker": { "version": docker_version, "containers": containers },
        "git": { "version": git_version },
    }))
}

/// `GET /events` — the node-level event ring.
pub async fn events(State(state): State<Arc<AppState>>) -> Response {
    ok_json(state.workspaces.node_events.snapshot())
}

async fn version_of(program: &str, args: &[&str]) -> Option<String> {
    let output = tokio::process::Command::new(program).args(args).output().await.ok()?;
    output
        .status
        .success()
        .then(|| String::from_utf8_lossy(&output.stdout).trim().to_owned())
}
