// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Node agent: the long-lived service owning a compute node's runtime —
//! devcontainer provisioning, workspace hosting, PTY and ACP session
//! multiplexing, log streaming, and durable reporting to the Control
//! Plane.

pub mod acp;
pub mod bootstrap;
pub mod config;
pub mod container;
pub mod error;
pub mod http;
pub mod logs;
pub mod pty;
pub mod report;
pub mod state;
pub mod store;
pub mod workspace;
pub mod ws;

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::report::heartbeat::HeartbeatReporter;
use crate::state::AppState;

/// Run the agent until shutdown.
pub async fn run(config: config::Config) -> anyhow::Result<()> {
    config.validate()?;

    let store = Arc::new(store::Store::open(&config.store_path())?);
    let state = AppState::new(config, store);

    let addr = format!("{}:{}", state.config.host, state.config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(addr, node_id = %state.config.node_id, "node agent listening");

    // Bootstrap converges in the background while the server is already
    // accepting; the credential helper and ready callback need the HTTP
    // surface up.
    spawn_bootstrap(Arc::clone(&state));

    // Resurrect persistent ACP sessions before traffic arrives for them.
    resurrect_acp_sessions(&state);

    let heartbeat = HeartbeatReporter::new(
        state.config.control_plane_base().to_owned(),
        state.config.node_id.clone(),
        state.config.heartbeat_interval(),
        Arc::clone(&state.callback_token),
    );
    let heartbeat_task = heartbeat.spawn(state.shutdown.clone());

    let router = http::build_router(Arc::clone(&state));
    let shutdown = state.shutdown.clone();
    tokio::spawn(wait_for_signal(shutdown.clone()));

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown.clone().cancelled_owned())
        .await?;

    // Ordered teardown: ACP sessions (cancel + grace + kill) and PTYs
    // (SIGHUP + grace), then the devcontainers, then the reporters drain,
    // then the store closes on drop.
    tracing::info!("shutting down");
    state.workspaces.shutdown_node().await;
    let _ = heartbeat_task.await;
    state.reporters.shutdown().await;
    Ok(())
}

fn spawn_bootstrap(state: Arc<AppState>) {
    let config = state.config.clone();
    tokio::spawn(async move {
        let bootstrap = match bootstrap::Bootstrap::new(
            config,
            state.reporters.clone(),
            Arc::clone(&state.containers),
            Arc::clone(&state.callback_token),
        ) {
            Ok(bootstrap) => bootstrap,
            Err(e) => {
                tracing::error!(err = %e, "bootstrap could not be constructed");
                return;
            }
        };
        match bootstrap.run().await {
            Ok(outcome) => {
                if let Some(workspace_id) = outcome.workspace_id {
                    *state.node_workspace_id.write() = Some(workspace_id.clone());
                    if let (Some(dir), Some(repo)) =
                        (outcome.workspace_dir, state.config.repository.clone())
                    {
                        state.workspaces.register_ready(
                            &workspace_id,
                            &repo,
                            state.config.branch.as_deref(),
                            dir,
                        );
                    }
                }
            }
            Err(e) => tracing::error!(err = %e, "bootstrap failed"),
        }
    });
}

fn resurrect_acp_sessions(state: &Arc<AppState>) {
    let records = match state.store.persistent_acp_sessions() {
        Ok(records) => records,
        Err(e) => {
            tracing::warn!(err = %e, "could not load persistent agent sessions");
            return;
        }
    };
    for record in records {
        let Ok(workspace) = state.workspaces.get(&record.workspace_id) else {
            // The workspace will resurrect its sessions when registered.
            continue;
        };
        match workspace.acp.resurrect(&record) {
            Ok(session) => {
                tracing::info!(session_id = %session.id, "agent session resurrected");
            }
            Err(e) => tracing::warn!(
                session_id = %record.session_id,
                err = %e,
                "agent session resurrection failed"
            ),
        }
    }
}

async fn wait_for_signal(shutdown: CancellationToken) {
    let ctrl_c = tokio::signal::ctrl_c();
    let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
    {
        Ok(sigterm) => sigterm,
        Err(e) => {
            tracing::warn!(err = %e, "sigterm handler unavailable");
            let _ = ctrl_c.await;
            shutdown.cancel();
            return;
        }
    };
    tokio::select! {
        _ = ctrl_c => {}
        _ = sigterm.recv() => {}
    }
    shutdown.cancel();
}
