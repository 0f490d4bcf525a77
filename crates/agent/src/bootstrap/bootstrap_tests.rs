// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use parking_lot::RwLock;
use serde_json::json;
use wiremock::matchers::{bearer_token, body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::*;
use crate::container::ContainerRuntime;

fn bootstrap_for(server_url: &str, state_dir: &std::path::Path) -> anyhow::Result<Bootstrap> {
    let state_dir_arg = state_dir.to_string_lossy().into_owned();
    let config = crate::config::Config::parse_from([
        "sam-agent",
        "--control-plane-url",
        server_url,
        "--node-id",
        "n1",
        "--bootstrap-token",
        "T",
        "--repository",
        "https://host/org/repo.git",
        "--state-dir",
        state_dir_arg.as_str(),
        "--msg-retry-initial-ms",
        "10",
        "--msg-retry-max-ms",
        "40",
    ]);
    let containers =
        Arc::new(ContainerRuntime::new("devcontainer.local_folder".into(), Duration::from_secs(30)));
    let token: CallbackToken = Arc::new(RwLock::new(None));
    Bootstrap::new(config, Reporters::disabled(), containers, token)
}

#[tokio::test]
async fn redeem_persists_workspace_and_token() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/bootstrap/T"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "workspaceId": "w1",
            "callbackToken": "cb-1",
            "controlPlaneUrl": server.uri(),
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir()?;
    let mut bootstrap = bootstrap_for(&server.uri(), dir.path())?;
    bootstrap.redeem().await?;

    assert!(bootstrap.state.redeemed);
    assert_eq!(bootstrap.state.workspace_id.as_deref(), Some("w1"));
    assert_eq!(*bootstrap.callback_token.read(), Some("cb-1".to_owned()));

    // The flags survive on disk for the next process start.
    let reloaded = BootstrapState::load(&dir.path().join("bootstrap-state.json"))?;
    assert!(reloaded.redeemed);
    assert_eq!(reloaded.callback_token.as_deref(), Some("cb-1"));
    server.verify().await;
    Ok(())
}

#[tokio::test]
async fn redeem_404_is_permanent() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/bootstrap/T"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir()?;
    let mut bootstrap = bootstrap_for(&server.uri(), dir.path())?;
    let err = match bootstrap.redeem().await {
        Err(e) => e.to_string(),
        Ok(()) => anyhow::bail!("redeem unexpectedly succeeded"),
    };
    assert!(err.contains("404"), "unexpected error: {err}");
    assert!(!bootstrap.state.redeemed);
    Ok(())
}

#[tokio::test]
async fn ready_callback_retries_until_accepted() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/workspaces/w1/ready"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/workspaces/w1/ready"))
        .and(bearer_token("cb-1"))
        .and(body_json(json!({ "status": "running" })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir()?;
    let mut bootstrap = bootstrap_for(&server.uri(), dir.path())?;
    bootstrap.state.workspace_id = Some("w1".to_owned());
    bootstrap.state.callback_token = Some("cb-1".to_owned());

    bootstrap.report_ready().await?;
    server.verify().await;
    Ok(())
}

#[tokio::test]
async fn provisioning_failure_is_reported() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/workspaces/w1/provisioning-failed"))
        .and(body_json(json!({ "error": "devcontainer build failed" })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir()?;
    let mut bootstrap = bootstrap_for(&server.uri(), dir.path())?;
    bootstrap.state.workspace_id = Some("w1".to_owned());
    bootstrap.state.callback_token = Some("cb-1".to_owned());

    bootstrap.report_provisioning_failed("devcontainer build failed").await;
    server.verify().await;
    Ok(())
}

#[tokio::test]
async fn completed_state_short_circuits_run() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    // No stage endpoint may be called when every flag is already set.
    Mock::given(method("POST")).respond_with(ResponseTemplate::new(500)).expect(0).mount(&server).await;

    let dir = tempfile::tempdir()?;
    let state = BootstrapState {
        redeemed: true,
        repo_cloned: true,
        devcontainer_ready: true,
        credential_helper_installed: true,
        ready_reported: true,
        workspace_id: Some("w1".to_owned()),
        callback_token: Some("cb-1".to_owned()),
    };
    state.save(&dir.path().join("bootstrap-state.json"))?;

    let bootstrap = bootstrap_for(&server.uri(), dir.path())?;
    let outcome = bootstrap.run().await?;
    assert_eq!(outcome.workspace_id.as_deref(), Some("w1"));
    server.verify().await;
    Ok(())
}

#[tokio::test]
async fn missing_token_on_fresh_node_skips_bootstrap() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST")).respond_with(ResponseTemplate::new(500)).expect(0).mount(&server).await;

    let dir = tempfile::tempdir()?;
    let server_uri = server.uri();
    let state_dir_arg = dir.path().to_string_lossy().into_owned();
    let config = crate::config::Config::parse_from([
        "sam-agent",
        "--control-plane-url",
        server_uri.as_str(),
        "--node-id",
        "n1",
        "--state-dir",
        state_dir_arg.as_str(),
    ]);
    let containers =
        Arc::new(ContainerRuntime::new("devcontainer.local_folder".into(), Duration::from_secs(30)));
    let token: CallbackToken = Arc::new(RwLock::new(None));
    let bootstrap = Bootstrap::new(config, Reporters::disabled(), containers, token)?;

    bootstrap.run().await?;
    server.verify().await;
    Ok(())
}
