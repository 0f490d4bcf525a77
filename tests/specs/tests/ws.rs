// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket gateway tests over a live listener.

use std::time::Duration;

use futures_util::StreamExt;
use sam_specs::TestAgent;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite;

fn ws_url(agent: &TestAgent, path_and_query: &str) -> String {
    format!("{}{}", agent.base_url.replace("http://", "ws://"), path_and_query)
}

#[tokio::test]
async fn log_follow_upgrade_requires_a_valid_token() -> anyhow::Result<()> {
    let agent = TestAgent::start().await?;

    let err = connect_async(ws_url(&agent, "/logs/ws?token=bogus")).await;
    match err {
        Err(tungstenite::Error::Http(resp)) => assert_eq!(resp.status(), 401),
        other => anyhow::bail!("expected HTTP 401 rejection, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn log_follow_upgrade_succeeds_with_node_token() -> anyhow::Result<()> {
    let agent = TestAgent::start().await?;
    let token = agent.node_token()?;

    let (mut socket, resp) =
        connect_async(ws_url(&agent, &format!("/logs/ws?token={token}&source=cloud-init")))
            .await?;
    assert_eq!(resp.status(), 101);

    // No cloud-init files exist in the test environment, so nothing
    // arrives; the connection simply stays open until we close it.
    let _ = tokio::time::timeout(Duration::from_millis(300), socket.next()).await;
    socket.close(None).await?;
    Ok(())
}

#[tokio::test]
async fn invalid_filter_is_rejected_before_upgrade() -> anyhow::Result<()> {
    let agent = TestAgent::start().await?;
    let token = agent.node_token()?;

    let err = connect_async(ws_url(
        &agent,
        &format!("/logs/ws?token={token}&source=docker&container=bad%3Bname"),
    ))
    .await;
    match err {
        Err(tungstenite::Error::Http(resp)) => assert_eq!(resp.status(), 400),
        other => anyhow::bail!("expected HTTP 400 rejection, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn pty_ws_for_unknown_session_is_rejected() -> anyhow::Result<()> {
    let agent = TestAgent::start().await?;
    agent.state.workspaces.register_ready(
        "w-ws",
        "https://host/org/demo.git",
        None,
        std::path::PathBuf::from("/tmp/demo"),
    );
    let token = agent.workspace_token("w-ws")?;

    let err = connect_async(ws_url(
        &agent,
        &format!("/workspaces/w-ws/terminals/no-such-session/ws?token={token}"),
    ))
    .await;
    match err {
        Err(tungstenite::Error::Http(resp)) => assert_eq!(resp.status(), 404),
        other => anyhow::bail!("expected HTTP 404 rejection, got {other:?}"),
    }
    Ok(())
}
