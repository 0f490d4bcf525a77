// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end surface tests: a live router, real JWKS validation against
//! a fake key server, and the management routes.

use sam_specs::TestAgent;

#[tokio::test]
async fn health_requires_no_auth() -> anyhow::Result<()> {
    let agent = TestAgent::start().await?;
    let resp = reqwest::get(agent.url("/health")).await?;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await?;
    assert_eq!(body["status"], "running");
    assert_eq!(body["nodeId"], sam_specs::NODE_ID);
    Ok(())
}

#[tokio::test]
async fn management_routes_reject_missing_token() -> anyhow::Result<()> {
    let agent = TestAgent::start().await?;
    let client = reqwest::Client::new();
    let resp = client.get(agent.url("/workspaces")).send().await?;
    assert_eq!(resp.status(), 401);
    let body: serde_json::Value = resp.json().await?;
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
    Ok(())
}

#[tokio::test]
async fn garbage_token_is_rejected() -> anyhow::Result<()> {
    let agent = TestAgent::start().await?;
    let client = reqwest::Client::new();
    let resp = client
        .get(agent.url("/workspaces"))
        .bearer_auth("not-a-jwt")
        .send()
        .await?;
    assert_eq!(resp.status(), 401);
    Ok(())
}

#[tokio::test]
async fn wrong_audience_is_rejected() -> anyhow::Result<()> {
    let agent = TestAgent::start().await?;
    let client = reqwest::Client::new();
    let resp = client
        .get(agent.url("/workspaces"))
        .bearer_auth(agent.wrong_audience_token()?)
        .send()
        .await?;
    assert_eq!(resp.status(), 401);
    Ok(())
}

#[tokio::test]
async fn node_token_lists_workspaces() -> anyhow::Result<()> {
    let agent = TestAgent::start().await?;
    let client = reqwest::Client::new();
    let resp = client
        .get(agent.url("/workspaces"))
        .bearer_auth(agent.node_token()?)
        .send()
        .await?;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await?;
    assert_eq!(body, serde_json::json!([]));
    Ok(())
}

#[tokio::test]
async fn workspace_token_cannot_cross_workspaces() -> anyhow::Result<()> {
    let agent = TestAgent::start().await?;
    let client = reqwest::Client::new();
    let resp = client
        .get(agent.url("/workspaces/other/events"))
        .bearer_auth(agent.workspace_token("mine")?)
        .send()
        .await?;
    assert_eq!(resp.status(), 403);
    Ok(())
}

#[tokio::test]
async fn workspace_create_returns_creating_state() -> anyhow::Result<()> {
    let agent = TestAgent::start().await?;
    let client = reqwest::Client::new();
    let resp = client
        .post(agent.url("/workspaces"))
        .bearer_auth(agent.node_token()?)
        .json(&serde_json::json!({
            "repository": "https://unreachable.invalid/org/demo.git",
            "displayName": "Demo",
        }))
        .send()
        .await?;
    assert_eq!(resp.status(), 201);
    let body: serde_json::Value = resp.json().await?;
    assert_eq!(body["state"], "creating");
    assert_eq!(body["displayName"], "Demo");
    let workspace_id = body["workspaceId"].as_str().unwrap_or_default().to_owned();
    assert!(!workspace_id.is_empty());

    // The workspace-scoped token now reads its own events.
    let resp = client
        .get(agent.url(&format!("/workspaces/{workspace_id}/events")))
        .bearer_auth(agent.workspace_token(&workspace_id)?)
        .send()
        .await?;
    assert_eq!(resp.status(), 200);
    Ok(())
}

#[tokio::test]
async fn unknown_workspace_is_404() -> anyhow::Result<()> {
    let agent = TestAgent::start().await?;
    let client = reqwest::Client::new();
    let resp = client
        .get(agent.url("/workspaces/nope/terminals"))
        .bearer_auth(agent.workspace_token("nope")?)
        .send()
        .await?;
    assert_eq!(resp.status(), 404);
    let body: serde_json::Value = resp.json().await?;
    assert_eq!(body["error"]["code"], "NOT_FOUND");
    Ok(())
}

#[tokio::test]
async fn unknown_route_is_404() -> anyhow::Result<()> {
    let agent = TestAgent::start().await?;
    let client = reqwest::Client::new();
    let resp = client
        .get(agent.url("/definitely-not-a-route"))
        .bearer_auth(agent.node_token()?)
        .send()
        .await?;
    assert_eq!(resp.status(), 404);
    Ok(())
}

#[tokio::test]
async fn invalid_log_filter_is_rejected() -> anyhow::Result<()> {
    let agent = TestAgent::start().await?;
    let client = reqwest::Client::new();
    let resp = client
        .get(agent.url("/logs?source=kernel"))
        .bearer_auth(agent.node_token()?)
        .send()
        .await?;
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = resp.json().await?;
    assert_eq!(body["error"]["code"], "INVALID_FILTER");
    Ok(())
}

#[tokio::test]
async fn shell_metacharacters_never_reach_a_subprocess() -> anyhow::Result<()> {
    let agent = TestAgent::start().await?;
    let client = reqwest::Client::new();
    for query in [
        "/logs?source=docker&container=c;%20rm%20-rf%20/",
        "/logs?since=$(reboot)",
        "/logs?cursor=s=abc%60reboot%60",
        "/logs?limit=0",
    ] {
        let resp = client
            .get(agent.url(query))
            .bearer_auth(agent.node_token()?)
            .send()
            .await?;
        assert_eq!(resp.status(), 400, "query {query} was not rejected");
    }
    Ok(())
}

#[tokio::test]
async fn agent_session_register_validates_kind() -> anyhow::Result<()> {
    let agent = TestAgent::start().await?;
    let client = reqwest::Client::new();
    // A ready workspace that needs no provisioning.
    agent.state.workspaces.register_ready(
        "w-reg",
        "https://host/org/demo.git",
        None,
        std::path::PathBuf::from("/tmp/demo"),
    );

    let resp = client
        .post(agent.url("/workspaces/w-reg/agent-sessions"))
        .bearer_auth(agent.workspace_token("w-reg")?)
        .json(&serde_json::json!({ "agentType": "skynet" }))
        .send()
        .await?;
    assert_eq!(resp.status(), 400);

    let resp = client
        .post(agent.url("/workspaces/w-reg/agent-sessions"))
        .bearer_auth(agent.workspace_token("w-reg")?)
        .json(&serde_json::json!({ "agentType": "claude-code" }))
        .send()
        .await?;
    assert_eq!(resp.status(), 201);
    let body: serde_json::Value = resp.json().await?;
    assert_eq!(body["agentType"], "claude-code");
    assert_eq!(body["status"], "starting");
    Ok(())
}

#[tokio::test]
async fn registered_session_appears_in_list() -> anyhow::Result<()> {
    let agent = TestAgent::start().await?;
    let client = reqwest::Client::new();
    agent.state.workspaces.register_ready(
        "w-list",
        "https://host/org/demo.git",
        None,
        std::path::PathBuf::from("/tmp/demo"),
    );
    client
        .post(agent.url("/workspaces/w-list/agent-sessions"))
        .bearer_auth(agent.workspace_token("w-list")?)
        .json(&serde_json::json!({ "agentType": "gemini-cli", "sessionId": "s9" }))
        .send()
        .await?
        .error_for_status()?;

    let resp = client
        .get(agent.url("/workspaces/w-list/agent-sessions"))
        .bearer_auth(agent.workspace_token("w-list")?)
        .send()
        .await?;
    let body: serde_json::Value = resp.json().await?;
    let sessions = body.as_array().cloned().unwrap_or_default();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0]["sessionId"], "s9");
    assert_eq!(sessions[0]["agentType"], "gemini-cli");
    Ok(())
}

#[tokio::test]
async fn git_credentials_requires_callback_token() -> anyhow::Result<()> {
    let agent = TestAgent::start().await?;
    let client = reqwest::Client::new();

    // No callback token on the node yet: everything is rejected.
    let resp = client
        .post(agent.url("/git/credentials"))
        .bearer_auth("anything")
        .body("protocol=https\nhost=github.com\n")
        .send()
        .await?;
    assert_eq!(resp.status(), 401);

    // With a callback token, only an exact match is accepted.
    *agent.state.callback_token.write() = Some("cb-secret".to_owned());
    let resp = client
        .post(agent.url("/git/credentials"))
        .bearer_auth("wrong")
        .body("protocol=https\nhost=github.com\n")
        .send()
        .await?;
    assert_eq!(resp.status(), 401);
    Ok(())
}

#[tokio::test]
async fn system_info_reports_facts() -> anyhow::Result<()> {
    let agent = TestAgent::start().await?;
    let client = reqwest::Client::new();
    let resp = client
        .get(agent.url("/system"))
        .bearer_auth(agent.node_token()?)
        .send()
        .await?;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await?;
    assert_eq!(body["agentVersion"], env!("CARGO_PKG_VERSION"));
    assert!(body["system"]["memory"]["totalBytes"].is_number());
    Ok(())
}
