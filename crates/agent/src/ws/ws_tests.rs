// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde_json::json;

use super::*;

#[test]
fn prompt_text_concatenates_blocks() {
    let frame = json!({
        "jsonrpc": "2.0",
        "id": 9,
        "method": "session/prompt",
        "params": {"prompt": [
            {"type": "text", "text": "fix the "},
            {"type": "text", "text": "tests"},
        ]}
    });
    assert_eq!(prompt_text(&frame).as_deref(), Some("fix the tests"));
}

#[test]
fn prompt_text_ignores_non_text_blocks() {
    let frame = json!({
        "method": "session/prompt",
        "params": {"prompt": [
            {"type": "image", "data": "..."},
            {"type": "text", "text": "caption"},
        ]}
    });
    assert_eq!(prompt_text(&frame).as_deref(), Some("caption"));
}

#[test]
fn prompt_text_absent_params() {
    assert_eq!(prompt_text(&json!({"method": "session/prompt"})), None);
}

#[test]
fn ws_query_parses_takeover_and_agent_type() -> anyhow::Result<()> {
    let query: WsQuery =
        serde_urlencoded_like(&[("token", "t"), ("takeover", "true"), ("agentType", "codex")])?;
    assert_eq!(query.token.as_deref(), Some("t"));
    assert!(query.takeover);
    assert_eq!(query.agent_type.as_deref(), Some("codex"));
    Ok(())
}

/// Build a WsQuery through serde the way axum's Query extractor does.
fn serde_urlencoded_like(pairs: &[(&str, &str)]) -> anyhow::Result<WsQuery> {
    let value = serde_json::Map::from_iter(pairs.iter().map(|(k, v)| {
        let value = if *v == "true" {
            serde_json::Value::Bool(true)
        } else {
            serde_json::Value::String((*v).to_owned())
        };
        ((*k).to_owned(), value)
    }));
    Ok(serde_json::from_value(serde_json::Value::Object(value))?)
}
