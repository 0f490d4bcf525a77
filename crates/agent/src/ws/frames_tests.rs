// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn session_state_wire_shape() -> anyhow::Result<()> {
    let frame = ServerFrame::SessionState {
        status: "ready".to_owned(),
        agent_type: "claude-code".to_owned(),
        replay_count: 5,
    };
    let json: serde_json::Value = serde_json::to_value(&frame)?;
    assert_eq!(json["type"], "session_state");
    assert_eq!(json["status"], "ready");
    assert_eq!(json["agentType"], "claude-code");
    assert_eq!(json["replayCount"], 5);
    Ok(())
}

#[test]
fn marker_frames_have_only_a_type() -> anyhow::Result<()> {
    let json = serde_json::to_string(&ServerFrame::SessionReplayComplete)?;
    assert_eq!(json, r#"{"type":"session_replay_complete"}"#);
    let json = serde_json::to_string(&ServerFrame::SessionPromptDone)?;
    assert_eq!(json, r#"{"type":"session_prompt_done"}"#);
    Ok(())
}

#[test]
fn agent_status_omits_absent_error() -> anyhow::Result<()> {
    let frame = ServerFrame::AgentStatus {
        status: "restarting".to_owned(),
        agent_type: "gemini-cli".to_owned(),
        error: None,
    };
    let json = serde_json::to_string(&frame)?;
    assert!(!json.contains("error"));
    Ok(())
}

#[test]
fn gateway_error_has_no_type_tag() -> anyhow::Result<()> {
    let err = GatewayError::new(crate::error::ApiError::Busy, "prompt in progress");
    let json: serde_json::Value = serde_json::to_value(&err)?;
    assert_eq!(json["error"], "BUSY");
    assert_eq!(json["message"], "prompt in progress");
    assert!(json.get("type").is_none());
    Ok(())
}

#[test]
fn pty_client_frames_parse() -> anyhow::Result<()> {
    let input: PtyClientFrame = serde_json::from_str(r#"{"type":"input","data":"aGk="}"#)?;
    assert!(matches!(input, PtyClientFrame::Input { .. }));
    let resize: PtyClientFrame =
        serde_json::from_str(r#"{"type":"resize","cols":120,"rows":40}"#)?;
    assert!(matches!(resize, PtyClientFrame::Resize { cols: 120, rows: 40 }));
    Ok(())
}
