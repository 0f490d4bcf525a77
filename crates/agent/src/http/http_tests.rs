// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn workspace_id_extraction() {
    assert_eq!(workspace_path_id("/workspaces/w1/stop"), Some("w1"));
    assert_eq!(workspace_path_id("/workspaces/w1"), Some("w1"));
    assert_eq!(workspace_path_id("/workspaces/w1/agent-sessions/s1/start"), Some("w1"));
    assert_eq!(workspace_path_id("/workspaces"), None);
    assert_eq!(workspace_path_id("/workspaces/"), None);
    assert_eq!(workspace_path_id("/logs"), None);
    assert_eq!(workspace_path_id("/system"), None);
}

#[test]
fn routing_headers_are_fixed_names() {
    assert_eq!(NODE_ID_HEADER, "x-sam-node-id");
    assert_eq!(WORKSPACE_ID_HEADER, "x-sam-workspace-id");
}
