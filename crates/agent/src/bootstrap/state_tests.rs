// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn missing_file_is_fresh_state() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let state = BootstrapState::load(&dir.path().join("bootstrap-state.json"))?;
    assert!(!state.redeemed);
    assert!(!state.is_complete());
    assert!(state.callback_token.is_none());
    Ok(())
}

#[test]
fn save_then_load_round_trips() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("bootstrap-state.json");
    let state = BootstrapState {
        redeemed: true,
        repo_cloned: true,
        workspace_id: Some("w1".to_owned()),
        callback_token: Some("cb".to_owned()),
        ..Default::default()
    };
    state.save(&path)?;

    let loaded = BootstrapState::load(&path)?;
    assert!(loaded.redeemed);
    assert!(loaded.repo_cloned);
    assert!(!loaded.devcontainer_ready);
    assert_eq!(loaded.workspace_id.as_deref(), Some("w1"));
    assert_eq!(loaded.callback_token.as_deref(), Some("cb"));
    Ok(())
}

#[test]
fn save_creates_missing_parent_dirs() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("nested/deeper/bootstrap-state.json");
    BootstrapState::default().save(&path)?;
    assert!(path.exists());
    Ok(())
}

#[test]
fn save_replaces_not_appends() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("bootstrap-state.json");
    let mut state = BootstrapState { redeemed: true, ..Default::default() };
    state.save(&path)?;
    state.repo_cloned = true;
    state.save(&path)?;

    let loaded = BootstrapState::load(&path)?;
    assert!(loaded.redeemed && loaded.repo_cloned);
    // The file holds exactly one JSON document.
    let contents = std::fs::read_to_string(&path)?;
    assert!(serde_json::from_str::<BootstrapState>(&contents).is_ok());
    Ok(())
}

#[test]
fn corrupt_file_is_an_error_not_a_reset() {
    let dir = match tempfile::tempdir() {
        Ok(d) => d,
        Err(_) => return,
    };
    let path = dir.path().join("bootstrap-state.json");
    let _ = std::fs::write(&path, "not json{");
    assert!(BootstrapState::load(&path).is_err());
}

#[test]
fn completion_requires_every_flag() {
    let mut state = BootstrapState {
        redeemed: true,
        repo_cloned: true,
        devcontainer_ready: true,
        credential_helper_installed: true,
        ready_reported: false,
        ..Default::default()
    };
    assert!(!state.is_complete());
    state.ready_reported = true;
    assert!(state.is_complete());
}
