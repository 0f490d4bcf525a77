// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::Path;

use super::*;

fn features() -> Option<&'static str> {
    Some(r#"{"ghcr.io/devcontainers/features/node:1":{}}"#)
}

#[test]
fn detects_canonical_config() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    assert!(!has_devcontainer_config(dir.path()));
    std::fs::create_dir_all(dir.path().join(".devcontainer"))?;
    std::fs::write(dir.path().join(".devcontainer/devcontainer.json"), "{}")?;
    assert!(has_devcontainer_config(dir.path()));
    Ok(())
}

#[test]
fn detects_top_level_config() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    std::fs::write(dir.path().join(".devcontainer.json"), "{}")?;
    assert!(has_devcontainer_config(dir.path()));
    Ok(())
}

#[test]
fn detects_any_json_in_devcontainer_dir() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    std::fs::create_dir_all(dir.path().join(".devcontainer"))?;
    std::fs::write(dir.path().join(".devcontainer/custom.json"), "{}")?;
    assert!(has_devcontainer_config(dir.path()));
    Ok(())
}

#[test]
fn non_json_files_do_not_count() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    std::fs::create_dir_all(dir.path().join(".devcontainer"))?;
    std::fs::write(dir.path().join(".devcontainer/README.md"), "hi")?;
    assert!(!has_devcontainer_config(dir.path()));
    Ok(())
}

#[test]
fn features_are_never_injected_into_repo_config() {
    // A repo with its own devcontainer config builds without
    // --additional-features, even when features are configured.
    let args = build_args(Path::new("/workspace/repo"), features(), false);
    assert!(!args.iter().any(|a| a == "--additional-features"), "args: {args:?}");
}

#[test]
fn features_are_injected_for_synthesized_config() {
    let args = build_args(Path::new("/workspace/repo"), features(), true);
    let pos = args.iter().position(|a| a == "--additional-features");
    assert!(pos.is_some_and(|i| args[i + 1].contains("node")), "args: {args:?}");
}

#[test]
fn workspace_folder_is_a_single_argv_entry() {
    let args = build_args(Path::new("/workspace/my repo"), None, true);
    assert_eq!(args[1], "--workspace-folder=/workspace/my repo");
}
