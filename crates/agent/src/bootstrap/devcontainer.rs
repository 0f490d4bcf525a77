// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Devcontainer build via the devcontainer CLI.
//!
//! Repositories that ship their own devcontainer configuration are built
//! exactly as-is; `--additional-features` is injected only for the
//! synthesized default config, so repo-defined environments are never
//! altered.

use std::path::Path;
use std::time::Duration;

use tokio::process::Command;

/// Does the repository define any devcontainer configuration?
///
/// Checked paths: `.devcontainer/devcontainer.json`, `.devcontainer.json`,
/// or any `*.json` inside a `.devcontainer/` directory.
pub fn has_devcontainer_config(dir: &Path) -> bool {
    if dir.join(".devcontainer/devcontainer.json").exists() {
        return true;
    }
    if dir.join(".devcontainer.json").exists() {
        return true;
    }
    let nested = dir.join(".devcontainer");
    if let Ok(entries) = std::fs::read_dir(&nested) {
        for entry in entries.flatten() {
            if entry.path().extension().is_some_and(|ext| ext == "json") {
                return true;
            }
        }
    }
    false
}

/// Argv for `devcontainer up`. Features are passed only when the config
/// was synthesized by us.
pub fn build_args(
    workspace_dir: &Path,
    features: Option<&str>,
    synthesized: bool,
) -> Vec<String> {
    let mut args = vec![
        "up".to_owned(),
        format!("--workspace-folder={}", workspace_dir.display()),
    ];
    if synthesized {
        if let Some(features) = features {
            args.push("--additional-features".to_owned());
            args.push(features.to_owned());
        }
    }
    args
}

/// Build the workspace's devcontainer, synthesizing a default config when
/// the repository has none.
pub async fn ensure_built(
    workspace_dir: &Path,
    default_image: &str,
    features: Option<&str>,
    timeout: Duration,
) -> anyhow::Result<()> {
    let synthesized = !has_devcontainer_config(workspace_dir);
    if synthesized {
        write_default_config(workspace_dir, default_image).await?;
    }

    let args = build_args(workspace_dir, features, synthesized);
    tracing::info!(dir = %workspace_dir.display(), synthesized, "building devcontainer");
    let output = tokio::time::timeout(
        timeout,
        Command::new("devcontainer").args(&args).output(),
    )
    .await
    .map_err(|_| anyhow::anyhow!("devcontainer build timed out after {timeout:?}"))??;

    if !output.status.success() {
        anyhow::bail!(
            "devcontainer up failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(())
}

async fn write_default_config(workspace_dir: &Path, image: &str) -> anyhow::Result<()> {
    let dir = workspace_dir.join(".devcontainer");
    tokio::fs::create_dir_all(&dir).await?;
    let config = serde_json::json!({
        "name": "workspace",
        "image": image,
    });
    tokio::fs::write(dir.join("devcontainer.json"), serde_json::to_vec_pretty(&config)?).await?;
    Ok(())
}

#[cfg(test)]
#[path = "devcontainer_tests.rs"]
mod tests;
