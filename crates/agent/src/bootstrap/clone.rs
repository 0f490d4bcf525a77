// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Repository checkout for bootstrap and workspace creation.

use std::path::Path;

use tokio::process::Command;

/// Directory-safe name for a repository URL: trim `.git`, take the path
/// basename, and map anything outside `[A-Za-z0-9_.-]` to `-`.
pub fn safe_repo_name(url: &str) -> String {
    let trimmed = url.trim_end_matches('/').trim_end_matches(".git");
    let base = trimmed.rsplit(['/', ':']).next().unwrap_or(trimmed);
    let mapped: String = base
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') { c } else { '-' })
        .collect();
    let cleaned = mapped.trim_matches('-');
    if cleaned.is_empty() {
        "repo".to_owned()
    } else {
        cleaned.to_owned()
    }
}

/// Clone `repo` into `dest`, skipping when a checkout matching the branch
/// is already present.
pub async fn clone_repo(repo: &str, branch: Option<&str>, dest: &Path) -> anyhow::Result<()> {
    if dest.join(".git").exists() {
        if let Some(branch) = branch {
            let current = current_branch(dest).await?;
            if current == branch {
                tracing::info!(dest = %dest.display(), branch, "checkout already present");
                return Ok(());
            }
            tracing::info!(dest = %dest.display(), from = %current, to = branch, "switching branch");
            run_git(&["-C", &dest.to_string_lossy(), "fetch", "origin", branch]).await?;
            run_git(&["-C", &dest.to_string_lossy(), "checkout", branch]).await?;
            return Ok(());
        }
        tracing::info!(dest = %dest.display(), "checkout already present");
        return Ok(());
    }

    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let dest_str = dest.to_string_lossy().into_owned();
    let mut args = vec!["clone"];
    if let Some(branch) = branch {
        args.push("--branch");
        args.push(branch);
    }
    args.push(repo);
    args.push(&dest_str);
    run_git(&args).await
}

async fn current_branch(dir: &Path) -> anyhow::Result<String> {
    let dir_arg = dir.to_string_lossy().into_owned();
    let output = Command::new("git")
        .args(["-C", dir_arg.as_str(), "rev-parse", "--abbrev-ref", "HEAD"])
        .output()
        .await?;
    if !output.status.success() {
        anyhow::bail!(
            "git rev-parse failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_owned())
}

async fn run_git(args: &[&str]) -> anyhow::Result<()> {
    let output = Command::new("git").args(args).output().await?;
    if !output.status.success() {
        anyhow::bail!(
            "git {} failed: {}",
            args.first().copied().unwrap_or(""),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(())
}

#[cfg(test)]
#[path = "clone_tests.rs"]
mod tests;
