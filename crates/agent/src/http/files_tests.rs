// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::Path;

use super::*;

#[test]
fn traversal_segments_rejected() {
    let root = Path::new("/workspace/repo");
    assert!(resolve_within(root, Some("../etc/passwd")).is_err());
    assert!(resolve_within(root, Some("a/../../b")).is_err());
    assert!(resolve_within(root, Some("src/lib.rs")).is_ok());
    assert!(resolve_within(root, None).is_ok());
}

#[test]
fn leading_slash_is_treated_as_relative() -> anyhow::Result<()> {
    let root = Path::new("/workspace/repo");
    let resolved = resolve_within(root, Some("/src"))?;
    assert_eq!(resolved, root.join("src"));
    Ok(())
}

#[tokio::test]
async fn list_respects_limit() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    for n in 0..5 {
        tokio::fs::write(dir.path().join(format!("file-{n}.txt")), "x").await?;
    }
    let (entries, truncated) = list_dir(dir.path(), dir.path(), 3).await?;
    assert_eq!(entries.len(), 3);
    assert!(truncated);
    Ok(())
}

#[tokio::test]
async fn walk_finds_by_substring_and_skips_git() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    tokio::fs::create_dir_all(dir.path().join("src")).await?;
    tokio::fs::create_dir_all(dir.path().join(".git/objects")).await?;
    tokio::fs::write(dir.path().join("src/main.rs"), "fn main() {}").await?;
    tokio::fs::write(dir.path().join("src/util.rs"), "").await?;
    tokio::fs::write(dir.path().join(".git/config"), "").await?;

    let (entries, truncated) =
        walk(dir.path(), dir.path(), 100, Some("main".to_owned())).await?;
    assert!(!truncated);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].path, "src/main.rs");
    assert_eq!(entries[0].kind, "file");
    Ok(())
}

#[tokio::test]
async fn tree_walk_collects_dirs_and_files() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    tokio::fs::create_dir_all(dir.path().join("a/b")).await?;
    tokio::fs::write(dir.path().join("a/b/c.txt"), "data").await?;

    let (entries, _) = walk(dir.path(), dir.path(), 100, None).await?;
    let paths: Vec<&str> = entries.iter().map(|e| e.path.as_str()).collect();
    assert!(paths.contains(&"a"));
    assert!(paths.contains(&"a/b"));
    assert!(paths.contains(&"a/b/c.txt"));
    Ok(())
}
