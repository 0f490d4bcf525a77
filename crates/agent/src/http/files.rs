// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Read-only file access to a workspace checkout (host side).

use std::path::{Path as FsPath, PathBuf};
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::Response;
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiFailure};
use crate::state::AppState;

use super::{fail, ok_json};

#[derive(Debug, Deserialize)]
pub struct FilesQuery {
    /// `list` (default), `tree`, or `find`.
    #[serde(default)]
    pub op: Option<String>,
    /// Directory relative to the workspace root.
    #[serde(default)]
    pub path: Option<String>,
    /// Substring pattern for `find`.
    #[serde(default)]
    pub pattern: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileEntry {
    pub path: String,
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

/// `GET /workspaces/:id/files?op=list|tree|find&path=&pattern=`
pub async fn files(
    State(state): State<Arc<AppState>>,
    Path(workspace_id): Path<String>,
    Query(query): Query<FilesQuery>,
) -> Response {
    let workspace = match state.workspaces.get(&workspace_id) {
        Ok(workspace) => workspace,
        Err(e) => return fail(e),
    };
    let root = workspace.workspace_dir.clone();
    let start = match resolve_within(&root, query.path.as_deref()) {
        Ok(start) => start,
        Err(e) => return fail(e),
    };

    let op = query.op.as_deref().unwrap_or("list");
    let result = match op {
        "list" => list_dir(&root, &start, state.config.file_list_limit).await,
        "tree" => walk(&root, &start, state.config.file_list_limit, None).await,
        "find" => {
            let Some(pattern) = query.pattern.clone() else {
                return fail(ApiFailure::new(ApiError::BadRequest, "find requires a pattern"));
            };
            walk(&root, &start, state.config.file_find_limit, Some(pattern.to_lowercase())).await
        }
        other => {
            return fail(ApiFailure::new(ApiError::BadRequest, format!("unknown op {other:?}")))
        }
    };

    match result {
        Ok((entries, truncated)) => {
            ok_json(serde_json::json!({ "entries": entries, "truncated": truncated }))
        }
        Err(e) => fail(e),
    }
}

/// Join a client-supplied relative path under the workspace root,
/// rejecting traversal out of it.
fn resolve_within(root: &FsPath, rel: Option<&str>) -> anyhow::Result<PathBuf> {
    let rel = rel.unwrap_or("");
    if rel.split('/').any(|seg| seg == "..") {
        return Err(ApiFailure::new(ApiError::BadRequest, "path may not contain '..'"));
    }
    let joined = root.join(rel.trim_start_matches('/'));
    if !joined.starts_with(root) {
        return Err(ApiFailure::new(ApiError::BadRequest, "path escapes the workspace"));
    }
    Ok(joined)
}

async fn list_dir(
    root: &FsPath,
    dir: &FsPath,
    limit: usize,
) -> anyhow::Result<(Vec<FileEntry>, bool)> {
    let mut entries = Vec::new();
    let mut read_dir = tokio::fs::read_dir(dir).await?;
    let mut truncated = false;
    while let Some(entry) = read_dir.next_entry().await? {
        if entries.len() >= limit {
            truncated = true;
            break;
        }
        let meta = entry.metadata().await?;
        entries.push(FileEntry {
            path: relative_to(root, &entry.path()),
            kind: if meta.is_dir() { "dir" } else { "file" },
            size: meta.is_file().then(|| meta.len()),
        });
    }
    entries.sort_by(|a, b| a.path.cmp(&b.path));
    Ok((entries, truncated))
}

/// Depth-first walk bounded by `limit`; with a pattern, only matching
/// names are collected (case-insensitive substring).
async fn walk(
    root: &FsPath,
    start: &FsPath,
    limit: usize,
    pattern: Option<String>,
) -> anyhow::Result<(Vec<FileEntry>, bool)> {
    let mut entries = Vec::new();
    let mut stack = vec![start.to_path_buf()];
    let mut truncated = false;

    while let Some(dir) = stack.pop() {
        let Ok(mut read_dir) = tokio::fs::read_dir(&dir).await else {
            continue;
        };
        while let Some(entry) = read_dir.next_entry().await? {
            if entries.len() >= limit {
                truncated = true;
                stack.clear();
                break;
            }
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().into_owned();
            if name == ".git" {
                continue;
            }
            let meta = entry.metadata().await?;
            if meta.is_dir() {
                stack.push(path.clone());
            }
            let matches = pattern
                .as_deref()
                .is_none_or(|p| name.to_lowercase().contains(p));
            if matches {
                entries.push(FileEntry {
                    path: relative_to(root, &path),
                    kind: if meta.is_dir() { "dir" } else { "file" },
                    size: meta.is_file().then(|| meta.len()),
                });
            }
        }
    }
    entries.sort_by(|a, b| a.path.cmp(&b.path));
    Ok((entries, truncated))
}

fn relative_to(root: &FsPath, path: &FsPath) -> String {
    path.strip_prefix(root).unwrap_or(path).to_string_lossy().into_owned()
}

#[cfg(test)]
#[path = "files_tests.rs"]
mod tests;
