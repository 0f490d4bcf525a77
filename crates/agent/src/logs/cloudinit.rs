// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cloud-init log file parsing.
//!
//! `cloud-init.log` lines carry a `YYYY-MM-DD HH:MM:SS,mmm - module[LEVEL]`
//! prefix; `cloud-init-output.log` is mostly raw command output. Unprefixed
//! lines inherit the previous line's timestamp and default to info.

use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, Utc};

use super::{LogEntry, LogLevel};

/// Read and merge the configured cloud-init files, bounded by the optional
/// time window.
pub async fn read(
    paths: &[PathBuf],
    since: &Option<String>,
    until: &Option<String>,
) -> anyhow::Result<Vec<LogEntry>> {
    let since = since.as_deref().and_then(parse_bound);
    let until = until.as_deref().and_then(parse_bound);

    let mut entries = Vec::new();
    for path in paths {
        let Ok(content) = tokio::fs::read_to_string(path).await else {
            // Absent files are normal on nodes without cloud-init.
            continue;
        };
        entries.extend(parse_log(&content));
    }
    entries.retain(|e| {
        since.is_none_or(|s| e.timestamp >= s) && until.is_none_or(|u| e.timestamp <= u)
    });
    Ok(entries)
}

/// Parse one file's contents. Pure for testability.
pub fn parse_log(content: &str) -> Vec<LogEntry> {
    let mut entries = Vec::new();
    let mut last_ts: Option<DateTime<Utc>> = None;
    for line in content.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let entry = match parse_prefixed_line(line) {
            Some(entry) => {
                last_ts = Some(entry.timestamp);
                entry
            }
            None => LogEntry {
                timestamp: last_ts.unwrap_or_else(Utc::now),
                level: LogLevel::Info,
                source: "cloud-init".to_owned(),
                message: line.to_owned(),
                metadata: None,
            },
        };
        entries.push(entry);
    }
    entries
}

/// `2026-01-15 10:30:00,123 - modules.py[DEBUG]: message`
fn parse_prefixed_line(line: &str) -> Option<LogEntry> {
    // Timestamp is a fixed 23-character prefix.
    if line.len() < 23 {
        return None;
    }
    let (ts_raw, rest) = line.split_at(23);
    let naive = NaiveDateTime::parse_from_str(ts_raw, "%Y-%m-%d %H:%M:%S,%3f").ok()?;
    let timestamp = naive.and_utc();

    let rest = rest.strip_prefix(" - ")?;
    let open = rest.find('[')?;
    let close = rest.find(']')?;
    if close < open {
        return None;
    }
    let module = &rest[..open];
    let level = match &rest[open + 1..close] {
        "DEBUG" => LogLevel::Debug,
        "INFO" => LogLevel::Info,
        "WARNING" | "WARN" => LogLevel::Warn,
        "ERROR" | "CRITICAL" => LogLevel::Error,
        _ => return None,
    };
    let message = rest[close + 1..].trim_start_matches(':').trim_start().to_owned();

    Some(LogEntry {
        timestamp,
        level,
        source: "cloud-init".to_owned(),
        message,
        metadata: Some(serde_json::json!({ "module": module })),
    })
}

fn parse_bound(value: &str) -> Option<DateTime<Utc>> {
    if let Some(rest) = value.strip_prefix('-') {
        let unit = rest.chars().last()?;
        let n: i64 = rest[..rest.len() - 1].parse().ok()?;
        let delta = match unit {
            's' => chrono::Duration::seconds(n),
            'm' => chrono::Duration::minutes(n),
            'h' => chrono::Duration::hours(n),
            'd' => chrono::Duration::days(n),
            _ => return None,
        };
        return Some(Utc::now() - delta);
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S").ok().map(|n| n.and_utc())
}

/// The two well-known cloud-init files under `/var/log`.
pub fn default_paths(log_dir: &Path) -> Vec<PathBuf> {
    vec![log_dir.join("cloud-init.log"), log_dir.join("cloud-init-output.log")]
}

#[cfg(test)]
#[path = "cloudinit_tests.rs"]
mod tests;
