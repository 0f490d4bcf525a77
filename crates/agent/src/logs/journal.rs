// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Journald access via `journalctl -o json`.
//!
//! Arguments are always distinct argv entries built from validated filter
//! fields; nothing is ever interpolated into a shell string.

use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use tokio::process::Command;

use super::{LogEntry, LogLevel};

/// One journald read, already validated upstream.
#[derive(Debug, Clone, Default)]
pub struct JournalQuery {
    /// Scope to a systemd unit (agent/systemd sources).
    pub unit: Option<String>,
    /// Scope to a container's journal entries (docker source).
    pub container: Option<String>,
    pub since: Option<String>,
    pub until: Option<String>,
    pub cursor: Option<String>,
    pub limit: usize,
}

/// Read up to `limit` entries. Returns entries in journal order
/// (oldest-first), the cursor of the newest consumed entry, and whether
/// more entries were available.
pub async fn read(
    query: &JournalQuery,
    timeout: Duration,
) -> anyhow::Result<(Vec<LogEntry>, Option<String>, bool)> {
    let argv = build_argv(query);
    let output = tokio::time::timeout(
        timeout,
        Command::new("journalctl").args(&argv).output(),
    )
    .await
    .map_err(|_| anyhow::anyhow!("journalctl timed out after {timeout:?}"))??;

    if !output.status.success() {
        anyhow::bail!(
            "journalctl failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let mut entries = Vec::new();
    let mut last_cursor = None;
    for line in stdout.lines() {
        if let Some((entry, cursor)) = parse_line(line) {
            entries.push(entry);
            if cursor.is_some() {
                last_cursor = cursor;
            }
        }
    }

    let has_more = entries.len() > query.limit;
    if has_more {
        // We fetched one extra to detect continuation.
        let excess = entries.len() - query.limit;
        entries.drain(..excess);
    }
    Ok((entries, last_cursor, has_more))
}

/// Build the journalctl argv for a query. Pure for testability.
pub fn build_argv(query: &JournalQuery) -> Vec<String> {
    let mut argv = vec!["-o".to_owned(), "json".to_owned(), "--no-pager".to_owned()];
    // Fetch one extra entry so the caller can detect a further page.
    argv.push("-n".to_owned());
    argv.push((query.limit + 1).to_string());
    if let Some(ref unit) = query.unit {
        argv.push("-u".to_owned());
        argv.push(unit.clone());
    }
    if let Some(ref since) = query.since {
        argv.push("--since".to_owned());
        argv.push(since.clone());
    }
    if let Some(ref until) = query.until {
        argv.push("--until".to_owned());
        argv.push(until.clone());
    }
    if let Some(ref cursor) = query.cursor {
        argv.push(format!("--after-cursor={cursor}"));
    }
    if let Some(ref container) = query.container {
        // Journald match expression; positional, not an option.
        argv.push(format!("CONTAINER_NAME={container}"));
    }
    argv
}

/// Argv for a live follow of the same scope.
pub fn build_follow_argv(query: &JournalQuery) -> Vec<String> {
    let mut argv = vec![
        "-o".to_owned(),
        "json".to_owned(),
        "--no-pager".to_owned(),
        "-f".to_owned(),
        "-n".to_owned(),
        "0".to_owned(),
    ];
    if let Some(ref unit) = query.unit {
        argv.push("-u".to_owned());
        argv.push(unit.clone());
    }
    if let Some(ref container) = query.container {
        argv.push(format!("CONTAINER_NAME={container}"));
    }
    argv
}

/// Parse one `journalctl -o json` line into an entry plus its cursor.
pub fn parse_line(line: &str) -> Option<(LogEntry, Option<String>)> {
    let value: serde_json::Value = serde_json::from_str(line).ok()?;
    let message = match value.get("MESSAGE") {
        Some(serde_json::Value::String(s)) => s.clone(),
        // Binary payloads arrive as byte arrays.
        Some(serde_json::Value::Array(bytes)) => {
            let raw: Vec<u8> =
                bytes.iter().filter_map(|b| b.as_u64().map(|v| v as u8)).collect();
            String::from_utf8_lossy(&raw).into_owned()
        }
        _ => return None,
    };

    let timestamp = value
        .get("__REALTIME_TIMESTAMP")
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse::<i64>().ok())
        .and_then(usec_to_utc)
        .unwrap_or_else(Utc::now);

    let level = value
        .get("PRIORITY")
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse::<u8>().ok())
        .map(priority_to_level)
        .unwrap_or(LogLevel::Info);

    let source = if let Some(name) = value.get("CONTAINER_NAME").and_then(|v| v.as_str()) {
        format!("docker:{name}")
    } else if value.get("_SYSTEMD_UNIT").is_some() {
        "systemd".to_owned()
    } else {
        "agent".to_owned()
    };

    let cursor = value.get("__CURSOR").and_then(|v| v.as_str()).map(str::to_owned);

    let mut metadata = serde_json::Map::new();
    for key in ["_SYSTEMD_UNIT", "_PID", "SYSLOG_IDENTIFIER"] {
        if let Some(v) = value.get(key) {
            metadata.insert(key.to_owned(), v.clone());
        }
    }

    Some((
        LogEntry {
            timestamp,
            level,
            source,
            message,
            metadata: (!metadata.is_empty()).then(|| serde_json::Value::Object(metadata)),
        },
        cursor,
    ))
}

/// Syslog priority to the monotone level scale.
pub fn priority_to_level(priority: u8) -> LogLevel {
    match priority {
        0..=3 => LogLevel::Error,
        4 => LogLevel::Warn,
        5 | 6 => LogLevel::Info,
        _ => LogLevel::Debug,
    }
}

fn usec_to_utc(usec: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_micros(usec).single()
}

#[cfg(test)]
#[path = "journal_tests.rs"]
mod tests;
