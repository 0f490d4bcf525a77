// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Two-phase log streaming: catch-up from the paginated reader, then a
//! live follow of the backend.
//!
//! The follower is restarted after a short pause if the backend process
//! dies; a failed send to the caller ends the stream.

use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{cloudinit, journal, LogEntry, LogFilter, LogReader, LogSource};

/// Pause before restarting a dead follower.
const RESTART_PAUSE: Duration = Duration::from_secs(1);

/// Why one follower invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowExit {
    /// The caller's receiver is gone; the stream is over.
    SenderClosed,
    Cancelled,
    /// The backend process exited; the follower should restart.
    BackendExited,
}

/// Stream logs matching `filter`: catch-up oldest-first, then follow live.
///
/// Runs until `cancel` fires or the receiving side of `tx` is dropped.
pub async fn stream(
    reader: &LogReader,
    filter: &LogFilter,
    tx: mpsc::Sender<LogEntry>,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    filter
        .validate(reader.settings().page_max_limit)
        .map_err(|msg| anyhow::anyhow!("invalid filter: {msg}"))?;

    // Phase 1: catch-up. The most recent entries, delivered oldest-first.
    let mut catchup = filter.clone();
    catchup.limit = Some(reader.settings().stream_buffer.min(reader.settings().page_max_limit));
    let page = reader.read(&catchup).await?;
    for entry in page.entries.into_iter().rev() {
        if tx.send(entry).await.is_err() {
            return Ok(());
        }
    }

    // Phase 2: follow, restarting across backend deaths.
    let (program, argv) = follow_command(filter, reader.settings());
    loop {
        match follow_once(&program, &argv, filter, &tx, &cancel).await {
            FollowExit::SenderClosed | FollowExit::Cancelled => return Ok(()),
            FollowExit::BackendExited => {
                tokio::select! {
                    _ = tokio::time::sleep(RESTART_PAUSE) => {}
                    () = cancel.cancelled() => return Ok(()),
                }
            }
        }
    }
}

/// The follower subprocess for a filter's source. Pure for testability.
pub fn follow_command(filter: &LogFilter, settings: &super::LogSettings) -> (String, Vec<String>) {
    match filter.source_enum() {
        LogSource::Agent | LogSource::Systemd => (
            "journalctl".to_owned(),
            journal::build_follow_argv(&journal::JournalQuery {
                unit: Some(settings.unit.clone()),
                ..Default::default()
            }),
        ),
        LogSource::Docker => (
            "journalctl".to_owned(),
            journal::build_follow_argv(&journal::JournalQuery {
                container: filter.container.clone(),
                ..Default::default()
            }),
        ),
        LogSource::CloudInit => {
            let mut argv = vec!["-F".to_owned(), "-n".to_owned(), "0".to_owned()];
            argv.extend(
                settings.cloud_init_paths.iter().map(|p| p.to_string_lossy().into_owned()),
            );
            ("tail".to_owned(), argv)
        }
        // Live entries for the merged view come from the journal; cloud-init
        // files are boot-time and covered by catch-up.
        LogSource::All => (
            "journalctl".to_owned(),
            journal::build_follow_argv(&journal::JournalQuery::default()),
        ),
    }
}

/// Run one follower subprocess to completion, forwarding matching entries.
pub async fn follow_once(
    program: &str,
    argv: &[String],
    filter: &LogFilter,
    tx: &mpsc::Sender<LogEntry>,
    cancel: &CancellationToken,
) -> FollowExit {
    let child = Command::new(program)
        .args(argv)
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn();

    let mut child = match child {
        Ok(child) => child,
        Err(e) => {
            tracing::warn!(program, err = %e, "log follower failed to spawn");
            return FollowExit::BackendExited;
        }
    };
    let Some(stdout) = child.stdout.take() else {
        return FollowExit::BackendExited;
    };
    let mut lines = BufReader::new(stdout).lines();
    let is_cloud_init = filter.source_enum() == LogSource::CloudInit;

    loop {
        tokio::select! {
            () = cancel.cancelled() => return FollowExit::Cancelled,
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) | Err(_) => return FollowExit::BackendExited,
                };
                let entry = if is_cloud_init {
                    cloudinit::parse_log(&line).pop()
                } else {
                    journal::parse_line(&line).map(|(entry, _)| entry)
                };
                let Some(entry) = entry else { continue };
                if !filter.matches(&entry) {
                    continue;
                }
                if tx.send(entry).await.is_err() {
                    return FollowExit::SenderClosed;
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "stream_tests.rs"]
mod tests;
