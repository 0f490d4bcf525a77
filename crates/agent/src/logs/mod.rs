// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Unified log access across the agent's journal unit, docker container
//! journal entries, and cloud-init files.

pub mod cloudinit;
pub mod filter;
pub mod journal;
pub mod stream;

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use filter::LogFilter;

/// Monotone severity threshold: debug < info < warn < error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "debug" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "warn" => Some(Self::Warn),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

/// Which backend(s) a read or follow targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogSource {
    Agent,
    Systemd,
    Docker,
    CloudInit,
    #[default]
    All,
}

impl LogSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Agent => "agent",
            Self::Systemd => "systemd",
            Self::Docker => "docker",
            Self::CloudInit => "cloud-init",
            Self::All => "all",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "agent" => Some(Self::Agent),
            "systemd" => Some(Self::Systemd),
            "docker" => Some(Self::Docker),
            "cloud-init" => Some(Self::CloudInit),
            "all" => Some(Self::All),
            _ => None,
        }
    }
}

/// One derived log line. Never stored; assembled from a backend on read.
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    /// `agent`, `systemd`, `cloud-init`, or `docker:<container>`.
    pub source: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// One page of a paginated read.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogPage {
    pub entries: Vec<LogEntry>,
    pub has_more: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

/// Sizing knobs copied out of the agent config.
#[derive(Debug, Clone)]
pub struct LogSettings {
    /// Systemd unit the agent's own entries live under.
    pub unit: String,
    pub reader_timeout: Duration,
    pub page_default_limit: usize,
    pub page_max_limit: usize,
    pub stream_buffer: usize,
    /// Cloud-init file paths; overridable in tests.
    pub cloud_init_paths: Vec<std::path::PathBuf>,
}

impl LogSettings {
    pub fn with_default_cloud_init(mut self) -> Self {
        self.cloud_init_paths = vec![
            "/var/log/cloud-init.log".into(),
            "/var/log/cloud-init-output.log".into(),
        ];
        self
    }
}

/// Paginated reader over all backends.
pub struct LogReader {
    settings: LogSettings,
}

impl LogReader {
    pub fn new(settings: LogSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &LogSettings {
        &self.settings
    }

    /// Read one page matching `filter`, newest entries first.
    ///
    /// Validation is total: any invalid filter input is rejected here,
    /// before any subprocess argument is constructed.
    pub async fn read(&self, filter: &LogFilter) -> anyhow::Result<LogPage> {
        filter
            .validate(self.settings.page_max_limit)
            .map_err(|msg| anyhow::anyhow!("invalid filter: {msg}"))?;

        let limit = filter.limit.unwrap_or(self.settings.page_default_limit);
        let source = filter.source_enum();

        let (mut entries, next_cursor, mut has_more) = match source {
            LogSource::Agent | LogSource::Systemd => {
                let (entries, cursor, more) = journal::read(
                    &journal::JournalQuery {
                        unit: Some(self.settings.unit.clone()),
                        container: None,
                        since: filter.since.clone(),
                        until: filter.until.clone(),
                        cursor: filter.cursor.clone(),
                        limit,
                    },
                    self.settings.reader_timeout,
                )
                .await?;
                (entries, cursor, more)
            }
            LogSource::Docker => {
                let (entries, cursor, more) = journal::read(
                    &journal::JournalQuery {
                        unit: None,
                        container: filter.container.clone(),
                        since: filter.since.clone(),
                        until: filter.until.clone(),
                        cursor: filter.cursor.clone(),
                        limit,
                    },
                    self.settings.reader_timeout,
                )
                .await?;
                (entries, cursor, more)
            }
            LogSource::CloudInit => {
                let entries =
                    cloudinit::read(&self.settings.cloud_init_paths, &filter.since, &filter.until)
                        .await?;
                (entries, None, false)
            }
            LogSource::All => {
                let (mut entries, cursor, more) = journal::read(
                    &journal::JournalQuery {
                        unit: None,
                        container: None,
                        since: filter.since.clone(),
                        until: filter.until.clone(),
                        cursor: filter.cursor.clone(),
                        limit,
                    },
                    self.settings.reader_timeout,
                )
                .await?;
                let cloud =
                    cloudinit::read(&self.settings.cloud_init_paths, &filter.since, &filter.until)
                        .await
                        .unwrap_or_default();
                entries.extend(cloud);
                (entries, cursor, more)
            }
        };

        // Search and level thresholds apply after collection, uniformly
        // across backends.
        entries.retain(|e| filter.matches(e));

        // Newest first.
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        if entries.len() > limit {
            entries.truncate(limit);
            has_more = true;
        }

        Ok(LogPage { entries, has_more, next_cursor })
    }
}
