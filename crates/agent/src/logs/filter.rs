// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Log filter validation.
//!
//! Every field is checked against a strict whitelist before any subprocess
//! argument is built from it; rejected input never reaches an argv.

use serde::Deserialize;

use super::{LogEntry, LogLevel, LogSource};

const MAX_CONTAINER_LEN: usize = 128;
const MAX_SEARCH_LEN: usize = 256;
const MAX_CURSOR_LEN: usize = 512;
const MAX_TIME_LEN: usize = 64;

/// Query filter for log reads and follows.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogFilter {
    pub source: Option<String>,
    pub level: Option<String>,
    pub container: Option<String>,
    pub since: Option<String>,
    pub until: Option<String>,
    pub search: Option<String>,
    pub cursor: Option<String>,
    pub limit: Option<usize>,
}

impl LogFilter {
    /// Validate every field. Returns the offending field's message on the
    /// first failure.
    pub fn validate(&self, max_limit: usize) -> Result<(), String> {
        if let Some(ref source) = self.source {
            if LogSource::parse(source).is_none() {
                return Err(format!("unknown source {source:?}"));
            }
        }
        if let Some(ref level) = self.level {
            if LogLevel::parse(level).is_none() {
                return Err(format!("unknown level {level:?}"));
            }
        }
        if let Some(ref container) = self.container {
            if !valid_container_name(container) {
                return Err("container name contains invalid characters".to_owned());
            }
        }
        if self.source_enum() == LogSource::Docker && self.container.is_none() {
            return Err("container is required for source=docker".to_owned());
        }
        for (field, value) in [("since", &self.since), ("until", &self.until)] {
            if let Some(value) = value {
                if !valid_time(value) {
                    return Err(format!("{field} must be ISO-8601 or relative like -5m"));
                }
            }
        }
        if let Some(ref search) = self.search {
            if search.len() > MAX_SEARCH_LEN {
                return Err(format!("search exceeds {MAX_SEARCH_LEN} characters"));
            }
        }
        if let Some(ref cursor) = self.cursor {
            if !valid_cursor(cursor) {
                return Err("cursor contains invalid characters".to_owned());
            }
        }
        if let Some(limit) = self.limit {
            if limit == 0 || limit > max_limit {
                return Err(format!("limit must be between 1 and {max_limit}"));
            }
        }
        Ok(())
    }

    pub fn source_enum(&self) -> LogSource {
        self.source.as_deref().and_then(LogSource::parse).unwrap_or_default()
    }

    pub fn level_enum(&self) -> Option<LogLevel> {
        self.level.as_deref().and_then(LogLevel::parse)
    }

    /// Level threshold and case-insensitive substring search, applied
    /// per-entry after collection.
    pub fn matches(&self, entry: &LogEntry) -> bool {
        if let Some(min) = self.level_enum() {
            if entry.level < min {
                return false;
            }
        }
        if let Some(ref search) = self.search {
            if !entry.message.to_lowercase().contains(&search.to_lowercase()) {
                return false;
            }
        }
        true
    }
}

/// Container names: leading alphanumeric, then `[A-Za-z0-9_.-]`.
pub fn valid_container_name(name: &str) -> bool {
    if name.is_empty() || name.len() > MAX_CONTAINER_LEN {
        return false;
    }
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !first.is_ascii_alphanumeric() {
        return false;
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

/// Accepts ISO-8601 timestamps, `YYYY-MM-DD HH:MM:SS`, or a relative
/// offset `-N{s,m,h,d}`.
pub fn valid_time(value: &str) -> bool {
    if value.is_empty() || value.len() > MAX_TIME_LEN {
        return false;
    }
    if let Some(rest) = value.strip_prefix('-') {
        let Some(unit) = rest.chars().last() else {
            return false;
        };
        if !matches!(unit, 's' | 'm' | 'h' | 'd') {
            return false;
        }
        let digits = &rest[..rest.len() - 1];
        return !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit());
    }
    if chrono::DateTime::parse_from_rfc3339(value).is_ok() {
        return true;
    }
    chrono::NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S").is_ok()
}

/// Journald cursors are opaque but draw from a known character class.
pub fn valid_cursor(cursor: &str) -> bool {
    !cursor.is_empty()
        && cursor.len() <= MAX_CURSOR_LEN
        && cursor
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '=' | ';' | '+' | '_' | '/' | ':' | '.' | '@' | '-'))
}

#[cfg(test)]
#[path = "filter_tests.rs"]
mod tests;
