// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use chrono::Utc;
use yare::parameterized;

use super::*;

fn filter() -> LogFilter {
    LogFilter::default()
}

fn entry(level: LogLevel, message: &str) -> LogEntry {
    LogEntry {
        timestamp: Utc::now(),
        level,
        source: "agent".to_owned(),
        message: message.to_owned(),
        metadata: None,
    }
}

#[test]
fn empty_filter_is_valid() {
    assert!(filter().validate(1000).is_ok());
}

#[parameterized(
    agent = { "agent" },
    systemd = { "systemd" },
    cloud_init = { "cloud-init" },
    all = { "all" },
)]
fn known_sources_accepted(source: &str) {
    let mut f = filter();
    f.source = Some(source.to_owned());
    assert!(f.validate(1000).is_ok());
}

#[test]
fn unknown_source_rejected() {
    let mut f = filter();
    f.source = Some("kernel; rm -rf /".to_owned());
    let err = f.validate(1000).err();
    assert!(err.is_some_and(|e| e.contains("unknown source")));
}

#[test]
fn unknown_level_rejected() {
    let mut f = filter();
    f.level = Some("critical".to_owned());
    assert!(f.validate(1000).is_err());
}

#[parameterized(
    simple = { "my-container", true },
    dotted = { "web.1", true },
    underscore = { "a_b", true },
    leading_dash = { "-bad", false },
    shell_meta = { "c; rm -rf /", false },
    empty = { "", false },
    space = { "a b", false },
)]
fn container_name_whitelist(name: &str, ok: bool) {
    assert_eq!(valid_container_name(name), ok, "name: {name:?}");
}

#[test]
fn docker_source_requires_container() {
    let mut f = filter();
    f.source = Some("docker".to_owned());
    assert!(f.validate(1000).is_err());
    f.container = Some("web".to_owned());
    assert!(f.validate(1000).is_ok());
}

#[parameterized(
    rfc3339 = { "2026-01-15T10:30:00Z", true },
    rfc3339_offset = { "2026-01-15T10:30:00+02:00", true },
    plain = { "2026-01-15 10:30:00", true },
    rel_minutes = { "-5m", true },
    rel_hours = { "-12h", true },
    rel_days = { "-2d", true },
    rel_seconds = { "-30s", true },
    rel_no_digits = { "-m", false },
    rel_bad_unit = { "-5w", false },
    garbage = { "yesterday; reboot", false },
    empty = { "", false },
)]
fn time_syntax(value: &str, ok: bool) {
    assert_eq!(valid_time(value), ok, "value: {value:?}");
}

#[test]
fn bad_since_rejected_before_any_spawn() {
    let mut f = filter();
    f.since = Some("$(reboot)".to_owned());
    assert!(f.validate(1000).is_err());
}

#[test]
fn cursor_charset_enforced() {
    assert!(valid_cursor("s=abc123;i=42;b=9f/x:y@z.w-q_+="));
    assert!(!valid_cursor("s=abc`reboot`"));
    assert!(!valid_cursor(""));
    assert!(!valid_cursor(&"x".repeat(600)));
}

#[test]
fn limit_bounds() {
    let mut f = filter();
    f.limit = Some(0);
    assert!(f.validate(1000).is_err());
    f.limit = Some(1001);
    assert!(f.validate(1000).is_err());
    f.limit = Some(1000);
    assert!(f.validate(1000).is_ok());
}

#[test]
fn overlong_search_rejected() {
    let mut f = filter();
    f.search = Some("x".repeat(300));
    assert!(f.validate(1000).is_err());
}

#[test]
fn level_threshold_is_monotone() {
    let mut f = filter();
    f.level = Some("warn".to_owned());
    assert!(!f.matches(&entry(LogLevel::Debug, "m")));
    assert!(!f.matches(&entry(LogLevel::Info, "m")));
    assert!(f.matches(&entry(LogLevel::Warn, "m")));
    assert!(f.matches(&entry(LogLevel::Error, "m")));
}

#[test]
fn search_is_case_insensitive_substring() {
    let mut f = filter();
    f.search = Some("ReFuSeD".to_owned());
    assert!(f.matches(&entry(LogLevel::Info, "connection refused by peer")));
    assert!(!f.matches(&entry(LogLevel::Info, "connection accepted")));
}
