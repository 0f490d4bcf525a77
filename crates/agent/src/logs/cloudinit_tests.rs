// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

const SAMPLE: &str = "\
2026-01-15 10:30:00,123 - util.py[DEBUG]: Cloud-init v. 24.1 running 'init'
2026-01-15 10:30:01,456 - modules.py[INFO]: Running module ssh
raw continuation output line
2026-01-15 10:30:02,789 - handlers.py[WARNING]: Unhandled unknown content-type
2026-01-15 10:30:03,000 - main.py[ERROR]: failed to fetch datasource
";

#[test]
fn prefixed_lines_parse_level_and_module() {
    let entries = parse_log(SAMPLE);
    assert_eq!(entries.len(), 5);
    assert_eq!(entries[0].level, LogLevel::Debug);
    assert_eq!(entries[1].level, LogLevel::Info);
    assert_eq!(entries[3].level, LogLevel::Warn);
    assert_eq!(entries[4].level, LogLevel::Error);
    assert!(entries[0].message.starts_with("Cloud-init v. 24.1"));
    let module = entries[1]
        .metadata
        .as_ref()
        .and_then(|m| m.get("module"))
        .and_then(|v| v.as_str());
    assert_eq!(module, Some("modules.py"));
}

#[test]
fn raw_lines_inherit_previous_timestamp() {
    let entries = parse_log(SAMPLE);
    assert_eq!(entries[2].message, "raw continuation output line");
    assert_eq!(entries[2].level, LogLevel::Info);
    assert_eq!(entries[2].timestamp, entries[1].timestamp);
}

#[test]
fn all_sources_are_cloud_init() {
    for entry in parse_log(SAMPLE) {
        assert_eq!(entry.source, "cloud-init");
    }
}

#[test]
fn blank_lines_are_skipped() {
    let entries = parse_log("\n\n2026-01-15 10:30:00,000 - a.py[INFO]: x\n\n");
    assert_eq!(entries.len(), 1);
}

#[tokio::test]
async fn read_merges_files_and_tolerates_missing() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let log = dir.path().join("cloud-init.log");
    tokio::fs::write(&log, SAMPLE).await?;
    let missing = dir.path().join("cloud-init-output.log");

    let entries = read(&[log, missing], &None, &None).await?;
    assert_eq!(entries.len(), 5);
    Ok(())
}

#[tokio::test]
async fn read_applies_time_window() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let log = dir.path().join("cloud-init.log");
    tokio::fs::write(&log, SAMPLE).await?;

    let entries = read(
        &[log],
        &Some("2026-01-15T10:30:02Z".to_owned()),
        &Some("2026-01-15T10:30:02.999Z".to_owned()),
    )
    .await?;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].level, LogLevel::Warn);
    Ok(())
}
