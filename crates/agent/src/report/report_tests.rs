// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{bearer_token, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::*;

fn settings() -> ReporterSettings {
    ReporterSettings {
        batch_max_wait: Duration::from_millis(50),
        batch_max_size: 50,
        batch_max_bytes: 65_536,
        outbox_max_size: 10_000,
        retry_initial: Duration::from_millis(20),
        retry_max: Duration::from_millis(100),
        retry_max_elapsed: Duration::from_secs(10),
    }
}

async fn wait_until<F: Fn() -> bool>(cond: F, what: &str) -> anyhow::Result<()> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while !cond() {
        if tokio::time::Instant::now() > deadline {
            anyhow::bail!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    Ok(())
}

#[tokio::test]
async fn batch_is_delivered_and_deleted_on_success() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/workspaces/w1/messages"))
        .and(bearer_token("tok-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"persisted": 2, "duplicates": 0})))
        .mount(&server)
        .await;

    let store = Arc::new(Store::open_in_memory()?);
    let reporter =
        Reporter::spawn(Outbox::Messages, Arc::clone(&store), server.uri(), settings());
    reporter.enqueue("m1", &json!({"messageId": "m1", "role": "user", "content": "hi"}))?;
    reporter.enqueue("m2", &json!({"messageId": "m2", "role": "assistant", "content": "yo"}))?;
    reporter.set_workspace("w1");
    reporter.set_token("tok-1");

    wait_until(|| store.outbox_len(Outbox::Messages).unwrap_or(99) == 0, "outbox drain").await?;
    reporter.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn transient_failures_bump_attempts_then_succeed() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    // Three transient failures, then success: the batch survives with its
    // attempt counters incremented, then is deleted on the fourth attempt.
    Mock::given(method("POST"))
        .and(path("/api/workspaces/w1/messages"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(3)
        .expect(3)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/workspaces/w1/messages"))
        .and(bearer_token("tok-late"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let store = Arc::new(Store::open_in_memory()?);
    let reporter =
        Reporter::spawn(Outbox::Messages, Arc::clone(&store), server.uri(), settings());
    reporter.enqueue("m1", &json!({"messageId": "m1"}))?;
    reporter.enqueue("m2", &json!({"messageId": "m2"}))?;
    reporter.set_workspace("w1");
    reporter.set_token("tok-late");

    wait_until(|| store.outbox_len(Outbox::Messages).unwrap_or(99) == 0, "outbox drain").await?;
    reporter.shutdown().await;
    server.verify().await;
    Ok(())
}

#[tokio::test]
async fn permanent_rejection_discards_batch_without_retry() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/workspaces/w1/errors"))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(Store::open_in_memory()?);
    let reporter = Reporter::spawn(Outbox::Errors, Arc::clone(&store), server.uri(), settings());
    reporter.enqueue("e1", &json!({"error": "boom"}))?;
    reporter.set_workspace("w1");
    reporter.set_token("tok");

    wait_until(|| store.outbox_len(Outbox::Errors).unwrap_or(99) == 0, "discard").await?;
    // Give the loop a chance to (incorrectly) retry before verifying.
    tokio::time::sleep(Duration::from_millis(200)).await;
    reporter.shutdown().await;
    server.verify().await;
    Ok(())
}

#[tokio::test]
async fn rows_stay_queued_without_a_token() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST")).respond_with(ResponseTemplate::new(200)).expect(0).mount(&server).await;

    let store = Arc::new(Store::open_in_memory()?);
    let reporter =
        Reporter::spawn(Outbox::BootLog, Arc::clone(&store), server.uri(), settings());
    reporter.enqueue("b1", &json!({"stage": "redeem", "level": "info"}))?;
    reporter.set_workspace("w1");

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(store.outbox_len(Outbox::BootLog)?, 1);
    reporter.shutdown().await;
    server.verify().await;
    Ok(())
}

#[tokio::test]
async fn enqueue_is_idempotent_through_the_reporter() -> anyhow::Result<()> {
    let store = Arc::new(Store::open_in_memory()?);
    let reporter = Reporter::spawn(
        Outbox::Messages,
        Arc::clone(&store),
        "http://127.0.0.1:9".to_owned(),
        settings(),
    );
    reporter.enqueue("dup", &json!({"messageId": "dup"}))?;
    reporter.enqueue("dup", &json!({"messageId": "dup"}))?;
    assert_eq!(store.outbox_len(Outbox::Messages)?, 1);
    reporter.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn disabled_reporter_is_a_noop() -> anyhow::Result<()> {
    let reporter = Reporter::disabled();
    reporter.enqueue("x", &json!({}))?;
    reporter.set_token("t");
    reporter.set_workspace("w");
    reporter.shutdown().await;
    Ok(())
}

#[test]
fn permanent_status_set() {
    for status in [400, 401, 403, 404] {
        assert!(is_permanent(status), "{status} should be permanent");
    }
    for status in [408, 429, 500, 502, 503] {
        assert!(!is_permanent(status), "{status} should be retried");
    }
}
