// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable batched reporters: one pattern applied to the chat-message,
//! boot-log, and error channels, plus the non-durable heartbeat.
//!
//! Rows live in the store's outboxes until a batch post succeeds, so
//! delivery is at-least-once across process crashes. A disabled reporter is
//! a no-op handle, keeping call sites unconditional.

pub mod backoff;
pub mod heartbeat;

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::store::{Outbox, OutboxRow, Store};
use backoff::Backoff;

/// Batch sizing and retry policy, copied out of the agent config.
#[derive(Debug, Clone)]
pub struct ReporterSettings {
    pub batch_max_wait: std::time::Duration,
    pub batch_max_size: usize,
    pub batch_max_bytes: usize,
    pub outbox_max_size: usize,
    pub retry_initial: std::time::Duration,
    pub retry_max: std::time::Duration,
    pub retry_max_elapsed: std::time::Duration,
}

/// Where batches are posted: set after bootstrap, updated on reconnect.
#[derive(Debug, Clone, Default)]
struct Route {
    workspace_id: Option<String>,
    token: Option<String>,
}

/// Cheap cloneable handle to one durable reporter.
///
/// `Reporter::disabled()` yields a handle whose every method is a no-op,
/// so "reporting disabled" needs no conditional branches at call sites.
#[derive(Clone, Default)]
pub struct Reporter(Option<Arc<ReporterInner>>);

struct ReporterInner {
    outbox: Outbox,
    store: Arc<Store>,
    base_url: String,
    settings: ReporterSettings,
    client: reqwest::Client,
    route: watch::Sender<Route>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Reporter {
    /// Start a reporter's background loop over the given outbox.
    pub fn spawn(
        outbox: Outbox,
        store: Arc<Store>,
        base_url: String,
        settings: ReporterSettings,
    ) -> Self {
        let (route_tx, _) = watch::channel(Route::default());
        let inner = Arc::new(ReporterInner {
            outbox,
            store,
            base_url: base_url.trim_end_matches('/').to_owned(),
            settings,
            client: reqwest::Client::new(),
            route: route_tx,
            cancel: CancellationToken::new(),
            task: Mutex::new(None),
        });
        let handle = tokio::spawn(Arc::clone(&inner).run());
        *inner.task.lock() = Some(handle);
        Self(Some(inner))
    }

    pub fn disabled() -> Self {
        Self(None)
    }

    /// Write one row to the outbox. Idempotent under caller retry: a
    /// duplicate `message_id` leaves exactly one row. Fails when the outbox
    /// is at capacity.
    pub fn enqueue(&self, message_id: &str, payload: &serde_json::Value) -> anyhow::Result<()> {
        let Some(inner) = &self.0 else {
            return Ok(());
        };
        inner.store.enqueue(
            inner.outbox,
            message_id,
            &payload.to_string(),
            inner.settings.outbox_max_size,
        )?;
        Ok(())
    }

    /// Update the bearer used on subsequent batch posts.
    pub fn set_token(&self, token: &str) {
        let Some(inner) = &self.0 else {
            return;
        };
        inner.route.send_modify(|r| r.token = Some(token.to_owned()));
    }

    /// Set the workspace the reporter posts under.
    pub fn set_workspace(&self, workspace_id: &str) {
        let Some(inner) = &self.0 else {
            return;
        };
        inner.route.send_modify(|r| r.workspace_id = Some(workspace_id.to_owned()));
    }

    /// Signal the loop to drain once and wait for it to exit.
    pub async fn shutdown(&self) {
        let Some(inner) = &self.0 else {
            return;
        };
        inner.cancel.cancel();
        let handle = inner.task.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

impl ReporterInner {
    async fn run(self: Arc<Self>) {
        let mut tick = tokio::time::interval(self.settings.batch_max_wait);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = tick.tick() => {}
                () = self.cancel.cancelled() => break,
            }
            if let Err(e) = self.flush_once().await {
                tracing::warn!(channel = self.outbox.channel(), err = %e, "outbox flush failed");
            }
        }
        // Final drain on shutdown.
        if let Err(e) = self.flush_once().await {
            tracing::warn!(channel = self.outbox.channel(), err = %e, "final outbox drain failed");
        }
    }

    async fn flush_once(&self) -> anyhow::Result<()> {
        let batch = self.store.next_batch(
            self.outbox,
            self.settings.batch_max_size,
            self.settings.batch_max_bytes,
        )?;
        if batch.is_empty() {
            return Ok(());
        }

        // Without a destination the rows stay queued.
        let workspace_id = match self.route.borrow().workspace_id.clone() {
            Some(ws) => ws,
            None => return Ok(()),
        };
        if self.route.borrow().token.is_none() {
            return Ok(());
        }

        let url = format!(
            "{}/api/workspaces/{}/{}",
            self.base_url,
            workspace_id,
            self.outbox.channel()
        );
        let body = batch_body(&batch);
        let ids: Vec<i64> = batch.iter().map(|r| r.id).collect();

        let mut backoff =
            Backoff::new(self.settings.retry_initial, self.settings.retry_max);
        let started = Instant::now();

        loop {
            // The bearer is re-read on every attempt so a token rotated
            // mid-retry is picked up.
            let token = self.route.borrow().token.clone().unwrap_or_default();
            let result = self
                .client
                .post(&url)
                .bearer_auth(&token)
                .json(&body)
                .send()
                .await;

            match result {
                Ok(resp) if resp.status().is_success() => {
                    self.store.delete_batch(self.outbox, &ids)?;
                    tracing::debug!(
                        channel = self.outbox.channel(),
                        rows = ids.len(),
                        "batch delivered"
                    );
                    return Ok(());
                }
                Ok(resp) if is_permanent(resp.status().as_u16()) => {
                    tracing::warn!(
                        channel = self.outbox.channel(),
                        status = resp.status().as_u16(),
                        rows = ids.len(),
                        "batch rejected permanently, discarding"
                    );
                    self.store.delete_batch(self.outbox, &ids)?;
                    return Ok(());
                }
                Ok(resp) => {
                    tracing::debug!(
                        channel = self.outbox.channel(),
                        status = resp.status().as_u16(),
                        "transient batch failure"
                    );
                    self.store.bump_attempts(self.outbox, &ids)?;
                }
                Err(e) => {
                    tracing::debug!(channel = self.outbox.channel(), err = %e, "batch post failed");
                    self.store.bump_attempts(self.outbox, &ids)?;
                }
            }

            if started.elapsed() >= self.settings.retry_max_elapsed {
                // Rows stay queued for the next tick.
                return Ok(());
            }
            tokio::select! {
                _ = tokio::time::sleep(backoff.next_delay()) => {}
                () = self.cancel.cancelled() => return Ok(()),
            }
        }
    }
}

/// The agent's full set of durable reporters.
#[derive(Clone, Default)]
pub struct Reporters {
    pub messages: Reporter,
    pub boot_log: Reporter,
    pub errors: Reporter,
}

impl Reporters {
    /// Start one reporter per channel over the shared store.
    pub fn spawn(store: &Arc<Store>, base_url: &str, settings: &ReporterSettings) -> Self {
        Self {
            messages: Reporter::spawn(
                Outbox::Messages,
                Arc::clone(store),
                base_url.to_owned(),
                settings.clone(),
            ),
            boot_log: Reporter::spawn(
                Outbox::BootLog,
                Arc::clone(store),
                base_url.to_owned(),
                settings.clone(),
            ),
            errors: Reporter::spawn(
                Outbox::Errors,
                Arc::clone(store),
                base_url.to_owned(),
                settings.clone(),
            ),
        }
    }

    /// All-disabled set for contexts with no control-plane link.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn set_workspace(&self, workspace_id: &str) {
        self.messages.set_workspace(workspace_id);
        self.boot_log.set_workspace(workspace_id);
        self.errors.set_workspace(workspace_id);
    }

    pub fn set_token(&self, token: &str) {
        self.messages.set_token(token);
        self.boot_log.set_token(token);
        self.errors.set_token(token);
    }

    /// Drain and stop every reporter.
    pub async fn shutdown(&self) {
        self.messages.shutdown().await;
        self.boot_log.shutdown().await;
        self.errors.shutdown().await;
    }
}

/// Permanent rejections are discarded; everything else is retried.
/// 404 means the workspace is gone upstream, so retrying cannot succeed.
fn is_permanent(status: u16) -> bool {
    matches!(status, 400 | 401 | 403 | 404)
}

fn batch_body(batch: &[OutboxRow]) -> serde_json::Value {
    let messages: Vec<serde_json::Value> = batch
        .iter()
        .map(|row| {
            serde_json::from_str(&row.payload)
                .unwrap_or_else(|_| serde_json::Value::String(row.payload.clone()))
        })
        .collect();
    serde_json::json!({ "messages": messages })
}

#[cfg(test)]
#[path = "report_tests.rs"]
mod tests;
