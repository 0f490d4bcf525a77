// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Non-durable node heartbeat.
//!
//! Posts a system snapshot on a fixed interval; a missed beat is simply
//! absent, and control-plane freshness logic derives health from the last
//! accepted timestamp.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Shared holder for the per-workspace callback bearer, filled in by
/// bootstrap and rotated on reconnect.
pub type CallbackToken = Arc<RwLock<Option<String>>>;

pub struct HeartbeatReporter {
    base_url: String,
    node_id: String,
    interval: Duration,
    client: reqwest::Client,
    token: CallbackToken,
    started_at: Instant,
}

impl HeartbeatReporter {
    pub fn new(
        base_url: String,
        node_id: String,
        interval: Duration,
        token: CallbackToken,
    ) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            node_id,
            interval,
            client: reqwest::Client::new(),
            token,
            started_at: Instant::now(),
        }
    }

    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(self.interval);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = tick.tick() => {}
                    () = cancel.cancelled() => return,
                }
                let Some(token) = self.token.read().clone() else {
                    continue;
                };
                let snapshot = self.snapshot().await;
                let url = format!("{}/api/nodes/{}/heartbeat", self.base_url, self.node_id);
                match self.client.post(&url).bearer_auth(&token).json(&snapshot).send().await {
                    Ok(resp) if resp.status().is_success() => {}
                    Ok(resp) => {
                        tracing::debug!(status = resp.status().as_u16(), "heartbeat rejected");
                    }
                    Err(e) => tracing::debug!(err = %e, "heartbeat post failed"),
                }
            }
        })
    }

    /// System facts for one beat.
    async fn snapshot(&self) -> serde_json::Value {
        let uptime_secs = self.started_at.elapsed().as_secs();
        let (system, disks) = tokio::task::spawn_blocking(collect_system_facts)
            .await
            .unwrap_or_else(|_| (serde_json::json!({}), serde_json::json!([])));
        let containers = docker_containers().await;

        serde_json::json!({
            "nodeId": self.node_id,
            "uptimeSecs": uptime_secs,
            "system": system,
            "disks": disks,
            "docker": containers,
            "agentVersion": env!("CARGO_PKG_VERSION"),
        })
    }
}

pub(crate) fn collect_system_facts() -> (serde_json::Value, serde_json::Value) {
    let mut sys = sysinfo::System::new();
    sys.refresh_memory();
    sys.refresh_cpu_usage();
    let load = sysinfo::System::load_average();
    let process = sys
        .process(sysinfo::Pid::from_u32(std::process::id()))
        .map(|p| serde_json::json!({ "rssBytes": p.memory() }))
        .unwrap_or_else(|| serde_json::json!({}));

    let system = serde_json::json!({
        "loadAvg": { "one": load.one, "five": load.five, "fifteen": load.fifteen },
        "memory": {
            "totalBytes": sys.total_memory(),
            "usedBytes": sys.used_memory(),
        },
        "cpuCount": sys.cpus().len(),
        "process": process,
    });

    let disks: Vec<serde_json::Value> = sysinfo::Disks::new_with_refreshed_list()
        .iter()
        .map(|d| {
            serde_json::json!({
                "mountPoint": d.mount_point().to_string_lossy(),
                "totalBytes": d.total_space(),
                "availableBytes": d.available_space(),
            })
        })
        .collect();

    (system, serde_json::Value::Array(disks))
}

/// Running containers as reported by the runtime; empty on error.
pub(crate) async fn docker_containers() -> serde_json::Value {
    let output = tokio::process::Command::new("docker")
        .args(["ps", "--format", "{{json .}}"])
        .output()
        .await;
    let Ok(output) = output else {
        return serde_json::Value::Array(vec![]);
    };
    if !output.status.success() {
        return serde_json::Value::Array(vec![]);
    }
    let containers: Vec<serde_json::Value> = String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter_map(|line| serde_json::from_str(line).ok())
        .collect();
    serde_json::Value::Array(containers)
}

#[cfg(test)]
#[path = "heartbeat_tests.rs"]
mod tests;
