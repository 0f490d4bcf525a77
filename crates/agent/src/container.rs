// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Devcontainer discovery against the container runtime.
//!
//! Containers are located by label and cached for a short TTL; a cached hit
//! is revalidated against the runtime so a rebuilt or stopped container is
//! never handed out.

use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::process::Command;

/// No container matched the label query. Callers treat this as retriable.
#[derive(Debug)]
pub struct NoContainerFound(pub String);

impl fmt::Display for NoContainerFound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "no container found for label {}", self.0)
    }
}

impl std::error::Error for NoContainerFound {}

struct CachedId {
    id: String,
    resolved_at: Instant,
}

/// Label-keyed container discovery with a TTL cache.
pub struct ContainerRuntime {
    label_key: String,
    cache_ttl: Duration,
    ids: RwLock<HashMap<String, CachedId>>,
    /// Effective in-container user, keyed by container ID.
    users: RwLock<HashMap<String, String>>,
}

impl ContainerRuntime {
    pub fn new(label_key: String, cache_ttl: Duration) -> Self {
        Self {
            label_key,
            cache_ttl,
            ids: RwLock::new(HashMap::new()),
            users: RwLock::new(HashMap::new()),
        }
    }

    /// Container ID for `{label_key}={label_value}`.
    ///
    /// Serves from cache while the entry is younger than the TTL and the
    /// container is still running; otherwise re-queries the runtime.
    pub async fn container_id(&self, label_value: &str) -> anyhow::Result<String> {
        let cached = {
            let ids = self.ids.read();
            ids.get(label_value)
                .filter(|c| c.resolved_at.elapsed() < self.cache_ttl)
                .map(|c| c.id.clone())
        };
        if let Some(id) = cached {
            if self.is_running(&id).await {
                return Ok(id);
            }
            self.invalidate(label_value);
        }

        let id = self.query(label_value).await?;
        self.ids
            .write()
            .insert(label_value.to_owned(), CachedId { id: id.clone(), resolved_at: Instant::now() });
        Ok(id)
    }

    /// Drop the cached ID (and its user entry), forcing re-discovery.
    /// Used after a devcontainer rebuild.
    pub fn invalidate(&self, label_value: &str) {
        let removed = self.ids.write().remove(label_value);
        if let Some(cached) = removed {
            self.users.write().remove(&cached.id);
        }
    }

    /// The user the container was configured to run as, defaulting to
    /// `root` when unset. Resolved lazily from `docker inspect` and cached
    /// per container ID.
    pub async fn effective_user(&self, container_id: &str) -> anyhow::Result<String> {
        if let Some(user) = self.users.read().get(container_id).cloned() {
            return Ok(user);
        }

        let output = Command::new("docker")
            .args(["inspect", "-f", "{{.Config.User}}", container_id])
            .output()
            .await?;
        if !output.status.success() {
            anyhow::bail!(
                "docker inspect {container_id} failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        let user = String::from_utf8_lossy(&output.stdout).trim().to_owned();
        let user = if user.is_empty() { "root".to_owned() } else { user };
        self.users.write().insert(container_id.to_owned(), user.clone());
        Ok(user)
    }

    async fn query(&self, label_value: &str) -> anyhow::Result<String> {
        let filter = format!("label={}={label_value}", self.label_key);
        let output =
            Command::new("docker").args(["ps", "-q", "--filter", filter.as_str()]).output().await?;
        if !output.status.success() {
            anyhow::bail!(
                "docker ps failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let mut ids = stdout.lines().filter(|l| !l.trim().is_empty());
        let Some(first) = ids.next() else {
            return Err(anyhow::Error::new(NoContainerFound(filter)));
        };
        if ids.next().is_some() {
            tracing::warn!(filter, "multiple containers matched label, using first");
        }
        Ok(first.trim().to_owned())
    }

    async fn is_running(&self, container_id: &str) -> bool {
        let filter = format!("id={container_id}");
        let output = Command::new("docker")
            .args(["ps", "-q", "--no-trunc", "--filter", filter.as_str()])
            .output()
            .await;
        match output {
            Ok(out) if out.status.success() => {
                !String::from_utf8_lossy(&out.stdout).trim().is_empty()
            }
            _ => false,
        }
    }
}

#[cfg(test)]
#[path = "container_tests.rs"]
mod tests;
