// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Terminal sessions multiplexed into a workspace's devcontainer.

pub mod ring;
pub mod session;
pub mod spawn;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::container::ContainerRuntime;

pub use session::{AttachError, Attachment, PtyOutput, PtySession};
pub use spawn::ExitStatus;

/// How often the orphan reaper scans sessions.
const REAP_INTERVAL: Duration = Duration::from_secs(10);

/// Summary of one terminal session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PtySessionInfo {
    pub session_id: String,
    pub workspace_id: String,
    pub cols: u16,
    pub rows: u16,
    pub attached: bool,
    pub exited: bool,
}

/// Sizing and environment knobs copied out of the agent config.
#[derive(Debug, Clone)]
pub struct PtySettings {
    pub default_shell: String,
    pub ring_capacity: usize,
    pub orphan_grace: Option<Duration>,
    pub max_sessions: usize,
}

/// Per-workspace owner of `sessionId -> PtySession`.
pub struct PtyManager {
    workspace_id: String,
    /// Container label value identifying this workspace's devcontainer.
    label_value: String,
    container_workdir: String,
    settings: PtySettings,
    containers: Arc<ContainerRuntime>,
    sessions: RwLock<HashMap<String, Arc<PtySession>>>,
    cancel: CancellationToken,
}

impl PtyManager {
    pub fn new(
        workspace_id: String,
        label_value: String,
        container_workdir: String,
        settings: PtySettings,
        containers: Arc<ContainerRuntime>,
    ) -> Arc<Self> {
        let manager = Arc::new(Self {
            workspace_id,
            label_value,
            container_workdir,
            settings,
            containers,
            sessions: RwLock::new(HashMap::new()),
            cancel: CancellationToken::new(),
        });
        if manager.settings.orphan_grace.is_some() {
            let reaper = Arc::clone(&manager);
            tokio::spawn(reaper.reap_orphans());
        }
        manager
    }

    /// Create a new terminal session inside the devcontainer.
    pub async fn create(
        &self,
        cols: u16,
        rows: u16,
        shell: Option<String>,
    ) -> anyhow::Result<Arc<PtySession>> {
        if self.sessions.read().len() >= self.settings.max_sessions {
            anyhow::bail!("session limit reached for workspace {}", self.workspace_id);
        }

        let container_id = self.containers.container_id(&self.label_value).await?;
        let user = self.containers.effective_user(&container_id).await?;
        let shell = shell.unwrap_or_else(|| self.settings.default_shell.clone());

        let command = vec![
            "docker".to_owned(),
            "exec".to_owned(),
            "-it".to_owned(),
            "-u".to_owned(),
            user,
            "-w".to_owned(),
            self.container_workdir.clone(),
            container_id,
            shell,
        ];

        let session_id = Uuid::new_v4().to_string();
        let session = PtySession::spawn(
            session_id.clone(),
            self.workspace_id.clone(),
            &command,
            cols,
            rows,
            self.settings.ring_capacity,
        )?;
        self.sessions.write().insert(session_id, Arc::clone(&session));
        tracing::info!(
            workspace_id = %self.workspace_id,
            session_id = %session.id,
            "terminal session created"
        );
        Ok(session)
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<PtySession>> {
        self.sessions.read().get(session_id).cloned()
    }

    pub fn list(&self) -> Vec<PtySessionInfo> {
        self.sessions
            .read()
            .values()
            .map(|s| {
                let (cols, rows) = s.size();
                PtySessionInfo {
                    session_id: s.id.clone(),
                    workspace_id: s.workspace_id.clone(),
                    cols,
                    rows,
                    attached: s.has_viewer(),
                    exited: s.is_exited(),
                }
            })
            .collect()
    }

    /// Close one session and remove it from the map.
    pub async fn close(&self, session_id: &str) -> bool {
        let removed = self.sessions.write().remove(session_id);
        match removed {
            Some(session) => {
                session.close().await;
                true
            }
            None => false,
        }
    }

    /// Close every session. Used during workspace stop and node shutdown.
    pub async fn close_all(&self) {
        self.cancel.cancel();
        let sessions: Vec<_> = self.sessions.write().drain().map(|(_, s)| s).collect();
        for session in sessions {
            session.close().await;
        }
    }

    async fn reap_orphans(self: Arc<Self>) {
        let Some(grace) = self.settings.orphan_grace else {
            return;
        };
        let mut tick = tokio::time::interval(REAP_INTERVAL);
        loop {
            tokio::select! {
                _ = tick.tick() => {}
                () = self.cancel.cancelled() => return,
            }
            let stale: Vec<String> = self
                .sessions
                .read()
                .values()
                .filter(|s| s.orphaned_for().is_some_and(|idle| idle >= grace))
                .map(|s| s.id.clone())
                .collect();
            for session_id in stale {
                tracing::info!(session_id, "closing orphaned terminal session");
                self.close(&session_id).await;
            }
        }
    }
}
