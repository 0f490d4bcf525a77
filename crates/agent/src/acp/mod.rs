// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-workspace host for ACP agent sessions.

pub mod agent;
pub mod buffer;
pub mod rpc;
pub mod session;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::Serialize;

use crate::container::ContainerRuntime;
use crate::report::Reporter;
use crate::store::{AcpSessionRecord, Store};
use crate::workspace::events::EventRing;

pub use agent::AgentKind;
pub use session::{
    AcpAttachment, AcpEvent, AcpSession, AcpStatus, LaunchSpec, PrepareCommands, PromptError,
};

/// Timing and sizing knobs copied out of the agent config.
#[derive(Debug, Clone)]
pub struct AcpSettings {
    pub init_timeout: Duration,
    pub prompt_timeout: Duration,
    pub cancel_grace: Duration,
    pub reconnect_delay: Duration,
    pub max_restart_attempts: u32,
    pub message_buffer: usize,
    pub viewer_buffer: usize,
    pub max_sessions: usize,
}

/// Summary of one ACP session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcpSessionInfo {
    pub session_id: String,
    pub agent_type: String,
    pub status: String,
    pub persistent: bool,
    pub replay_count: usize,
}

/// Owner of `sessionId -> AcpSession` for one workspace.
pub struct AcpHost {
    workspace_id: String,
    /// Container label value identifying this workspace's devcontainer.
    label_value: String,
    container_workdir: String,
    settings: AcpSettings,
    containers: Arc<ContainerRuntime>,
    store: Arc<Store>,
    messages: Reporter,
    events: Arc<EventRing>,
    sessions: RwLock<HashMap<String, Arc<AcpSession>>>,
}

impl AcpHost {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        workspace_id: String,
        label_value: String,
        container_workdir: String,
        settings: AcpSettings,
        containers: Arc<ContainerRuntime>,
        store: Arc<Store>,
        messages: Reporter,
        events: Arc<EventRing>,
    ) -> Arc<Self> {
        Arc::new(Self {
            workspace_id,
            label_value,
            container_workdir,
            settings,
            containers,
            store,
            messages,
            events,
            sessions: RwLock::new(HashMap::new()),
        })
    }

    /// Register a session record without creating a process.
    pub fn register(
        &self,
        session_id: Option<String>,
        kind: AgentKind,
        persistent: bool,
    ) -> anyhow::Result<Arc<AcpSession>> {
        let session_id = session_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        {
            let sessions = self.sessions.read();
            if sessions.contains_key(&session_id) {
                anyhow::bail!("agent session {session_id} already exists");
            }
            if sessions.len() >= self.settings.max_sessions {
                anyhow::bail!("agent session limit reached for workspace {}", self.workspace_id);
            }
        }

        let session = AcpSession::new(
            session_id.clone(),
            self.workspace_id.clone(),
            kind,
            persistent,
            self.settings.clone(),
            self.messages.clone(),
            Arc::clone(&self.events),
        );
        self.sessions.write().insert(session_id.clone(), Arc::clone(&session));

        if persistent {
            self.store.upsert_acp_session(&AcpSessionRecord {
                session_id,
                workspace_id: self.workspace_id.clone(),
                agent_kind: kind.as_str().to_owned(),
                persistent,
            })?;
        }
        self.events.push("acp-register", &format!("agent session {} registered", session.id));
        Ok(session)
    }

    /// Recreate a persistent session after a process restart. The session
    /// resumes in `restarting` with a replay-boundary marker; its process
    /// is launched on the next start or prompt.
    pub fn resurrect(&self, record: &AcpSessionRecord) -> anyhow::Result<Arc<AcpSession>> {
        let kind = AgentKind::parse(&record.agent_kind)
            .ok_or_else(|| anyhow::anyhow!("unknown agent kind {:?}", record.agent_kind))?;
        let session = self.register(Some(record.session_id.clone()), kind, record.persistent)?;
        session.mark_resurrected();
        Ok(session)
    }

    /// Create the subprocess for a registered session (registering it on
    /// the fly when needed) and deliver the initial prompt once ready.
    pub async fn start(
        &self,
        session_id: &str,
        kind: AgentKind,
        initial_prompt: Option<String>,
    ) -> anyhow::Result<Arc<AcpSession>> {
        let session = match self.get(session_id) {
            Some(existing) => existing,
            None => self.register(Some(session_id.to_owned()), kind, false)?,
        };
        if session.is_running() {
            anyhow::bail!("agent session {session_id} already started");
        }

        let container_id = self.containers.container_id(&self.label_value).await?;
        let user = self.containers.effective_user(&container_id).await?;
        let profile = session.kind.profile();

        let mut command = vec![
            "docker".to_owned(),
            "exec".to_owned(),
            "-i".to_owned(),
            "-u".to_owned(),
            user,
            "-w".to_owned(),
            self.container_workdir.clone(),
            container_id.clone(),
        ];
        command.extend(profile.launch.iter().map(|s| (*s).to_owned()));

        let mut check = vec!["docker".to_owned(), "exec".to_owned(), container_id.clone()];
        check.extend(["which".to_owned(), profile.binary.to_owned()]);
        let mut install = vec![
            "docker".to_owned(),
            "exec".to_owned(),
            "-u".to_owned(),
            "root".to_owned(),
            container_id,
        ];
        install.extend(profile.install.iter().map(|s| (*s).to_owned()));

        session.start(
            LaunchSpec { command, prepare: Some(PrepareCommands { check, install }) },
            initial_prompt,
        );
        self.events.push("acp-start", &format!("agent session {} starting", session.id));
        Ok(session)
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<AcpSession>> {
        self.sessions.read().get(session_id).cloned()
    }

    pub fn list(&self) -> Vec<AcpSessionInfo> {
        self.sessions
            .read()
            .values()
            .map(|s| AcpSessionInfo {
                session_id: s.id.clone(),
                agent_type: s.kind.as_str().to_owned(),
                status: s.status().as_str().to_owned(),
                persistent: s.persistent,
                replay_count: s.replay_len(),
            })
            .collect()
    }

    /// Cancel an in-flight prompt.
    pub async fn cancel(&self, session_id: &str) -> anyhow::Result<bool> {
        let Some(session) = self.get(session_id) else {
            return Ok(false);
        };
        session.cancel_prompt().await?;
        Ok(true)
    }

    /// Stop and forget one session.
    pub async fn remove(&self, session_id: &str) -> bool {
        let removed = self.sessions.write().remove(session_id);
        let Some(session) = removed else {
            return false;
        };
        session.shutdown().await;
        if let Err(e) = self.store.delete_acp_session(session_id) {
            tracing::warn!(session_id, err = %e, "agent session record delete failed");
        }
        self.events.push("acp-remove", &format!("agent session {session_id} removed"));
        true
    }

    /// Stop every session: cancel + grace first, then kill. Used during
    /// workspace stop and node shutdown, ahead of PTY teardown.
    pub async fn shutdown_all(&self) {
        let sessions: Vec<_> = self.sessions.write().drain().map(|(_, s)| s).collect();
        for session in sessions {
            session.shutdown().await;
        }
    }
}
