// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace lifecycle and routing.
//!
//! Each workspace is an isolated runtime context on the shared host: a repo
//! checkout, one devcontainer, a PTY manager, an ACP host, and a bounded
//! event log. The manager owns the per-node table and enforces lifecycle
//! ordering during stop and shutdown: ACP sessions first (cancel + grace),
//! then PTYs, then the devcontainer.

pub mod events;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::acp::{AcpHost, AcpSettings};
use crate::bootstrap::{clone, devcontainer};
use crate::container::ContainerRuntime;
use crate::error::{ApiError, ApiFailure};
use crate::pty::{PtyManager, PtySettings};
use crate::report::Reporters;
use crate::store::Store;
use events::EventRing;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkspaceState {
    Creating,
    Ready,
    Stopping,
    Stopped,
    Error,
}

impl WorkspaceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Creating => "creating",
            Self::Ready => "ready",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Error => "error",
        }
    }
}

/// One isolated development context on this node.
pub struct Workspace {
    pub id: String,
    pub repository: String,
    pub branch: Option<String>,
    pub display_name: String,
    pub workspace_dir: PathBuf,
    /// Path inside the container; determined by the workspace dir basename.
    pub container_workdir: String,
    /// Container label value used for discovery.
    pub label_value: String,
    state: RwLock<WorkspaceState>,
    pub events: Arc<EventRing>,
    pub ptys: Arc<PtyManager>,
    pub acp: Arc<AcpHost>,
}

impl Workspace {
    pub fn state(&self) -> WorkspaceState {
        *self.state.read()
    }

    fn set_state(&self, state: WorkspaceState) {
        *self.state.write() = state;
        self.events.push("state", &format!("workspace {} -> {}", self.id, state.as_str()));
    }
}

/// Wire shape of a workspace.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceResponse {
    pub workspace_id: String,
    pub repository: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    pub display_name: String,
    pub workspace_dir: String,
    pub container_work_dir: String,
    pub state: String,
}

impl From<&Workspace> for WorkspaceResponse {
    fn from(ws: &Workspace) -> Self {
        Self {
            workspace_id: ws.id.clone(),
            repository: ws.repository.clone(),
            branch: ws.branch.clone(),
            display_name: ws.display_name.clone(),
            workspace_dir: ws.workspace_dir.to_string_lossy().into_owned(),
            container_work_dir: ws.container_workdir.clone(),
            state: ws.state().as_str().to_owned(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateWorkspace {
    #[serde(default)]
    pub workspace_id: Option<String>,
    pub repository: String,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    /// Accepted for parity with the provisioning API; recorded only.
    #[serde(default)]
    pub vm_size: Option<String>,
    /// Display-name collisions auto-suffix by default; disabling turns a
    /// collision into a conflict error.
    #[serde(default = "default_true")]
    pub auto_suffix: bool,
}

fn default_true() -> bool {
    true
}

/// Sizing knobs copied out of the agent config.
#[derive(Debug, Clone)]
pub struct WorkspaceSettings {
    pub base_dir: PathBuf,
    pub max_workspaces: usize,
    pub default_devcontainer_image: String,
    pub devcontainer_features: Option<String>,
    pub devcontainer_build_timeout: std::time::Duration,
    pub pty: PtySettings,
    pub acp: AcpSettings,
}

/// Per-node owner of the workspace table.
pub struct WorkspaceManager {
    settings: WorkspaceSettings,
    containers: Arc<ContainerRuntime>,
    store: Arc<Store>,
    reporters: Reporters,
    pub node_events: Arc<EventRing>,
    workspaces: RwLock<HashMap<String, Arc<Workspace>>>,
    node_stopping: AtomicBool,
}

impl WorkspaceManager {
    pub fn new(
        settings: WorkspaceSettings,
        containers: Arc<ContainerRuntime>,
        store: Arc<Store>,
        reporters: Reporters,
    ) -> Arc<Self> {
        Arc::new(Self {
            settings,
            containers,
            store,
            reporters,
            node_events: Arc::new(EventRing::default()),
            workspaces: RwLock::new(HashMap::new()),
            node_stopping: AtomicBool::new(false),
        })
    }

    /// Create a workspace and provision it in the background. Returns with
    /// state `creating`; the caller polls or watches events.
    pub fn create(self: &Arc<Self>, req: CreateWorkspace) -> anyhow::Result<Arc<Workspace>> {
        self.guard_node_running()?;
        let mut workspaces = self.workspaces.write();
        if workspaces.len() >= self.settings.max_workspaces {
            return Err(ApiFailure::new(
                ApiError::Conflict,
                format!("workspace limit ({}) reached", self.settings.max_workspaces),
            ));
        }
        let workspace_id = req.workspace_id.clone().unwrap_or_else(|| Uuid::new_v4().to_string());
        if workspaces.contains_key(&workspace_id) {
            return Err(ApiFailure::new(
                ApiError::Conflict,
                format!("workspace {workspace_id} already exists"),
            ));
        }

        let wanted = req
            .display_name
            .clone()
            .unwrap_or_else(|| clone::safe_repo_name(&req.repository));
        let taken: Vec<String> =
            workspaces.values().map(|w| normalize_display_name(&w.display_name)).collect();
        let display_name = resolve_display_name(&wanted, &taken, req.auto_suffix)?;

        let dir_base = clone::safe_repo_name(&req.repository);
        let taken_dirs: Vec<PathBuf> =
            workspaces.values().map(|w| w.workspace_dir.clone()).collect();
        let workspace_dir = unique_dir(&self.settings.base_dir, &dir_base, &taken_dirs);

        let workspace =
            self.build_workspace(&workspace_id, &req, display_name, workspace_dir, WorkspaceState::Creating);
        workspaces.insert(workspace_id.clone(), Arc::clone(&workspace));
        drop(workspaces);

        if let Some(ref vm_size) = req.vm_size {
            workspace.events.push("create", &format!("requested vm size {vm_size}"));
        }
        self.node_events.push("workspace-create", &format!("workspace {workspace_id} creating"));

        let manager = Arc::clone(self);
        let provision = Arc::clone(&workspace);
        tokio::spawn(async move {
            manager.provision(provision).await;
        });
        Ok(workspace)
    }

    /// Register an already-provisioned workspace (the bootstrap checkout).
    pub fn register_ready(
        self: &Arc<Self>,
        workspace_id: &str,
        repository: &str,
        branch: Option<&str>,
        workspace_dir: PathBuf,
    ) -> Arc<Workspace> {
        let req = CreateWorkspace {
            workspace_id: Some(workspace_id.to_owned()),
            repository: repository.to_owned(),
            branch: branch.map(str::to_owned),
            display_name: None,
            vm_size: None,
            auto_suffix: true,
        };
        let display_name = clone::safe_repo_name(repository);
        let workspace =
            self.build_workspace(workspace_id, &req, display_name, workspace_dir, WorkspaceState::Ready);
        self.workspaces.write().insert(workspace_id.to_owned(), Arc::clone(&workspace));
        self.node_events.push("workspace-ready", &format!("workspace {workspace_id} registered"));
        workspace
    }

    fn build_workspace(
        &self,
        workspace_id: &str,
        req: &CreateWorkspace,
        display_name: String,
        workspace_dir: PathBuf,
        state: WorkspaceState,
    ) -> Arc<Workspace> {
        let basename = workspace_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "workspace".to_owned());
        let container_workdir = format!("/workspaces/{basename}");
        let label_value = workspace_dir.to_string_lossy().into_owned();
        let events = Arc::new(EventRing::default());

        let ptys = PtyManager::new(
            workspace_id.to_owned(),
            label_value.clone(),
            container_workdir.clone(),
            self.settings.pty.clone(),
            Arc::clone(&self.containers),
        );
        let acp = AcpHost::new(
            workspace_id.to_owned(),
            label_value.clone(),
            container_workdir.clone(),
            self.settings.acp.clone(),
            Arc::clone(&self.containers),
            Arc::clone(&self.store),
            self.reporters.messages.clone(),
            Arc::clone(&events),
        );

        Arc::new(Workspace {
            id: workspace_id.to_owned(),
            repository: req.repository.clone(),
            branch: req.branch.clone(),
            display_name,
            workspace_dir,
            container_workdir,
            label_value,
            state: RwLock::new(state),
            events,
            ptys,
            acp,
        })
    }

    /// Background clone + devcontainer build for a new workspace.
    async fn provision(&self, workspace: Arc<Workspace>) {
        let result = async {
            clone::clone_repo(
                &workspace.repository,
                workspace.branch.as_deref(),
                &workspace.workspace_dir,
            )
            .await?;
            devcontainer::ensure_built(
                &workspace.workspace_dir,
                &self.settings.default_devcontainer_image,
                self.settings.devcontainer_features.as_deref(),
                self.settings.devcontainer_build_timeout,
            )
            .await?;
            self.containers.container_id(&workspace.label_value).await?;
            Ok::<(), anyhow::Error>(())
        }
        .await;

        match result {
            Ok(()) => workspace.set_state(WorkspaceState::Ready),
            Err(e) => {
                tracing::error!(workspace_id = %workspace.id, err = %e, "provisioning failed");
                workspace.events.push("error", &format!("provisioning failed: {e:#}"));
                workspace.set_state(WorkspaceState::Error);
            }
        }
    }

    pub fn get(&self, workspace_id: &str) -> anyhow::Result<Arc<Workspace>> {
        self.workspaces.read().get(workspace_id).cloned().ok_or_else(|| {
            ApiFailure::new(ApiError::NotFound, format!("workspace {workspace_id} not found"))
        })
    }

    pub fn list(&self) -> Vec<WorkspaceResponse> {
        self.workspaces.read().values().map(|w| WorkspaceResponse::from(w.as_ref())).collect()
    }

    /// Stop a workspace: ACP sessions first (cancel + grace), then PTYs,
    /// then the devcontainer. Files are preserved.
    pub async fn stop(&self, workspace_id: &str) -> anyhow::Result<()> {
        self.guard_node_running()?;
        let workspace = self.get(workspace_id)?;
        self.stop_children(&workspace).await;
        workspace.set_state(WorkspaceState::Stopped);
        self.node_events.push("workspace-stop", &format!("workspace {workspace_id} stopped"));
        Ok(())
    }

    /// Restart: stop children, then bring the devcontainer back up.
    pub async fn restart(&self, workspace_id: &str) -> anyhow::Result<()> {
        self.guard_node_running()?;
        let workspace = self.get(workspace_id)?;
        self.stop_children(&workspace).await;
        workspace.set_state(WorkspaceState::Creating);

        devcontainer::ensure_built(
            &workspace.workspace_dir,
            &self.settings.default_devcontainer_image,
            self.settings.devcontainer_features.as_deref(),
            self.settings.devcontainer_build_timeout,
        )
        .await?;
        self.containers.invalidate(&workspace.label_value);
        self.containers.container_id(&workspace.label_value).await?;
        workspace.set_state(WorkspaceState::Ready);
        Ok(())
    }

    /// Delete: stop everything, remove the devcontainer and the checkout.
    pub async fn delete(&self, workspace_id: &str) -> anyhow::Result<()> {
        let workspace = self.get(workspace_id)?;
        self.stop_children(&workspace).await;
        self.remove_container(&workspace, true).await;
        if workspace.workspace_dir.starts_with(&self.settings.base_dir) {
            if let Err(e) = tokio::fs::remove_dir_all(&workspace.workspace_dir).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(workspace_id, err = %e, "workspace dir removal failed");
                }
            }
        }
        self.workspaces.write().remove(workspace_id);
        self.node_events.push("workspace-delete", &format!("workspace {workspace_id} deleted"));
        Ok(())
    }

    /// Ordered child teardown shared by stop/restart/delete/shutdown.
    async fn stop_children(&self, workspace: &Arc<Workspace>) {
        workspace.set_state(WorkspaceState::Stopping);
        workspace.acp.shutdown_all().await;
        workspace.ptys.close_all().await;
        self.remove_container(workspace, false).await;
    }

    async fn remove_container(&self, workspace: &Arc<Workspace>, delete: bool) {
        let Ok(container_id) = self.containers.container_id(&workspace.label_value).await else {
            return;
        };
        let args: Vec<&str> = if delete {
            vec!["rm", "-f", container_id.as_str()]
        } else {
            vec!["stop", container_id.as_str()]
        };
        let result = tokio::process::Command::new("docker").args(&args).output().await;
        match result {
            Ok(out) if out.status.success() => {}
            Ok(out) => tracing::warn!(
                workspace_id = %workspace.id,
                stderr = %String::from_utf8_lossy(&out.stderr).trim(),
                "container teardown failed"
            ),
            Err(e) => tracing::warn!(workspace_id = %workspace.id, err = %e, "docker invocation failed"),
        }
        self.containers.invalidate(&workspace.label_value);
    }

    /// Node shutdown: mark stopping, then tear down every workspace in
    /// lifecycle order.
    pub async fn shutdown_node(&self) {
        self.node_stopping.store(true, Ordering::Release);
        let workspaces: Vec<Arc<Workspace>> =
            self.workspaces.read().values().cloned().collect();
        for workspace in workspaces {
            self.stop_children(&workspace).await;
            workspace.set_state(WorkspaceState::Stopped);
        }
    }

    pub fn is_stopping(&self) -> bool {
        self.node_stopping.load(Ordering::Acquire)
    }

    fn guard_node_running(&self) -> anyhow::Result<()> {
        if self.is_stopping() {
            return Err(ApiFailure::new(ApiError::NodeStopping, "node is shutting down"));
        }
        Ok(())
    }
}

/// Normalized form used for display-name uniqueness: lowercase, non-word
/// runs collapsed to single dashes.
pub fn normalize_display_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut dash_pending = false;
    for c in name.trim().chars() {
        if c.is_alphanumeric() {
            if dash_pending && !out.is_empty() {
                out.push('-');
            }
            dash_pending = false;
            out.extend(c.to_lowercase());
        } else {
            dash_pending = true;
        }
    }
    out
}

/// Pick a unique display name, auto-suffixing `-2`, `-3`, … on collision.
fn resolve_display_name(
    wanted: &str,
    taken_normalized: &[String],
    auto_suffix: bool,
) -> anyhow::Result<String> {
    let normalized = normalize_display_name(wanted);
    if normalized.is_empty() {
        return Err(ApiFailure::new(ApiError::BadRequest, "display name is empty"));
    }
    if !taken_normalized.contains(&normalized) {
        return Ok(wanted.trim().to_owned());
    }
    if !auto_suffix {
        return Err(ApiFailure::new(
            ApiError::Conflict,
            format!("display name {wanted:?} is already in use"),
        ));
    }
    for n in 2.. {
        let candidate = format!("{normalized}-{n}");
        if !taken_normalized.contains(&candidate) {
            return Ok(format!("{}-{n}", wanted.trim()));
        }
    }
    unreachable!()
}

/// Pick a checkout directory not used by another workspace.
fn unique_dir(base: &std::path::Path, name: &str, taken: &[PathBuf]) -> PathBuf {
    let candidate = base.join(name);
    if !taken.contains(&candidate) {
        return candidate;
    }
    for n in 2.. {
        let candidate = base.join(format!("{name}-{n}"));
        if !taken.contains(&candidate) {
            return candidate;
        }
    }
    unreachable!()
}

#[cfg(test)]
#[path = "workspace_tests.rs"]
mod tests;
