// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One-shot node readiness pipeline.
//!
//! Stages run in order — redeem, clone, devcontainer build, credential
//! helper install, ready callback — and each persists its completion flag
//! only after the effect is observed, so re-running after a crash
//! converges without repeating irreversible work.

pub mod clone;
pub mod credhelper;
pub mod devcontainer;
pub mod state;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use serde::Deserialize;
use uuid::Uuid;

use crate::config::Config;
use crate::container::ContainerRuntime;
use crate::report::backoff::Backoff;
use crate::report::heartbeat::CallbackToken;
use crate::report::Reporters;

pub use state::BootstrapState;

/// Attempts for the ready callback before declaring provisioning failed.
const READY_MAX_ATTEMPTS: u32 = 10;

/// What bootstrap established, for wiring the initial workspace.
#[derive(Debug, Default, Clone)]
pub struct BootstrapOutcome {
    pub workspace_id: Option<String>,
    pub workspace_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct RedeemResponse {
    #[serde(rename = "workspaceId")]
    workspace_id: String,
    #[serde(rename = "callbackToken")]
    callback_token: String,
    #[serde(rename = "controlPlaneUrl")]
    #[allow(dead_code)]
    control_plane_url: Option<String>,
}

pub struct Bootstrap {
    config: Config,
    http: reqwest::Client,
    reporters: Reporters,
    containers: Arc<ContainerRuntime>,
    callback_token: CallbackToken,
    state_path: PathBuf,
    state: BootstrapState,
}

impl Bootstrap {
    pub fn new(
        config: Config,
        reporters: Reporters,
        containers: Arc<ContainerRuntime>,
        callback_token: CallbackToken,
    ) -> anyhow::Result<Self> {
        let state_path = config.bootstrap_state_path();
        let state = BootstrapState::load(&state_path)?;
        Ok(Self {
            config,
            http: reqwest::Client::new(),
            reporters,
            containers,
            callback_token,
            state_path,
            state,
        })
    }

    /// Run the pipeline to completion, bounded by the configured maximum
    /// wait. A failure is reported to the provisioning-failed endpoint
    /// before propagating.
    pub async fn run(mut self) -> anyhow::Result<BootstrapOutcome> {
        // Credentials from a previous run are published immediately so
        // reporters and the heartbeat work before (and without) re-running.
        self.publish_credentials();

        if self.state.is_complete() {
            tracing::info!("bootstrap already complete");
            return Ok(self.outcome());
        }

        let max_wait = self.config.bootstrap_max_wait();
        let result = tokio::time::timeout(max_wait, self.run_stages()).await;
        let result = match result {
            Ok(result) => result,
            Err(_) => Err(anyhow::anyhow!("bootstrap exceeded maximum wait {max_wait:?}")),
        };

        match result {
            Ok(()) => Ok(self.outcome()),
            Err(e) => {
                self.boot_log("error", "bootstrap", &format!("bootstrap failed: {e:#}"));
                self.report_provisioning_failed(&format!("{e:#}")).await;
                Err(e)
            }
        }
    }

    fn outcome(&self) -> BootstrapOutcome {
        BootstrapOutcome {
            workspace_id: self.state.workspace_id.clone(),
            workspace_dir: self
                .config
                .repository
                .as_deref()
                .map(|r| self.config.workspace_base_dir.join(clone::safe_repo_name(r))),
        }
    }

    async fn run_stages(&mut self) -> anyhow::Result<()> {
        if !self.state.redeemed {
            if self.config.bootstrap_token.is_none() {
                tracing::info!("no bootstrap token configured, skipping bootstrap");
                return Ok(());
            }
            self.redeem().await?;
        }

        let repository = self
            .config
            .repository
            .clone()
            .context("REPOSITORY is required to provision the workspace")?;
        let workspace_dir =
            self.config.workspace_base_dir.join(clone::safe_repo_name(&repository));

        if !self.state.repo_cloned {
            self.boot_log("info", "clone", &format!("cloning {repository}"));
            clone::clone_repo(&repository, self.config.branch.as_deref(), &workspace_dir)
                .await
                .context("repository clone failed")?;
            self.state.repo_cloned = true;
            self.state.save(&self.state_path)?;
            self.boot_log("info", "clone", "repository checkout ready");
        }

        if !self.state.devcontainer_ready {
            self.boot_log("info", "devcontainer", "building devcontainer");
            devcontainer::ensure_built(
                &workspace_dir,
                &self.config.default_devcontainer_image,
                self.config.devcontainer_features.as_deref(),
                self.config.devcontainer_build_timeout(),
            )
            .await
            .context("devcontainer build failed")?;
            // The build labels the container; observing it via discovery is
            // the stage's completion condition.
            self.containers
                .container_id(&workspace_dir.to_string_lossy())
                .await
                .context("devcontainer not discoverable after build")?;
            self.state.devcontainer_ready = true;
            self.state.save(&self.state_path)?;
            self.boot_log("info", "devcontainer", "devcontainer ready");
        }

        if !self.state.credential_helper_installed {
            let token = self
                .state
                .callback_token
                .clone()
                .context("callback token missing before credential helper install")?;
            let container_id =
                self.containers.container_id(&workspace_dir.to_string_lossy()).await?;
            self.boot_log("info", "credential-helper", "installing git credential helper");
            credhelper::install(&container_id, self.config.port, &token)
                .await
                .context("credential helper install failed")?;
            self.state.credential_helper_installed = true;
            self.state.save(&self.state_path)?;
        }

        if !self.state.ready_reported {
            self.report_ready().await?;
            self.state.ready_reported = true;
            self.state.save(&self.state_path)?;
            self.boot_log("info", "ready", "node reported ready");
        }

        Ok(())
    }

    /// Redeem the single-use bootstrap token. A 404 is permanent: the
    /// token was already consumed or never existed.
    async fn redeem(&mut self) -> anyhow::Result<()> {
        let token = self.config.bootstrap_token.clone().context("bootstrap token missing")?;
        let url = format!("{}/api/bootstrap/{token}", self.config.control_plane_base());
        self.boot_log("info", "redeem", "redeeming bootstrap token");

        let resp = self.http.post(&url).send().await.context("bootstrap redeem request failed")?;
        if resp.status().as_u16() == 404 {
            anyhow::bail!("bootstrap token rejected (404): token is invalid or already used");
        }
        if !resp.status().is_success() {
            anyhow::bail!("bootstrap redeem failed with status {}", resp.status());
        }
        let redeemed: RedeemResponse =
            resp.json().await.context("bootstrap redeem response malformed")?;

        self.state.redeemed = true;
        self.state.workspace_id = Some(redeemed.workspace_id);
        self.state.callback_token = Some(redeemed.callback_token);
        self.state.save(&self.state_path)?;
        self.publish_credentials();
        self.boot_log("info", "redeem", "bootstrap token redeemed");
        Ok(())
    }

    /// Push the workspace id + callback token into the reporters and the
    /// shared token holder.
    fn publish_credentials(&self) {
        if let Some(ref ws) = self.state.workspace_id {
            self.reporters.set_workspace(ws);
        }
        if let Some(ref token) = self.state.callback_token {
            self.reporters.set_token(token);
            *self.callback_token.write() = Some(token.clone());
        }
    }

    /// The ready callback is the control plane's sole signal for advancing
    /// its pipeline, so it is retried with backoff before giving up.
    async fn report_ready(&self) -> anyhow::Result<()> {
        let workspace_id =
            self.state.workspace_id.clone().context("workspace id missing before ready report")?;
        let token = self
            .state
            .callback_token
            .clone()
            .context("callback token missing before ready report")?;
        let url = format!(
            "{}/api/workspaces/{workspace_id}/ready",
            self.config.control_plane_base()
        );
        let body = serde_json::json!({ "status": "running" });

        let mut backoff =
            Backoff::new(self.config.msg_retry_initial(), self.config.msg_retry_max());
        for attempt in 1..=READY_MAX_ATTEMPTS {
            match self.http.post(&url).bearer_auth(&token).json(&body).send().await {
                Ok(resp) if resp.status().is_success() => return Ok(()),
                Ok(resp) => {
                    tracing::warn!(attempt, status = resp.status().as_u16(), "ready callback rejected");
                }
                Err(e) => tracing::warn!(attempt, err = %e, "ready callback failed"),
            }
            if attempt < READY_MAX_ATTEMPTS {
                tokio::time::sleep(backoff.next_delay()).await;
            }
        }
        anyhow::bail!("ready callback failed after {READY_MAX_ATTEMPTS} attempts")
    }

    async fn report_provisioning_failed(&self, error: &str) {
        let (Some(workspace_id), Some(token)) =
            (self.state.workspace_id.clone(), self.state.callback_token.clone())
        else {
            return;
        };
        let url = format!(
            "{}/api/workspaces/{workspace_id}/provisioning-failed",
            self.config.control_plane_base()
        );
        let body = serde_json::json!({ "error": error });
        if let Err(e) = self.http.post(&url).bearer_auth(&token).json(&body).send().await {
            tracing::warn!(err = %e, "provisioning-failed report did not reach the control plane");
        }
    }

    /// Structured boot-log entry, flushed asynchronously by the reporter.
    fn boot_log(&self, level: &str, stage: &str, message: &str) {
        let entry = serde_json::json!({
            "level": level,
            "stage": stage,
            "message": message,
            "at": chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        });
        if let Err(e) = self.reporters.boot_log.enqueue(&Uuid::new_v4().to_string(), &entry) {
            tracing::warn!(err = %e, "boot log enqueue failed");
        }
        match level {
            "error" => tracing::error!(stage, "{message}"),
            "warn" => tracing::warn!(stage, "{message}"),
            _ => tracing::info!(stage, "{message}"),
        }
    }
}

#[cfg(test)]
#[path = "bootstrap_tests.rs"]
mod tests;
