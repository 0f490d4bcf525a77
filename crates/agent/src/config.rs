// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Node agent configuration, loaded from CLI flags and environment.
//!
//! Every tunable lives here; the rest of the crate reads defaults through
//! the accessor methods instead of hard-coding values.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

/// On-node agent for control-plane managed workspaces.
#[derive(Debug, Clone, Parser)]
#[command(name = "sam-agent", version, about)]
pub struct Config {
    /// Control Plane base URL (e.g. https://app.example.com).
    #[arg(long, env = "CONTROL_PLANE_URL")]
    pub control_plane_url: String,

    /// Node identity issued by the Control Plane.
    #[arg(long, env = "NODE_ID")]
    pub node_id: String,

    /// Host address to bind to.
    #[arg(long, env = "VM_AGENT_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// HTTP port to listen on.
    #[arg(long, env = "VM_AGENT_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Comma-separated allowed WebSocket origins. Derived from the
    /// control-plane domain when unset.
    #[arg(long, env = "ALLOWED_ORIGINS")]
    pub allowed_origins: Option<String>,

    /// Expected JWT audience for management tokens.
    #[arg(long, env = "JWT_AUDIENCE", default_value = "workspace-terminal")]
    pub jwt_audience: String,

    /// Expected JWT issuer. Defaults to the control-plane URL.
    #[arg(long, env = "JWT_ISSUER")]
    pub jwt_issuer: Option<String>,

    /// JWKS endpoint. Defaults to {CONTROL_PLANE_URL}/.well-known/jwks.json.
    #[arg(long, env = "JWKS_URL")]
    pub jwks_url: Option<String>,

    /// Base directory for workspace checkouts on the host.
    #[arg(long, env = "WORKSPACE_BASE_DIR", default_value = "/workspace")]
    pub workspace_base_dir: PathBuf,

    /// Agent state directory (bootstrap state, embedded database).
    #[arg(long, env = "STATE_DIR", default_value = "/var/lib/sam-agent")]
    pub state_dir: PathBuf,

    // -- Bootstrap ------------------------------------------------------------
    /// Single-use bootstrap token to redeem against the Control Plane.
    #[arg(long, env = "BOOTSTRAP_TOKEN")]
    pub bootstrap_token: Option<String>,

    /// Repository URL to clone during bootstrap.
    #[arg(long, env = "REPOSITORY")]
    pub repository: Option<String>,

    /// Branch to check out during bootstrap.
    #[arg(long, env = "BRANCH")]
    pub branch: Option<String>,

    /// Maximum time for the whole bootstrap pipeline, in seconds.
    #[arg(long, env = "BOOTSTRAP_MAX_WAIT", default_value_t = 300)]
    pub bootstrap_max_wait_secs: u64,

    /// Devcontainer build timeout in seconds.
    #[arg(long, env = "DEVCONTAINER_BUILD_TIMEOUT", default_value_t = 1200)]
    pub devcontainer_build_timeout_secs: u64,

    /// Image used when a repository has no devcontainer configuration.
    #[arg(
        long,
        env = "DEFAULT_DEVCONTAINER_IMAGE",
        default_value = "mcr.microsoft.com/devcontainers/base:ubuntu"
    )]
    pub default_devcontainer_image: String,

    /// Additional-features JSON passed to the build tool for synthesized
    /// devcontainers only.
    #[arg(long, env = "DEVCONTAINER_FEATURES")]
    pub devcontainer_features: Option<String>,

    // -- Container ------------------------------------------------------------
    /// Label key used to locate a workspace's devcontainer.
    #[arg(long, env = "CONTAINER_LABEL_KEY", default_value = "devcontainer.local_folder")]
    pub container_label_key: String,

    /// Container discovery cache TTL in seconds.
    #[arg(long, env = "CONTAINER_CACHE_TTL", default_value_t = 30)]
    pub container_cache_ttl_secs: u64,

    /// Default shell spawned for new terminals.
    #[arg(long, env = "DEFAULT_SHELL", default_value = "/bin/bash")]
    pub default_shell: String,

    // -- Sessions -------------------------------------------------------------
    /// PTY output ring buffer capacity in bytes.
    #[arg(long, env = "PTY_OUTPUT_BUFFER_SIZE", default_value_t = 262_144)]
    pub pty_output_buffer_size: usize,

    /// Seconds a PTY session may sit with no viewer before it is reaped.
    /// Zero disables the reaper.
    #[arg(long, env = "PTY_ORPHAN_GRACE_PERIOD", default_value_t = 0)]
    pub pty_orphan_grace_secs: u64,

    /// ACP agent init timeout in milliseconds.
    #[arg(long, env = "ACP_INIT_TIMEOUT", default_value_t = 30_000)]
    pub acp_init_timeout_ms: u64,

    /// Delay between ACP agent restart attempts, in milliseconds.
    #[arg(long, env = "ACP_RECONNECT_DELAY", default_value_t = 1000)]
    pub acp_reconnect_delay_ms: u64,

    /// Maximum ACP agent restart attempts before the session errors out.
    #[arg(long, env = "ACP_MAX_RESTART_ATTEMPTS", default_value_t = 3)]
    pub acp_max_restart_attempts: u32,

    /// ACP prompt timeout in seconds.
    #[arg(long, env = "ACP_PROMPT_TIMEOUT", default_value_t = 3600)]
    pub acp_prompt_timeout_secs: u64,

    /// Grace after an ACP cancel before the agent process is killed, in
    /// milliseconds.
    #[arg(long, env = "ACP_PROMPT_CANCEL_GRACE_PERIOD", default_value_t = 10_000)]
    pub acp_prompt_cancel_grace_ms: u64,

    /// Bounded ACP message log capacity (entries).
    #[arg(long, env = "ACP_MESSAGE_BUFFER_SIZE", default_value_t = 5000)]
    pub acp_message_buffer_size: usize,

    /// Per-viewer send buffer capacity (messages).
    #[arg(long, env = "ACP_VIEWER_SEND_BUFFER", default_value_t = 256)]
    pub acp_viewer_send_buffer: usize,

    /// WebSocket ping interval in seconds.
    #[arg(long, env = "ACP_PING_INTERVAL", default_value_t = 30)]
    pub acp_ping_interval_secs: u64,

    /// WebSocket pong timeout in seconds.
    #[arg(long, env = "ACP_PONG_TIMEOUT", default_value_t = 10)]
    pub acp_pong_timeout_secs: u64,

    /// Maximum workspaces on this node.
    #[arg(long, env = "MAX_WORKSPACES", default_value_t = 8)]
    pub max_workspaces: usize,

    /// Maximum PTY + ACP sessions per workspace.
    #[arg(long, env = "MAX_SESSIONS_PER_WORKSPACE", default_value_t = 32)]
    pub max_sessions_per_workspace: usize,

    // -- Logs -----------------------------------------------------------------
    /// Systemd unit the agent's own journal entries are scoped to.
    #[arg(long, env = "AGENT_JOURNAL_UNIT", default_value = "sam-agent")]
    pub journal_unit: String,

    /// Per-invocation log reader timeout in seconds.
    #[arg(long, env = "LOG_READER_TIMEOUT", default_value_t = 30)]
    pub log_reader_timeout_secs: u64,

    /// Entries delivered during stream catch-up.
    #[arg(long, env = "LOG_STREAM_BUFFER_SIZE", default_value_t = 100)]
    pub log_stream_buffer_size: usize,

    /// Default page size for log reads.
    #[arg(long, env = "LOG_PAGE_DEFAULT_LIMIT", default_value_t = 100)]
    pub log_page_default_limit: usize,

    /// Maximum page size for log reads.
    #[arg(long, env = "LOG_PAGE_MAX_LIMIT", default_value_t = 1000)]
    pub log_page_max_limit: usize,

    // -- Files ----------------------------------------------------------------
    /// Maximum entries returned by a file listing.
    #[arg(long, env = "FILE_LIST_LIMIT", default_value_t = 1000)]
    pub file_list_limit: usize,

    /// Maximum matches returned by a file find.
    #[arg(long, env = "FILE_FIND_LIMIT", default_value_t = 500)]
    pub file_find_limit: usize,

    // -- Reporters ------------------------------------------------------------
    /// Heartbeat interval in seconds.
    #[arg(long, env = "HEARTBEAT_INTERVAL", default_value_t = 60)]
    pub heartbeat_interval_secs: u64,

    /// Maximum wait between outbox flushes, in milliseconds.
    #[arg(long, env = "MSG_BATCH_MAX_WAIT", default_value_t = 2000)]
    pub msg_batch_max_wait_ms: u64,

    /// Maximum rows per outbox batch.
    #[arg(long, env = "MSG_BATCH_MAX_SIZE", default_value_t = 50)]
    pub msg_batch_max_size: usize,

    /// Maximum payload bytes per outbox batch.
    #[arg(long, env = "MSG_BATCH_MAX_BYTES", default_value_t = 65_536)]
    pub msg_batch_max_bytes: usize,

    /// Maximum rows an outbox may hold before enqueue fails.
    #[arg(long, env = "MSG_OUTBOX_MAX_SIZE", default_value_t = 10_000)]
    pub msg_outbox_max_size: usize,

    /// Initial retry backoff for failed batch posts, in milliseconds.
    #[arg(long, env = "MSG_RETRY_INITIAL", default_value_t = 1000)]
    pub msg_retry_initial_ms: u64,

    /// Retry backoff ceiling, in milliseconds.
    #[arg(long, env = "MSG_RETRY_MAX", default_value_t = 30_000)]
    pub msg_retry_max_ms: u64,

    /// Total time budget for retrying one batch, in seconds.
    #[arg(long, env = "MSG_RETRY_MAX_ELAPSED", default_value_t = 300)]
    pub msg_retry_max_elapsed_secs: u64,

    // -- HTTP server ----------------------------------------------------------
    /// Per-request timeout in seconds.
    #[arg(long, env = "HTTP_REQUEST_TIMEOUT", default_value_t = 30)]
    pub http_request_timeout_secs: u64,

    /// Log format (json or text).
    #[arg(long, env = "LOG_FORMAT", default_value = "json")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Config {
    /// Validate the configuration after parsing.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.control_plane_url.trim().is_empty() {
            anyhow::bail!("CONTROL_PLANE_URL must not be empty");
        }
        if !self.control_plane_url.starts_with("http://")
            && !self.control_plane_url.starts_with("https://")
        {
            anyhow::bail!("CONTROL_PLANE_URL must be an http(s) URL");
        }
        if self.node_id.trim().is_empty() {
            anyhow::bail!("NODE_ID must not be empty");
        }
        if self.pty_output_buffer_size == 0 {
            anyhow::bail!("PTY_OUTPUT_BUFFER_SIZE must be greater than zero");
        }
        if self.acp_message_buffer_size == 0 || self.acp_viewer_send_buffer == 0 {
            anyhow::bail!("ACP buffer sizes must be greater than zero");
        }
        if self.msg_batch_max_size == 0 || self.msg_outbox_max_size == 0 {
            anyhow::bail!("outbox batch and capacity sizes must be greater than zero");
        }
        if self.log_page_default_limit > self.log_page_max_limit {
            anyhow::bail!("LOG_PAGE_DEFAULT_LIMIT must not exceed LOG_PAGE_MAX_LIMIT");
        }
        Ok(())
    }

    /// Control-plane URL with any trailing slash removed.
    pub fn control_plane_base(&self) -> &str {
        self.control_plane_url.trim_end_matches('/')
    }

    /// Expected JWT issuer (explicit or derived from the control-plane URL).
    pub fn jwt_issuer(&self) -> String {
        self.jwt_issuer.clone().unwrap_or_else(|| self.control_plane_base().to_owned())
    }

    /// JWKS endpoint (explicit or derived from the control-plane URL).
    pub fn jwks_url(&self) -> String {
        self.jwks_url
            .clone()
            .unwrap_or_else(|| format!("{}/.well-known/jwks.json", self.control_plane_base()))
    }

    /// Origins accepted for WebSocket upgrades.
    ///
    /// When `ALLOWED_ORIGINS` is unset this is the control-plane origin plus
    /// a `*.` wildcard over its base domain.
    pub fn allowed_origins(&self) -> Vec<String> {
        if let Some(ref raw) = self.allowed_origins {
            return raw
                .split(',')
                .map(|s| s.trim().trim_end_matches('/').to_owned())
                .filter(|s| !s.is_empty())
                .collect();
        }

        let origin = self.control_plane_base().to_owned();
        let mut origins = vec![origin];
        if let Some(domain) = base_domain(self.control_plane_base()) {
            origins.push(format!("*.{domain}"));
        }
        origins
    }

    pub fn bootstrap_max_wait(&self) -> Duration {
        Duration::from_secs(self.bootstrap_max_wait_secs)
    }

    pub fn devcontainer_build_timeout(&self) -> Duration {
        Duration::from_secs(self.devcontainer_build_timeout_secs)
    }

    pub fn container_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.container_cache_ttl_secs)
    }

    pub fn pty_orphan_grace(&self) -> Option<Duration> {
        (self.pty_orphan_grace_secs > 0).then(|| Duration::from_secs(self.pty_orphan_grace_secs))
    }

    pub fn acp_init_timeout(&self) -> Duration {
        Duration::from_millis(self.acp_init_timeout_ms)
    }

    pub fn acp_reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.acp_reconnect_delay_ms)
    }

    pub fn acp_prompt_timeout(&self) -> Duration {
        Duration::from_secs(self.acp_prompt_timeout_secs)
    }

    pub fn acp_prompt_cancel_grace(&self) -> Duration {
        Duration::from_millis(self.acp_prompt_cancel_grace_ms)
    }

    pub fn acp_ping_interval(&self) -> Duration {
        Duration::from_secs(self.acp_ping_interval_secs)
    }

    pub fn acp_pong_timeout(&self) -> Duration {
        Duration::from_secs(self.acp_pong_timeout_secs)
    }

    pub fn log_reader_timeout(&self) -> Duration {
        Duration::from_secs(self.log_reader_timeout_secs)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn msg_batch_max_wait(&self) -> Duration {
        Duration::from_millis(self.msg_batch_max_wait_ms)
    }

    pub fn msg_retry_initial(&self) -> Duration {
        Duration::from_millis(self.msg_retry_initial_ms)
    }

    pub fn msg_retry_max(&self) -> Duration {
        Duration::from_millis(self.msg_retry_max_ms)
    }

    pub fn msg_retry_max_elapsed(&self) -> Duration {
        Duration::from_secs(self.msg_retry_max_elapsed_secs)
    }

    pub fn http_request_timeout(&self) -> Duration {
        Duration::from_secs(self.http_request_timeout_secs)
    }

    /// Path of the bootstrap state file.
    pub fn bootstrap_state_path(&self) -> PathBuf {
        self.state_dir.join("bootstrap-state.json")
    }

    /// Path of the embedded database file.
    pub fn store_path(&self) -> PathBuf {
        self.state_dir.join("state.db")
    }
}

/// Extract the registrable-ish base domain of an http(s) URL: the host with
/// its first label removed when it has three or more labels, otherwise the
/// host itself. Ports and paths are ignored; IP literals return `None`.
pub fn base_domain(url: &str) -> Option<String> {
    let rest = url.strip_prefix("https://").or_else(|| url.strip_prefix("http://"))?;
    let host = rest.split(['/', ':']).next()?;
    if host.is_empty() || host.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return None;
    }
    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() >= 3 {
        Some(labels[1..].join("."))
    } else if labels.len() == 2 {
        Some(host.to_owned())
    } else {
        None
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
