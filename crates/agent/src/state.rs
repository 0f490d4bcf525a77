// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared application state passed to all handlers via the axum `State`
//! extractor. Everything lifecycle-managed lives here and is wired up once
//! in [`crate::run`].

use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use crate::acp::AcpSettings;
use crate::config::Config;
use crate::container::ContainerRuntime;
use crate::logs::{LogReader, LogSettings};
use crate::pty::PtySettings;
use crate::report::heartbeat::CallbackToken;
use crate::report::{Reporters, ReporterSettings};
use crate::store::Store;
use crate::workspace::{WorkspaceManager, WorkspaceSettings};
use crate::ws::auth::{AuthSettings, JwtVerifier};

pub struct AppState {
    pub config: Config,
    pub store: Arc<Store>,
    pub containers: Arc<ContainerRuntime>,
    pub workspaces: Arc<WorkspaceManager>,
    pub reporters: Reporters,
    pub verifier: Arc<JwtVerifier>,
    /// Per-workspace callback bearer, filled in by bootstrap.
    pub callback_token: CallbackToken,
    /// Workspace this node was bootstrapped for, once known.
    pub node_workspace_id: RwLock<Option<String>>,
    pub logs: Arc<LogReader>,
    pub shutdown: CancellationToken,
    pub started_at: Instant,
}

impl AppState {
    /// Wire every subsystem from the loaded config.
    pub fn new(config: Config, store: Arc<Store>) -> Arc<Self> {
        let containers = Arc::new(ContainerRuntime::new(
            config.container_label_key.clone(),
            config.container_cache_ttl(),
        ));

        let reporter_settings = ReporterSettings {
            batch_max_wait: config.msg_batch_max_wait(),
            batch_max_size: config.msg_batch_max_size,
            batch_max_bytes: config.msg_batch_max_bytes,
            outbox_max_size: config.msg_outbox_max_size,
            retry_initial: config.msg_retry_initial(),
            retry_max: config.msg_retry_max(),
            retry_max_elapsed: config.msg_retry_max_elapsed(),
        };
        let reporters =
            Reporters::spawn(&store, config.control_plane_base(), &reporter_settings);

        let workspace_settings = WorkspaceSettings {
            base_dir: config.workspace_base_dir.clone(),
            max_workspaces: config.max_workspaces,
            default_devcontainer_image: config.default_devcontainer_image.clone(),
            devcontainer_features: config.devcontainer_features.clone(),
            devcontainer_build_timeout: config.devcontainer_build_timeout(),
            pty: PtySettings {
                default_shell: config.default_shell.clone(),
                ring_capacity: config.pty_output_buffer_size,
                orphan_grace: config.pty_orphan_grace(),
                max_sessions: config.max_sessions_per_workspace,
            },
            acp: AcpSettings {
                init_timeout: config.acp_init_timeout(),
                prompt_timeout: config.acp_prompt_timeout(),
                cancel_grace: config.acp_prompt_cancel_grace(),
                reconnect_delay: config.acp_reconnect_delay(),
                max_restart_attempts: config.acp_max_restart_attempts,
                message_buffer: config.acp_message_buffer_size,
                viewer_buffer: config.acp_viewer_send_buffer,
                max_sessions: config.max_sessions_per_workspace,
            },
        };
        let workspaces = WorkspaceManager::new(
            workspace_settings,
            Arc::clone(&containers),
            Arc::clone(&store),
            reporters.clone(),
        );

        let verifier = Arc::new(JwtVerifier::new(AuthSettings {
            jwks_url: config.jwks_url(),
            issuer: config.jwt_issuer(),
            audience: config.jwt_audience.clone(),
        }));

        let logs = Arc::new(LogReader::new(
            LogSettings {
                unit: config.journal_unit.clone(),
                reader_timeout: config.log_reader_timeout(),
                page_default_limit: config.log_page_default_limit,
                page_max_limit: config.log_page_max_limit,
                stream_buffer: config.log_stream_buffer_size,
                cloud_init_paths: vec![],
            }
            .with_default_cloud_init(),
        ));

        Arc::new(Self {
            config,
            store,
            containers,
            workspaces,
            reporters,
            verifier,
            callback_token: Arc::new(RwLock::new(None)),
            node_workspace_id: RwLock::new(None),
            logs,
            shutdown: CancellationToken::new(),
            started_at: Instant::now(),
        })
    }
}
