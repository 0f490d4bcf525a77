// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One ACP session: an AI-agent subprocess driven over JSON-RPC stdio,
//! with an ordered replay buffer and broadcast fan-out to viewers.
//!
//! The supervisor task owns the child process across restarts. Appends to
//! the message log and the broadcast send happen under the log lock, so a
//! viewer that snapshots and subscribes under the same lock sees every
//! frame exactly once, in order.

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::{broadcast, mpsc, Notify};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::report::Reporter;
use crate::workspace::events::EventRing;

use super::agent::AgentKind;
use super::buffer::MessageLog;
use super::rpc;
use super::AcpSettings;

/// Session status. Transitions are monotonic except `ready <-> prompting`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AcpStatus {
    Starting,
    Installing,
    Ready,
    Prompting,
    Error,
    Restarting,
}

impl AcpStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Installing => "installing",
            Self::Ready => "ready",
            Self::Prompting => "prompting",
            Self::Error => "error",
            Self::Restarting => "restarting",
        }
    }
}

/// Fan-out event delivered to every attached viewer.
#[derive(Debug, Clone)]
pub enum AcpEvent {
    /// A JSON-RPC frame from the agent, already appended to the log.
    Message(Arc<Value>),
    Status { status: AcpStatus, error: Option<String> },
    PromptDone,
}

/// Prompt rejection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptError {
    /// A prompt is already in progress.
    Busy,
    /// The session is not in a promptable state.
    NotReady(AcpStatus),
    /// The agent process is gone.
    Closed,
}

/// Commands run before launch: presence check, then install when absent.
#[derive(Debug, Clone)]
pub struct PrepareCommands {
    pub check: Vec<String>,
    pub install: Vec<String>,
}

/// How to run the agent subprocess, resolved against the live container at
/// start time.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub command: Vec<String>,
    pub prepare: Option<PrepareCommands>,
}

/// A viewer attachment: current status, ordered replay, live receiver.
pub struct AcpAttachment {
    pub status: AcpStatus,
    pub replay: Vec<Arc<Value>>,
    pub events: broadcast::Receiver<AcpEvent>,
}

/// Why one child incarnation ended.
enum ChildOutcome {
    /// Killed via the kill switch or session cancel; restart unless the
    /// whole session is over.
    Killed,
    /// The process exited or its pipe broke.
    Crashed(anyhow::Error),
    /// The agent never answered initialize; terminal for the session.
    InitTimedOut,
}

struct ActivePrompt {
    request_id: u64,
    /// Accumulated agent_message_chunk text for the chat-message report.
    text: String,
    watchdog: CancellationToken,
}

pub struct AcpSession {
    pub id: String,
    pub workspace_id: String,
    pub kind: AgentKind,
    pub persistent: bool,
    settings: AcpSettings,
    /// Set at start; the session itself knows nothing about containers.
    launch: Mutex<Option<LaunchSpec>>,
    initial_prompt: Mutex<Option<String>>,

    status: RwLock<AcpStatus>,
    last_error: RwLock<Option<String>>,
    log: Mutex<MessageLog>,
    events: broadcast::Sender<AcpEvent>,
    stdin_tx: Mutex<Option<mpsc::Sender<Value>>>,
    prompt: Mutex<Option<ActivePrompt>>,
    prompt_done: Notify,
    request_seq: AtomicU64,
    restart_attempts: AtomicU32,
    running: AtomicBool,
    /// Cancels the current child only (watchdog kill path).
    kill_switch: Mutex<CancellationToken>,
    /// Ends the session for good.
    cancel: CancellationToken,

    messages: Reporter,
    workspace_events: Arc<EventRing>,
}

impl AcpSession {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: String,
        workspace_id: String,
        kind: AgentKind,
        persistent: bool,
        settings: AcpSettings,
        messages: Reporter,
        workspace_events: Arc<EventRing>,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(settings.viewer_buffer);
        let message_buffer = settings.message_buffer;
        Arc::new(Self {
            id,
            workspace_id,
            kind,
            persistent,
            settings,
            launch: Mutex::new(None),
            initial_prompt: Mutex::new(None),
            status: RwLock::new(AcpStatus::Starting),
            last_error: RwLock::new(None),
            log: Mutex::new(MessageLog::new(message_buffer)),
            events,
            stdin_tx: Mutex::new(None),
            prompt: Mutex::new(None),
            prompt_done: Notify::new(),
            request_seq: AtomicU64::new(1),
            restart_attempts: AtomicU32::new(0),
            running: AtomicBool::new(false),
            kill_switch: Mutex::new(CancellationToken::new()),
            cancel: CancellationToken::new(),
            messages,
            workspace_events,
        })
    }

    /// Mark a resurrected session: it resumes in `restarting` with a
    /// replay-boundary marker in place of pre-restart history.
    pub fn mark_resurrected(self: &Arc<Self>) {
        self.set_status(AcpStatus::Restarting, None);
        self.append_frame(Arc::new(rpc::replay_boundary()));
    }

    pub fn status(&self) -> AcpStatus {
        *self.status.read()
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    pub fn replay_len(&self) -> usize {
        self.log.lock().len()
    }

    /// Start the subprocess supervisor with a resolved launch spec.
    /// Idempotent: a running session keeps its current child.
    pub fn start(self: &Arc<Self>, launch: LaunchSpec, initial_prompt: Option<String>) {
        *self.launch.lock() = Some(launch);
        if let Some(prompt) = initial_prompt {
            *self.initial_prompt.lock() = Some(prompt);
        }
        if self.running.swap(true, Ordering::AcqRel) {
            return;
        }
        let session = Arc::clone(self);
        tokio::spawn(session.supervise());
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Attach a viewer: status + ordered replay + live subscription, all
    /// consistent under the log lock.
    pub fn attach(&self) -> AcpAttachment {
        let log = self.log.lock();
        AcpAttachment {
            status: *self.status.read(),
            replay: log.snapshot(),
            events: self.events.subscribe(),
        }
    }

    /// Forward a viewer's prompt to the agent. One prompt at a time: the
    /// prompt slot is the gate, so concurrent callers cannot both pass.
    pub fn prompt(&self, text: &str) -> Result<(), PromptError> {
        let mut slot = self.prompt.lock();
        if slot.is_some() {
            return Err(PromptError::Busy);
        }
        match *self.status.read() {
            AcpStatus::Ready => {}
            AcpStatus::Prompting => return Err(PromptError::Busy),
            other => return Err(PromptError::NotReady(other)),
        }

        let request_id = self.request_seq.fetch_add(1, Ordering::Relaxed);
        let params = serde_json::json!({
            "sessionId": self.id,
            "prompt": [{ "type": "text", "text": text }],
        });
        let request = rpc::request(request_id, self.kind.profile().prompt_method, params);
        let tx = self.stdin_tx.lock().clone().ok_or(PromptError::Closed)?;
        tx.try_send(request).map_err(|_| PromptError::Closed)?;

        let watchdog = CancellationToken::new();
        *slot = Some(ActivePrompt { request_id, text: String::new(), watchdog: watchdog.clone() });
        drop(slot);

        self.set_status(AcpStatus::Prompting, None);
        self.report_chat("user", text);
        self.spawn_prompt_watchdog(watchdog);
        Ok(())
    }

    /// Pass-through JSON-RPC from a viewer to the agent.
    pub async fn send_raw(&self, frame: Value) -> anyhow::Result<()> {
        let tx = self.stdin_tx.lock().clone();
        match tx {
            Some(tx) => tx.send(frame).await.map_err(|_| anyhow::anyhow!("agent stdin closed")),
            None => anyhow::bail!("agent process not running"),
        }
    }

    /// Explicit cancel: send the cancel notification, then give the agent
    /// the grace window to resolve the prompt before killing it.
    pub async fn cancel_prompt(&self) -> anyhow::Result<()> {
        if self.status() != AcpStatus::Prompting {
            return Ok(());
        }
        let cancel = rpc::notification(
            self.kind.profile().cancel_method,
            serde_json::json!({ "sessionId": self.id }),
        );
        let _ = self.send_raw(cancel).await;

        let grace = self.settings.cancel_grace;
        let resolved = tokio::time::timeout(grace, self.prompt_done.notified()).await.is_ok();
        if !resolved && self.status() == AcpStatus::Prompting {
            tracing::warn!(session_id = %self.id, "cancel grace elapsed, killing agent");
            self.kill_switch.lock().cancel();
        }
        Ok(())
    }

    /// Stop the session for good: cancel, grace, kill.
    pub async fn shutdown(&self) {
        let _ = self.cancel_prompt().await;
        self.cancel.cancel();
        self.kill_switch.lock().cancel();
    }

    // -- Supervisor -----------------------------------------------------------

    async fn supervise(self: Arc<Self>) {
        let Some(spec) = self.launch.lock().clone() else {
            self.set_status(AcpStatus::Error, Some("session started without a launch spec".into()));
            return;
        };
        loop {
            if self.cancel.is_cancelled() {
                return;
            }
            if let Some(ref prepare) = spec.prepare {
                if let Err(e) = self.ensure_installed(prepare).await {
                    self.set_status(AcpStatus::Error, Some(format!("agent install failed: {e:#}")));
                    return;
                }
            }

            let kill = CancellationToken::new();
            *self.kill_switch.lock() = kill.clone();

            let outcome = self.run_child(&spec.command, kill).await;
            self.abort_prompt_state();

            match outcome {
                ChildOutcome::InitTimedOut => {
                    self.set_status(
                        AcpStatus::Error,
                        Some(format!(
                            "agent initialize timed out after {:?}",
                            self.settings.init_timeout
                        )),
                    );
                    return;
                }
                ChildOutcome::Killed if self.cancel.is_cancelled() => return,
                ChildOutcome::Killed => {}
                ChildOutcome::Crashed(e) => {
                    tracing::warn!(session_id = %self.id, err = %e, "agent process ended");
                    if self.cancel.is_cancelled() {
                        return;
                    }
                }
            }

            let attempts = self.restart_attempts.fetch_add(1, Ordering::Relaxed) + 1;
            if attempts > self.settings.max_restart_attempts {
                self.set_status(
                    AcpStatus::Error,
                    Some(format!("agent restart attempts exhausted ({attempts})")),
                );
                return;
            }
            self.set_status(AcpStatus::Restarting, None);
            tokio::select! {
                _ = tokio::time::sleep(self.settings.reconnect_delay) => {}
                () = self.cancel.cancelled() => return,
            }
        }
    }

    /// One child incarnation: spawn, initialize, pump lines until exit.
    async fn run_child(&self, command: &[String], kill: CancellationToken) -> ChildOutcome {
        self.set_status(AcpStatus::Starting, None);
        let mut child = match Command::new(&command[0])
            .args(&command[1..])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => return ChildOutcome::Crashed(e.into()),
        };

        let Some(stdin) = child.stdin.take() else {
            return ChildOutcome::Crashed(anyhow::anyhow!("agent stdin missing"));
        };
        let Some(stdout) = child.stdout.take() else {
            return ChildOutcome::Crashed(anyhow::anyhow!("agent stdout missing"));
        };
        let mut lines = BufReader::new(stdout).lines();

        // Writer task: serialize frames onto the agent's stdin.
        let (stdin_tx, mut stdin_rx) = mpsc::channel::<Value>(64);
        *self.stdin_tx.lock() = Some(stdin_tx.clone());
        let writer = tokio::spawn(async move {
            let mut stdin = stdin;
            while let Some(frame) = stdin_rx.recv().await {
                let Ok(mut line) = serde_json::to_vec(&frame) else { continue };
                line.push(b'\n');
                if stdin.write_all(&line).await.is_err() {
                    break;
                }
            }
        });

        // Initialize handshake, bounded by the init timeout.
        let init = rpc::request(
            0,
            "initialize",
            serde_json::json!({ "protocolVersion": 1, "clientCapabilities": {} }),
        );
        let _ = stdin_tx.send(init).await;
        match tokio::time::timeout(self.settings.init_timeout, lines.next_line()).await {
            Ok(Ok(Some(line))) => {
                if let Ok(frame) = serde_json::from_str::<Value>(&line) {
                    self.handle_frame(frame);
                }
                self.set_status(AcpStatus::Ready, None);
            }
            Ok(_) => {
                let _ = child.kill().await;
                writer.abort();
                *self.stdin_tx.lock() = None;
                return ChildOutcome::Crashed(anyhow::anyhow!(
                    "agent exited before initialize response"
                ));
            }
            Err(_) => {
                let _ = child.kill().await;
                writer.abort();
                *self.stdin_tx.lock() = None;
                return ChildOutcome::InitTimedOut;
            }
        }

        // Deliver the registered initial prompt once the agent is ready.
        let initial = self.initial_prompt.lock().take();
        if let Some(text) = initial {
            if let Err(e) = self.prompt(&text) {
                tracing::warn!(session_id = %self.id, "initial prompt rejected: {e:?}");
            }
        }

        // Main pump.
        let outcome = loop {
            tokio::select! {
                () = kill.cancelled() => {
                    let _ = child.kill().await;
                    break ChildOutcome::Killed;
                }
                () = self.cancel.cancelled() => {
                    let _ = child.kill().await;
                    break ChildOutcome::Killed;
                }
                line = lines.next_line() => match line {
                    Ok(Some(line)) => {
                        if let Ok(frame) = serde_json::from_str::<Value>(&line) {
                            self.handle_frame(frame);
                        }
                    }
                    Ok(None) => break ChildOutcome::Crashed(anyhow::anyhow!("agent closed stdout")),
                    Err(e) => break ChildOutcome::Crashed(e.into()),
                },
            }
        };

        *self.stdin_tx.lock() = None;
        writer.abort();
        let _ = child.wait().await;
        outcome
    }

    /// Run the presence check; install when it fails.
    async fn ensure_installed(&self, prepare: &PrepareCommands) -> anyhow::Result<()> {
        let check =
            Command::new(&prepare.check[0]).args(&prepare.check[1..]).output().await?;
        if check.status.success() {
            return Ok(());
        }
        self.set_status(AcpStatus::Installing, None);
        tracing::info!(session_id = %self.id, agent = self.kind.as_str(), "installing agent");
        let install =
            Command::new(&prepare.install[0]).args(&prepare.install[1..]).output().await?;
        if !install.status.success() {
            anyhow::bail!(
                "install command failed: {}",
                String::from_utf8_lossy(&install.stderr).trim()
            );
        }
        Ok(())
    }

    // -- Frame handling -------------------------------------------------------

    fn handle_frame(&self, frame: Value) {
        // Prompt completion: a response whose id matches the active prompt.
        if let Some(id) = rpc::response_id(&frame) {
            let finished = {
                let prompt = self.prompt.lock();
                prompt.as_ref().is_some_and(|p| p.request_id == id)
            };
            if id != 0 {
                // Responses other than initialize are part of the session
                // transcript.
                self.append_frame(Arc::new(frame));
            }
            if finished {
                self.finish_prompt();
            }
            return;
        }

        if rpc::is_method_frame(&frame) {
            if let Some(text) = rpc::agent_message_chunk_text(&frame) {
                let mut prompt = self.prompt.lock();
                if let Some(active) = prompt.as_mut() {
                    active.text.push_str(text);
                }
            }
            self.append_frame(Arc::new(frame));
        }
    }

    fn finish_prompt(&self) {
        let active = self.prompt.lock().take();
        if let Some(active) = active {
            active.watchdog.cancel();
            if !active.text.is_empty() {
                self.report_chat("assistant", &active.text);
            }
        }
        self.set_status(AcpStatus::Ready, None);
        let _ = self.events.send(AcpEvent::PromptDone);
        self.prompt_done.notify_waiters();
    }

    /// Clear prompt state when the child dies mid-prompt.
    fn abort_prompt_state(&self) {
        let active = self.prompt.lock().take();
        if let Some(active) = active {
            active.watchdog.cancel();
        }
        self.prompt_done.notify_waiters();
    }

    /// Append under the log lock and fan out inside it, preserving the
    /// replay-then-live ordering for concurrent attaches.
    fn append_frame(&self, frame: Arc<Value>) {
        let mut log = self.log.lock();
        if let Some(dropped) = log.push(Arc::clone(&frame)) {
            self.workspace_events.push(
                "acp-buffer-drop",
                &format!("session {} message log dropped {dropped} oldest entries", self.id),
            );
        }
        let _ = self.events.send(AcpEvent::Message(frame));
    }

    fn set_status(&self, status: AcpStatus, error: Option<String>) {
        *self.status.write() = status;
        if error.is_some() {
            *self.last_error.write() = error.clone();
        }
        let _ = self.events.send(AcpEvent::Status { status, error });
    }

    fn spawn_prompt_watchdog(&self, watchdog: CancellationToken) {
        let prompt_timeout = self.settings.prompt_timeout;
        let grace = self.settings.cancel_grace;
        let watch = PromptWatch {
            session_id: self.id.clone(),
            stdin: self.stdin_tx.lock().clone(),
            kill_switch: self.kill_switch.lock().clone(),
            cancel_method: self.kind.profile().cancel_method,
        };
        tokio::spawn(async move {
            tokio::select! {
                () = watchdog.cancelled() => {}
                _ = tokio::time::sleep(prompt_timeout) => {
                    watch.fire(grace, watchdog).await;
                }
            }
        });
    }

    fn report_chat(&self, role: &str, content: &str) {
        let message_id = Uuid::new_v4().to_string();
        let payload = serde_json::json!({
            "messageId": message_id,
            "sessionId": self.id,
            "role": role,
            "content": content,
            "timestamp": chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        });
        if let Err(e) = self.messages.enqueue(&message_id, &payload) {
            tracing::warn!(session_id = %self.id, err = %e, "chat message enqueue failed");
        }
    }
}

struct PromptWatch {
    session_id: String,
    stdin: Option<mpsc::Sender<Value>>,
    kill_switch: CancellationToken,
    cancel_method: &'static str,
}

impl PromptWatch {
    /// Timeout path: cancel notification, grace, then kill.
    async fn fire(&self, grace: std::time::Duration, done: CancellationToken) {
        tracing::warn!(session_id = %self.session_id, "prompt timed out, cancelling");
        if let Some(ref stdin) = self.stdin {
            let cancel = rpc::notification(
                self.cancel_method,
                serde_json::json!({ "sessionId": self.session_id }),
            );
            let _ = stdin.send(cancel).await;
        }
        tokio::select! {
            () = done.cancelled() => {}
            _ = tokio::time::sleep(grace) => {
                tracing::warn!(session_id = %self.session_id, "cancel grace elapsed, killing agent");
                self.kill_switch.cancel();
            }
        }
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
