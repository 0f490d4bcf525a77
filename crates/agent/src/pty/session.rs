// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One interactive terminal session: a PTY-backed child process, an output
//! ring for reattach replay, and an attachment slot holding at most one
//! live viewer.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use nix::sys::signal::Signal;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::ring::OutputRing;
use super::spawn::{ExitStatus, PtyProcess};

/// Capacity of a viewer's outbound channel, in chunks.
const VIEWER_BUFFER: usize = 256;

/// How long a viewer's channel may stay full before the viewer is dropped.
const VIEWER_STALL_DEADLINE: Duration = Duration::from_secs(1);

/// Grace between SIGHUP and SIGKILL when closing a session.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// Output delivered to an attached viewer.
#[derive(Debug, Clone)]
pub enum PtyOutput {
    /// Raw bytes from the shell.
    Data(Bytes),
    /// The viewer was detached server-side; the channel closes after this.
    Detached { reason: &'static str },
    /// The shell exited.
    Exited { status: ExitStatus },
}

/// Attach rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachError {
    /// Another viewer is attached and takeover was not requested.
    Conflict,
}

/// A successful attachment: ring replay plus the live output channel.
pub struct Attachment {
    pub viewer_id: u64,
    pub replay: Vec<u8>,
    pub output: mpsc::Receiver<PtyOutput>,
}

struct Viewer {
    id: u64,
    tx: mpsc::Sender<PtyOutput>,
    full_since: Option<Instant>,
}

pub struct PtySession {
    pub id: String,
    pub workspace_id: String,
    process: Arc<PtyProcess>,
    input_tx: mpsc::Sender<Bytes>,
    ring: Mutex<OutputRing>,
    viewer: Mutex<Option<Viewer>>,
    viewer_seq: AtomicU64,
    /// When the last viewer detached; `None` while a viewer is attached.
    detached_at: Mutex<Option<Instant>>,
    last_activity: Mutex<Instant>,
    exited: AtomicBool,
    exit_status: Mutex<Option<ExitStatus>>,
    cancel: CancellationToken,
}

impl PtySession {
    /// Spawn the PTY child for `command` and start the output pump.
    pub fn spawn(
        id: String,
        workspace_id: String,
        command: &[String],
        cols: u16,
        rows: u16,
        ring_capacity: usize,
    ) -> anyhow::Result<Arc<Self>> {
        let process = Arc::new(PtyProcess::spawn(command, cols, rows)?);
        let (input_tx, mut input_rx) = mpsc::channel::<Bytes>(256);
        let (output_tx, mut output_rx) = mpsc::channel::<Bytes>(256);

        let session = Arc::new(Self {
            id,
            workspace_id,
            process: Arc::clone(&process),
            input_tx,
            ring: Mutex::new(OutputRing::new(ring_capacity)),
            viewer: Mutex::new(None),
            viewer_seq: AtomicU64::new(0),
            detached_at: Mutex::new(Some(Instant::now())),
            last_activity: Mutex::new(Instant::now()),
            exited: AtomicBool::new(false),
            exit_status: Mutex::new(None),
            cancel: CancellationToken::new(),
        });

        // I/O pump: PTY <-> channels.
        let pump_process = Arc::clone(&process);
        let pump_cancel = session.cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                result = pump_process.run(output_tx, &mut input_rx) => {
                    if let Err(e) = result {
                        tracing::debug!(err = %e, "pty io pump ended");
                    }
                }
                () = pump_cancel.cancelled() => {}
            }
        });

        // Output fan-in: ring + attached viewer.
        let fan = Arc::clone(&session);
        tokio::spawn(async move {
            while let Some(data) = output_rx.recv().await {
                fan.ring.lock().write(&data);
                *fan.last_activity.lock() = Instant::now();
                fan.forward_to_viewer(PtyOutput::Data(data));
            }
            // PTY closed: record the exit and tell the viewer.
            let status = fan.process.wait().await.unwrap_or(ExitStatus { code: None, signal: None });
            fan.exited.store(true, Ordering::Release);
            *fan.exit_status.lock() = Some(status);
            fan.forward_to_viewer(PtyOutput::Exited { status });
        });

        Ok(session)
    }

    /// Deliver output to the attached viewer, dropping the viewer if its
    /// channel has been full past the stall deadline. The session itself
    /// never blocks on a slow viewer.
    fn forward_to_viewer(&self, output: PtyOutput) {
        let mut slot = self.viewer.lock();
        let Some(viewer) = slot.as_mut() else {
            return;
        };
        match viewer.tx.try_send(output) {
            Ok(()) => viewer.full_since = None,
            Err(mpsc::error::TrySendError::Full(_)) => {
                let since = *viewer.full_since.get_or_insert_with(Instant::now);
                if since.elapsed() >= VIEWER_STALL_DEADLINE {
                    tracing::warn!(session_id = %self.id, "dropping stalled viewer");
                    *slot = None;
                    *self.detached_at.lock() = Some(Instant::now());
                }
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                *slot = None;
                *self.detached_at.lock() = Some(Instant::now());
            }
        }
    }

    /// Attach a viewer. At most one may be attached; with `takeover` the
    /// existing viewer is detached (its channel receives a takeover marker
    /// and closes) before the newcomer is admitted. The full ring contents
    /// are returned for replay ahead of live output.
    pub fn attach(&self, takeover: bool) -> Result<Attachment, AttachError> {
        let mut slot = self.viewer.lock();
        if let Some(existing) = slot.take() {
            if !takeover {
                *slot = Some(existing);
                return Err(AttachError::Conflict);
            }
            let _ = existing.tx.try_send(PtyOutput::Detached { reason: "takeover" });
            // Dropping the sender closes the previous viewer's channel.
        }

        let viewer_id = self.viewer_seq.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(VIEWER_BUFFER);
        // Snapshot under the same lock that guards fan-out so replayed
        // bytes strictly precede live bytes.
        let replay = self.ring.lock().snapshot();
        *slot = Some(Viewer { id: viewer_id, tx, full_since: None });
        *self.detached_at.lock() = None;
        Ok(Attachment { viewer_id, replay, output: rx })
    }

    /// Detach the given viewer if it is still the attached one.
    pub fn detach(&self, viewer_id: u64) {
        let mut slot = self.viewer.lock();
        if slot.as_ref().is_some_and(|v| v.id == viewer_id) {
            *slot = None;
            *self.detached_at.lock() = Some(Instant::now());
        }
    }

    pub fn has_viewer(&self) -> bool {
        self.viewer.lock().is_some()
    }

    /// How long the session has been without a viewer, if it is orphaned.
    pub fn orphaned_for(&self) -> Option<Duration> {
        self.detached_at.lock().map(|at| at.elapsed())
    }

    pub async fn write_input(&self, data: Bytes) -> anyhow::Result<()> {
        *self.last_activity.lock() = Instant::now();
        self.input_tx.send(data).await.map_err(|_| anyhow::anyhow!("pty input channel closed"))
    }

    pub fn resize(&self, cols: u16, rows: u16) -> anyhow::Result<()> {
        self.process.resize(cols, rows)
    }

    pub fn size(&self) -> (u16, u16) {
        self.process.size()
    }

    pub fn pid(&self) -> u32 {
        self.process.pid()
    }

    pub fn is_exited(&self) -> bool {
        self.exited.load(Ordering::Acquire)
    }

    pub fn last_activity_elapsed(&self) -> Duration {
        self.last_activity.lock().elapsed()
    }

    /// Close the session: SIGHUP, wait up to the grace, then SIGKILL.
    pub async fn close(&self) {
        let _ = self.process.signal(Signal::SIGHUP);
        let waited = tokio::time::timeout(CLOSE_GRACE, self.process.wait()).await;
        if waited.is_err() {
            let _ = self.process.signal(Signal::SIGKILL);
            let _ = self.process.wait().await;
        }
        self.cancel.cancel();
        let mut slot = self.viewer.lock();
        if let Some(viewer) = slot.take() {
            let _ = viewer.tx.try_send(PtyOutput::Detached { reason: "closed" });
        }
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
