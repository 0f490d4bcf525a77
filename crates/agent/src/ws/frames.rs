// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Gateway framing.
//!
//! ACP connections interleave these frames with pass-through JSON-RPC; PTY
//! connections carry base64 output frames and input/resize client frames.

use serde::{Deserialize, Serialize};

/// Server-to-client frames.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerFrame {
    /// First frame on an ACP connect: current status and how many
    /// buffered messages will be replayed.
    SessionState {
        status: String,
        agent_type: String,
        replay_count: usize,
    },
    /// Replay finished; the connection is live from here.
    SessionReplayComplete,
    /// Terminal marker for one prompt.
    SessionPromptDone,
    AgentStatus {
        status: String,
        agent_type: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// PTY output, base64-encoded raw bytes.
    Output { data: String },
    /// The server detached this viewer (takeover, close).
    Detached { reason: String },
    /// The PTY child exited.
    Exited {
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<i32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        signal: Option<i32>,
    },
}

/// Gateway-level error frame. Never an ACP payload: the shape is
/// `{"error": code, "message": human}` with no `type` tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayError {
    pub error: String,
    pub message: String,
}

impl GatewayError {
    pub fn new(code: crate::error::ApiError, message: impl Into<String>) -> Self {
        Self { error: code.as_str().to_owned(), message: message.into() }
    }
}

/// Client-to-server frames on a PTY connection.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PtyClientFrame {
    /// Keystrokes, base64-encoded.
    Input { data: String },
    Resize { cols: u16, rows: u16 },
}

#[cfg(test)]
#[path = "frames_tests.rs"]
mod tests;
