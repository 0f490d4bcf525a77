// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! JSON-RPC helpers for the agent stdio protocol.
//!
//! Traffic is mostly pass-through `serde_json::Value`s; these helpers
//! classify frames and build the few requests the session host originates.

use serde_json::{json, Value};

/// A request or notification originated by the session host.
pub fn request(id: u64, method: &str, params: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params })
}

pub fn notification(method: &str, params: Value) -> Value {
    json!({ "jsonrpc": "2.0", "method": method, "params": params })
}

/// Does this frame carry a `method` (notification or agent-originated
/// request) rather than a response?
pub fn is_method_frame(v: &Value) -> bool {
    v.get("method").is_some()
}

/// The response id, when this frame is a result or error response.
pub fn response_id(v: &Value) -> Option<u64> {
    if v.get("result").is_none() && v.get("error").is_none() {
        return None;
    }
    v.get("id").and_then(Value::as_u64)
}

/// `result.stopReason` of a prompt completion.
pub fn stop_reason(v: &Value) -> Option<&str> {
    v.get("result")?.get("stopReason")?.as_str()
}

/// Text of a `session/update` `agent_message_chunk`, if this frame is one.
pub fn agent_message_chunk_text(v: &Value) -> Option<&str> {
    if v.get("method")?.as_str()? != "session/update" {
        return None;
    }
    let update = v.get("params")?.get("update")?;
    if update.get("sessionUpdate")?.as_str()? != "agent_message_chunk" {
        return None;
    }
    update.get("content")?.get("text")?.as_str()
}

/// Marker appended to a resurrected session's log in place of history
/// that did not survive the process restart.
pub fn replay_boundary() -> Value {
    notification("session/update", json!({ "update": { "sessionUpdate": "replay_boundary" } }))
}

#[cfg(test)]
#[path = "rpc_tests.rs"]
mod tests;
