// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded in-memory event log, one per workspace plus one for the node.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

/// Default ring capacity.
const DEFAULT_CAPACITY: usize = 1000;

/// One lifecycle or diagnostic event.
#[derive(Debug, Clone, Serialize)]
pub struct WorkspaceEvent {
    pub at: DateTime<Utc>,
    pub kind: String,
    pub message: String,
}

/// Fixed-capacity event ring; the oldest entries fall off.
pub struct EventRing {
    inner: Mutex<VecDeque<WorkspaceEvent>>,
    capacity: usize,
}

impl EventRing {
    pub fn new(capacity: usize) -> Self {
        Self { inner: Mutex::new(VecDeque::with_capacity(capacity.min(64))), capacity }
    }

    pub fn push(&self, kind: &str, message: &str) {
        let mut inner = self.inner.lock();
        if inner.len() == self.capacity {
            inner.pop_front();
        }
        inner.push_back(WorkspaceEvent {
            at: Utc::now(),
            kind: kind.to_owned(),
            message: message.to_owned(),
        });
    }

    /// Events oldest-first.
    pub fn snapshot(&self) -> Vec<WorkspaceEvent> {
        self.inner.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

impl Default for EventRing {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
#[path = "events_tests.rs"]
mod tests;
