// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use serde_json::json;

use super::*;

fn frame(n: u64) -> Arc<serde_json::Value> {
    Arc::new(json!({ "seq": n }))
}

#[test]
fn preserves_append_order() {
    let mut log = MessageLog::new(10);
    for n in 0..5 {
        assert!(log.push(frame(n)).is_none());
    }
    let seqs: Vec<u64> =
        log.snapshot().iter().filter_map(|f| f.get("seq").and_then(|v| v.as_u64())).collect();
    assert_eq!(seqs, vec![0, 1, 2, 3, 4]);
}

#[test]
fn overflow_drops_oldest_first() {
    let mut log = MessageLog::new(3);
    for n in 0..5 {
        log.push(frame(n));
    }
    let seqs: Vec<u64> =
        log.snapshot().iter().filter_map(|f| f.get("seq").and_then(|v| v.as_u64())).collect();
    assert_eq!(seqs, vec![2, 3, 4]);
    assert_eq!(log.dropped(), 2);
    assert_eq!(log.len(), 3);
}

#[test]
fn first_drop_is_marked() {
    let mut log = MessageLog::new(2);
    assert!(log.push(frame(0)).is_none());
    assert!(log.push(frame(1)).is_none());
    assert_eq!(log.push(frame(2)), Some(1));
    // Subsequent drops stay quiet until the next marker threshold.
    assert!(log.push(frame(3)).is_none());
}
