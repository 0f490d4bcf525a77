// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn push_and_snapshot_preserve_order() {
    let ring = EventRing::new(10);
    ring.push("create", "workspace created");
    ring.push("stop", "workspace stopping");
    let events = ring.snapshot();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].kind, "create");
    assert_eq!(events[1].kind, "stop");
}

#[test]
fn overflow_drops_oldest() {
    let ring = EventRing::new(3);
    for n in 0..5 {
        ring.push("tick", &format!("event {n}"));
    }
    let events = ring.snapshot();
    assert_eq!(events.len(), 3);
    assert_eq!(events[0].message, "event 2");
    assert_eq!(events[2].message, "event 4");
}

#[test]
fn timestamps_are_monotone_nondecreasing() {
    let ring = EventRing::default();
    ring.push("a", "first");
    ring.push("b", "second");
    let events = ring.snapshot();
    assert!(events[0].at <= events[1].at);
}
