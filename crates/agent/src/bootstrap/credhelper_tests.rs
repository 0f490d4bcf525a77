// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn script_posts_to_local_agent_with_bearer() {
    let script = render_script(8080, "cb-secret");
    assert!(script.starts_with("#!/bin/sh"));
    assert!(script.contains("http://localhost:8080/git/credentials"));
    assert!(script.contains("Authorization: Bearer cb-secret"));
}

#[test]
fn script_only_answers_get() {
    let script = render_script(9000, "t");
    assert!(script.contains("get)"));
    // store/erase fall through to the no-op arm.
    assert!(script.contains("exit 0"));
}

#[test]
fn helper_path_is_stable() {
    assert_eq!(HELPER_PATH, "/usr/local/bin/git-credential-sam");
}
