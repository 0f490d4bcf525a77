// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use yare::parameterized;

use super::*;

#[parameterized(
    claude = { "claude-code", AgentKind::ClaudeCode },
    gemini = { "gemini-cli", AgentKind::GeminiCli },
    codex = { "codex", AgentKind::Codex },
)]
fn parse_round_trips(s: &str, kind: AgentKind) {
    assert_eq!(AgentKind::parse(s), Some(kind));
    assert_eq!(kind.as_str(), s);
}

#[test]
fn unknown_kind_rejected() {
    assert_eq!(AgentKind::parse("cursor"), None);
    assert_eq!(AgentKind::parse(""), None);
}

#[test]
fn serde_uses_kebab_case() -> anyhow::Result<()> {
    let json = serde_json::to_string(&AgentKind::ClaudeCode)?;
    assert_eq!(json, "\"claude-code\"");
    let back: AgentKind = serde_json::from_str("\"gemini-cli\"")?;
    assert_eq!(back, AgentKind::GeminiCli);
    Ok(())
}

#[test]
fn every_profile_is_complete() {
    for kind in [AgentKind::ClaudeCode, AgentKind::GeminiCli, AgentKind::Codex] {
        let profile = kind.profile();
        assert!(!profile.binary.is_empty());
        assert!(!profile.install.is_empty());
        assert!(!profile.launch.is_empty());
        assert!(profile.prompt_method.starts_with("session/"));
        assert!(profile.cancel_method.starts_with("session/"));
    }
}
