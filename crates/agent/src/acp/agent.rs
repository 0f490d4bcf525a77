// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The closed set of supported ACP agents.
//!
//! Each kind carries a capability record: how to find or install the agent
//! binary inside the devcontainer, how to launch it, and which JSON-RPC
//! methods drive prompting and cancellation.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AgentKind {
    ClaudeCode,
    GeminiCli,
    Codex,
}

impl AgentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClaudeCode => "claude-code",
            Self::GeminiCli => "gemini-cli",
            Self::Codex => "codex",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "claude-code" => Some(Self::ClaudeCode),
            "gemini-cli" => Some(Self::GeminiCli),
            "codex" => Some(Self::Codex),
            _ => None,
        }
    }

    pub fn profile(&self) -> &'static AgentProfile {
        match self {
            Self::ClaudeCode => &CLAUDE_CODE,
            Self::GeminiCli => &GEMINI_CLI,
            Self::Codex => &CODEX,
        }
    }
}

/// Capability record for one agent kind.
#[derive(Debug)]
pub struct AgentProfile {
    /// Binary resolved inside the container.
    pub binary: &'static str,
    /// Argv that installs the binary when absent.
    pub install: &'static [&'static str],
    /// Argv that launches the agent in ACP stdio mode.
    pub launch: &'static [&'static str],
    pub prompt_method: &'static str,
    pub cancel_method: &'static str,
}

static CLAUDE_CODE: AgentProfile = AgentProfile {
    binary: "claude-code-acp",
    install: &["npm", "install", "-g", "@zed-industries/claude-code-acp"],
    launch: &["claude-code-acp"],
    prompt_method: "session/prompt",
    cancel_method: "session/cancel",
};

static GEMINI_CLI: AgentProfile = AgentProfile {
    binary: "gemini",
    install: &["npm", "install", "-g", "@google/gemini-cli"],
    launch: &["gemini", "--experimental-acp"],
    prompt_method: "session/prompt",
    cancel_method: "session/cancel",
};

static CODEX: AgentProfile = AgentProfile {
    binary: "codex-acp",
    install: &["npm", "install", "-g", "@openai/codex-acp"],
    launch: &["codex-acp"],
    prompt_method: "session/prompt",
    cancel_method: "session/cancel",
};

#[cfg(test)]
#[path = "agent_tests.rs"]
mod tests;
