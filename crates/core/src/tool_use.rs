// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::SessionId;

/// Which lifecycle hook produced a `ToolUseEntry`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum HookType {
    PreToolUse,
    PostToolUse,
    SubagentStart,
    SubagentStop,
}

impl HookType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PreToolUse" => Some(Self::PreToolUse),
            "PostToolUse" => Some(Self::PostToolUse),
            "SubagentStart" => Some(Self::SubagentStart),
            "SubagentStop" => Some(Self::SubagentStop),
            _ => None,
        }
    }
}

/// Append-only audit-log row. Pre/Post rows are correlated by `tool_use_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolUseEntry {
    pub timestamp: DateTime<Utc>,
    pub session_id: Option<SessionId>,
    pub claude_session_id: Option<String>,
    pub hook_type: HookType,
    pub tool_name: String,
    pub target_file: Option<String>,
    pub bash_command: Option<String>,
    pub tool_use_id: Option<String>,
    pub cwd: Option<String>,
    pub agent_id: Option<String>,
    /// Denormalized at write time so the audit log stays readable after the
    /// session record itself is pruned (SPEC_FULL.md §3).
    pub session_name: Option<String>,
    pub parent_session_id: Option<SessionId>,
    /// Raw `tool_response` payload, only present on `PostToolUse` rows.
    pub tool_response: Option<serde_json::Value>,
}
