// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::SessionId;

/// Which kind of agent process a session hosts. A small discriminated set
/// with a branch table rather than inheritance — see `spec.md` §9
/// "Dynamic dispatch over agent providers".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provider {
    Claude,
    Codex,
    CodexApp,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Claude => "claude",
            Self::Codex => "codex",
            Self::CodexApp => "codex-app",
        }
    }

    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s {
            "claude" => Some(Self::Claude),
            "codex" => Some(Self::Codex),
            "codex-app" | "codex_app" | "codexapp" => Some(Self::CodexApp),
            _ => None,
        }
    }

    /// Providers hosted inside a named terminal-multiplexer window (as
    /// opposed to `codex-app`'s headless structured-event protocol).
    pub fn is_tmux_hosted(&self) -> bool {
        matches!(self, Self::Claude | Self::Codex)
    }

    /// Crash-recovery is gated on `claude` only per `spec.md` §4.4 and the
    /// open question in §9: generalising to `codex` needs a provider-specific
    /// crash-signature list the source never provided.
    pub fn supports_crash_recovery(&self) -> bool {
        matches!(self, Self::Claude)
    }
}

/// Session lifecycle status (stored, canonical).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Running,
    Idle,
    WaitingPermission,
    WaitingInput,
    Stopped,
    Error,
}

/// Derived runtime activity, computed from `SessionStatus` plus (for
/// `codex-app`) external signals. Never persisted directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityState {
    Thinking,
    Working,
    WaitingPermission,
    WaitingInput,
    Idle,
    Unknown,
}

/// Signals external to `SessionStatus` that only `codex-app` sessions carry,
/// used to derive `ActivityState` per `spec.md` §4.3.
#[derive(Debug, Clone, Copy, Default)]
pub struct CodexAppSignals {
    pub in_flight: bool,
    pub seconds_since_last_delta: Option<u64>,
    pub waiting_permission_recent: bool,
    pub waiting_input_recent: bool,
}

/// The primary entity: a single interactive coding-agent session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    /// Stable machine name derived from the id, e.g. `claude-a1b2c3d4`.
    pub name: String,
    pub friendly_name: Option<String>,
    pub working_dir: String,
    /// Multiplexer window name (equals `name` unless overridden).
    pub window_name: String,
    pub provider: Provider,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub parent_session_id: Option<SessionId>,
    /// Marks a session as an "engineering manager": every child it spawns
    /// automatically gets a remind, context-monitor, and stop-notify
    /// registration routed back to it.
    pub is_em: bool,
    pub role: Option<String>,
    pub completion_status: Option<String>,
    pub completion_message: Option<String>,
    pub agent_status_text: Option<String>,
    pub agent_status_at: Option<DateTime<Utc>>,
    pub tokens_used: u64,
    pub tools_used: HashMap<String, u32>,
    pub last_tool_call: Option<DateTime<Utc>>,
    pub last_tool_summary: Option<String>,
    pub spawn_prompt: Option<String>,
    pub spawned_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub current_task: Option<String>,

    // Context-usage watchdog one-shots (§4.5.9 / §4.6).
    pub context_monitor_enabled: bool,
    pub context_monitor_notify_target: Option<SessionId>,
    pub context_warning_sent: bool,
    pub context_critical_sent: bool,
    pub context_compacting: bool,

    // Provider-specific fields.
    /// The `claude_session_id` a hook payload may carry, used as the last
    /// resort in the three-way session-matching chain (`spec.md` §6:
    /// `session_manager_id` → `transcript_path` → `claude_session_id`).
    pub claude_session_id: Option<String>,
    pub transcript_path: Option<String>,
    pub telegram_chat_id: Option<i64>,
    pub telegram_thread_id: Option<i64>,
    pub last_handoff_path: Option<String>,

    pub log_file: PathBuf,
    pub pid: Option<u32>,
}

impl Session {
    pub fn tmux_session_name(id: SessionId, provider: Provider) -> String {
        format!("{}-{}", provider.as_str(), id)
    }

    /// Derive the user-visible activity state from stored status, applying
    /// the `codex-app` branch table from `spec.md` §4.3 when applicable.
    pub fn activity_state(&self, codex_app_signals: Option<CodexAppSignals>) -> ActivityState {
        match self.provider {
            Provider::Claude | Provider::Codex => match self.status {
                SessionStatus::Running => ActivityState::Working,
                SessionStatus::Idle => ActivityState::Idle,
                SessionStatus::WaitingPermission => ActivityState::WaitingPermission,
                SessionStatus::WaitingInput => ActivityState::WaitingInput,
                SessionStatus::Stopped | SessionStatus::Error => ActivityState::Unknown,
            },
            Provider::CodexApp => {
                let sig = codex_app_signals.unwrap_or_default();
                if sig.waiting_permission_recent {
                    ActivityState::WaitingPermission
                } else if sig.waiting_input_recent {
                    ActivityState::WaitingInput
                } else if sig.in_flight && sig.seconds_since_last_delta.is_none() {
                    ActivityState::Thinking
                } else if sig.in_flight {
                    // `in_flight && recent delta` — "recent" is any delta at all
                    // within the poll window; absence of a delta at all (the
                    // branch above) means the model hasn't started streaming yet.
                    ActivityState::Working
                } else {
                    ActivityState::Idle
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base(provider: Provider, status: SessionStatus) -> Session {
        let id = SessionId::generate();
        Session {
            id,
            name: format!("{}-{}", provider.as_str(), id),
            friendly_name: None,
            working_dir: "/tmp".into(),
            window_name: format!("{}-{}", provider.as_str(), id),
            provider,
            status,
            created_at: Utc::now(),
            last_activity: Utc::now(),
            parent_session_id: None,
            is_em: false,
            role: None,
            completion_status: None,
            completion_message: None,
            agent_status_text: None,
            agent_status_at: None,
            tokens_used: 0,
            tools_used: HashMap::new(),
            last_tool_call: None,
            last_tool_summary: None,
            spawn_prompt: None,
            spawned_at: None,
            completed_at: None,
            current_task: None,
            claude_session_id: None,
            context_monitor_enabled: false,
            context_monitor_notify_target: None,
            context_warning_sent: false,
            context_critical_sent: false,
            context_compacting: false,
            transcript_path: None,
            telegram_chat_id: None,
            telegram_thread_id: None,
            last_handoff_path: None,
            log_file: PathBuf::from("/tmp/log"),
            pid: None,
        }
    }

    #[test]
    fn claude_activity_state_is_direct_rewrite() {
        let s = base(Provider::Claude, SessionStatus::Running);
        assert_eq!(s.activity_state(None), ActivityState::Working);
        let s = base(Provider::Claude, SessionStatus::Idle);
        assert_eq!(s.activity_state(None), ActivityState::Idle);
        let s = base(Provider::Claude, SessionStatus::WaitingPermission);
        assert_eq!(s.activity_state(None), ActivityState::WaitingPermission);
    }

    #[test]
    fn codex_app_in_flight_no_delta_is_thinking() {
        let s = base(Provider::CodexApp, SessionStatus::Running);
        let sig = CodexAppSignals { in_flight: true, seconds_since_last_delta: None, ..Default::default() };
        assert_eq!(s.activity_state(Some(sig)), ActivityState::Thinking);
    }

    #[test]
    fn codex_app_in_flight_with_delta_is_working() {
        let s = base(Provider::CodexApp, SessionStatus::Running);
        let sig =
            CodexAppSignals { in_flight: true, seconds_since_last_delta: Some(1), ..Default::default() };
        assert_eq!(s.activity_state(Some(sig)), ActivityState::Working);
    }

    #[test]
    fn codex_app_waiting_permission_wins_over_in_flight() {
        let s = base(Provider::CodexApp, SessionStatus::Running);
        let sig = CodexAppSignals {
            in_flight: true,
            seconds_since_last_delta: Some(1),
            waiting_permission_recent: true,
            ..Default::default()
        };
        assert_eq!(s.activity_state(Some(sig)), ActivityState::WaitingPermission);
    }

    #[test]
    fn codex_app_idle_otherwise() {
        let s = base(Provider::CodexApp, SessionStatus::Running);
        assert_eq!(s.activity_state(None), ActivityState::Idle);
    }

    #[test]
    fn tmux_session_name_format() {
        let id = SessionId::generate();
        assert_eq!(Session::tmux_session_name(id, Provider::Claude), format!("claude-{id}"));
    }
}
