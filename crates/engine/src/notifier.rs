// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stub notifier trait standing in for the Telegram mirror and the
//! summary/LLM-invocation helper — both are named non-goals of the core
//! (`spec.md` §1), but the engine still calls through this trait at its
//! event-emission seams so a real mirror can be plugged in without
//! touching C3–C6 (SPEC_FULL.md §1).

use async_trait::async_trait;
use sm_core::id::SessionId;

/// One user-visible notification the engine wants mirrored somewhere
/// outside the target session's own input stream (an operator-facing chat
/// bot, a log line, a desktop notification — the core doesn't care which).
#[derive(Debug, Clone)]
pub struct NotificationEvent {
    pub session_id: SessionId,
    pub kind: NotificationKind,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    PermissionPrompt,
    Idle,
    Completion,
    Error,
    Crash,
    ContextUsage,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: NotificationEvent);
}

/// Default implementation: logs at `info` and drops the event. Every
/// production deployment is expected to swap this for a real mirror.
#[derive(Debug, Default)]
pub struct LoggingNotifier;

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn notify(&self, event: NotificationEvent) {
        tracing::info!(
            session_id = %event.session_id,
            kind = ?event.kind,
            text = %event.text,
            "notification"
        );
    }
}
