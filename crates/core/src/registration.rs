// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::SessionId;

/// `(session_id, soft_threshold_seconds, hard_threshold_seconds, registered_at)`.
/// One active registration per session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemindRegistration {
    pub session_id: SessionId,
    pub soft_threshold_seconds: u64,
    pub hard_threshold_seconds: u64,
    pub registered_at: DateTime<Utc>,
}

/// A heartbeat registration from child to parent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParentWakeRegistration {
    pub child_session_id: SessionId,
    pub parent_session_id: SessionId,
    pub period_seconds: u64,
    pub registered_at: DateTime<Utc>,
}

/// Short-lived: the watcher wants a one-shot "target is now idle" or
/// "timeout" message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchRegistration {
    pub id: uuid::Uuid,
    pub watcher_session_id: SessionId,
    pub target_session_id: SessionId,
    pub timeout_seconds: u64,
    pub registered_at: DateTime<Utc>,
}

/// A one-shot reminder an agent schedules against itself via
/// `POST /scheduler/remind` (`spec.md` §6), distinct from the recurring
/// per-session [`RemindRegistration`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledReminder {
    pub id: uuid::Uuid,
    pub session_id: SessionId,
    pub fire_at: DateTime<Utc>,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// `(enabled, notify_target_session_id)` plus the two one-shot flags and the
/// `compacting` runtime flag, all stored on the `Session` record itself
/// (see `sm_core::Session`); this type is the wire/API projection used for
/// `GET /sessions/context-monitor`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextMonitorEnrolment {
    pub session_id: SessionId,
    pub enabled: bool,
    pub notify_target_session_id: Option<SessionId>,
    pub warning_sent: bool,
    pub critical_sent: bool,
}
