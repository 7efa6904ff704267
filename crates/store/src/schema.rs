// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Schema definition and migration bootstrap for the single embedded
//! database file (`spec.md` §1: "one embedded relational database file").

use rusqlite::Connection;

use crate::{StoreError, StoreResult};

pub const CURRENT_SCHEMA_VERSION: i64 = 1;

const CREATE_SCHEMA_VERSION: &str = "
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL
);";

const CREATE_SESSIONS: &str = "
CREATE TABLE IF NOT EXISTS sessions (
    id                   TEXT PRIMARY KEY,
    name                 TEXT NOT NULL,
    friendly_name        TEXT UNIQUE,
    provider             TEXT NOT NULL,
    status               TEXT NOT NULL,
    working_dir          TEXT NOT NULL,
    tmux_window          TEXT NOT NULL,
    log_file             TEXT NOT NULL,
    pid                  INTEGER,
    parent_session_id    TEXT REFERENCES sessions(id),
    task                 TEXT,
    role                 TEXT,
    is_em                INTEGER NOT NULL DEFAULT 0,
    context_monitor      INTEGER NOT NULL DEFAULT 0,
    session_manager_id   TEXT,
    claude_session_id    TEXT,
    transcript_path      TEXT,
    created_at           TEXT NOT NULL,
    updated_at           TEXT NOT NULL
);";

const CREATE_SESSION_DELIVERY_STATE: &str = "
CREATE TABLE IF NOT EXISTS session_delivery_state (
    session_id                       TEXT PRIMARY KEY REFERENCES sessions(id),
    is_idle                          INTEGER NOT NULL DEFAULT 0,
    last_idle_at                     TEXT,
    pending_user_input                INTEGER NOT NULL DEFAULT 0,
    pending_input_first_seen          TEXT,
    saved_user_input                  TEXT,
    pending_handoff_path               TEXT,
    stop_notify_sender_id             TEXT,
    stop_notify_sender_name           TEXT,
    paste_buffered_notify_sender_id   TEXT,
    paste_buffered_notify_sender_name TEXT,
    stop_notify_skip_count           INTEGER NOT NULL DEFAULT 0,
    skip_count_armed_at              TEXT,
    last_stop_notify_fired_at        TEXT
);";

const CREATE_MESSAGE_QUEUE: &str = "
CREATE TABLE IF NOT EXISTS message_queue (
    id                    TEXT PRIMARY KEY,
    target_session_id     TEXT NOT NULL REFERENCES sessions(id),
    sender                TEXT,
    sender_name           TEXT,
    text                  TEXT NOT NULL,
    mode                  TEXT NOT NULL,
    queued_at             TEXT NOT NULL,
    timeout_at            TEXT,
    notify_on_delivery    INTEGER NOT NULL DEFAULT 0,
    notify_after_seconds  INTEGER,
    notify_on_stop        INTEGER NOT NULL DEFAULT 0,
    delivered_at          TEXT
);
CREATE INDEX IF NOT EXISTS idx_message_queue_target
    ON message_queue(target_session_id, delivered_at);";

// One active registration per session (`spec.md` §3 RemindRegistration).
const CREATE_REMIND_REGISTRATIONS: &str = "
CREATE TABLE IF NOT EXISTS remind_registrations (
    session_id             TEXT PRIMARY KEY REFERENCES sessions(id),
    soft_threshold_seconds INTEGER NOT NULL,
    hard_threshold_seconds INTEGER NOT NULL,
    registered_at          TEXT NOT NULL
);";

// One-shot reminders fired by agents via `sm remind N \"...\"` (`spec.md`
// §4.2), distinct from the recurring per-session `remind_registrations`.
const CREATE_SCHEDULED_REMINDERS: &str = "
CREATE TABLE IF NOT EXISTS scheduled_reminders (
    id                TEXT PRIMARY KEY,
    session_id        TEXT NOT NULL REFERENCES sessions(id),
    fire_at           TEXT NOT NULL,
    text              TEXT NOT NULL,
    created_at        TEXT NOT NULL,
    cancelled         INTEGER NOT NULL DEFAULT 0
);";

const CREATE_PARENT_WAKE_REGISTRATIONS: &str = "
CREATE TABLE IF NOT EXISTS parent_wake_registrations (
    child_session_id  TEXT PRIMARY KEY REFERENCES sessions(id),
    parent_session_id TEXT NOT NULL REFERENCES sessions(id),
    period_seconds    INTEGER NOT NULL,
    registered_at     TEXT NOT NULL
);";

const CREATE_WATCH_REGISTRATIONS: &str = "
CREATE TABLE IF NOT EXISTS watch_registrations (
    id                  TEXT PRIMARY KEY,
    watcher_session_id  TEXT NOT NULL REFERENCES sessions(id),
    target_session_id   TEXT NOT NULL REFERENCES sessions(id),
    timeout_seconds     INTEGER NOT NULL,
    registered_at       TEXT NOT NULL
);";

const CREATE_TOOL_USAGE: &str = "
CREATE TABLE IF NOT EXISTS tool_usage (
    id                 TEXT PRIMARY KEY,
    session_id         TEXT NOT NULL REFERENCES sessions(id),
    session_name       TEXT NOT NULL,
    parent_session_id  TEXT REFERENCES sessions(id),
    hook_type          TEXT NOT NULL,
    tool_name          TEXT NOT NULL,
    tool_input         TEXT,
    tool_response      TEXT,
    occurred_at        TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_tool_usage_session ON tool_usage(session_id, occurred_at);";

const CREATE_CONTEXT_MONITOR_ENROLMENTS: &str = "
CREATE TABLE IF NOT EXISTS context_monitor_enrolments (
    session_id               TEXT PRIMARY KEY REFERENCES sessions(id),
    enabled                  INTEGER NOT NULL DEFAULT 0,
    notify_target_session_id TEXT,
    warning_sent             INTEGER NOT NULL DEFAULT 0,
    critical_sent            INTEGER NOT NULL DEFAULT 0,
    enrolled_at              TEXT NOT NULL
);";

/// Create every table if absent and stamp `schema_version`. Idempotent: safe
/// to call on every daemon startup.
pub fn initialize(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(CREATE_SCHEMA_VERSION)?;
    conn.execute_batch(CREATE_SESSIONS)?;
    conn.execute_batch(CREATE_SESSION_DELIVERY_STATE)?;
    conn.execute_batch(CREATE_MESSAGE_QUEUE)?;
    conn.execute_batch(CREATE_REMIND_REGISTRATIONS)?;
    conn.execute_batch(CREATE_SCHEDULED_REMINDERS)?;
    conn.execute_batch(CREATE_PARENT_WAKE_REGISTRATIONS)?;
    conn.execute_batch(CREATE_WATCH_REGISTRATIONS)?;
    conn.execute_batch(CREATE_TOOL_USAGE)?;
    conn.execute_batch(CREATE_CONTEXT_MONITOR_ENROLMENTS)?;

    let count: i64 = conn.query_row("SELECT COUNT(*) FROM schema_version", [], |r| r.get(0))?;
    if count == 0 {
        conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [CURRENT_SCHEMA_VERSION])?;
    } else {
        let version: i64 =
            conn.query_row("SELECT version FROM schema_version", [], |r| r.get(0))?;
        if version > CURRENT_SCHEMA_VERSION {
            return Err(StoreError::Migration(format!(
                "database schema version {version} is newer than this build supports ({CURRENT_SCHEMA_VERSION})"
            )));
        }
    }
    Ok(())
}
