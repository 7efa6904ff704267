// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! C2: persistence. One embedded SQLite file holds every durable record the
//! scheduler needs to survive a daemon restart — sessions, the message
//! queue, timer registrations, tool-usage history, and context-monitor
//! enrolments (`spec.md` §1, §3). A JSON snapshot mirrors the session table
//! for operators who want to `cat` current state without a SQLite client.
//!
//! `rusqlite::Connection` isn't `Sync`; callers share a `Store` behind
//! `Arc` and every query takes the single internal mutex. Call volume here
//! is bounded by the number of interactive sessions a human drives from one
//! machine, not request throughput, so a single connection is plenty.

pub mod messages;
pub mod registrations;
pub mod schema;
pub mod sessions;
pub mod snapshot;
pub mod tool_usage;

use std::path::Path;

use rusqlite::Connection;
use tokio::sync::Mutex;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("schema migration error: {0}")]
    Migration(String),
    #[error("record not found: {0}")]
    NotFound(String),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        // Foreign keys are documentary, not enforced: the message queue and
        // the tool-usage audit log are both allowed to outlive the session
        // row they reference (spec.md §3 "may remain in the audit log";
        // §4.2 startup reload drops orphaned queue rows rather than relying
        // on cascading deletes).
        schema::initialize(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        schema::initialize(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn opens_in_memory_and_initializes_schema() {
        let store = Store::open_in_memory().unwrap();
        let conn = store.conn.lock().await;
        let version: i64 = conn
            .query_row("SELECT version FROM schema_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(version, schema::CURRENT_SCHEMA_VERSION);
    }
}
