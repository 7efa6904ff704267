// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable mirror of the per-session message queue (`spec.md` §4.2). Reads
//! of the pending list use `delivered_at IS NULL AND (timeout_at IS NULL OR
//! timeout_at > now) ORDER BY queued_at`, matching the pending invariant in
//! `spec.md` §3.

use chrono::{DateTime, Utc};
use rusqlite::{params, Row};
use sm_core::id::SessionId;
use sm_core::message::{DeliveryMode, QueuedMessage};

use crate::{Store, StoreError, StoreResult};

fn mode_to_str(m: DeliveryMode) -> &'static str {
    match m {
        DeliveryMode::Sequential => "sequential",
        DeliveryMode::Important => "important",
        DeliveryMode::Urgent => "urgent",
        DeliveryMode::Steer => "steer",
    }
}

fn mode_from_str(s: &str) -> StoreResult<DeliveryMode> {
    Ok(match s {
        "sequential" => DeliveryMode::Sequential,
        "important" => DeliveryMode::Important,
        "urgent" => DeliveryMode::Urgent,
        "steer" => DeliveryMode::Steer,
        other => return Err(StoreError::Migration(format!("unknown delivery mode {other}"))),
    })
}

fn row_to_message(row: &Row<'_>) -> rusqlite::Result<QueuedMessage> {
    let id: String = row.get("id")?;
    let target: String = row.get("target_session_id")?;
    let sender: Option<String> = row.get("sender")?;
    let mode_str: String = row.get("mode")?;

    Ok(QueuedMessage {
        id: uuid::Uuid::parse_str(&id).unwrap_or_else(|_| uuid::Uuid::nil()),
        target: SessionId::parse(&target).unwrap_or_else(|| {
            // Parsing failures here indicate on-disk corruption; surfaced to
            // the caller as a nil/garbage id rather than panicking so a
            // single bad row doesn't take down the whole pending-list read.
            SessionId::parse("00000000").expect("static fallback id")
        }),
        sender: sender.and_then(|s| SessionId::parse(&s)),
        sender_name: row.get("sender_name")?,
        text: row.get("text")?,
        mode: mode_from_str(&mode_str).unwrap_or(DeliveryMode::Sequential),
        queued_at: row.get("queued_at")?,
        timeout_at: row.get("timeout_at")?,
        notify_on_delivery: row.get::<_, i64>("notify_on_delivery")? != 0,
        notify_after_seconds: row.get::<_, Option<i64>>("notify_after_seconds")?.map(|s| s as u64),
        notify_on_stop: row.get::<_, i64>("notify_on_stop")? != 0,
        delivered_at: row.get("delivered_at")?,
    })
}

impl Store {
    pub async fn insert_message(&self, msg: &QueuedMessage) -> StoreResult<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO message_queue (
                id, target_session_id, sender, sender_name, text, mode, queued_at,
                timeout_at, notify_on_delivery, notify_after_seconds, notify_on_stop, delivered_at
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12)",
            params![
                msg.id.to_string(),
                msg.target.to_string(),
                msg.sender.map(|s| s.to_string()),
                msg.sender_name,
                msg.text,
                mode_to_str(msg.mode),
                msg.queued_at,
                msg.timeout_at,
                msg.notify_on_delivery as i64,
                msg.notify_after_seconds.map(|s| s as i64),
                msg.notify_on_stop as i64,
                msg.delivered_at,
            ],
        )?;
        Ok(())
    }

    /// Pending messages for `target`, FIFO by `queued_at`. Mirrors the
    /// `spec.md` §4.2 `SELECT` exactly.
    pub async fn pending_messages(
        &self,
        target: SessionId,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<QueuedMessage>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT * FROM message_queue
             WHERE target_session_id = ?1
               AND delivered_at IS NULL
               AND (timeout_at IS NULL OR timeout_at > ?2)
             ORDER BY queued_at ASC",
        )?;
        let rows = stmt.query_map(params![target.to_string(), now], row_to_message)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// All pending messages across every session, used on daemon startup to
    /// reload the in-memory queues (`spec.md` §4.2).
    pub async fn all_pending_messages(&self, now: DateTime<Utc>) -> StoreResult<Vec<QueuedMessage>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT * FROM message_queue
             WHERE delivered_at IS NULL AND (timeout_at IS NULL OR timeout_at > ?1)
             ORDER BY queued_at ASC",
        )?;
        let rows = stmt.query_map(params![now], row_to_message)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// The most recently queued message addressed to `target`, delivered or
    /// not — backs `GET /admin/last-message/:id`.
    pub async fn last_message_for_session(&self, target: SessionId) -> StoreResult<Option<QueuedMessage>> {
        let conn = self.conn.lock().await;
        let result = conn.query_row(
            "SELECT * FROM message_queue WHERE target_session_id = ?1 ORDER BY queued_at DESC LIMIT 1",
            [target.to_string()],
            row_to_message,
        );
        match result {
            Ok(m) => Ok(Some(m)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::Sqlite(e)),
        }
    }

    pub async fn mark_delivered(&self, id: uuid::Uuid, at: DateTime<Utc>) -> StoreResult<()> {
        let conn = self.conn.lock().await;
        let changed = conn.execute(
            "UPDATE message_queue SET delivered_at = ?1 WHERE id = ?2",
            params![at, id.to_string()],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }

    pub async fn delete_message(&self, id: uuid::Uuid) -> StoreResult<()> {
        let conn = self.conn.lock().await;
        conn.execute("DELETE FROM message_queue WHERE id = ?1", [id.to_string()])?;
        Ok(())
    }

    /// Drop every queued message addressed to a session that no longer
    /// exists, per the startup-reload rule in `spec.md` §4.2.
    pub async fn drop_messages_for_missing_targets(&self) -> StoreResult<u64> {
        let conn = self.conn.lock().await;
        let changed = conn.execute(
            "DELETE FROM message_queue
             WHERE target_session_id NOT IN (SELECT id FROM sessions)",
            [],
        )?;
        Ok(changed as u64)
    }
}

#[cfg(test)]
mod tests {
    use sm_core::session::Provider;

    use super::*;

    async fn seeded_store() -> (Store, SessionId) {
        let store = Store::open_in_memory().unwrap();
        let id = SessionId::generate();
        let session = sm_core::Session {
            id,
            name: format!("claude-{id}"),
            friendly_name: None,
            working_dir: "/tmp".into(),
            window_name: format!("claude-{id}"),
            provider: Provider::Claude,
            status: sm_core::session::SessionStatus::Running,
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
            tools_used: Default::default(),
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
            log_file: "/tmp/log".into(),
            pid: None,
        };
        store.insert_session(&session).await.unwrap();
        (store, id)
    }

    #[tokio::test]
    async fn pending_messages_are_fifo() {
        let (store, target) = seeded_store().await;
        for text in ["first", "second", "third"] {
            let msg = QueuedMessage::new(
                target,
                None,
                None,
                text.into(),
                DeliveryMode::Sequential,
                None,
                None,
                false,
                false,
            );
            store.insert_message(&msg).await.unwrap();
        }
        let pending = store.pending_messages(target, Utc::now()).await.unwrap();
        let texts: Vec<_> = pending.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn delivered_messages_are_excluded() {
        let (store, target) = seeded_store().await;
        let msg = QueuedMessage::new(
            target,
            None,
            None,
            "hi".into(),
            DeliveryMode::Sequential,
            None,
            None,
            false,
            false,
        );
        store.insert_message(&msg).await.unwrap();
        store.mark_delivered(msg.id, Utc::now()).await.unwrap();
        let pending = store.pending_messages(target, Utc::now()).await.unwrap();
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn dropping_messages_for_missing_targets() {
        let store = Store::open_in_memory().unwrap();
        let ghost = SessionId::generate();
        let msg = QueuedMessage::new(
            ghost,
            None,
            None,
            "orphaned".into(),
            DeliveryMode::Sequential,
            None,
            None,
            false,
            false,
        );
        store.insert_message(&msg).await.unwrap();
        let dropped = store.drop_messages_for_missing_targets().await.unwrap();
        assert_eq!(dropped, 1);
        let remaining = store.all_pending_messages(Utc::now()).await.unwrap();
        assert!(remaining.is_empty());
    }
}
