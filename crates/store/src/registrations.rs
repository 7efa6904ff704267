// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable mirrors of the three timer-job registrations plus the
//! context-monitor enrolment (`spec.md` §3, §4.2).

use chrono::{DateTime, Utc};
use rusqlite::params;
use sm_core::id::SessionId;
use sm_core::registration::{
    ContextMonitorEnrolment, ParentWakeRegistration, RemindRegistration, ScheduledReminder,
    WatchRegistration,
};

use crate::{Store, StoreError, StoreResult};

impl Store {
    // -- remind ------------------------------------------------------------

    pub async fn upsert_remind(&self, reg: &RemindRegistration) -> StoreResult<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO remind_registrations
                (session_id, soft_threshold_seconds, hard_threshold_seconds, registered_at)
             VALUES (?1,?2,?3,?4)
             ON CONFLICT(session_id) DO UPDATE SET
                soft_threshold_seconds = excluded.soft_threshold_seconds,
                hard_threshold_seconds = excluded.hard_threshold_seconds,
                registered_at = excluded.registered_at",
            params![
                reg.session_id.to_string(),
                reg.soft_threshold_seconds as i64,
                reg.hard_threshold_seconds as i64,
                reg.registered_at,
            ],
        )?;
        Ok(())
    }

    pub async fn get_remind(&self, session_id: SessionId) -> StoreResult<Option<RemindRegistration>> {
        let conn = self.conn.lock().await;
        let result = conn.query_row(
            "SELECT session_id, soft_threshold_seconds, hard_threshold_seconds, registered_at
             FROM remind_registrations WHERE session_id = ?1",
            [session_id.to_string()],
            |row| {
                let id: String = row.get(0)?;
                Ok(RemindRegistration {
                    session_id: SessionId::parse(&id).unwrap_or(session_id),
                    soft_threshold_seconds: row.get::<_, i64>(1)? as u64,
                    hard_threshold_seconds: row.get::<_, i64>(2)? as u64,
                    registered_at: row.get(3)?,
                })
            },
        );
        match result {
            Ok(r) => Ok(Some(r)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::Sqlite(e)),
        }
    }

    pub async fn cancel_remind(&self, session_id: SessionId) -> StoreResult<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "DELETE FROM remind_registrations WHERE session_id = ?1",
            [session_id.to_string()],
        )?;
        Ok(())
    }

    pub async fn all_reminds(&self) -> StoreResult<Vec<RemindRegistration>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT session_id, soft_threshold_seconds, hard_threshold_seconds, registered_at
             FROM remind_registrations",
        )?;
        let rows = stmt.query_map([], |row| {
            let id: String = row.get(0)?;
            Ok(RemindRegistration {
                session_id: SessionId::parse(&id)
                    .unwrap_or_else(|| SessionId::parse("00000000").expect("static")),
                soft_threshold_seconds: row.get::<_, i64>(1)? as u64,
                hard_threshold_seconds: row.get::<_, i64>(2)? as u64,
                registered_at: row.get(3)?,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    // -- parent-wake ---------------------------------------------------------

    pub async fn upsert_parent_wake(&self, reg: &ParentWakeRegistration) -> StoreResult<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO parent_wake_registrations
                (child_session_id, parent_session_id, period_seconds, registered_at)
             VALUES (?1,?2,?3,?4)
             ON CONFLICT(child_session_id) DO UPDATE SET
                parent_session_id = excluded.parent_session_id,
                period_seconds = excluded.period_seconds,
                registered_at = excluded.registered_at",
            params![
                reg.child_session_id.to_string(),
                reg.parent_session_id.to_string(),
                reg.period_seconds as i64,
                reg.registered_at,
            ],
        )?;
        Ok(())
    }

    pub async fn cancel_parent_wake(&self, child_session_id: SessionId) -> StoreResult<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "DELETE FROM parent_wake_registrations WHERE child_session_id = ?1",
            [child_session_id.to_string()],
        )?;
        Ok(())
    }

    pub async fn all_parent_wakes(&self) -> StoreResult<Vec<ParentWakeRegistration>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT child_session_id, parent_session_id, period_seconds, registered_at
             FROM parent_wake_registrations",
        )?;
        let rows = stmt.query_map([], |row| {
            let child: String = row.get(0)?;
            let parent: String = row.get(1)?;
            Ok(ParentWakeRegistration {
                child_session_id: SessionId::parse(&child)
                    .unwrap_or_else(|| SessionId::parse("00000000").expect("static")),
                parent_session_id: SessionId::parse(&parent)
                    .unwrap_or_else(|| SessionId::parse("00000000").expect("static")),
                period_seconds: row.get::<_, i64>(2)? as u64,
                registered_at: row.get(3)?,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    // -- watch (ephemeral) -----------------------------------------------

    pub async fn insert_watch(&self, reg: &WatchRegistration) -> StoreResult<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO watch_registrations
                (id, watcher_session_id, target_session_id, timeout_seconds, registered_at)
             VALUES (?1,?2,?3,?4,?5)",
            params![
                reg.id.to_string(),
                reg.watcher_session_id.to_string(),
                reg.target_session_id.to_string(),
                reg.timeout_seconds as i64,
                reg.registered_at,
            ],
        )?;
        Ok(())
    }

    pub async fn delete_watch(&self, id: uuid::Uuid) -> StoreResult<()> {
        let conn = self.conn.lock().await;
        conn.execute("DELETE FROM watch_registrations WHERE id = ?1", [id.to_string()])?;
        Ok(())
    }

    // -- scheduled (one-shot) reminders --------------------------------------

    pub async fn insert_scheduled_reminder(&self, reminder: &ScheduledReminder) -> StoreResult<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO scheduled_reminders (id, session_id, fire_at, text, created_at, cancelled)
             VALUES (?1,?2,?3,?4,?5,0)",
            params![
                reminder.id.to_string(),
                reminder.session_id.to_string(),
                reminder.fire_at,
                reminder.text,
                reminder.created_at,
            ],
        )?;
        Ok(())
    }

    /// Every scheduled reminder due at or before `now` that hasn't already
    /// fired or been cancelled. Callers are responsible for calling
    /// [`Self::cancel_scheduled_reminder`] once delivered.
    pub async fn due_scheduled_reminders(&self, now: DateTime<Utc>) -> StoreResult<Vec<ScheduledReminder>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, session_id, fire_at, text, created_at FROM scheduled_reminders
             WHERE cancelled = 0 AND fire_at <= ?1",
        )?;
        let rows = stmt.query_map([now], |row| {
            let id: String = row.get(0)?;
            let session: String = row.get(1)?;
            Ok(ScheduledReminder {
                id: uuid::Uuid::parse_str(&id).unwrap_or_else(|_| uuid::Uuid::nil()),
                session_id: SessionId::parse(&session)
                    .unwrap_or_else(|| SessionId::parse("00000000").expect("static")),
                fire_at: row.get(2)?,
                text: row.get(3)?,
                created_at: row.get(4)?,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub async fn all_scheduled_reminders(&self) -> StoreResult<Vec<ScheduledReminder>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, session_id, fire_at, text, created_at FROM scheduled_reminders WHERE cancelled = 0",
        )?;
        let rows = stmt.query_map([], |row| {
            let id: String = row.get(0)?;
            let session: String = row.get(1)?;
            Ok(ScheduledReminder {
                id: uuid::Uuid::parse_str(&id).unwrap_or_else(|_| uuid::Uuid::nil()),
                session_id: SessionId::parse(&session)
                    .unwrap_or_else(|| SessionId::parse("00000000").expect("static")),
                fire_at: row.get(2)?,
                text: row.get(3)?,
                created_at: row.get(4)?,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub async fn cancel_scheduled_reminder(&self, id: uuid::Uuid) -> StoreResult<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE scheduled_reminders SET cancelled = 1 WHERE id = ?1",
            [id.to_string()],
        )?;
        Ok(())
    }

    // -- context monitor ----------------------------------------------------

    pub async fn upsert_context_monitor(
        &self,
        enrolment: &ContextMonitorEnrolment,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO context_monitor_enrolments
                (session_id, enabled, notify_target_session_id, warning_sent, critical_sent, enrolled_at)
             VALUES (?1,?2,?3,?4,?5,?6)
             ON CONFLICT(session_id) DO UPDATE SET
                enabled = excluded.enabled,
                notify_target_session_id = excluded.notify_target_session_id,
                warning_sent = excluded.warning_sent,
                critical_sent = excluded.critical_sent",
            params![
                enrolment.session_id.to_string(),
                enrolment.enabled as i64,
                enrolment.notify_target_session_id.map(|s| s.to_string()),
                enrolment.warning_sent as i64,
                enrolment.critical_sent as i64,
                now,
            ],
        )?;
        Ok(())
    }

    pub async fn list_context_monitor_enrolments(&self) -> StoreResult<Vec<ContextMonitorEnrolment>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT session_id, enabled, notify_target_session_id, warning_sent, critical_sent
             FROM context_monitor_enrolments WHERE enabled = 1",
        )?;
        let rows = stmt.query_map([], |row| {
            let id: String = row.get(0)?;
            let notify: Option<String> = row.get(2)?;
            Ok(ContextMonitorEnrolment {
                session_id: SessionId::parse(&id)
                    .unwrap_or_else(|| SessionId::parse("00000000").expect("static")),
                enabled: row.get::<_, i64>(1)? != 0,
                notify_target_session_id: notify.and_then(|s| SessionId::parse(&s)),
                warning_sent: row.get::<_, i64>(3)? != 0,
                critical_sent: row.get::<_, i64>(4)? != 0,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn remind_upsert_then_cancel() {
        let store = Store::open_in_memory().unwrap();
        let session_id = SessionId::generate();
        let reg = RemindRegistration {
            session_id,
            soft_threshold_seconds: 180,
            hard_threshold_seconds: 300,
            registered_at: Utc::now(),
        };
        store.upsert_remind(&reg).await.unwrap();
        let fetched = store.get_remind(session_id).await.unwrap().unwrap();
        assert_eq!(fetched.soft_threshold_seconds, 180);
        store.cancel_remind(session_id).await.unwrap();
        assert!(store.get_remind(session_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn scheduled_reminder_due_then_cancel() {
        let store = Store::open_in_memory().unwrap();
        let session_id = SessionId::generate();
        let reminder = ScheduledReminder {
            id: uuid::Uuid::new_v4(),
            session_id,
            fire_at: Utc::now() - chrono::Duration::seconds(1),
            text: "check in".into(),
            created_at: Utc::now(),
        };
        store.insert_scheduled_reminder(&reminder).await.unwrap();
        let due = store.due_scheduled_reminders(Utc::now()).await.unwrap();
        assert_eq!(due.len(), 1);
        store.cancel_scheduled_reminder(reminder.id).await.unwrap();
        assert!(store.due_scheduled_reminders(Utc::now()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn context_monitor_roundtrip() {
        let store = Store::open_in_memory().unwrap();
        let session_id = SessionId::generate();
        let notify = SessionId::generate();
        let enrolment = ContextMonitorEnrolment {
            session_id,
            enabled: true,
            notify_target_session_id: Some(notify),
            warning_sent: false,
            critical_sent: false,
        };
        store.upsert_context_monitor(&enrolment, Utc::now()).await.unwrap();
        let all = store.list_context_monitor_enrolments().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].notify_target_session_id, Some(notify));
    }
}
