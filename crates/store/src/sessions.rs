// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use chrono::{DateTime, Utc};
use rusqlite::{params, Row};
use sm_core::id::SessionId;
use sm_core::session::{Provider, Session, SessionStatus};

use crate::{Store, StoreError, StoreResult};

fn status_to_str(s: SessionStatus) -> &'static str {
    match s {
        SessionStatus::Running => "running",
        SessionStatus::Idle => "idle",
        SessionStatus::WaitingPermission => "waiting_permission",
        SessionStatus::WaitingInput => "waiting_input",
        SessionStatus::Stopped => "stopped",
        SessionStatus::Error => "error",
    }
}

fn status_from_str(s: &str) -> StoreResult<SessionStatus> {
    Ok(match s {
        "running" => SessionStatus::Running,
        "idle" => SessionStatus::Idle,
        "waiting_permission" => SessionStatus::WaitingPermission,
        "waiting_input" => SessionStatus::WaitingInput,
        "stopped" => SessionStatus::Stopped,
        "error" => SessionStatus::Error,
        other => return Err(StoreError::Migration(format!("unknown session status {other}"))),
    })
}

fn row_to_session(row: &Row<'_>) -> rusqlite::Result<Session> {
    let id_str: String = row.get("id")?;
    let id = SessionId::parse(&id_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            "invalid session id".into(),
        )
    })?;
    let provider_str: String = row.get("provider")?;
    let provider = Provider::from_str_loose(&provider_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            "unknown provider".into(),
        )
    })?;
    let status_str: String = row.get("status")?;
    let status = status_from_str(&status_str).map_err(|_| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            "unknown status".into(),
        )
    })?;
    let parent_session_id: Option<String> = row.get("parent_session_id")?;
    let parent_session_id = parent_session_id.and_then(|s| SessionId::parse(&s).ok());

    let created_at: DateTime<Utc> = row.get("created_at")?;
    let log_file: String = row.get("log_file")?;
    let window_name: String = row.get("tmux_window")?;
    let name: String = row.get("name")?;

    Ok(Session {
        id,
        name,
        friendly_name: row.get("friendly_name")?,
        working_dir: row.get("working_dir")?,
        window_name,
        provider,
        status,
        created_at,
        last_activity: row.get("updated_at")?,
        parent_session_id,
        is_em: row.get::<_, i64>("is_em").unwrap_or(0) != 0,
        role: row.get("role")?,
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
        current_task: row.get("task")?,
        claude_session_id: row.get("claude_session_id")?,
        context_monitor_enabled: row.get::<_, i64>("context_monitor")? != 0,
        context_monitor_notify_target: None,
        context_warning_sent: false,
        context_critical_sent: false,
        context_compacting: false,
        transcript_path: row.get("transcript_path")?,
        telegram_chat_id: None,
        telegram_thread_id: None,
        last_handoff_path: None,
        log_file: log_file.into(),
        pid: row.get::<_, Option<i64>>("pid")?.map(|p| p as u32),
    })
}

impl Store {
    pub async fn insert_session(&self, session: &Session) -> StoreResult<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO sessions (
                id, name, friendly_name, provider, status, working_dir, tmux_window,
                log_file, pid, parent_session_id, task, role, is_em,
                context_monitor, session_manager_id, claude_session_id,
                transcript_path, created_at, updated_at
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19)",
            params![
                session.id.to_string(),
                session.name,
                session.friendly_name,
                session.provider.as_str(),
                status_to_str(session.status),
                session.working_dir,
                session.window_name,
                session.log_file.to_string_lossy().to_string(),
                session.pid.map(|p| p as i64),
                session.parent_session_id.map(|id| id.to_string()),
                session.current_task,
                session.role,
                session.is_em as i64,
                session.context_monitor_enabled as i64,
                session.id.to_string(),
                session.claude_session_id,
                session.transcript_path,
                session.created_at,
                session.last_activity,
            ],
        )?;
        Ok(())
    }

    pub async fn get_session(&self, id: SessionId) -> StoreResult<Session> {
        let conn = self.conn.lock().await;
        conn.query_row("SELECT * FROM sessions WHERE id = ?1", [id.to_string()], row_to_session)
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound(id.to_string()),
                other => StoreError::Sqlite(other),
            })
    }

    pub async fn get_session_by_friendly_name(&self, name: &str) -> StoreResult<Session> {
        let conn = self.conn.lock().await;
        conn.query_row(
            "SELECT * FROM sessions WHERE friendly_name = ?1",
            [name],
            row_to_session,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound(name.to_string()),
            other => StoreError::Sqlite(other),
        })
    }

    /// First leg of the three-way Stop/Notification matching chain
    /// (`spec.md` §6): the hook payload's `session_manager_id` is the
    /// session's own id, issued to the agent process as an environment
    /// variable at spawn time.
    pub async fn get_session_by_manager_id(&self, manager_id: &str) -> StoreResult<Session> {
        let conn = self.conn.lock().await;
        conn.query_row(
            "SELECT * FROM sessions WHERE session_manager_id = ?1",
            [manager_id],
            row_to_session,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound(manager_id.to_string()),
            other => StoreError::Sqlite(other),
        })
    }

    pub async fn get_session_by_transcript_path(&self, path: &str) -> StoreResult<Session> {
        let conn = self.conn.lock().await;
        conn.query_row(
            "SELECT * FROM sessions WHERE transcript_path = ?1",
            [path],
            row_to_session,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound(path.to_string()),
            other => StoreError::Sqlite(other),
        })
    }

    pub async fn get_session_by_claude_session_id(&self, id: &str) -> StoreResult<Session> {
        let conn = self.conn.lock().await;
        conn.query_row(
            "SELECT * FROM sessions WHERE claude_session_id = ?1",
            [id],
            row_to_session,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound(id.to_string()),
            other => StoreError::Sqlite(other),
        })
    }

    pub async fn list_sessions(&self) -> StoreResult<Vec<Session>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare("SELECT * FROM sessions ORDER BY created_at ASC")?;
        let rows = stmt.query_map([], row_to_session)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub async fn list_children(&self, parent: SessionId) -> StoreResult<Vec<Session>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT * FROM sessions WHERE parent_session_id = ?1 ORDER BY created_at ASC",
        )?;
        let rows = stmt.query_map([parent.to_string()], row_to_session)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub async fn update_session_status(
        &self,
        id: SessionId,
        status: SessionStatus,
        last_activity: DateTime<Utc>,
    ) -> StoreResult<()> {
        let conn = self.conn.lock().await;
        let changed = conn.execute(
            "UPDATE sessions SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status_to_str(status), last_activity, id.to_string()],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }

    pub async fn update_session_friendly_name(
        &self,
        id: SessionId,
        friendly_name: &str,
    ) -> StoreResult<()> {
        let conn = self.conn.lock().await;
        let changed = conn.execute(
            "UPDATE sessions SET friendly_name = ?1 WHERE id = ?2",
            params![friendly_name, id.to_string()],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }

    pub async fn update_session_task(&self, id: SessionId, task: Option<&str>) -> StoreResult<()> {
        let conn = self.conn.lock().await;
        conn.execute("UPDATE sessions SET task = ?1 WHERE id = ?2", params![task, id.to_string()])?;
        Ok(())
    }

    pub async fn update_session_role(&self, id: SessionId, role: Option<&str>) -> StoreResult<()> {
        let conn = self.conn.lock().await;
        conn.execute("UPDATE sessions SET role = ?1 WHERE id = ?2", params![role, id.to_string()])?;
        Ok(())
    }

    pub async fn update_session_em_role(&self, id: SessionId, is_em: bool) -> StoreResult<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE sessions SET is_em = ?1 WHERE id = ?2",
            params![is_em as i64, id.to_string()],
        )?;
        Ok(())
    }

    pub async fn update_session_context_monitor(
        &self,
        id: SessionId,
        enabled: bool,
    ) -> StoreResult<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE sessions SET context_monitor = ?1 WHERE id = ?2",
            params![enabled as i64, id.to_string()],
        )?;
        Ok(())
    }

    pub async fn update_session_transcript_path(
        &self,
        id: SessionId,
        transcript_path: &str,
    ) -> StoreResult<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE sessions SET transcript_path = ?1 WHERE id = ?2",
            params![transcript_path, id.to_string()],
        )?;
        Ok(())
    }

    pub async fn update_session_claude_session_id(
        &self,
        id: SessionId,
        claude_session_id: &str,
    ) -> StoreResult<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE sessions SET claude_session_id = ?1 WHERE id = ?2",
            params![claude_session_id, id.to_string()],
        )?;
        Ok(())
    }

    pub async fn delete_session(&self, id: SessionId) -> StoreResult<()> {
        let conn = self.conn.lock().await;
        let changed = conn.execute("DELETE FROM sessions WHERE id = ?1", [id.to_string()])?;
        if changed == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use sm_core::session::Provider;

    use super::*;

    fn sample(provider: Provider) -> Session {
        let id = SessionId::generate();
        Session {
            id,
            name: format!("{}-{}", provider.as_str(), id),
            friendly_name: Some(format!("fn-{id}")),
            working_dir: "/tmp".into(),
            window_name: format!("{}-{}", provider.as_str(), id),
            provider,
            status: SessionStatus::Running,
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
            log_file: PathBuf::from("/tmp/log"),
            pid: None,
        }
    }

    #[tokio::test]
    async fn insert_and_get_roundtrips() {
        let store = Store::open_in_memory().unwrap();
        let s = sample(Provider::Claude);
        store.insert_session(&s).await.unwrap();
        let fetched = store.get_session(s.id).await.unwrap();
        assert_eq!(fetched.id, s.id);
        assert_eq!(fetched.friendly_name, s.friendly_name);
        assert_eq!(fetched.provider, Provider::Claude);
    }

    #[tokio::test]
    async fn get_by_manager_id_matches_own_id() {
        let store = Store::open_in_memory().unwrap();
        let s = sample(Provider::Codex);
        store.insert_session(&s).await.unwrap();
        let fetched = store.get_session_by_manager_id(&s.id.to_string()).await.unwrap();
        assert_eq!(fetched.id, s.id);
    }

    #[tokio::test]
    async fn unknown_id_is_not_found() {
        let store = Store::open_in_memory().unwrap();
        let err = store.get_session(SessionId::generate()).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn update_status_changes_row() {
        let store = Store::open_in_memory().unwrap();
        let s = sample(Provider::Claude);
        store.insert_session(&s).await.unwrap();
        store.update_session_status(s.id, SessionStatus::Idle, Utc::now()).await.unwrap();
        let fetched = store.get_session(s.id).await.unwrap();
        assert_eq!(fetched.status, SessionStatus::Idle);
    }
}
