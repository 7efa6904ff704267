// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only audit log (`spec.md` §3 `ToolUseEntry`). Rows are never
//! updated or deleted through normal operation — Pre/Post rows are
//! correlated by `tool_use_id` at read time, not merged at write time.

use rusqlite::{params, Row};
use sm_core::id::SessionId;
use sm_core::tool_use::{HookType, ToolUseEntry};

use crate::{Store, StoreResult};

fn hook_type_to_str(h: HookType) -> &'static str {
    match h {
        HookType::PreToolUse => "PreToolUse",
        HookType::PostToolUse => "PostToolUse",
        HookType::SubagentStart => "SubagentStart",
        HookType::SubagentStop => "SubagentStop",
    }
}

fn row_to_entry(row: &Row<'_>) -> rusqlite::Result<ToolUseEntry> {
    let session_id: Option<String> = row.get("session_id")?;
    let parent_session_id: Option<String> = row.get("parent_session_id")?;
    let hook_type_str: String = row.get("hook_type")?;
    let tool_input: Option<String> = row.get("tool_input")?;
    let tool_response: Option<String> = row.get("tool_response")?;

    let tool_input_val: Option<serde_json::Value> =
        tool_input.and_then(|s| serde_json::from_str(&s).ok());
    let target_file = tool_input_val
        .as_ref()
        .and_then(|v| v.get("file_path").or_else(|| v.get("path")))
        .and_then(|v| v.as_str())
        .map(str::to_string);
    let bash_command = tool_input_val
        .as_ref()
        .and_then(|v| v.get("command"))
        .and_then(|v| v.as_str())
        .map(str::to_string);

    Ok(ToolUseEntry {
        timestamp: row.get("occurred_at")?,
        session_id: session_id.and_then(|s| SessionId::parse(&s)),
        claude_session_id: None,
        hook_type: HookType::parse(&hook_type_str).unwrap_or(HookType::PreToolUse),
        tool_name: row.get("tool_name")?,
        target_file,
        bash_command,
        tool_use_id: None,
        cwd: None,
        agent_id: None,
        session_name: row.get("session_name")?,
        parent_session_id: parent_session_id.and_then(|s| SessionId::parse(&s)),
        tool_response: tool_response.and_then(|s| serde_json::from_str(&s).ok()),
    })
}

impl Store {
    pub async fn insert_tool_use(&self, entry: &ToolUseEntry) -> StoreResult<()> {
        let conn = self.conn.lock().await;
        let tool_input = match (&entry.target_file, &entry.bash_command) {
            (Some(f), _) => Some(serde_json::json!({ "file_path": f }).to_string()),
            (None, Some(c)) => Some(serde_json::json!({ "command": c }).to_string()),
            (None, None) => None,
        };
        conn.execute(
            "INSERT INTO tool_usage (
                id, session_id, session_name, parent_session_id, hook_type,
                tool_name, tool_input, tool_response, occurred_at
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)",
            params![
                uuid::Uuid::new_v4().to_string(),
                entry.session_id.map(|s| s.to_string()),
                entry.session_name,
                entry.parent_session_id.map(|s| s.to_string()),
                hook_type_to_str(entry.hook_type),
                entry.tool_name,
                tool_input,
                entry.tool_response.as_ref().map(|v| v.to_string()),
                entry.timestamp,
            ],
        )?;
        Ok(())
    }

    pub async fn recent_tool_uses(
        &self,
        session_id: SessionId,
        limit: u32,
    ) -> StoreResult<Vec<ToolUseEntry>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT * FROM tool_usage WHERE session_id = ?1 ORDER BY occurred_at DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![session_id.to_string(), limit], row_to_entry)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    #[tokio::test]
    async fn insert_and_read_back_survives_missing_session() {
        let store = Store::open_in_memory().unwrap();
        let session_id = SessionId::generate();
        let entry = ToolUseEntry {
            timestamp: Utc::now(),
            session_id: Some(session_id),
            claude_session_id: None,
            hook_type: HookType::PreToolUse,
            tool_name: "Bash".into(),
            target_file: None,
            bash_command: Some("ls -la".into()),
            tool_use_id: Some("tu-1".into()),
            cwd: Some("/tmp".into()),
            agent_id: None,
            session_name: Some("claude-deadbeef".into()),
            parent_session_id: None,
            tool_response: None,
        };
        store.insert_tool_use(&entry).await.unwrap();
        // The session row is never created: the audit log must remain
        // readable after the session record itself is pruned.
        let rows = store.recent_tool_uses(session_id, 10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].tool_name, "Bash");
        assert_eq!(rows[0].bash_command.as_deref(), Some("ls -la"));
    }
}
