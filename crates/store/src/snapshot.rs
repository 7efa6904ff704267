// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Full-fidelity JSON snapshot of the session registry (`spec.md` §6
//! "Persisted state layout"). Written on every registry mutation; read back
//! on daemon startup before the SQL mirror, since it — unlike the `sessions`
//! table — carries every field of `sm_core::Session` including the ones the
//! relational schema treats as ambient/ephemeral (token counters, agent
//! status text, spawn bookkeeping, Telegram routing).
//!
//! A legacy snapshot may carry `telegram_topic_id` instead of
//! `telegram_thread_id` (`spec.md` §8 round-trip law); [`load`] maps the old
//! field name onto the new one transparently.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sm_core::id::SessionId;
use sm_core::session::Session;

use crate::StoreResult;

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotFile {
    sessions: Vec<SnapshotSession>,
}

/// Wire shape for a single session. Mirrors `sm_core::Session` field for
/// field, with the legacy `telegram_topic_id` alias accepted on read.
#[derive(Debug, Serialize, Deserialize)]
struct SnapshotSession {
    #[serde(flatten)]
    session: Session,
    /// Legacy field name, accepted on read and never written.
    #[serde(default, skip_serializing)]
    telegram_topic_id: Option<i64>,
}

/// Atomically write `sessions` to `path` as a JSON snapshot: write to a
/// sibling temp file, then rename over the target, so a crash mid-write
/// never leaves a half-written snapshot behind.
pub async fn save(path: &Path, sessions: &HashMap<SessionId, Session>) -> StoreResult<()> {
    let file = SnapshotFile {
        sessions: sessions
            .values()
            .cloned()
            .map(|session| SnapshotSession { session, telegram_topic_id: None })
            .collect(),
    };
    let json = serde_json::to_vec_pretty(&file)?;
    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, &json).await?;
    tokio::fs::rename(&tmp_path, path).await?;
    Ok(())
}

/// Load the snapshot, mapping `telegram_topic_id` onto `telegram_thread_id`
/// when the new field is absent (`spec.md` §8 round-trip law). Returns an
/// empty map if the snapshot file doesn't exist yet.
pub async fn load(path: &Path) -> StoreResult<HashMap<SessionId, Session>> {
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        return Ok(HashMap::new());
    }
    let bytes = tokio::fs::read(path).await?;
    let file: SnapshotFile = serde_json::from_slice(&bytes)?;
    let mut out = HashMap::new();
    for mut entry in file.sessions {
        if entry.session.telegram_thread_id.is_none() {
            entry.session.telegram_thread_id = entry.telegram_topic_id;
        }
        out.insert(entry.session.id, entry.session);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use sm_core::session::Provider;
    use tempfile::tempdir;

    use super::*;

    fn sample_session() -> Session {
        let id = SessionId::generate();
        Session {
            id,
            name: format!("claude-{id}"),
            friendly_name: Some("dev".into()),
            working_dir: "/tmp".into(),
            window_name: format!("claude-{id}"),
            provider: Provider::Claude,
            status: sm_core::session::SessionStatus::Running,
            created_at: chrono::Utc::now(),
            last_activity: chrono::Utc::now(),
            parent_session_id: None,
            is_em: false,
            role: None,
            completion_status: None,
            completion_message: None,
            agent_status_text: Some("writing tests".into()),
            agent_status_at: Some(chrono::Utc::now()),
            tokens_used: 1234,
            tools_used: HashMap::from([("Bash".to_string(), 3)]),
            last_tool_call: None,
            last_tool_summary: None,
            spawn_prompt: None,
            spawned_at: None,
            completed_at: None,
            current_task: Some("write snapshot tests".into()),
            claude_session_id: None,
            context_monitor_enabled: false,
            context_monitor_notify_target: None,
            context_warning_sent: false,
            context_critical_sent: false,
            context_compacting: false,
            transcript_path: None,
            telegram_chat_id: Some(42),
            telegram_thread_id: Some(7),
            last_handoff_path: None,
            log_file: "/tmp/log".into(),
            pid: Some(9999),
        }
    }

    #[tokio::test]
    async fn roundtrips_full_session_fidelity() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sessions.json");
        let s = sample_session();
        let mut map = HashMap::new();
        map.insert(s.id, s.clone());

        save(&path, &map).await.unwrap();
        let loaded = load(&path).await.unwrap();

        let back = loaded.get(&s.id).unwrap();
        assert_eq!(back.tokens_used, 1234);
        assert_eq!(back.agent_status_text.as_deref(), Some("writing tests"));
        assert_eq!(back.tools_used.get("Bash"), Some(&3));
        assert_eq!(back.telegram_thread_id, Some(7));
    }

    #[tokio::test]
    async fn legacy_topic_id_maps_onto_thread_id() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sessions.json");
        let s = sample_session();
        let id = s.id;

        // Simulate a legacy snapshot: telegram_topic_id present, thread_id absent.
        let mut value = serde_json::to_value(&s).unwrap();
        let obj = value.as_object_mut().unwrap();
        obj.remove("telegram_thread_id");
        obj.insert("telegram_topic_id".to_string(), serde_json::json!(7));
        let legacy = serde_json::json!({ "sessions": [value] });
        tokio::fs::write(&path, serde_json::to_vec(&legacy).unwrap()).await.unwrap();

        let loaded = load(&path).await.unwrap();
        assert_eq!(loaded.get(&id).unwrap().telegram_thread_id, Some(7));
    }

    #[tokio::test]
    async fn missing_snapshot_loads_as_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sessions.json");
        let loaded = load(&path).await.unwrap();
        assert!(loaded.is_empty());
    }
}
