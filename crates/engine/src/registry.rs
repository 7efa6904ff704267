// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! C3: the session registry. In-memory map of `SessionId → Session`,
//! mirrored to `sm-store`; computes derived `activity_state`; owns session
//! lifecycle transitions (`spec.md` §4.3).

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use sm_core::id::{is_valid_friendly_name, SessionId};
use sm_core::session::{ActivityState, CodexAppSignals, Provider, Session, SessionStatus};
use sm_core::{SmError, SmResult};
use sm_store::Store;
use tokio::sync::RwLock;

/// Signals fed by the `codex-app` structured-event protocol, tracked
/// separately from the persisted `Session` row since they churn on every
/// streamed delta (`spec.md` §4.3).
#[derive(Debug, Clone, Default)]
struct CodexAppTracker {
    in_flight: bool,
    last_delta_at: Option<chrono::DateTime<Utc>>,
    waiting_permission_at: Option<chrono::DateTime<Utc>>,
    waiting_input_at: Option<chrono::DateTime<Utc>>,
}

/// Recency window for "recent" waiting-permission/input signals (`spec.md`
/// §4.3: "within the last 10 s").
const CODEX_APP_RECENCY_SECONDS: i64 = 10;

pub struct Registry {
    store: Arc<Store>,
    sessions: RwLock<HashMap<SessionId, Session>>,
    codex_app: RwLock<HashMap<SessionId, CodexAppTracker>>,
}

impl Registry {
    /// Load every persisted session from the JSON snapshot and SQL mirror
    /// on startup. The JSON snapshot is the fast path since it alone
    /// carries every `Session` field (`spec.md` §6, SPEC_FULL.md §4.2).
    pub async fn load(store: Arc<Store>, snapshot_path: &std::path::Path) -> SmResult<Self> {
        let mut sessions = sm_store::snapshot::load(snapshot_path)
            .await
            .map_err(|e| SmError::ExternalIo(e.to_string()))?;
        // Reconcile against the SQL mirror: any session the snapshot missed
        // (e.g. written after a snapshot but before a crash) is still in
        // SQLite, since every registry mutation writes through synchronously.
        let sql_sessions = store.list_sessions().await.map_err(|e| SmError::ExternalIo(e.to_string()))?;
        for session in sql_sessions {
            sessions.entry(session.id).or_insert(session);
        }
        Ok(Self { store, sessions: RwLock::new(sessions), codex_app: RwLock::new(HashMap::new()) })
    }

    pub fn new_empty(store: Arc<Store>) -> Self {
        Self { store, sessions: RwLock::new(HashMap::new()), codex_app: RwLock::new(HashMap::new()) }
    }

    async fn persist_snapshot(&self, snapshot_path: &std::path::Path) {
        let sessions = self.sessions.read().await;
        if let Err(e) = sm_store::snapshot::save(snapshot_path, &sessions).await {
            tracing::warn!("failed to persist session snapshot: {e}");
        }
    }

    /// Insert a freshly constructed session into both the in-memory map and
    /// the durable store. Callers (the engine) are responsible for asking
    /// C1 to actually launch the window before calling this.
    pub async fn insert(&self, session: Session, snapshot_path: &std::path::Path) -> SmResult<()> {
        self.store.insert_session(&session).await.map_err(|e| SmError::ExternalIo(e.to_string()))?;
        self.sessions.write().await.insert(session.id, session);
        self.persist_snapshot(snapshot_path).await;
        Ok(())
    }

    pub async fn get(&self, id: SessionId) -> Option<Session> {
        self.sessions.read().await.get(&id).cloned()
    }

    /// Resolve either an 8-hex-char id or a friendly name.
    pub async fn get_by_id_or_name(&self, id_or_name: &str) -> Option<Session> {
        if let Some(id) = SessionId::parse(id_or_name) {
            if let Some(s) = self.get(id).await {
                return Some(s);
            }
        }
        self.sessions.read().await.values().find(|s| s.friendly_name.as_deref() == Some(id_or_name)).cloned()
    }

    pub async fn list(&self, include_stopped: bool) -> Vec<Session> {
        let sessions = self.sessions.read().await;
        let mut out: Vec<Session> = sessions
            .values()
            .filter(|s| include_stopped || !matches!(s.status, SessionStatus::Stopped | SessionStatus::Error))
            .cloned()
            .collect();
        out.sort_by_key(|s| s.created_at);
        out
    }

    pub async fn list_children(&self, parent: SessionId, recursive: bool) -> Vec<Session> {
        let sessions = self.sessions.read().await;
        if !recursive {
            return sessions.values().filter(|s| s.parent_session_id == Some(parent)).cloned().collect();
        }
        let mut frontier = vec![parent];
        let mut out = Vec::new();
        while let Some(id) = frontier.pop() {
            for s in sessions.values().filter(|s| s.parent_session_id == Some(id)) {
                out.push(s.clone());
                frontier.push(s.id);
            }
        }
        out
    }

    /// Build a fresh `Session` with standard defaults. Does not persist or
    /// launch anything — callers finish the job.
    pub fn new_session(
        working_dir: String,
        provider: Provider,
        friendly_name: Option<String>,
        parent_session_id: Option<SessionId>,
        log_dir: &std::path::Path,
    ) -> Session {
        let id = SessionId::generate();
        let name = Session::tmux_session_name(id, provider);
        let now = Utc::now();
        Session {
            id,
            name: name.clone(),
            friendly_name,
            working_dir,
            window_name: name,
            provider,
            status: SessionStatus::Running,
            created_at: now,
            last_activity: now,
            parent_session_id,
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
            context_monitor_enabled: false,
            context_monitor_notify_target: None,
            context_warning_sent: false,
            context_critical_sent: false,
            context_compacting: false,
            claude_session_id: None,
            transcript_path: None,
            telegram_chat_id: None,
            telegram_thread_id: None,
            last_handoff_path: None,
            log_file: log_dir.join(format!("{id}.log")),
            pid: None,
        }
    }

    pub async fn update_friendly_name(&self, id: SessionId, name: &str) -> SmResult<()> {
        if !is_valid_friendly_name(name) {
            return Err(SmError::Validation(format!(
                "friendly name must match [A-Za-z0-9_-]{{1,32}}: {name}"
            )));
        }
        {
            let sessions = self.sessions.read().await;
            if sessions.values().any(|s| s.id != id && s.friendly_name.as_deref() == Some(name)) {
                return Err(SmError::Validation(format!("friendly name already in use: {name}")));
            }
        }
        self.store
            .update_session_friendly_name(id, name)
            .await
            .map_err(|e| Self::store_err(e, id))?;
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(&id).ok_or_else(|| SmError::NotFound(id.to_string()))?;
        session.friendly_name = Some(name.to_string());
        Ok(())
    }

    pub async fn set_em(&self, id: SessionId, is_em: bool) -> SmResult<()> {
        self.store.update_session_em_role(id, is_em).await.map_err(|e| Self::store_err(e, id))?;
        self.mutate(id, |s| s.is_em = is_em).await
    }

    pub async fn set_task(&self, id: SessionId, task: Option<String>) -> SmResult<()> {
        self.store
            .update_session_task(id, task.as_deref())
            .await
            .map_err(|e| Self::store_err(e, id))?;
        self.mutate(id, |s| s.current_task = task).await
    }

    pub async fn set_role(&self, id: SessionId, role: Option<String>) -> SmResult<()> {
        self.store
            .update_session_role(id, role.as_deref())
            .await
            .map_err(|e| Self::store_err(e, id))?;
        self.mutate(id, |s| s.role = role).await
    }

    /// `non-null resets remind` is handled by the timer service, which
    /// observes `agent_status_at` churn; the registry's job here is only to
    /// persist the text/timestamp pair (`spec.md` §6).
    pub async fn set_agent_status(&self, id: SessionId, text: Option<String>) -> SmResult<()> {
        let now = text.as_ref().map(|_| Utc::now());
        self.mutate(id, |s| {
            s.agent_status_text = text;
            s.agent_status_at = now;
        })
        .await
    }

    pub async fn set_context_monitor(
        &self,
        id: SessionId,
        enabled: bool,
        notify_target: Option<SessionId>,
    ) -> SmResult<()> {
        self.store
            .update_session_context_monitor(id, enabled)
            .await
            .map_err(|e| Self::store_err(e, id))?;
        // Re-arm one-shot flags when enabling (`spec.md` §6).
        self.mutate(id, |s| {
            s.context_monitor_enabled = enabled;
            s.context_monitor_notify_target = notify_target;
            if enabled {
                s.context_warning_sent = false;
                s.context_critical_sent = false;
            }
        })
        .await?;

        // `GET /sessions/context-monitor` reads the dedicated enrolments
        // table rather than scanning every session, so every enable/disable
        // has to stay mirrored there too.
        let session = self.get(id).await.ok_or_else(|| SmError::NotFound(id.to_string()))?;
        let enrolment = sm_core::registration::ContextMonitorEnrolment {
            session_id: id,
            enabled,
            notify_target_session_id: notify_target,
            warning_sent: session.context_warning_sent,
            critical_sent: session.context_critical_sent,
        };
        self.store.upsert_context_monitor(&enrolment, Utc::now()).await.map_err(|e| Self::store_err(e, id))?;
        Ok(())
    }

    /// Canonical reset used after `sm clear` / `POST .../invalidate-cache`
    /// (`spec.md` §4.3, §6).
    pub async fn invalidate_cache(&self, id: SessionId) -> SmResult<()> {
        self.mutate(id, |s| {
            s.completion_status = None;
            s.completion_message = None;
            s.role = None;
            s.agent_status_text = None;
            s.agent_status_at = None;
            s.context_warning_sent = false;
            s.context_critical_sent = false;
        })
        .await
    }

    pub async fn set_completion(&self, id: SessionId, status: &str, message: Option<String>) -> SmResult<()> {
        let now = Utc::now();
        self.mutate(id, |s| {
            s.completion_status = Some(status.to_string());
            s.completion_message = message;
            s.completed_at = Some(now);
        })
        .await
    }

    pub async fn update_status(&self, id: SessionId, status: SessionStatus) -> SmResult<()> {
        let now = Utc::now();
        self.store.update_session_status(id, status, now).await.map_err(|e| Self::store_err(e, id))?;
        self.mutate(id, |s| {
            s.status = status;
            s.last_activity = now;
        })
        .await
    }

    pub async fn touch_activity(&self, id: SessionId) -> SmResult<()> {
        let now = Utc::now();
        self.mutate(id, |s| s.last_activity = now).await
    }

    pub async fn record_tokens(&self, id: SessionId, delta: u64) -> SmResult<()> {
        self.mutate(id, |s| s.tokens_used += delta).await
    }

    pub async fn record_tool_use(&self, id: SessionId, tool_name: &str, summary: Option<String>) -> SmResult<()> {
        let now = Utc::now();
        self.mutate(id, |s| {
            *s.tools_used.entry(tool_name.to_string()).or_insert(0) += 1;
            s.last_tool_call = Some(now);
            if summary.is_some() {
                s.last_tool_summary = summary;
            }
        })
        .await
    }

    pub async fn set_claude_session_id(&self, id: SessionId, claude_session_id: &str) -> SmResult<()> {
        self.store
            .update_session_claude_session_id(id, claude_session_id)
            .await
            .map_err(|e| Self::store_err(e, id))?;
        self.mutate(id, |s| s.claude_session_id = Some(claude_session_id.to_string())).await
    }

    pub async fn set_transcript_path(&self, id: SessionId, path: &str) -> SmResult<()> {
        self.store
            .update_session_transcript_path(id, path)
            .await
            .map_err(|e| Self::store_err(e, id))?;
        self.mutate(id, |s| s.transcript_path = Some(path.to_string())).await
    }

    pub async fn set_pending_handoff(&self, id: SessionId, path: Option<String>) -> SmResult<()> {
        self.mutate(id, |s| s.last_handoff_path = path).await
    }

    /// Context-usage one-shot bookkeeping (`spec.md` §4.6): set whichever
    /// of the two alert flags fired.
    pub async fn mark_context_alert_sent(&self, id: SessionId, warning: bool, critical: bool) -> SmResult<()> {
        self.mutate(id, |s| {
            if warning {
                s.context_warning_sent = true;
            }
            if critical {
                s.context_critical_sent = true;
            }
        })
        .await
    }

    /// Set/clear the runtime `compacting` flag (`spec.md` §4.5.9), fed by
    /// `compaction` / `compaction_complete` hook events. `compaction` resets
    /// the one-shot alert flags immediately — the agent's own compaction is
    /// what frees up context, not the later `compaction_complete` — so the
    /// thresholds can re-fire on the next status line even before
    /// `compaction_complete` arrives.
    pub async fn set_compacting(&self, id: SessionId, compacting: bool) -> SmResult<()> {
        self.mutate(id, |s| {
            s.context_compacting = compacting;
            if compacting {
                s.context_warning_sent = false;
                s.context_critical_sent = false;
            }
        })
        .await
    }

    /// Three-step session-matching chain for hook callbacks missing
    /// explicit attribution (`spec.md` §4.7): `session_manager_id` (own
    /// id) → `transcript_path` (only if already recorded) → agent-internal
    /// `claude_session_id`.
    pub async fn match_hook_session(
        &self,
        session_manager_id: Option<&str>,
        transcript_path: Option<&str>,
        claude_session_id: Option<&str>,
    ) -> Option<Session> {
        if let Some(id_str) = session_manager_id {
            if let Some(id) = SessionId::parse(id_str) {
                if let Some(s) = self.get(id).await {
                    return Some(s);
                }
            }
        }
        if let Some(path) = transcript_path {
            let sessions = self.sessions.read().await;
            if let Some(s) = sessions.values().find(|s| s.transcript_path.as_deref() == Some(path)) {
                return Some(s.clone());
            }
        }
        if let Some(cid) = claude_session_id {
            let sessions = self.sessions.read().await;
            if let Some(s) = sessions.values().find(|s| s.claude_session_id.as_deref() == Some(cid)) {
                return Some(s.clone());
            }
        }
        None
    }

    /// Ownership rule for `kill_session`: if `requester` is set, `target`
    /// must be a direct child of `requester`, else refuse (`spec.md` §4.3).
    pub async fn check_kill_ownership(&self, requester: Option<SessionId>, target: SessionId) -> SmResult<()> {
        let Some(requester) = requester else { return Ok(()) };
        let sessions = self.sessions.read().await;
        let target_session = sessions.get(&target).ok_or_else(|| SmError::NotFound(target.to_string()))?;
        if target_session.parent_session_id != Some(requester) {
            return Err(SmError::Unauthorized(format!(
                "{requester} is not the parent of {target}"
            )));
        }
        Ok(())
    }

    /// Remove the session record from both maps (`spec.md` §3: terminal
    /// states are removed from the registry but may remain in the audit
    /// log).
    pub async fn remove(&self, id: SessionId, snapshot_path: &std::path::Path) -> SmResult<Session> {
        let removed = {
            let mut sessions = self.sessions.write().await;
            sessions.remove(&id).ok_or_else(|| SmError::NotFound(id.to_string()))?
        };
        self.store.delete_session(id).await.map_err(|e| Self::store_err(e, id))?;
        self.codex_app.write().await.remove(&id);
        self.persist_snapshot(snapshot_path).await;
        Ok(removed)
    }

    // -- codex-app signal tracking ------------------------------------------

    pub async fn codex_app_set_in_flight(&self, id: SessionId, in_flight: bool) {
        let mut map = self.codex_app.write().await;
        let tracker = map.entry(id).or_default();
        tracker.in_flight = in_flight;
        if !in_flight {
            tracker.last_delta_at = None;
        }
    }

    pub async fn codex_app_record_delta(&self, id: SessionId) {
        let mut map = self.codex_app.write().await;
        map.entry(id).or_default().last_delta_at = Some(Utc::now());
    }

    pub async fn codex_app_set_waiting_permission(&self, id: SessionId) {
        let mut map = self.codex_app.write().await;
        map.entry(id).or_default().waiting_permission_at = Some(Utc::now());
    }

    pub async fn codex_app_set_waiting_input(&self, id: SessionId) {
        let mut map = self.codex_app.write().await;
        map.entry(id).or_default().waiting_input_at = Some(Utc::now());
    }

    /// Whichever structured-request kind is currently outstanding and recent
    /// (`spec.md` §4.3), if any — used by the HTTP surface's
    /// `pending-requests`/`respond` pair, which models "this codex-app
    /// session has one outstanding request" as the 10 s recency window.
    pub async fn codex_app_pending_kind(&self, id: SessionId) -> Option<&'static str> {
        let map = self.codex_app.read().await;
        let tracker = map.get(&id)?;
        let now = Utc::now();
        let recent = |at: Option<chrono::DateTime<Utc>>| {
            at.map(|t| now - t <= chrono::Duration::seconds(CODEX_APP_RECENCY_SECONDS)).unwrap_or(false)
        };
        if recent(tracker.waiting_permission_at) {
            Some("permission")
        } else if recent(tracker.waiting_input_at) {
            Some("input")
        } else {
            None
        }
    }

    /// Clear whichever structured-request flag is live, once a response has
    /// been delivered back to the codex-app process.
    pub async fn codex_app_clear_pending(&self, id: SessionId) {
        let mut map = self.codex_app.write().await;
        if let Some(tracker) = map.get_mut(&id) {
            tracker.waiting_permission_at = None;
            tracker.waiting_input_at = None;
        }
    }

    async fn codex_app_signals(&self, id: SessionId) -> Option<CodexAppSignals> {
        let map = self.codex_app.read().await;
        let tracker = map.get(&id)?;
        let now = Utc::now();
        let recent = |at: Option<chrono::DateTime<Utc>>| {
            at.map(|t| now - t <= chrono::Duration::seconds(CODEX_APP_RECENCY_SECONDS)).unwrap_or(false)
        };
        Some(CodexAppSignals {
            in_flight: tracker.in_flight,
            seconds_since_last_delta: tracker.last_delta_at.map(|t| (now - t).num_seconds().max(0) as u64),
            waiting_permission_recent: recent(tracker.waiting_permission_at),
            waiting_input_recent: recent(tracker.waiting_input_at),
        })
    }

    pub async fn activity_state(&self, id: SessionId) -> Option<ActivityState> {
        let session = self.get(id).await?;
        let signals = if session.provider == Provider::CodexApp {
            self.codex_app_signals(id).await
        } else {
            None
        };
        Some(session.activity_state(signals))
    }

    async fn mutate(&self, id: SessionId, f: impl FnOnce(&mut Session)) -> SmResult<()> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(&id).ok_or_else(|| SmError::NotFound(id.to_string()))?;
        f(session);
        Ok(())
    }

    fn store_err(e: sm_store::StoreError, id: SessionId) -> SmError {
        match e {
            sm_store::StoreError::NotFound(_) => SmError::NotFound(id.to_string()),
            other => SmError::ExternalIo(other.to_string()),
        }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn fresh_registry() -> (Registry, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open_in_memory().unwrap());
        (Registry::new_empty(store), dir)
    }

    #[tokio::test]
    async fn insert_then_get_roundtrips() {
        let (reg, dir) = fresh_registry().await;
        let snap = dir.path().join("sessions.json");
        let session = Registry::new_session("/tmp".into(), Provider::Claude, None, None, dir.path());
        let id = session.id;
        reg.insert(session, &snap).await.unwrap();
        assert!(reg.get(id).await.is_some());
        assert!(snap.exists());
    }

    #[tokio::test]
    async fn friendly_name_uniqueness_enforced() {
        let (reg, dir) = fresh_registry().await;
        let snap = dir.path().join("sessions.json");
        let a = Registry::new_session("/tmp".into(), Provider::Claude, None, None, dir.path());
        let b = Registry::new_session("/tmp".into(), Provider::Claude, None, None, dir.path());
        let (a_id, b_id) = (a.id, b.id);
        reg.insert(a, &snap).await.unwrap();
        reg.insert(b, &snap).await.unwrap();
        reg.update_friendly_name(a_id, "dev-1").await.unwrap();
        let err = reg.update_friendly_name(b_id, "dev-1").await.unwrap_err();
        assert!(matches!(err, SmError::Validation(_)));
    }

    #[tokio::test]
    async fn friendly_name_regex_enforced() {
        let (reg, dir) = fresh_registry().await;
        let snap = dir.path().join("sessions.json");
        let a = Registry::new_session("/tmp".into(), Provider::Claude, None, None, dir.path());
        let id = a.id;
        reg.insert(a, &snap).await.unwrap();
        assert!(reg.update_friendly_name(id, "has space").await.is_err());
    }

    #[tokio::test]
    async fn kill_ownership_refuses_non_child() {
        let (reg, dir) = fresh_registry().await;
        let snap = dir.path().join("sessions.json");
        let parent = Registry::new_session("/tmp".into(), Provider::Claude, None, None, dir.path());
        let stranger = Registry::new_session("/tmp".into(), Provider::Claude, None, None, dir.path());
        let target = Registry::new_session("/tmp".into(), Provider::Claude, None, None, dir.path());
        let (parent_id, stranger_id, target_id) = (parent.id, stranger.id, target.id);
        reg.insert(parent, &snap).await.unwrap();
        reg.insert(stranger, &snap).await.unwrap();
        reg.insert(target, &snap).await.unwrap();

        assert!(reg.check_kill_ownership(Some(stranger_id), target_id).await.is_err());
        assert!(reg.check_kill_ownership(Some(parent_id), target_id).await.is_ok());
    }

    #[tokio::test]
    async fn claude_codex_activity_state_mirrors_status() {
        let (reg, dir) = fresh_registry().await;
        let snap = dir.path().join("sessions.json");
        let session = Registry::new_session("/tmp".into(), Provider::Claude, None, None, dir.path());
        let id = session.id;
        reg.insert(session, &snap).await.unwrap();
        reg.update_status(id, SessionStatus::Idle).await.unwrap();
        assert_eq!(reg.activity_state(id).await, Some(ActivityState::Idle));
    }

    #[tokio::test]
    async fn codex_app_signals_feed_activity_state() {
        let (reg, dir) = fresh_registry().await;
        let snap = dir.path().join("sessions.json");
        let session = Registry::new_session("/tmp".into(), Provider::CodexApp, None, None, dir.path());
        let id = session.id;
        reg.insert(session, &snap).await.unwrap();
        reg.codex_app_set_in_flight(id, true).await;
        assert_eq!(reg.activity_state(id).await, Some(ActivityState::Thinking));
        reg.codex_app_record_delta(id).await;
        assert_eq!(reg.activity_state(id).await, Some(ActivityState::Working));
    }
}
