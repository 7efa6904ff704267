// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `/hooks/*` — the Claude Code lifecycle-hook callbacks (`spec.md` §4.7,
//! §6). Every payload carries at least one of `session_manager_id`,
//! `transcript_path`, or `claude_session_id`; [`sm_engine::registry::Registry::match_hook_session`]
//! runs the three-step resolution chain.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use sm_core::session::SessionStatus;
use sm_core::tool_use::{HookType, ToolUseEntry};
use sm_core::SmError;

use crate::error::ApiError;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct HookAttribution {
    #[serde(default)]
    pub session_manager_id: Option<String>,
    #[serde(default)]
    pub transcript_path: Option<String>,
    #[serde(default)]
    pub claude_session_id: Option<String>,
}

impl HookAttribution {
    async fn resolve(&self, state: &AppState) -> Result<sm_core::session::Session, ApiError> {
        state
            .engine
            .registry
            .match_hook_session(
                self.session_manager_id.as_deref(),
                self.transcript_path.as_deref(),
                self.claude_session_id.as_deref(),
            )
            .await
            .ok_or_else(|| ApiError(SmError::NotFound("no session matched this hook payload".into())))
    }
}

#[derive(Debug, Deserialize)]
pub struct StopBody {
    #[serde(flatten)]
    pub attribution: HookAttribution,
}

/// `POST /hooks/stop` — the Stop-hook entry point. Always returns 200; the
/// hook script has no verdict to act on here (unlike the teacher's
/// block/allow contract, this system never blocks a Stop).
pub async fn stop(State(state): State<AppState>, Json(body): Json<StopBody>) -> impl IntoResponse {
    let session = match body.attribution.resolve(&state).await {
        Ok(s) => s,
        Err(e) => return e.into_response(),
    };
    match state.engine.delivery.mark_session_idle(session.id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => ApiError(e).into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct NotificationBody {
    #[serde(flatten)]
    pub attribution: HookAttribution,
    /// Claude Code's `notification` hook reason, e.g.
    /// `permission_prompt` or `idle_prompt`.
    pub kind: String,
}

/// `POST /hooks/notification` — a permission prompt or idle nudge fired by
/// the agent's own notification hook. Updates `SessionStatus` so `activity_state`
/// reflects it immediately, ahead of the output monitor's next poll tick.
pub async fn notification(
    State(state): State<AppState>,
    Json(body): Json<NotificationBody>,
) -> impl IntoResponse {
    let session = match body.attribution.resolve(&state).await {
        Ok(s) => s,
        Err(e) => return e.into_response(),
    };
    let status = match body.kind.as_str() {
        "permission_prompt" => Some(SessionStatus::WaitingPermission),
        "idle_prompt" => Some(SessionStatus::WaitingInput),
        _ => None,
    };
    if let Some(status) = status {
        if let Err(e) = state.engine.registry.update_status(session.id, status).await {
            return ApiError(e).into_response();
        }
    }
    StatusCode::NO_CONTENT.into_response()
}

#[derive(Debug, Deserialize)]
pub struct ToolUseBody {
    #[serde(flatten)]
    pub attribution: HookAttribution,
    pub hook_type: String,
    pub tool_name: String,
    #[serde(default)]
    pub target_file: Option<String>,
    #[serde(default)]
    pub bash_command: Option<String>,
    #[serde(default)]
    pub tool_use_id: Option<String>,
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub tool_response: Option<serde_json::Value>,
}

/// `POST /hooks/tool-use` — `PreToolUse` / `PostToolUse` / `SubagentStart` /
/// `SubagentStop`, written to the audit log and rolled up onto the session's
/// `tools_used` counters (`spec.md` §4.7, SPEC_FULL.md §3).
pub async fn tool_use(State(state): State<AppState>, Json(body): Json<ToolUseBody>) -> impl IntoResponse {
    let hook_type = match HookType::parse(&body.hook_type) {
        Some(h) => h,
        None => return ApiError(SmError::Validation(format!("unknown hook_type: {}", body.hook_type))).into_response(),
    };
    // Attribution may legitimately miss (a tool call before the session is
    // registered) — still log the row, just without a session_id.
    let session = body.attribution.resolve(&state).await.ok();

    let entry = ToolUseEntry {
        timestamp: chrono::Utc::now(),
        session_id: session.as_ref().map(|s| s.id),
        claude_session_id: body.attribution.claude_session_id.clone(),
        hook_type,
        tool_name: body.tool_name.clone(),
        target_file: body.target_file,
        bash_command: body.bash_command,
        tool_use_id: body.tool_use_id,
        cwd: body.cwd,
        agent_id: body.agent_id,
        session_name: session.as_ref().map(|s| s.name.clone()),
        parent_session_id: session.as_ref().and_then(|s| s.parent_session_id),
        tool_response: body.tool_response,
    };

    if let Err(e) = state.store.insert_tool_use(&entry).await {
        return ApiError(SmError::ExternalIo(e.to_string())).into_response();
    }
    if let Some(session) = &session {
        if matches!(hook_type, HookType::PostToolUse) {
            let summary = entry.target_file.clone().or_else(|| entry.bash_command.clone());
            if let Err(e) = state.engine.registry.record_tool_use(session.id, &body.tool_name, summary).await {
                return ApiError(e).into_response();
            }
        }
    }
    StatusCode::NO_CONTENT.into_response()
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ContextUsageBody {
    #[serde(flatten)]
    pub attribution: HookAttribution,
    /// One of `context_usage` (carries `percentage`), `compaction`, or
    /// `compaction_complete` (`spec.md` §4.5.9, §4.6).
    pub event: String,
    #[serde(default)]
    pub percentage: Option<f64>,
}

/// `POST /hooks/context-usage` — feeds the context-usage watchdog
/// (`spec.md` §4.6).
pub async fn context_usage(
    State(state): State<AppState>,
    Json(body): Json<ContextUsageBody>,
) -> impl IntoResponse {
    let session = match body.attribution.resolve(&state).await {
        Ok(s) => s,
        Err(e) => return e.into_response(),
    };

    let result = if body.event == "context_usage" {
        match body.percentage {
            Some(pct) => state.engine.timers.handle_context_usage(session.id, pct).await,
            None => Err(SmError::Validation("context_usage event requires percentage".into())),
        }
    } else {
        state.engine.timers.handle_compaction_event(session.id, &body.event).await
    };

    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => ApiError(e).into_response(),
    }
}
