// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `/sessions/*` — session lifecycle, messaging, and introspection
//! (`spec.md` §6). Every handler here delegates straight into the
//! registry/delivery/timers the engine already owns.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use sm_core::id::SessionId;
use sm_core::message::DeliveryMode;
use sm_core::session::{Provider, Session};
use sm_core::SmError;

use crate::error::{ApiError, ApiResult};
use crate::AppState;

use super::require_session_id;

fn parse_id(raw: &str) -> Result<SessionId, ApiError> {
    require_session_id(raw).map_err(ApiError)
}

// -- spawn / list / get / kill -------------------------------------------

#[derive(Debug, Deserialize)]
pub struct SpawnRequest {
    pub provider: String,
    pub working_dir: String,
    #[serde(default)]
    pub friendly_name: Option<String>,
    #[serde(default)]
    pub parent_session_id: Option<String>,
    #[serde(default)]
    pub is_em: bool,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub spawn_prompt: Option<String>,
}

/// `POST /sessions` — create a session, launch its terminal window (for
/// tmux-hosted providers), and cascade an engineering-manager's standard
/// child registrations (scenario 6, `spec.md` §8).
pub async fn spawn(State(state): State<AppState>, Json(req): Json<SpawnRequest>) -> ApiResult<impl IntoResponse> {
    let provider = Provider::from_str_loose(&req.provider)
        .ok_or_else(|| ApiError(SmError::Validation(format!("unknown provider: {}", req.provider))))?;
    let parent_id = req
        .parent_session_id
        .as_deref()
        .map(parse_id)
        .transpose()?;

    let mut session = sm_engine::registry::Registry::new_session(
        req.working_dir.clone(),
        provider,
        req.friendly_name.clone(),
        parent_id,
        &state.log_dir,
    );
    session.is_em = req.is_em;
    session.role = req.role.clone();
    session.spawn_prompt = req.spawn_prompt.clone();
    session.spawned_at = Some(chrono::Utc::now());

    if provider.is_tmux_hosted() {
        let command = req.command.as_deref().unwrap_or(provider.as_str());
        state
            .engine
            .delivery
            .terminal()
            .create_window(&session.window_name, &req.working_dir, command, &req.args)
            .await
            .map_err(|e| ApiError(SmError::ExternalIo(e.to_string())))?;
    }

    state.engine.registry.insert(session.clone(), &state.snapshot_path).await?;
    state.engine.start_session_jobs(session.id).await;

    if let Some(parent_id) = parent_id {
        if let Some(parent) = state.engine.registry.get(parent_id).await {
            if parent.is_em {
                let _ = state
                    .engine
                    .timers
                    .register_remind(
                        session.id,
                        state.default_remind_soft_seconds,
                        state.default_remind_hard_seconds,
                    )
                    .await;
                state.engine.registry.set_context_monitor(session.id, true, Some(parent_id)).await?;
                let child_name = session.friendly_name.clone().unwrap_or_else(|| session.id.to_string());
                state.engine.delivery.arm_notify_on_stop(session.id, parent_id, Some(child_name)).await;
            }
        }
    }

    Ok((StatusCode::CREATED, Json(session)))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub include_stopped: bool,
}

pub async fn list(State(state): State<AppState>, Query(q): Query<ListQuery>) -> Json<Vec<Session>> {
    Json(state.engine.registry.list(q.include_stopped).await)
}

pub async fn get(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Session>> {
    let session = state
        .engine
        .registry
        .get_by_id_or_name(&id)
        .await
        .ok_or_else(|| ApiError(SmError::NotFound(id.clone())))?;
    Ok(Json(session))
}

#[derive(Debug, Deserialize)]
pub struct KillQuery {
    #[serde(default)]
    pub requester_id: Option<String>,
}

/// `DELETE /sessions/:id` — ownership-gated: if `requester_id` is set, the
/// target must be a direct child of the requester (`spec.md` §4.3).
pub async fn kill(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(q): Query<KillQuery>,
) -> ApiResult<impl IntoResponse> {
    let target = parse_id(&id)?;
    let requester = q.requester_id.as_deref().map(parse_id).transpose()?;
    state.engine.registry.check_kill_ownership(requester, target).await?;

    let session = state
        .engine
        .registry
        .get(target)
        .await
        .ok_or_else(|| ApiError(SmError::NotFound(target.to_string())))?;
    if session.provider.is_tmux_hosted() {
        let _ = state.engine.delivery.terminal().kill_window(&session.window_name).await;
    }
    state.engine.stop_session_jobs(target).await;
    state.engine.registry.remove(target, &state.snapshot_path).await?;
    Ok(StatusCode::NO_CONTENT)
}

// -- field patches --------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct NameBody {
    pub name: String,
}

pub async fn set_friendly_name(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<NameBody>,
) -> ApiResult<StatusCode> {
    let target = parse_id(&id)?;
    state.engine.registry.update_friendly_name(target, &body.name).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct EmBody {
    pub is_em: bool,
}

pub async fn set_em(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<EmBody>,
) -> ApiResult<StatusCode> {
    let target = parse_id(&id)?;
    state.engine.registry.set_em(target, body.is_em).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct OptTextBody {
    #[serde(default)]
    pub value: Option<String>,
}

pub async fn set_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<OptTextBody>,
) -> ApiResult<StatusCode> {
    let target = parse_id(&id)?;
    state.engine.registry.set_task(target, body.value).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn set_role(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<OptTextBody>,
) -> ApiResult<StatusCode> {
    let target = parse_id(&id)?;
    state.engine.registry.set_role(target, body.value).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn set_agent_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<OptTextBody>,
) -> ApiResult<StatusCode> {
    let target = parse_id(&id)?;
    state.engine.registry.set_agent_status(target, body.value).await?;
    Ok(StatusCode::NO_CONTENT)
}

// -- messaging --------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct InputBody {
    pub text: String,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub sender: Option<String>,
    #[serde(default)]
    pub sender_name: Option<String>,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
    #[serde(default)]
    pub notify_after_seconds: Option<u64>,
    #[serde(default)]
    pub notify_on_delivery: bool,
    #[serde(default)]
    pub notify_on_stop: bool,
}

fn parse_mode(raw: Option<&str>) -> Result<DeliveryMode, ApiError> {
    match raw.unwrap_or("sequential") {
        "sequential" => Ok(DeliveryMode::Sequential),
        "important" => Ok(DeliveryMode::Important),
        "urgent" => Ok(DeliveryMode::Urgent),
        "steer" => Ok(DeliveryMode::Steer),
        other => Err(ApiError(SmError::Validation(format!("unknown delivery mode: {other}")))),
    }
}

/// `POST /sessions/:id/input` — queue a message for delivery (`spec.md` §6).
pub async fn send_input(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<InputBody>,
) -> ApiResult<Json<sm_core::message::QueuedMessage>> {
    let target = parse_id(&id)?;
    let mode = parse_mode(body.mode.as_deref())?;
    let sender = body.sender.as_deref().map(parse_id).transpose()?;
    let msg = state
        .engine
        .delivery
        .queue_message(
            target,
            sender,
            body.sender_name,
            body.text,
            mode,
            body.timeout_seconds,
            body.notify_after_seconds,
            body.notify_on_delivery,
            body.notify_on_stop,
        )
        .await?;
    Ok(Json(msg))
}

#[derive(Debug, Deserialize)]
pub struct KeyBody {
    pub key: String,
}

pub async fn send_key(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<KeyBody>,
) -> ApiResult<StatusCode> {
    let target = parse_id(&id)?;
    let session = state
        .engine
        .registry
        .get(target)
        .await
        .ok_or_else(|| ApiError(SmError::NotFound(target.to_string())))?;
    state
        .engine
        .delivery
        .terminal()
        .send_key(&session.window_name, &body.key)
        .await
        .map_err(|e| ApiError(SmError::ExternalIo(e.to_string())))?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /sessions/:id/send-queue` — force an immediate delivery attempt,
/// e.g. after an external event makes the target newly eligible.
pub async fn send_queue(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<StatusCode> {
    let target = parse_id(&id)?;
    state.engine.delivery.try_deliver(target, false).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /sessions/:id/clear` — Escape, then `/clear`, then reset the
/// per-session completion/role/agent-status cache (`spec.md` §4.3).
pub async fn clear(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<StatusCode> {
    let target = parse_id(&id)?;
    let session = state
        .engine
        .registry
        .get(target)
        .await
        .ok_or_else(|| ApiError(SmError::NotFound(target.to_string())))?;
    if !session.provider.is_tmux_hosted() {
        return Err(ApiError(SmError::Validation(format!("session {target} has no terminal window"))));
    }
    let terminal = state.engine.delivery.terminal();
    let _ = terminal.send_key(&session.window_name, "Escape").await;
    terminal
        .send_text_then_enter(&session.window_name, "/clear", state.engine.delivery.config().settle_delay)
        .await
        .map_err(|e| ApiError(SmError::ExternalIo(e.to_string())))?;
    state.engine.registry.invalidate_cache(target).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct HandoffBody {
    pub file_path: String,
    #[serde(default)]
    pub requester_id: Option<String>,
}

/// `POST /sessions/:id/handoff` — self-directed context rotation
/// (`spec.md` §4.5.7). `requester_id`, if given, must equal the path id.
pub async fn handoff(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<HandoffBody>,
) -> ApiResult<StatusCode> {
    let target = parse_id(&id)?;
    let requester = body.requester_id.as_deref().map(parse_id).transpose()?.unwrap_or(target);
    state.engine.delivery.schedule_handoff(target, requester, body.file_path).await?;
    Ok(StatusCode::ACCEPTED)
}

#[derive(Debug, Deserialize)]
pub struct CompletionBody {
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
}

pub async fn task_complete(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<CompletionBody>,
) -> ApiResult<StatusCode> {
    let target = parse_id(&id)?;
    state.engine.registry.set_completion(target, &body.status, body.message).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn invalidate_cache(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<StatusCode> {
    let target = parse_id(&id)?;
    state.engine.registry.invalidate_cache(target).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct NotifyOnStopBody {
    pub sender_id: String,
    #[serde(default)]
    pub sender_name: Option<String>,
}

/// `POST /sessions/:id/notify-on-stop` — arm a one-shot "I've stopped"
/// message to `sender_id` the next time this session goes idle.
pub async fn notify_on_stop(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<NotifyOnStopBody>,
) -> ApiResult<StatusCode> {
    let target = parse_id(&id)?;
    let sender = parse_id(&body.sender_id)?;
    state.engine.delivery.arm_notify_on_stop(target, sender, body.sender_name).await;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct ContextMonitorBody {
    pub enabled: bool,
    #[serde(default)]
    pub notify_target_session_id: Option<String>,
}

pub async fn enable_context_monitor(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<ContextMonitorBody>,
) -> ApiResult<StatusCode> {
    let target = parse_id(&id)?;
    let notify_target = body.notify_target_session_id.as_deref().map(parse_id).transpose()?;
    state.engine.registry.set_context_monitor(target, body.enabled, notify_target).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_context_monitor(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<sm_core::registration::ContextMonitorEnrolment>>> {
    let enrolments = state
        .store
        .list_context_monitor_enrolments()
        .await
        .map_err(|e| ApiError(SmError::ExternalIo(e.to_string())))?;
    Ok(Json(enrolments))
}

// -- introspection ------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ChildrenQuery {
    #[serde(default)]
    pub recursive: bool,
}

pub async fn children(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(q): Query<ChildrenQuery>,
) -> ApiResult<Json<Vec<Session>>> {
    let target = parse_id(&id)?;
    Ok(Json(state.engine.registry.list_children(target, q.recursive).await))
}

#[derive(Debug, Deserialize)]
pub struct OutputQuery {
    #[serde(default)]
    pub lines: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct OutputResponse {
    pub text: String,
}

pub async fn output(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(q): Query<OutputQuery>,
) -> ApiResult<Json<OutputResponse>> {
    let target = parse_id(&id)?;
    let session = state
        .engine
        .registry
        .get(target)
        .await
        .ok_or_else(|| ApiError(SmError::NotFound(target.to_string())))?;
    if !session.provider.is_tmux_hosted() {
        return Err(ApiError(SmError::Validation(format!("session {target} has no terminal window"))));
    }
    let lines = q.lines.unwrap_or(state.engine.delivery.config().capture_lines);
    let text = state
        .engine
        .delivery
        .terminal()
        .capture_pane(&session.window_name, lines)
        .await
        .map_err(|e| ApiError(SmError::ExternalIo(e.to_string())))?;
    Ok(Json(OutputResponse { text }))
}

#[derive(Debug, Deserialize)]
pub struct ToolCallsQuery {
    #[serde(default)]
    pub limit: Option<u32>,
}

pub async fn tool_calls(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(q): Query<ToolCallsQuery>,
) -> ApiResult<Json<Vec<sm_core::tool_use::ToolUseEntry>>> {
    let target = parse_id(&id)?;
    let entries = state
        .store
        .recent_tool_uses(target, q.limit.unwrap_or(50))
        .await
        .map_err(|e| ApiError(SmError::ExternalIo(e.to_string())))?;
    Ok(Json(entries))
}

#[derive(Debug, Serialize)]
pub struct SessionSummary {
    pub session: Session,
    pub activity_state: Option<sm_core::session::ActivityState>,
    pub has_pending_messages: bool,
}

pub async fn summary(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<SessionSummary>> {
    let target = parse_id(&id)?;
    let session = state
        .engine
        .registry
        .get(target)
        .await
        .ok_or_else(|| ApiError(SmError::NotFound(target.to_string())))?;
    let activity_state = state.engine.registry.activity_state(target).await;
    let has_pending_messages = state.engine.delivery.has_pending_messages(target).await;
    Ok(Json(SessionSummary { session, activity_state, has_pending_messages }))
}
