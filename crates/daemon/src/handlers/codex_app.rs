// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `/codex-app/*` — the headless structured-event protocol surface for
//! `codex-app` sessions (`spec.md` §4.3, §6). Unlike `claude`/`codex`,
//! these sessions carry no terminal window; activity is entirely derived
//! from the event stream this module ingests.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use sm_core::session::{ActivityState, Provider};
use sm_core::SmError;

use crate::error::ApiError;
use crate::AppState;

use super::require_session_id;

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CodexAppEvent {
    Delta,
    InFlight { value: bool },
    WaitingPermission,
    WaitingInput,
}

/// `POST /codex-app/:id/events` — the engine's only window into a
/// `codex-app` session's activity.
pub async fn events(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(event): Json<CodexAppEvent>,
) -> impl IntoResponse {
    let target = match require_session_id(&id) {
        Ok(id) => id,
        Err(e) => return ApiError(e).into_response(),
    };
    match event {
        CodexAppEvent::Delta => state.engine.registry.codex_app_record_delta(target).await,
        CodexAppEvent::InFlight { value } => state.engine.registry.codex_app_set_in_flight(target, value).await,
        CodexAppEvent::WaitingPermission => state.engine.registry.codex_app_set_waiting_permission(target).await,
        CodexAppEvent::WaitingInput => state.engine.registry.codex_app_set_waiting_input(target).await,
    }
    StatusCode::NO_CONTENT.into_response()
}

#[derive(Debug, Serialize)]
pub struct PendingRequest {
    pub request_id: String,
    pub kind: String,
}

/// `GET /codex-app/:id/pending-requests` — at most one outstanding request
/// per session; its id is synthesized from the session id and kind since
/// there is nothing else to disambiguate it by.
pub async fn pending_requests(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<PendingRequest>>, ApiError> {
    let target = require_session_id(&id).map_err(ApiError)?;
    let requests = match state.engine.registry.codex_app_pending_kind(target).await {
        Some(kind) => vec![PendingRequest { request_id: format!("{target}:{kind}"), kind: kind.to_string() }],
        None => Vec::new(),
    };
    Ok(Json(requests))
}

#[derive(Debug, Deserialize)]
pub struct RespondBody {
    pub text: String,
}

/// `POST /codex-app/:id/requests/:request_id/respond` — deliver a response
/// to the currently outstanding request. Conflicts (409
/// `pending_structured_request`) if `request_id` doesn't match the one
/// currently outstanding — most commonly because a second request arrived
/// before the first was answered.
pub async fn respond(
    State(state): State<AppState>,
    Path((id, request_id)): Path<(String, String)>,
    Json(body): Json<RespondBody>,
) -> impl IntoResponse {
    let target = match require_session_id(&id) {
        Ok(id) => id,
        Err(e) => return ApiError(e).into_response(),
    };
    let session = match state.engine.registry.get(target).await {
        Some(s) => s,
        None => return ApiError(SmError::NotFound(target.to_string())).into_response(),
    };
    if session.provider != Provider::CodexApp {
        return ApiError(SmError::Validation(format!("session {target} is not codex-app"))).into_response();
    }
    let current = state.engine.registry.codex_app_pending_kind(target).await;
    let expected = current.map(|kind| format!("{target}:{kind}"));
    if expected.as_deref() != Some(request_id.as_str()) {
        return ApiError(SmError::PendingStructuredRequest).into_response();
    }
    state.engine.registry.codex_app_clear_pending(target).await;
    // codex-app has no terminal window to write into; relaying the answer
    // into the structured-event transport is the notifier's job, same seam
    // the engine already uses for every other "deliver this outside the
    // scheduler's own state" event.
    state
        .engine
        .delivery
        .notifier()
        .notify(sm_engine::notifier::NotificationEvent {
            session_id: target,
            kind: sm_engine::notifier::NotificationKind::Completion,
            text: body.text,
        })
        .await;
    StatusCode::NO_CONTENT.into_response()
}

#[derive(Debug, Serialize)]
pub struct ActivityAction {
    pub action: &'static str,
    pub label: &'static str,
}

/// `GET /codex-app/:id/activity-actions` — the set of actions the caller
/// (typically a chat-bot mirror) should offer given the session's current
/// derived activity state.
pub async fn activity_actions(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<ActivityAction>>, ApiError> {
    let target = require_session_id(&id).map_err(ApiError)?;
    let activity = state.engine.registry.activity_state(target).await;
    let actions = match activity {
        Some(ActivityState::WaitingPermission) => {
            vec![ActivityAction { action: "approve", label: "Approve" }, ActivityAction { action: "deny", label: "Deny" }]
        }
        Some(ActivityState::WaitingInput) => vec![ActivityAction { action: "respond", label: "Respond" }],
        _ => Vec::new(),
    };
    Ok(Json(actions))
}
