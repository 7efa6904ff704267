// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `/reviews/*` — PR/session review requests. The review workflow itself
//! (fetching a diff, invoking an LLM judge) is an out-of-scope collaborator
//! (`spec.md` §1); what the core owns is turning a review request into a
//! queued `important` message addressed to the reviewing session, the same
//! way any other agent-to-agent message is delivered. Per `spec.md` §6,
//! these endpoints use the "error-as-200" convention — business failures
//! come back as `200 {"error": "..."}` rather than a 4xx/5xx, since a
//! caller scripting against this surface treats a review outcome as data,
//! not a transport failure.

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use sm_core::id::SessionId;
use sm_core::message::DeliveryMode;

use crate::AppState;

use super::require_session_id;

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ReviewOutcome {
    Queued { queued: sm_core::message::QueuedMessage },
    Error { error: String },
}

async fn dispatch_review(
    state: &AppState,
    target: SessionId,
    caller: Option<SessionId>,
    text: String,
    important: bool,
) -> ReviewOutcome {
    let mode = if important { DeliveryMode::Important } else { DeliveryMode::Sequential };
    match state
        .engine
        .delivery
        .queue_message(target, caller, None, text, mode, None, None, false, false)
        .await
    {
        Ok(queued) => ReviewOutcome::Queued { queued },
        Err(e) => ReviewOutcome::Error { error: e.to_string() },
    }
}

#[derive(Debug, Deserialize)]
pub struct PrReviewRequest {
    pub pr_number: u64,
    #[serde(default)]
    pub repo: Option<String>,
    pub reviewer_session_id: String,
    #[serde(default)]
    pub steer: bool,
    #[serde(default)]
    pub wait: bool,
    #[serde(default)]
    pub caller_session_id: Option<String>,
}

/// `POST /reviews/pr` — queue a PR-review request into the named reviewer
/// session. `wait` is accepted for API compatibility but the core has no
/// synchronous review outcome to block on; the caller should use `watch`
/// (`spec.md` §4.5.8) against the reviewer session if it wants to block.
pub async fn pr_review(State(state): State<AppState>, Json(req): Json<PrReviewRequest>) -> Json<ReviewOutcome> {
    let target = match require_session_id(&req.reviewer_session_id) {
        Ok(id) => id,
        Err(e) => return Json(ReviewOutcome::Error { error: e.to_string() }),
    };
    let caller = match req.caller_session_id.as_deref().map(require_session_id).transpose() {
        Ok(c) => c,
        Err(e) => return Json(ReviewOutcome::Error { error: e.to_string() }),
    };
    let repo = req.repo.clone().unwrap_or_else(|| "(default repo)".to_string());
    let text = format!("Please review PR #{} in {}.", req.pr_number, repo);
    Json(dispatch_review(&state, target, caller, text, req.steer).await)
}

#[derive(Debug, Deserialize)]
pub struct SessionReviewRequest {
    #[serde(default)]
    pub reviewer_session_id: Option<String>,
    #[serde(default)]
    pub instructions: Option<String>,
    #[serde(default)]
    pub caller_session_id: Option<String>,
}

/// `POST /sessions/:id/review` — ask another session to review `:id`'s
/// current work.
pub async fn review_target(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<SessionReviewRequest>,
) -> Json<ReviewOutcome> {
    let subject = match require_session_id(&id) {
        Ok(id) => id,
        Err(e) => return Json(ReviewOutcome::Error { error: e.to_string() }),
    };
    let reviewer = match req.reviewer_session_id.as_deref().map(require_session_id).transpose() {
        Ok(Some(r)) => r,
        Ok(None) => subject,
        Err(e) => return Json(ReviewOutcome::Error { error: e.to_string() }),
    };
    let caller = match req.caller_session_id.as_deref().map(require_session_id).transpose() {
        Ok(c) => c,
        Err(e) => return Json(ReviewOutcome::Error { error: e.to_string() }),
    };
    let text = req
        .instructions
        .clone()
        .unwrap_or_else(|| format!("Please review session {subject}'s current work."));
    Json(dispatch_review(&state, reviewer, caller, text, false).await)
}

/// `POST /sessions/review` — same convention, reviewer supplied in body.
pub async fn session_review(State(state): State<AppState>, Json(req): Json<SessionReviewRequest>) -> Json<ReviewOutcome> {
    let reviewer = match req.reviewer_session_id.as_deref().map(require_session_id).transpose() {
        Ok(Some(r)) => r,
        Ok(None) => {
            return Json(ReviewOutcome::Error { error: "reviewer_session_id is required".into() })
        }
        Err(e) => return Json(ReviewOutcome::Error { error: e.to_string() }),
    };
    let caller = match req.caller_session_id.as_deref().map(require_session_id).transpose() {
        Ok(c) => c,
        Err(e) => return Json(ReviewOutcome::Error { error: e.to_string() }),
    };
    let text = req.instructions.clone().unwrap_or_else(|| "Please review the requested work.".to_string());
    Json(dispatch_review(&state, reviewer, caller, text, false).await)
}
