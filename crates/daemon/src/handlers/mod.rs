// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

pub mod admin;
pub mod codex_app;
pub mod hooks;
pub mod reviews;
pub mod sessions;

use sm_core::id::SessionId;
use sm_core::SmError;

/// Parse a path segment as a `SessionId`, or resolve it as a friendly name
/// via the registry when it isn't 8 hex chars — callers that accept
/// `id_or_name` use this; callers that only accept a hard id use
/// `SessionId::parse` directly and 404 on failure.
pub(crate) fn require_session_id(id: &str) -> Result<SessionId, SmError> {
    SessionId::parse(id).ok_or_else(|| SmError::Validation(format!("not a session id: {id}")))
}
