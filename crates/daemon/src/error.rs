// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Maps `sm_core::SmError` onto the HTTP surface (`spec.md` §7): every
//! error response is `{"error": "...", "error_code": "..."}` at the status
//! `ErrorCode::http_status()` names.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use sm_core::{ErrorCode, SmError};

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    error_code: &'static str,
}

/// Newtype so handlers can `?`-propagate `SmError` straight into a response.
pub struct ApiError(pub SmError);

impl From<SmError> for ApiError {
    fn from(e: SmError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.0.code();
        let status = StatusCode::from_u16(code.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorBody { error: self.0.to_string(), error_code: code.as_machine_code() };
        (status, Json(body)).into_response()
    }
}

pub fn into_response(code: ErrorCode, message: impl Into<String>) -> Response {
    let status = StatusCode::from_u16(code.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(ErrorBody { error: message.into(), error_code: code.as_machine_code() })).into_response()
}

pub type ApiResult<T> = Result<T, ApiError>;
