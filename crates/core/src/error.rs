// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified error kind, shared by the HTTP surface and the CLI's exit-code
/// mapping. Mirrors `spec.md` §7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    Validation,
    NotFound,
    Unauthorized,
    /// Delivery blocked by a pending structured request (codex-app).
    PendingStructuredRequest,
    ExternalIo,
    /// The session manager daemon is unreachable.
    Unavailable,
    Internal,
}

impl ErrorCode {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Validation => 422,
            Self::NotFound => 404,
            Self::Unauthorized => 403,
            Self::PendingStructuredRequest => 409,
            Self::ExternalIo => 500,
            Self::Unavailable => 503,
            Self::Internal => 500,
        }
    }

    /// Exit code for the CLI mirror of the API (`spec.md` §6).
    pub fn cli_exit_code(&self) -> i32 {
        match self {
            Self::Unavailable => 2,
            _ => 1,
        }
    }

    pub fn as_machine_code(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::NotFound => "not_found",
            Self::Unauthorized => "unauthorized",
            Self::PendingStructuredRequest => "pending_structured_request",
            Self::ExternalIo => "external_io",
            Self::Unavailable => "unavailable",
            Self::Internal => "internal",
        }
    }
}

/// Top-level error type returned by `sm-core`/`sm-engine` operations.
#[derive(Debug, Error)]
pub enum SmError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("session not found: {0}")]
    NotFound(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("pending structured request")]
    PendingStructuredRequest,

    #[error("terminal/storage I/O error: {0}")]
    ExternalIo(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl SmError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Validation(_) => ErrorCode::Validation,
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::Unauthorized(_) => ErrorCode::Unauthorized,
            Self::PendingStructuredRequest => ErrorCode::PendingStructuredRequest,
            Self::ExternalIo(_) => ErrorCode::ExternalIo,
            Self::Internal(_) => ErrorCode::Internal,
        }
    }
}

pub type SmResult<T> = Result<T, SmError>;
