// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `sm`'s `clap::Parser` configuration — `SM_API_URL` and
//! `CLAUDE_SESSION_MANAGER_ID` (`spec.md` §6 "Environment"), following the
//! teacher's flat-struct-with-`env`-fallbacks idiom
//! (`examples/groblegark-coop/crates/cli/src/config.rs`).

use clap::Parser;

#[derive(Debug, Parser, Clone)]
pub struct SmConfig {
    /// Base URL of the `smd` daemon's HTTP surface.
    #[arg(long, env = "SM_API_URL", default_value = "http://127.0.0.1:8420")]
    pub api_url: String,

    /// This process's own session id, set by the daemon when it launched
    /// the agent; hooks and `sm` subcommands that act "as" the caller read
    /// this rather than requiring `--session-id` on every invocation.
    #[arg(long, env = "CLAUDE_SESSION_MANAGER_ID")]
    pub session_manager_id: Option<String>,

    /// Request timeout in milliseconds.
    #[arg(long, env = "SM_REQUEST_TIMEOUT_MS", default_value = "10000")]
    pub request_timeout_ms: u64,
}

impl SmConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_url.trim().is_empty() {
            anyhow::bail!("--api-url / SM_API_URL must not be empty");
        }
        Ok(())
    }

    /// The caller's own session id, or a business error if it's required
    /// and not set (`spec.md` §6 CLI exit code 2 reserved for daemon
    /// unavailability — a missing session id is a validation error, exit 1).
    pub fn require_session_manager_id(&self) -> anyhow::Result<&str> {
        self.session_manager_id
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("CLAUDE_SESSION_MANAGER_ID is not set"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_api_url() {
        let cfg = SmConfig { api_url: "  ".into(), session_manager_id: None, request_timeout_ms: 1000 };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn missing_session_manager_id_is_an_error() {
        let cfg = SmConfig { api_url: "http://x".into(), session_manager_id: None, request_timeout_ms: 1000 };
        assert!(cfg.require_session_manager_id().is_err());
    }
}
