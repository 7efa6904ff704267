// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! C1: the terminal driver. Sends keystrokes to and captures the visible
//! pane of a named multiplexer window; creates and destroys windows.
//!
//! The driver is stateless — all concurrency control (the per-session
//! delivery mutex) lives in `sm-engine` above it.

pub mod keys;
pub mod recording;
pub mod strip;
pub mod tmux;

use std::time::Duration;

use async_trait::async_trait;

/// Default settle delay between writing text and sending the terminating
/// Enter key (`spec.md` §4.1): long enough that the agent TUI's paste
/// detector (which looks for a fast `text\r` burst) sees two independent
/// keystroke events instead.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(300);

/// Default timeout for the urgent path's prompt-readiness poll (`spec.md`
/// §4.5.4).
pub const DEFAULT_READY_POLL_TIMEOUT: Duration = Duration::from_secs(3);

/// Interval between prompt-readiness polls.
pub const READY_POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, thiserror::Error)]
pub enum TerminalError {
    #[error("window already exists: {0}")]
    AlreadyExists(String),
    #[error("window not found: {0}")]
    NotFound(String),
    #[error("terminal I/O error: {0}")]
    Io(String),
}

pub type TerminalResult<T> = Result<T, TerminalError>;

/// The C1 contract. Implementations must not retry internally — callers
/// (the delivery engine) own retry/back-pressure decisions.
#[async_trait]
pub trait Terminal: Send + Sync {
    /// Create a detached window running `command` with `args` in
    /// `working_dir`. Fails if a window with this name already exists.
    async fn create_window(
        &self,
        name: &str,
        working_dir: &str,
        command: &str,
        args: &[String],
    ) -> TerminalResult<()>;

    async fn window_exists(&self, name: &str) -> TerminalResult<bool>;

    /// Return the most recent `lines` lines of the window's visible output
    /// with terminal-escape sequences removed.
    async fn capture_pane(&self, name: &str, lines: u32) -> TerminalResult<String>;

    /// Two atomic sub-operations: write `text` as keystrokes, then — after
    /// `settle_delay` — send Enter as a separate keystroke. Both must
    /// succeed; on either failure, report failure without retrying.
    async fn send_text_then_enter(
        &self,
        name: &str,
        text: &str,
        settle_delay: Duration,
    ) -> TerminalResult<()>;

    /// Send a single named key (`Enter`, `Escape`, `y`, `Ctrl-c`, ...).
    async fn send_key(&self, name: &str, key: &str) -> TerminalResult<()>;

    async fn set_status(&self, name: &str, text: &str) -> TerminalResult<()>;

    async fn kill_window(&self, name: &str) -> TerminalResult<()>;
}

/// Poll `capture_pane` until the last line, right-stripped, ends exactly
/// with `>` (no trailing user text) or `timeout` elapses. Returns `true` if
/// readiness was observed. Shared by the urgent delivery path (§4.5.4) and
/// the watch-for-idle terminal probe (§4.6 Phase 2).
pub async fn poll_prompt_ready(
    term: &dyn Terminal,
    window: &str,
    timeout: Duration,
) -> TerminalResult<bool> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let pane = term.capture_pane(window, 1).await?;
        if is_prompt_ready(&pane) {
            return Ok(true);
        }
        if tokio::time::Instant::now() >= deadline {
            return Ok(false);
        }
        tokio::time::sleep(READY_POLL_INTERVAL).await;
    }
}

/// A pane's last line indicates readiness when, right-stripped, it ends
/// exactly with `>` — i.e. no user text follows the marker.
pub fn is_prompt_ready(pane_text: &str) -> bool {
    let last_line = pane_text.lines().last().unwrap_or("");
    last_line.trim_end().ends_with('>')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_when_last_line_ends_with_bare_marker() {
        assert!(is_prompt_ready("some output\n> "));
        assert!(is_prompt_ready(">"));
    }

    #[test]
    fn not_ready_when_user_text_follows_marker() {
        assert!(!is_prompt_ready("> half typed"));
    }

    #[test]
    fn not_ready_on_empty_pane() {
        assert!(!is_prompt_ready(""));
    }
}
