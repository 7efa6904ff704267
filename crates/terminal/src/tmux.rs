// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::keys::{as_ctrl_sequence, encode_key};
use crate::strip::strip_ansi;
use crate::{Terminal, TerminalError, TerminalResult};

/// Shells out to the `tmux(1)` binary. The real multiplexer process is an
/// external collaborator (`spec.md` §1); this is the thin client.
pub struct TmuxDriver {
    tmux_bin: String,
}

impl Default for TmuxDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl TmuxDriver {
    pub fn new() -> Self {
        Self { tmux_bin: "tmux".to_string() }
    }

    pub fn with_binary(tmux_bin: impl Into<String>) -> Self {
        Self { tmux_bin: tmux_bin.into() }
    }

    async fn run(&self, args: &[&str]) -> TerminalResult<std::process::Output> {
        debug!(args = ?args, "tmux invocation");
        Command::new(&self.tmux_bin)
            .args(args)
            .output()
            .await
            .map_err(|e| TerminalError::Io(e.to_string()))
    }
}

#[async_trait]
impl Terminal for TmuxDriver {
    async fn create_window(
        &self,
        name: &str,
        working_dir: &str,
        command: &str,
        args: &[String],
    ) -> TerminalResult<()> {
        if self.window_exists(name).await? {
            return Err(TerminalError::AlreadyExists(name.to_string()));
        }
        let mut cmd_args = vec!["new-session", "-d", "-s", name, "-c", working_dir, command];
        let extra: Vec<&str> = args.iter().map(String::as_str).collect();
        cmd_args.extend(extra);
        let out = self.run(&cmd_args).await?;
        if !out.status.success() {
            return Err(TerminalError::Io(String::from_utf8_lossy(&out.stderr).into_owned()));
        }
        Ok(())
    }

    async fn window_exists(&self, name: &str) -> TerminalResult<bool> {
        let out = self.run(&["has-session", "-t", name]).await?;
        Ok(out.status.success())
    }

    async fn capture_pane(&self, name: &str, lines: u32) -> TerminalResult<String> {
        let start = format!("-{lines}");
        let out = self.run(&["capture-pane", "-t", name, "-p", "-S", &start]).await?;
        if !out.status.success() {
            return Err(TerminalError::NotFound(name.to_string()));
        }
        Ok(strip_ansi(&String::from_utf8_lossy(&out.stdout)))
    }

    async fn send_text_then_enter(
        &self,
        name: &str,
        text: &str,
        settle_delay: Duration,
    ) -> TerminalResult<()> {
        // Sub-operation 1: literal keystrokes, never coalesced with the
        // terminating newline — see `spec.md` §4.1's rationale.
        let out = self.run(&["send-keys", "-t", name, "-l", text]).await?;
        if !out.status.success() {
            return Err(TerminalError::Io(String::from_utf8_lossy(&out.stderr).into_owned()));
        }

        tokio::time::sleep(settle_delay).await;

        // Sub-operation 2: Enter as its own keystroke event.
        let out = self.run(&["send-keys", "-t", name, "Enter"]).await?;
        if !out.status.success() {
            return Err(TerminalError::Io(String::from_utf8_lossy(&out.stderr).into_owned()));
        }
        Ok(())
    }

    async fn send_key(&self, name: &str, key: &str) -> TerminalResult<()> {
        let translated;
        let key_arg: &str = if let Some(enc) = encode_key(key) {
            enc
        } else if let Some(ctrl) = as_ctrl_sequence(key) {
            translated = ctrl;
            &translated
        } else {
            key
        };
        let out = self.run(&["send-keys", "-t", name, key_arg]).await?;
        if !out.status.success() {
            return Err(TerminalError::Io(String::from_utf8_lossy(&out.stderr).into_owned()));
        }
        Ok(())
    }

    async fn set_status(&self, name: &str, text: &str) -> TerminalResult<()> {
        let out = self.run(&["set-option", "-t", name, "status-left", text]).await?;
        if !out.status.success() {
            return Err(TerminalError::Io(String::from_utf8_lossy(&out.stderr).into_owned()));
        }
        Ok(())
    }

    async fn kill_window(&self, name: &str) -> TerminalResult<()> {
        let out = self.run(&["kill-session", "-t", name]).await?;
        if !out.status.success() {
            return Err(TerminalError::NotFound(name.to_string()));
        }
        Ok(())
    }
}
