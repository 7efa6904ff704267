// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! An in-memory `Terminal` double that records every call it receives and
//! serves scripted `capture_pane` output, so engine-level tests can assert
//! on exact keystroke sequences without a real `tmux` underneath.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::{Terminal, TerminalError, TerminalResult};

/// One observed call against a `RecordingTerminal`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    CreateWindow { name: String, working_dir: String, command: String, args: Vec<String> },
    WindowExists { name: String },
    CapturePane { name: String, lines: u32 },
    SendTextThenEnter { name: String, text: String },
    SendKey { name: String, key: String },
    SetStatus { name: String, text: String },
    KillWindow { name: String },
}

#[derive(Default)]
struct Inner {
    calls: Vec<Call>,
    panes: HashMap<String, String>,
    windows: HashMap<String, bool>,
    fail_next: Option<String>,
}

/// Test double backing the six end-to-end delivery scenarios. Scripted with
/// [`RecordingTerminal::set_pane`] / [`RecordingTerminal::set_window_exists`];
/// inspected with [`RecordingTerminal::calls`].
pub struct RecordingTerminal {
    inner: Mutex<Inner>,
}

impl Default for RecordingTerminal {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingTerminal {
    pub fn new() -> Self {
        Self { inner: Mutex::new(Inner::default()) }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.inner.lock().expect("lock").calls.clone()
    }

    pub fn set_pane(&self, name: &str, text: &str) {
        self.inner.lock().expect("lock").panes.insert(name.to_string(), text.to_string());
    }

    pub fn set_window_exists(&self, name: &str, exists: bool) {
        self.inner.lock().expect("lock").windows.insert(name.to_string(), exists);
    }

    /// Make the next call fail with `TerminalError::Io(reason)`, once.
    pub fn fail_next_call(&self, reason: &str) {
        self.inner.lock().expect("lock").fail_next = Some(reason.to_string());
    }

    fn maybe_fail(&self) -> TerminalResult<()> {
        let mut guard = self.inner.lock().expect("lock");
        if let Some(reason) = guard.fail_next.take() {
            return Err(TerminalError::Io(reason));
        }
        Ok(())
    }
}

#[async_trait]
impl Terminal for RecordingTerminal {
    async fn create_window(
        &self,
        name: &str,
        working_dir: &str,
        command: &str,
        args: &[String],
    ) -> TerminalResult<()> {
        self.maybe_fail()?;
        let mut guard = self.inner.lock().expect("lock");
        if guard.windows.get(name).copied().unwrap_or(false) {
            return Err(TerminalError::AlreadyExists(name.to_string()));
        }
        guard.windows.insert(name.to_string(), true);
        guard.calls.push(Call::CreateWindow {
            name: name.to_string(),
            working_dir: working_dir.to_string(),
            command: command.to_string(),
            args: args.to_vec(),
        });
        Ok(())
    }

    async fn window_exists(&self, name: &str) -> TerminalResult<bool> {
        self.maybe_fail()?;
        let mut guard = self.inner.lock().expect("lock");
        guard.calls.push(Call::WindowExists { name: name.to_string() });
        Ok(guard.windows.get(name).copied().unwrap_or(false))
    }

    async fn capture_pane(&self, name: &str, lines: u32) -> TerminalResult<String> {
        self.maybe_fail()?;
        let mut guard = self.inner.lock().expect("lock");
        guard.calls.push(Call::CapturePane { name: name.to_string(), lines });
        Ok(guard.panes.get(name).cloned().unwrap_or_default())
    }

    async fn send_text_then_enter(
        &self,
        name: &str,
        text: &str,
        settle_delay: Duration,
    ) -> TerminalResult<()> {
        self.maybe_fail()?;
        if !settle_delay.is_zero() {
            tokio::time::sleep(settle_delay).await;
        }
        self.inner.lock().expect("lock").calls.push(Call::SendTextThenEnter {
            name: name.to_string(),
            text: text.to_string(),
        });
        Ok(())
    }

    async fn send_key(&self, name: &str, key: &str) -> TerminalResult<()> {
        self.maybe_fail()?;
        self.inner
            .lock()
            .expect("lock")
            .calls
            .push(Call::SendKey { name: name.to_string(), key: key.to_string() });
        Ok(())
    }

    async fn set_status(&self, name: &str, text: &str) -> TerminalResult<()> {
        self.maybe_fail()?;
        self.inner
            .lock()
            .expect("lock")
            .calls
            .push(Call::SetStatus { name: name.to_string(), text: text.to_string() });
        Ok(())
    }

    async fn kill_window(&self, name: &str) -> TerminalResult<()> {
        self.maybe_fail()?;
        let mut guard = self.inner.lock().expect("lock");
        if !guard.windows.get(name).copied().unwrap_or(false) {
            return Err(TerminalError::NotFound(name.to_string()));
        }
        guard.windows.insert(name.to_string(), false);
        guard.calls.push(Call::KillWindow { name: name.to_string() });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_create_then_send_sequence() {
        let term = RecordingTerminal::new();
        term.create_window("s1", "/tmp", "claude", &[]).await.unwrap();
        term.send_text_then_enter("s1", "hello", Duration::ZERO).await.unwrap();
        assert_eq!(
            term.calls(),
            vec![
                Call::CreateWindow {
                    name: "s1".into(),
                    working_dir: "/tmp".into(),
                    command: "claude".into(),
                    args: vec![],
                },
                Call::SendTextThenEnter { name: "s1".into(), text: "hello".into() },
            ]
        );
    }

    #[tokio::test]
    async fn create_window_twice_errors() {
        let term = RecordingTerminal::new();
        term.create_window("s1", "/tmp", "claude", &[]).await.unwrap();
        let err = term.create_window("s1", "/tmp", "claude", &[]).await.unwrap_err();
        assert!(matches!(err, TerminalError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn scripted_pane_is_served() {
        let term = RecordingTerminal::new();
        term.set_pane("s1", "some output\n> ");
        let pane = term.capture_pane("s1", 50).await.unwrap();
        assert_eq!(pane, "some output\n> ");
    }

    #[tokio::test]
    async fn fail_next_call_surfaces_once() {
        let term = RecordingTerminal::new();
        term.fail_next_call("boom");
        assert!(term.window_exists("s1").await.is_err());
        assert!(term.window_exists("s1").await.is_ok());
    }
}
