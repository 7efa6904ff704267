// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! C4: the output monitor. One cooperative task per session, tailing its
//! log file and polling its pane for liveness (`spec.md` §4.4).
//!
//! File tailing is grounded in the teacher's `driver::log_watch::LogWatcher`:
//! byte-offset tracking, truncation detection that resets the offset to
//! zero, a `notify`-driven wakeup with a polling fallback.

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sm_core::id::SessionId;
use sm_core::session::SessionStatus;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::delivery::DeliveryEngine;
use crate::notifier::{NotificationEvent, NotificationKind, Notifier};
use crate::patterns::{self, PatternClass};
use crate::registry::Registry;

/// One emission per this many seconds for a permission-prompt match
/// (`spec.md` §4.4 step 2).
const PERMISSION_DEBOUNCE_SECONDS: i64 = 30;

/// Byte-offset tail of a session's log file. Mirrors the teacher's
/// `LogWatcher` minus the generic line-batch channel plumbing — the
/// monitor reads a chunk, classifies it, and moves on within the same
/// tick.
struct LogTailer {
    path: PathBuf,
    offset: u64,
}

impl LogTailer {
    fn new(path: PathBuf) -> Self {
        Self { path, offset: 0 }
    }

    /// Read whatever text has been appended since the last read. Resets to
    /// the start of the file if it shrank below the tracked offset (a
    /// `/clear` truncates the transcript).
    fn read_new_lines(&mut self) -> std::io::Result<Vec<String>> {
        let file = match std::fs::File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(e),
        };

        if let Ok(meta) = file.metadata() {
            if meta.len() < self.offset {
                self.offset = 0;
            }
        }

        let mut reader = BufReader::new(file);
        reader.seek(SeekFrom::Start(self.offset))?;

        let mut lines = Vec::new();
        let mut line = String::new();
        loop {
            line.clear();
            let bytes_read = reader.read_line(&mut line)?;
            if bytes_read == 0 {
                break;
            }
            self.offset += bytes_read as u64;
            let trimmed = line.trim_end();
            if !trimmed.is_empty() {
                lines.push(trimmed.to_string());
            }
        }
        Ok(lines)
    }

    fn setup_notify_watcher(&self, wake_tx: mpsc::Sender<()>) -> Option<notify::RecommendedWatcher> {
        use notify::{RecursiveMode, Watcher};

        let mut watcher = notify::recommended_watcher(move |_: notify::Result<notify::Event>| {
            let _ = wake_tx.try_send(());
        })
        .ok()?;
        let watch_path = self.path.parent().unwrap_or(self.path.as_path());
        watcher.watch(watch_path, RecursiveMode::NonRecursive).ok()?;
        Some(watcher)
    }
}

/// Per-session bookkeeping that outlives any single tick but never survives
/// a restart (the output monitor is rebuilt fresh by `Engine::resume_all`).
#[derive(Default)]
struct MonitorState {
    last_pattern: Option<PatternClass>,
    last_permission_emit_at: Option<DateTime<Utc>>,
    tick_count: u32,
    blocked_by_permission: bool,
    deferred_crash_recovery: bool,
    /// `(at, succeeded)` of the last crash-recovery attempt, for the
    /// success/failure debounce (`spec.md` §4.4 step 5).
    last_crash_recovery_at: Option<(DateTime<Utc>, bool)>,
    idle_event_emitted: bool,
}

pub struct MonitorSupervisor {
    registry: Arc<Registry>,
    delivery: Arc<DeliveryEngine>,
    terminal: Arc<dyn sm_terminal::Terminal>,
    notifier: Arc<dyn Notifier>,
    config: EngineConfig,
    jobs: RwLock<HashMap<SessionId, CancellationToken>>,
}

impl MonitorSupervisor {
    pub fn new(
        registry: Arc<Registry>,
        delivery: Arc<DeliveryEngine>,
        terminal: Arc<dyn sm_terminal::Terminal>,
        notifier: Arc<dyn Notifier>,
        config: EngineConfig,
    ) -> Self {
        Self { registry, delivery, terminal, notifier, config, jobs: RwLock::new(HashMap::new()) }
    }

    /// Start the cooperative task for a session, unless one is already
    /// running (`spec.md` §9 "Cooperative-task lifetimes").
    pub async fn spawn(self: &Arc<Self>, id: SessionId) {
        {
            let jobs = self.jobs.read().await;
            if jobs.contains_key(&id) {
                return;
            }
        }
        let Some(session) = self.registry.get(id).await else { return };
        let token = CancellationToken::new();
        self.jobs.write().await.insert(id, token.clone());

        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.run_loop(id, session.log_file, token).await;
        });
    }

    pub async fn cancel(&self, id: SessionId) {
        if let Some(token) = self.jobs.write().await.remove(&id) {
            token.cancel();
        }
    }

    pub async fn shutdown(&self) {
        for (_, token) in self.jobs.write().await.drain() {
            token.cancel();
        }
    }

    async fn run_loop(self: Arc<Self>, id: SessionId, log_file: PathBuf, shutdown: CancellationToken) {
        let mut tailer = LogTailer::new(log_file);
        let mut state = MonitorState::default();

        let (wake_tx, mut wake_rx) = mpsc::channel::<()>(1);
        let _watcher = tailer.setup_notify_watcher(wake_tx);
        let mut interval = tokio::time::interval(self.config.monitor_poll_interval);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = wake_rx.recv() => {}
                _ = interval.tick() => {}
            }
            if !self.tick(id, &mut tailer, &mut state).await {
                break;
            }
        }
        self.jobs.write().await.remove(&id);
    }

    /// Returns `false` if the task should exit (window gone or session
    /// deregistered).
    async fn tick(&self, id: SessionId, tailer: &mut LogTailer, state: &mut MonitorState) -> bool {
        state.tick_count += 1;

        let Some(session) = self.registry.get(id).await else { return false };

        // Step 3: window-liveness probe every N ticks.
        if session.provider.is_tmux_hosted()
            && state.tick_count % self.config.window_liveness_check_every_ticks.max(1) == 0
            && matches!(self.terminal.window_exists(&session.window_name).await, Ok(false))
        {
            let _ = self.registry.update_status(id, SessionStatus::Stopped).await;
            self.notifier
                .notify(NotificationEvent {
                    session_id: id,
                    kind: NotificationKind::Error,
                    text: format!("session {} window is gone", session.name),
                })
                .await;
            return false;
        }

        let lines = tailer.read_new_lines().unwrap_or_default();
        if !lines.is_empty() {
            // Step 1: the log grew — update activity and clear the
            // permission block ("cleared by any new content").
            let _ = self.registry.touch_activity(id).await;
            state.blocked_by_permission = false;
            state.idle_event_emitted = false;

            let chunk = lines.join("\n");

            // Step 2: classify, permission wins ties within the chunk.
            if let Some(class) = patterns::classify(&chunk) {
                state.last_pattern = Some(class);
                match class {
                    PatternClass::Permission => {
                        let _ = self.registry.update_status(id, SessionStatus::WaitingPermission).await;
                        state.blocked_by_permission = true;
                        let now = Utc::now();
                        let should_emit = state
                            .last_permission_emit_at
                            .map(|t| now - t >= chrono::Duration::seconds(PERMISSION_DEBOUNCE_SECONDS))
                            .unwrap_or(true);
                        if should_emit {
                            state.last_permission_emit_at = Some(now);
                            self.emit(id, NotificationKind::PermissionPrompt, &chunk).await;
                        }
                    }
                    PatternClass::Error => {
                        self.emit(id, NotificationKind::Error, &chunk).await;
                    }
                    PatternClass::Completion => {
                        self.emit(id, NotificationKind::Completion, &chunk).await;
                    }
                }
            }

            // Step 5: crash-signature detection.
            if patterns::is_crash_signature(&chunk) {
                self.on_crash_signature(id, &session, state).await;
            }
        } else {
            // Step 4: empty delta — check idle.
            if !matches!(session.status, SessionStatus::Idle | SessionStatus::Stopped) {
                let elapsed = (Utc::now() - session.last_activity).num_seconds();
                if elapsed >= self.config.idle_threshold_seconds as i64 {
                    let _ = self.registry.update_status(id, SessionStatus::Idle).await;
                    if !state.idle_event_emitted {
                        state.idle_event_emitted = true;
                        let cooldown_ok = self
                            .delivery
                            .last_stop_notify_fired_at(id)
                            .await
                            .map(|t| {
                                (Utc::now() - t).num_seconds()
                                    >= self.config.idle_notification_cooldown_seconds
                            })
                            .unwrap_or(true);
                        if cooldown_ok {
                            self.emit(id, NotificationKind::Idle, "session is idle").await;
                        }
                    }
                }
            }
        }

        // Flush a deferred crash recovery once the session has transitioned
        // through idle, unless a fresh permission prompt is blocking it.
        if state.deferred_crash_recovery
            && !state.blocked_by_permission
            && matches!(session.status, SessionStatus::Idle | SessionStatus::Stopped)
        {
            state.deferred_crash_recovery = false;
            self.attempt_crash_recovery(id, &session, state).await;
        }

        true
    }

    async fn on_crash_signature(&self, id: SessionId, session: &sm_core::session::Session, state: &mut MonitorState) {
        if !session.provider.supports_crash_recovery() {
            return;
        }
        if matches!(session.status, SessionStatus::Idle | SessionStatus::Stopped) {
            self.attempt_crash_recovery(id, session, state).await;
        } else {
            state.deferred_crash_recovery = true;
        }
    }

    async fn attempt_crash_recovery(&self, id: SessionId, session: &sm_core::session::Session, state: &mut MonitorState) {
        let now = Utc::now();
        if let Some((at, succeeded)) = state.last_crash_recovery_at {
            let cooldown = if succeeded {
                self.config.crash_recovery_success_cooldown_seconds
            } else {
                self.config.crash_recovery_failure_cooldown_seconds
            };
            if (now - at).num_seconds() < cooldown {
                return;
            }
        }

        let alive = self.terminal.window_exists(&session.window_name).await.unwrap_or(false);
        if alive {
            let _ = self.registry.update_status(id, SessionStatus::Running).await;
            state.last_crash_recovery_at = Some((now, true));
        } else {
            let _ = self.registry.update_status(id, SessionStatus::Stopped).await;
            state.last_crash_recovery_at = Some((now, false));
        }
        self.notifier
            .notify(NotificationEvent {
                session_id: id,
                kind: NotificationKind::Crash,
                text: format!("crash signature detected on {}, window_alive={alive}", session.name),
            })
            .await;
    }

    async fn emit(&self, id: SessionId, kind: NotificationKind, chunk: &str) {
        self.notifier
            .notify(NotificationEvent { session_id: id, kind, text: truncate(chunk, 400) })
            .await;
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_tailer_reads_appended_lines() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("session.log");
        std::fs::write(&path, "first line\n").expect("write");

        let mut tailer = LogTailer::new(path.clone());
        let first = tailer.read_new_lines().expect("read");
        assert_eq!(first, vec!["first line".to_string()]);

        let mut file = std::fs::OpenOptions::new().append(true).open(&path).expect("append");
        use std::io::Write;
        writeln!(file, "second line").expect("write");

        let second = tailer.read_new_lines().expect("read");
        assert_eq!(second, vec!["second line".to_string()]);
    }

    #[test]
    fn log_tailer_resets_offset_on_truncation() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("session.log");
        std::fs::write(&path, "aaaaaaaaaa\n").expect("write");

        let mut tailer = LogTailer::new(path.clone());
        let _ = tailer.read_new_lines().expect("read");
        assert!(tailer.offset > 0);

        std::fs::write(&path, "b\n").expect("truncate+rewrite");
        let lines = tailer.read_new_lines().expect("read");
        assert_eq!(lines, vec!["b".to_string()]);
    }

    #[test]
    fn log_tailer_missing_file_returns_empty() {
        let mut tailer = LogTailer::new(PathBuf::from("/nonexistent/path/to.log"));
        assert_eq!(tailer.read_new_lines().expect("read"), Vec::<String>::new());
    }
}
