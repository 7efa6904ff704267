// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Black-box harness for the six end-to-end scenarios of `spec.md` §8.
//!
//! Unlike the CLI's own smoke tests (which spawn the compiled daemon
//! binary and drive it over a real transport), this harness builds the
//! router in-process with a [`sm_terminal::recording::RecordingTerminal`]
//! standing in for `tmux`, so every scenario can assert on exact keystroke
//! sequences without a real terminal multiplexer underneath.

use std::sync::Arc;
use std::time::Duration;

use axum_test::TestServer;
use sm_engine::config::EngineConfig;
use sm_engine::notifier::LoggingNotifier;
use sm_engine::Engine;
use sm_store::Store;
use sm_terminal::recording::RecordingTerminal;

/// Everything one scenario test needs: the HTTP surface, the terminal
/// double to assert against, and the temp state the engine persists into.
pub struct World {
    pub server: TestServer,
    pub terminal: Arc<RecordingTerminal>,
    pub engine: Arc<Engine>,
    pub store: Arc<Store>,
    _state_dir: tempfile::TempDir,
}

impl World {
    /// Build a fresh engine/router pair with a fast-polling `EngineConfig`
    /// (real interval/threshold values would make every scenario a
    /// multi-second sleep).
    pub async fn build() -> World {
        Self::build_with(fast_config()).await
    }

    pub async fn build_with(config: EngineConfig) -> World {
        let state_dir = tempfile::tempdir().expect("tempdir");
        let snapshot_path = state_dir.path().join("sessions.json");
        let log_dir = state_dir.path().join("logs");
        std::fs::create_dir_all(&log_dir).expect("log dir");

        let store = Arc::new(Store::open_in_memory().expect("in-memory store"));
        let terminal = Arc::new(RecordingTerminal::new());
        let notifier = Arc::new(LoggingNotifier);

        let engine = Arc::new(
            Engine::new(
                store.clone(),
                terminal.clone() as Arc<dyn sm_terminal::Terminal>,
                notifier,
                config,
                &snapshot_path,
            )
            .await
            .expect("engine init"),
        );

        let state = sm_daemon::AppState {
            engine: engine.clone(),
            store: store.clone(),
            log_dir,
            snapshot_path,
            tmux_bin: "tmux".to_string(),
            default_remind_soft_seconds: 180,
            default_remind_hard_seconds: 300,
        };

        let router = sm_daemon::build_router_inner(state);
        let server = TestServer::new(router).expect("test server");

        World { server, terminal, engine, store, _state_dir: state_dir }
    }
}

/// Poll intervals and thresholds shrunk to millisecond scale so a scenario
/// can wait on a real `tokio::time::sleep` instead of mocking the clock.
pub fn fast_config() -> EngineConfig {
    EngineConfig {
        monitor_poll_interval: Duration::from_millis(20),
        idle_threshold_seconds: 300,
        window_liveness_check_every_ticks: 30,
        idle_notification_cooldown_seconds: 300,
        crash_recovery_success_cooldown_seconds: 30,
        crash_recovery_failure_cooldown_seconds: 5,
        max_batch_size: 20,
        settle_delay: Duration::from_millis(1),
        ready_poll_timeout: Duration::from_millis(200),
        ready_poll_interval: Duration::from_millis(10),
        capture_lines: 50,
        skip_fence_window_seconds: 8,
        stop_notify_suppression_seconds: 10,
        watch_poll_interval: Duration::from_millis(20),
        default_remind_soft_seconds: 180,
        default_remind_hard_seconds: 300,
        context_warning_percentage: 50.0,
        context_critical_percentage: 65.0,
    }
}

/// Spawn a session via the real HTTP surface and return its JSON body.
pub async fn spawn_session(
    server: &TestServer,
    provider: &str,
    parent_session_id: Option<String>,
    is_em: bool,
) -> serde_json::Value {
    let body = serde_json::json!({
        "provider": provider,
        "working_dir": "/tmp",
        "parent_session_id": parent_session_id,
        "is_em": is_em,
    });
    let resp = server.post("/sessions").json(&body).await;
    resp.assert_status(axum::http::StatusCode::CREATED);
    resp.json()
}

pub fn session_id(session: &serde_json::Value) -> String {
    session["id"].as_str().expect("session id").to_string()
}

/// Fire a `Stop` hook attributed to `session_id` via the `session_manager_id`
/// leg of the three-step matching chain (`spec.md` §6) — the simplest of
/// the three to exercise directly, since it's just the session's own id.
pub async fn fire_stop_hook(server: &TestServer, session_id: &str) {
    let resp = server
        .post("/hooks/stop")
        .json(&serde_json::json!({ "session_manager_id": session_id }))
        .await;
    resp.assert_status(axum::http::StatusCode::NO_CONTENT);
}

/// Wait up to `timeout` polling every `step` until `pred` returns `true`.
pub async fn wait_until(timeout: Duration, step: Duration, mut pred: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if pred() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(step).await;
    }
}
