// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! C7: the HTTP surface. A thin `axum` adapter over `sm-engine` — every
//! handler here delegates to the registry/delivery/timers it owns rather
//! than holding any state of its own (`spec.md` §4.7).

pub mod config;
pub mod error;
pub mod handlers;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::routing::{delete, get, patch, post};
use axum::Router;
use sm_engine::Engine;
use sm_store::Store;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Shared state every handler receives through `State<AppState>`.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub store: Arc<Store>,
    pub log_dir: PathBuf,
    pub snapshot_path: PathBuf,
    pub tmux_bin: String,
    pub default_remind_soft_seconds: u64,
    pub default_remind_hard_seconds: u64,
}

/// Wire up the full HTTP surface named in `spec.md` §6.
pub fn build_router(state: AppState) -> Router {
    build_router_inner(state).layer(CorsLayer::permissive())
}

/// Router without the permissive CORS layer, used by integration tests
/// that want to assert on headers directly.
pub fn build_router_inner(state: AppState) -> Router {
    use handlers::{admin, codex_app, hooks, reviews, sessions};

    Router::new()
        // -- sessions ---------------------------------------------------
        .route("/sessions", post(sessions::spawn).get(sessions::list))
        .route("/sessions/:id", get(sessions::get).delete(sessions::kill))
        .route("/sessions/:id/friendly-name", patch(sessions::set_friendly_name))
        .route("/sessions/:id/em", patch(sessions::set_em))
        .route("/sessions/:id/task", patch(sessions::set_task))
        .route("/sessions/:id/role", patch(sessions::set_role))
        .route("/sessions/:id/agent-status", patch(sessions::set_agent_status))
        .route("/sessions/:id/input", post(sessions::send_input))
        .route("/sessions/:id/key", post(sessions::send_key))
        .route("/sessions/:id/clear", post(sessions::clear))
        .route("/sessions/:id/handoff", post(sessions::handoff))
        .route("/sessions/:id/task-complete", post(sessions::task_complete))
        .route("/sessions/:id/invalidate-cache", post(sessions::invalidate_cache))
        .route("/sessions/:id/notify-on-stop", post(sessions::notify_on_stop))
        .route("/sessions/:id/context-monitor", post(sessions::enable_context_monitor))
        .route("/sessions/:id/children", get(sessions::children))
        .route("/sessions/:id/output", get(sessions::output))
        .route("/sessions/:id/tool-calls", get(sessions::tool_calls))
        .route("/sessions/:id/summary", get(sessions::summary))
        .route("/sessions/:id/send-queue", post(sessions::send_queue))
        .route("/sessions/context-monitor", get(sessions::list_context_monitor))
        // -- reviews ------------------------------------------------------
        .route("/reviews/pr", post(reviews::pr_review))
        .route("/sessions/:id/review", post(reviews::review_target))
        .route("/sessions/review", post(reviews::session_review))
        // -- codex-app ------------------------------------------------------
        .route("/codex-app/:id/events", post(codex_app::events))
        .route("/codex-app/:id/pending-requests", get(codex_app::pending_requests))
        .route("/codex-app/:id/requests/:request_id/respond", post(codex_app::respond))
        .route("/codex-app/:id/activity-actions", get(codex_app::activity_actions))
        // -- hooks ------------------------------------------------------
        .route("/hooks/stop", post(hooks::stop))
        .route("/hooks/notification", post(hooks::notification))
        .route("/hooks/tool-use", post(hooks::tool_use))
        .route("/hooks/context-usage", post(hooks::context_usage))
        // -- admin / scheduler --------------------------------------------
        .route("/health", get(admin::health))
        .route("/admin/last-message/:id", get(admin::last_message))
        .route("/scheduler/remind", post(admin::schedule_remind))
        .route("/scheduler/parent-wake", post(admin::register_parent_wake))
        .route("/scheduler/watch", post(admin::watch))
        .route("/admin/cleanup-idle-topics", post(admin::cleanup_idle_topics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// A minimal router carrying only `/health`, used for a liveness check
/// before the full engine has finished loading (mirrors the teacher's
/// `build_health_router`).
pub fn build_health_router() -> Router {
    Router::new().route("/health", get(handlers::admin::health_anonymous))
}

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8420";
pub const GRACEFUL_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Build the engine, bind the HTTP surface, and serve until a shutdown
/// signal arrives. The single entry point `smd`'s `main` calls.
pub async fn run(cfg: config::SmdConfig) -> anyhow::Result<()> {
    cfg.validate()?;

    let state_dir = cfg.resolved_state_dir();
    let log_dir = cfg.resolved_log_dir();
    std::fs::create_dir_all(&state_dir)?;
    std::fs::create_dir_all(&log_dir)?;

    let store = Arc::new(Store::open(cfg.db_path())?);
    let terminal: Arc<dyn sm_terminal::Terminal> = Arc::new(sm_terminal::tmux::TmuxDriver::with_binary(cfg.tmux_bin.clone()));
    let notifier: Arc<dyn sm_engine::notifier::Notifier> = Arc::new(sm_engine::notifier::LoggingNotifier);
    let snapshot_path = cfg.snapshot_path();

    let engine = Arc::new(
        Engine::new(store.clone(), terminal.clone(), notifier, cfg.engine_config(), &snapshot_path).await?,
    );

    // `spec.md` §4.2: "any message whose target session no longer exists is
    // dropped" on load. The registry snapshot/SQL reconciliation above is
    // already done, so this is safe to run once, here, before jobs resume.
    match store.drop_messages_for_missing_targets().await {
        Ok(0) => {}
        Ok(dropped) => tracing::info!(dropped, "dropped queued messages for missing session targets"),
        Err(e) => tracing::warn!(error = %e, "failed to prune queued messages for missing session targets"),
    }

    engine.resume_all().await;

    let state = AppState {
        engine: engine.clone(),
        store,
        log_dir,
        snapshot_path,
        tmux_bin: cfg.tmux_bin.clone(),
        default_remind_soft_seconds: cfg.remind_soft_seconds,
        default_remind_hard_seconds: cfg.remind_hard_seconds,
    };

    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr).await?;
    tracing::info!(addr = %cfg.bind_addr, "sm-daemon listening");

    let shutdown = tokio_util::sync::CancellationToken::new();
    let shutdown_signal = shutdown.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        shutdown_signal.cancel();
    });

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    engine.shutdown().await;
    Ok(())
}
