// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! C6: the timer service. Four cooperative timer kinds sharing one
//! cancellation-token bookkeeping style (`spec.md` §4.6, §9
//! "Cooperative-task lifetimes"): remind, parent-wake, watch-for-idle, and
//! the event-driven context-usage alert state machine.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sm_core::id::SessionId;
use sm_core::message::DeliveryMode;
use sm_core::registration::{
    ParentWakeRegistration, RemindRegistration, ScheduledReminder, WatchRegistration,
};
use sm_core::session::SessionStatus;
use sm_core::SmResult;
use sm_store::Store;
use sm_terminal::{is_prompt_ready, Terminal};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::delivery::DeliveryEngine;
use crate::notifier::{NotificationEvent, NotificationKind, Notifier};
use crate::registry::Registry;

/// Poll cadence for the remind and parent-wake loops. Not tied to the
/// per-session threshold — the loop just needs to be fine enough that the
/// soft/hard thresholds don't overshoot noticeably.
const TIMER_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// `spec.md` §4.5.6 / §4.6: a Stop-notify fired to the same watcher within
/// this window swallows the watch's own idle emission.
const STOP_NOTIFY_SUPPRESSION_SECONDS: i64 = 10;

pub struct TimerService {
    store: Arc<Store>,
    registry: Arc<Registry>,
    delivery: Arc<DeliveryEngine>,
    #[allow(dead_code)]
    terminal: Arc<dyn Terminal>,
    notifier: Arc<dyn Notifier>,
    config: EngineConfig,
    remind_jobs: RwLock<HashMap<SessionId, CancellationToken>>,
    parent_wake_jobs: RwLock<HashMap<SessionId, CancellationToken>>,
    watch_jobs: RwLock<HashMap<Uuid, CancellationToken>>,
    scheduled_reminder_jobs: RwLock<HashMap<Uuid, CancellationToken>>,
}

impl TimerService {
    pub fn new(
        store: Arc<Store>,
        registry: Arc<Registry>,
        delivery: Arc<DeliveryEngine>,
        terminal: Arc<dyn Terminal>,
        notifier: Arc<dyn Notifier>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            registry,
            delivery,
            terminal,
            notifier,
            config,
            remind_jobs: RwLock::new(HashMap::new()),
            parent_wake_jobs: RwLock::new(HashMap::new()),
            watch_jobs: RwLock::new(HashMap::new()),
            scheduled_reminder_jobs: RwLock::new(HashMap::new()),
        }
    }

    // -- remind --------------------------------------------------------

    pub async fn register_remind(
        self: &Arc<Self>,
        session_id: SessionId,
        soft_threshold_seconds: u64,
        hard_threshold_seconds: u64,
    ) -> SmResult<()> {
        let reg = RemindRegistration {
            session_id,
            soft_threshold_seconds,
            hard_threshold_seconds,
            registered_at: Utc::now(),
        };
        self.store.upsert_remind(&reg).await.map_err(store_err)?;
        self.spawn_remind_job(session_id).await;
        Ok(())
    }

    pub async fn cancel_remind(&self, session_id: SessionId) -> SmResult<()> {
        self.store.cancel_remind(session_id).await.map_err(store_err)?;
        if let Some(token) = self.remind_jobs.write().await.remove(&session_id) {
            token.cancel();
        }
        Ok(())
    }

    // -- parent-wake -----------------------------------------------------

    pub async fn register_parent_wake(
        self: &Arc<Self>,
        child_session_id: SessionId,
        parent_session_id: SessionId,
        period_seconds: u64,
    ) -> SmResult<()> {
        let reg = ParentWakeRegistration {
            child_session_id,
            parent_session_id,
            period_seconds,
            registered_at: Utc::now(),
        };
        self.store.upsert_parent_wake(&reg).await.map_err(store_err)?;
        self.spawn_parent_wake_job(child_session_id).await;
        Ok(())
    }

    pub async fn cancel_parent_wake(&self, child_session_id: SessionId) -> SmResult<()> {
        self.store.cancel_parent_wake(child_session_id).await.map_err(store_err)?;
        if let Some(token) = self.parent_wake_jobs.write().await.remove(&child_session_id) {
            token.cancel();
        }
        Ok(())
    }

    // -- watch-for-idle --------------------------------------------------

    pub async fn watch(
        self: &Arc<Self>,
        target_session_id: SessionId,
        watcher_session_id: SessionId,
        timeout_seconds: u64,
    ) -> SmResult<Uuid> {
        let reg = WatchRegistration {
            id: Uuid::new_v4(),
            watcher_session_id,
            target_session_id,
            timeout_seconds,
            registered_at: Utc::now(),
        };
        self.store.insert_watch(&reg).await.map_err(store_err)?;

        let token = CancellationToken::new();
        self.watch_jobs.write().await.insert(reg.id, token.clone());

        let this = Arc::clone(self);
        let watch_id = reg.id;
        tokio::spawn(async move {
            this.run_watch_loop(watch_id, watcher_session_id, target_session_id, timeout_seconds, token).await;
        });
        Ok(reg.id)
    }

    pub async fn cancel_watch(&self, id: Uuid) {
        if let Some(token) = self.watch_jobs.write().await.remove(&id) {
            token.cancel();
        }
        let _ = self.store.delete_watch(id).await;
    }

    async fn run_watch_loop(
        self: Arc<Self>,
        watch_id: Uuid,
        watcher: SessionId,
        target: SessionId,
        timeout_seconds: u64,
        shutdown: CancellationToken,
    ) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(timeout_seconds);
        let mut consecutive_ready = 0u32;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = tokio::time::sleep(self.config.watch_poll_interval) => {}
            }

            let Some(session) = self.registry.get(target).await else {
                self.finish_watch(watch_id, watcher, "target no longer exists").await;
                return;
            };

            let is_idle = self.delivery.is_idle(target).await;
            let has_pending = self.delivery.has_pending_messages(target).await;
            let paste_buffered = self.delivery.has_pending_paste_buffer(target).await;

            // Phase 1: memory.
            if is_idle && !has_pending && !paste_buffered {
                self.finish_watch_idle(watch_id, watcher).await;
                return;
            }

            // Phase 2: terminal probe, tmux-hosted providers only.
            if session.provider.is_tmux_hosted() {
                let ready = self
                    .delivery
                    .terminal()
                    .capture_pane(&session.window_name, 1)
                    .await
                    .map(|pane| is_prompt_ready(&pane))
                    .unwrap_or(false);
                consecutive_ready = if ready { consecutive_ready + 1 } else { 0 };
                if consecutive_ready >= 2 {
                    self.finish_watch_idle(watch_id, watcher).await;
                    return;
                }
            } else if session.status == SessionStatus::Idle {
                // Phase 3: no terminal window (headless codex-app, or
                // restarted with empty in-memory state) — fall back to
                // the persisted status.
                self.finish_watch_idle(watch_id, watcher).await;
                return;
            }

            // Phase 4: stuck-pending tiebreaker.
            if is_idle && has_pending && consecutive_ready >= 2 {
                self.finish_watch_idle(watch_id, watcher).await;
                return;
            }

            if tokio::time::Instant::now() >= deadline {
                self.finish_watch_timeout(watch_id, watcher, target).await;
                return;
            }
        }
    }

    async fn finish_watch_idle(&self, watch_id: Uuid, watcher: SessionId) {
        self.cleanup_watch(watch_id).await;
        if self.stop_notify_suppresses(watcher).await {
            return;
        }
        let _ = self
            .delivery
            .queue_message(
                watcher,
                None,
                None,
                "target is idle".to_string(),
                DeliveryMode::Sequential,
                None,
                None,
                false,
                false,
            )
            .await;
    }

    async fn finish_watch_timeout(&self, watch_id: Uuid, watcher: SessionId, target: SessionId) {
        self.cleanup_watch(watch_id).await;
        let target_name = self.registry.get(target).await.map(|s| s.name).unwrap_or_else(|| target.to_string());
        let _ = self
            .delivery
            .queue_message(
                watcher,
                None,
                None,
                format!("Timeout: {target_name} still active"),
                DeliveryMode::Sequential,
                None,
                None,
                false,
                false,
            )
            .await;
    }

    async fn finish_watch(&self, watch_id: Uuid, watcher: SessionId, reason: &str) {
        self.cleanup_watch(watch_id).await;
        let _ = self
            .delivery
            .queue_message(
                watcher,
                None,
                None,
                reason.to_string(),
                DeliveryMode::Sequential,
                None,
                None,
                false,
                false,
            )
            .await;
    }

    async fn cleanup_watch(&self, watch_id: Uuid) {
        self.watch_jobs.write().await.remove(&watch_id);
        let _ = self.store.delete_watch(watch_id).await;
    }

    async fn stop_notify_suppresses(&self, watcher: SessionId) -> bool {
        self.delivery
            .last_stop_notify_fired_at(watcher)
            .await
            .map(|t| (Utc::now() - t).num_seconds() < STOP_NOTIFY_SUPPRESSION_SECONDS)
            .unwrap_or(false)
    }

    // -- scheduled (one-shot) reminders -----------------------------------

    /// `POST /scheduler/remind` (`spec.md` §6): an agent asks to be
    /// reminded of `text` after `delay_seconds`. Persisted so a restart
    /// mid-delay still fires it (see [`Self::resume_scheduled_reminders`]).
    pub async fn schedule_reminder(
        self: &Arc<Self>,
        session_id: SessionId,
        delay_seconds: u64,
        text: String,
    ) -> SmResult<Uuid> {
        let now = Utc::now();
        let reminder = ScheduledReminder {
            id: Uuid::new_v4(),
            session_id,
            fire_at: now + chrono::Duration::seconds(delay_seconds as i64),
            text,
            created_at: now,
        };
        self.store.insert_scheduled_reminder(&reminder).await.map_err(store_err)?;
        self.spawn_scheduled_reminder_job(reminder).await;
        Ok(reminder.id)
    }

    async fn spawn_scheduled_reminder_job(self: &Arc<Self>, reminder: ScheduledReminder) {
        let token = CancellationToken::new();
        self.scheduled_reminder_jobs.write().await.insert(reminder.id, token.clone());
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.run_scheduled_reminder(reminder, token).await;
        });
    }

    async fn run_scheduled_reminder(self: Arc<Self>, reminder: ScheduledReminder, shutdown: CancellationToken) {
        let now = Utc::now();
        let delay = (reminder.fire_at - now).num_milliseconds().max(0) as u64;
        tokio::select! {
            _ = shutdown.cancelled() => {
                self.scheduled_reminder_jobs.write().await.remove(&reminder.id);
                return;
            }
            _ = tokio::time::sleep(Duration::from_millis(delay)) => {}
        }

        let _ = self
            .delivery
            .queue_message(
                reminder.session_id,
                None,
                None,
                reminder.text.clone(),
                DeliveryMode::Sequential,
                None,
                None,
                false,
                false,
            )
            .await;
        let _ = self.store.cancel_scheduled_reminder(reminder.id).await;
        self.scheduled_reminder_jobs.write().await.remove(&reminder.id);
    }

    /// Re-arm every not-yet-fired scheduled reminder after a restart.
    /// Called once from [`crate::Engine::resume_all`].
    pub async fn resume_scheduled_reminders(self: &Arc<Self>) {
        if let Ok(reminders) = self.store.all_scheduled_reminders().await {
            for reminder in reminders {
                self.spawn_scheduled_reminder_job(reminder).await;
            }
        }
    }

    // -- context-usage alerts (event-driven, not a poll loop) ------------

    /// Fed by the `context-usage` hook (`spec.md` §4.6 "Context-usage
    /// alerts"). Two one-shot thresholds; the alert text is phrased from
    /// the notified party's viewpoint.
    pub async fn handle_context_usage(&self, session_id: SessionId, percentage: f64) -> SmResult<()> {
        let Some(session) = self.registry.get(session_id).await else { return Ok(()) };
        if !session.context_monitor_enabled {
            return Ok(());
        }
        let target = session.context_monitor_notify_target.unwrap_or(session_id);
        let self_directed = session.context_monitor_notify_target.is_none()
            || session.context_monitor_notify_target == Some(session_id);
        let name = session.friendly_name.clone().unwrap_or_else(|| session.name.clone());

        if percentage >= self.config.context_critical_percentage && !session.context_critical_sent {
            self.registry.mark_context_alert_sent(session_id, false, true).await?;
            let text = self.phrase_context_alert(&name, percentage, self_directed, true);
            self.notifier
                .notify(NotificationEvent { session_id, kind: NotificationKind::ContextUsage, text: text.clone() })
                .await;
            let _ = self
                .delivery
                .queue_message(target, None, None, text, DeliveryMode::Important, None, None, false, false)
                .await;
        } else if percentage >= self.config.context_warning_percentage && !session.context_warning_sent {
            self.registry.mark_context_alert_sent(session_id, true, false).await?;
            let text = self.phrase_context_alert(&name, percentage, self_directed, false);
            self.notifier
                .notify(NotificationEvent { session_id, kind: NotificationKind::ContextUsage, text: text.clone() })
                .await;
            let _ = self
                .delivery
                .queue_message(target, None, None, text, DeliveryMode::Sequential, None, None, false, false)
                .await;
        }
        Ok(())
    }

    fn phrase_context_alert(&self, name: &str, percentage: f64, self_directed: bool, critical: bool) -> String {
        let severity = if critical { "critical" } else { "warning" };
        if self_directed {
            format!(
                "\u{26a0}\u{fe0f} context usage {percentage:.0}% ({severity}) — consider writing a handoff doc and rotating context"
            )
        } else {
            format!("\u{26a0}\u{fe0f} Child {name} context usage {percentage:.0}% ({severity})")
        }
    }

    /// `compaction` sets the remind-suppression flag and, in the same
    /// step, resets both one-shot context-alert flags — the agent's own
    /// compaction is what frees up context, so the next status line can
    /// re-fire a threshold immediately. `compaction_complete` only clears
    /// the suppression flag again; it does not touch the alert flags.
    pub async fn handle_compaction_event(&self, session_id: SessionId, event: &str) -> SmResult<()> {
        match event {
            "compaction" => self.registry.set_compacting(session_id, true).await,
            "compaction_complete" => self.registry.set_compacting(session_id, false).await,
            _ => Ok(()),
        }
    }

    // -- lifecycle --------------------------------------------------------

    /// Re-arm whatever timer jobs a session already has registered.
    /// Called once per session at startup, after `Registry::load`.
    pub async fn resume_session(self: &Arc<Self>, session_id: SessionId) {
        if self.store.get_remind(session_id).await.ok().flatten().is_some() {
            self.spawn_remind_job(session_id).await;
        }
        if let Ok(wakes) = self.store.all_parent_wakes().await {
            if wakes.iter().any(|w| w.child_session_id == session_id) {
                self.spawn_parent_wake_job(session_id).await;
            }
        }
    }

    pub async fn cancel_all(&self, session_id: SessionId) {
        let _ = self.cancel_remind(session_id).await;
        let _ = self.cancel_parent_wake(session_id).await;
    }

    pub async fn shutdown(&self) {
        for (_, token) in self.remind_jobs.write().await.drain() {
            token.cancel();
        }
        for (_, token) in self.parent_wake_jobs.write().await.drain() {
            token.cancel();
        }
        for (_, token) in self.watch_jobs.write().await.drain() {
            token.cancel();
        }
        for (_, token) in self.scheduled_reminder_jobs.write().await.drain() {
            token.cancel();
        }
    }

    async fn spawn_remind_job(self: &Arc<Self>, session_id: SessionId) {
        {
            let jobs = self.remind_jobs.read().await;
            if jobs.contains_key(&session_id) {
                return;
            }
        }
        let token = CancellationToken::new();
        self.remind_jobs.write().await.insert(session_id, token.clone());
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.run_remind_loop(session_id, token).await;
        });
    }

    async fn run_remind_loop(self: Arc<Self>, session_id: SessionId, shutdown: CancellationToken) {
        let mut last_baseline = None;
        let mut soft_fired = false;
        let mut hard_fired = false;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(TIMER_POLL_INTERVAL) => {}
            }

            let Some(reg) = self.store.get_remind(session_id).await.ok().flatten() else { break };
            let Some(session) = self.registry.get(session_id).await else { break };
            if session.context_compacting {
                continue;
            }

            let baseline = [Some(reg.registered_at), session.agent_status_at, Some(session.last_activity), session.completed_at]
                .into_iter()
                .flatten()
                .max()
                .unwrap_or(reg.registered_at);
            if last_baseline != Some(baseline) {
                last_baseline = Some(baseline);
                soft_fired = false;
                hard_fired = false;
            }

            let elapsed = (Utc::now() - baseline).num_seconds().max(0) as u64;
            if elapsed >= reg.hard_threshold_seconds && !hard_fired {
                hard_fired = true;
                let _ = self
                    .delivery
                    .queue_message(
                        session_id,
                        None,
                        None,
                        "\u{23f0} status update requested (urgent — no update in a while)".to_string(),
                        DeliveryMode::Urgent,
                        None,
                        None,
                        false,
                        false,
                    )
                    .await;
            } else if elapsed >= reg.soft_threshold_seconds && !soft_fired {
                soft_fired = true;
                let _ = self
                    .delivery
                    .queue_message(
                        session_id,
                        None,
                        None,
                        "status update requested".to_string(),
                        DeliveryMode::Sequential,
                        None,
                        None,
                        false,
                        false,
                    )
                    .await;
            }
        }
        self.remind_jobs.write().await.remove(&session_id);
    }

    async fn spawn_parent_wake_job(self: &Arc<Self>, child_session_id: SessionId) {
        {
            let jobs = self.parent_wake_jobs.read().await;
            if jobs.contains_key(&child_session_id) {
                return;
            }
        }
        let token = CancellationToken::new();
        self.parent_wake_jobs.write().await.insert(child_session_id, token.clone());
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.run_parent_wake_loop(child_session_id, token).await;
        });
    }

    async fn run_parent_wake_loop(self: Arc<Self>, child_session_id: SessionId, shutdown: CancellationToken) {
        loop {
            let Some(reg) = self
                .store
                .all_parent_wakes()
                .await
                .ok()
                .and_then(|v| v.into_iter().find(|r| r.child_session_id == child_session_id))
            else {
                break;
            };

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(Duration::from_secs(reg.period_seconds)) => {}
            }

            let Some(child) = self.registry.get(child_session_id).await else { break };
            if child.status == SessionStatus::Stopped || child.completion_status.is_some() {
                break;
            }

            let name = child.friendly_name.clone().unwrap_or(child.name.clone());
            let _ = self
                .delivery
                .queue_message(
                    reg.parent_session_id,
                    Some(child_session_id),
                    Some(name.clone()),
                    format!("\u{1f493} {name} heartbeat"),
                    DeliveryMode::Sequential,
                    None,
                    None,
                    false,
                    false,
                )
                .await;
        }
        self.parent_wake_jobs.write().await.remove(&child_session_id);
    }
}

fn store_err(e: sm_store::StoreError) -> sm_core::SmError {
    sm_core::SmError::ExternalIo(e.to_string())
}
