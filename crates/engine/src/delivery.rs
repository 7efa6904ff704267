// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! C5: the message queue and delivery engine — "the core of the core"
//! (`spec.md` §4.5). Owns the per-session `SessionDeliveryState`, the
//! per-session delivery mutex, and every C1 touch that isn't a direct
//! window create/kill.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;

use chrono::Utc;
use sm_core::delivery_state::SessionDeliveryState;
use sm_core::id::SessionId;
use sm_core::message::{DeliveryMode, QueuedMessage};
use sm_core::session::{Provider, SessionStatus};
use sm_core::{SmError, SmResult};
use sm_store::Store;
use sm_terminal::Terminal;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::notifier::{NotificationEvent, NotificationKind, Notifier};
use crate::registry::Registry;

pub struct DeliveryEngine {
    store: Arc<Store>,
    registry: Arc<Registry>,
    terminal: Arc<dyn Terminal>,
    notifier: Arc<dyn Notifier>,
    config: EngineConfig,
    state: RwLock<HashMap<SessionId, SessionDeliveryState>>,
    mutexes: RwLock<HashMap<SessionId, Arc<Mutex<()>>>>,
    /// Set once, right after construction, so methods that take `&self` can
    /// still spawn a detached `'static` follow-up job (§4.5.1 step 4) without
    /// every caller having to thread an `Arc<Self>` through. See
    /// [`Self::new`].
    weak_self: OnceLock<Weak<DeliveryEngine>>,
}

impl DeliveryEngine {
    pub fn new(
        store: Arc<Store>,
        registry: Arc<Registry>,
        terminal: Arc<dyn Terminal>,
        notifier: Arc<dyn Notifier>,
        config: EngineConfig,
    ) -> Arc<Self> {
        let engine = Arc::new(Self {
            store,
            registry,
            terminal,
            notifier,
            config,
            state: RwLock::new(HashMap::new()),
            mutexes: RwLock::new(HashMap::new()),
            weak_self: OnceLock::new(),
        });
        let _ = engine.weak_self.set(Arc::downgrade(&engine));
        engine
    }

    /// §4.5.2: at most one outstanding delivery-in-flight token per session.
    async fn mutex_for(&self, id: SessionId) -> Arc<Mutex<()>> {
        if let Some(m) = self.mutexes.read().await.get(&id) {
            return Arc::clone(m);
        }
        let mut mutexes = self.mutexes.write().await;
        Arc::clone(mutexes.entry(id).or_insert_with(|| Arc::new(Mutex::new(()))))
    }

    pub async fn is_idle(&self, id: SessionId) -> bool {
        self.state.read().await.get(&id).map(|s| s.is_idle).unwrap_or(false)
    }

    pub async fn has_pending_paste_buffer(&self, id: SessionId) -> bool {
        self.state
            .read()
            .await
            .get(&id)
            .map(|s| s.paste_buffered_notify_sender_id.is_some())
            .unwrap_or(false)
    }

    pub async fn last_stop_notify_fired_at(&self, id: SessionId) -> Option<chrono::DateTime<Utc>> {
        self.state.read().await.get(&id).and_then(|s| s.last_stop_notify_fired_at)
    }

    pub async fn saved_user_input(&self, id: SessionId) -> Option<String> {
        self.state.read().await.get(&id).and_then(|s| s.saved_user_input.clone())
    }

    /// Arms a `notify_on_stop` slot directly, for the standalone
    /// `/sessions/{id}/notify-on-stop` endpoint (`spec.md` §6), which grants
    /// the slot without also delivering a message. Single-slot-overwrites
    /// semantics, same as the implicit arming in [`Self::on_delivered`].
    pub async fn arm_notify_on_stop(&self, target: SessionId, sender_id: SessionId, sender_name: Option<String>) {
        let idle_now = self.is_idle(target).await;
        self.mutate_state(target, |state| {
            if idle_now {
                state.stop_notify_sender_id = Some(sender_id);
                state.stop_notify_sender_name = sender_name;
            } else {
                state.paste_buffered_notify_sender_id = Some(sender_id);
                state.paste_buffered_notify_sender_name = sender_name;
            }
        })
        .await;
    }

    async fn mutate_state(&self, id: SessionId, f: impl FnOnce(&mut SessionDeliveryState)) {
        let mut state = self.state.write().await;
        f(state.entry(id).or_default());
    }

    /// §4.5.1: persist, reset a stale codex idle status, schedule delivery.
    pub async fn queue_message(
        &self,
        target: SessionId,
        sender: Option<SessionId>,
        sender_name: Option<String>,
        text: String,
        mode: DeliveryMode,
        timeout_seconds: Option<u64>,
        notify_after_seconds: Option<u64>,
        notify_on_delivery: bool,
        notify_on_stop: bool,
    ) -> SmResult<QueuedMessage> {
        let session = self.registry.get(target).await.ok_or_else(|| SmError::NotFound(target.to_string()))?;

        // "not marked paused" — no pause concept exists elsewhere in this
        // system; a codex session with a stale idle status is always
        // un-paused here, so always reset.
        if session.provider == Provider::Codex && session.status == SessionStatus::Idle {
            self.registry.update_status(target, SessionStatus::Running).await?;
        }

        let msg = QueuedMessage::new(
            target,
            sender,
            sender_name,
            text,
            mode,
            timeout_seconds,
            notify_after_seconds,
            notify_on_delivery,
            notify_on_stop,
        );
        self.store.insert_message(&msg).await.map_err(|e| SmError::ExternalIo(e.to_string()))?;

        match mode {
            DeliveryMode::Sequential => {
                self.try_deliver(target, false).await?;
            }
            DeliveryMode::Important => {
                self.try_deliver(target, true).await?;
            }
            DeliveryMode::Urgent => {
                self.deliver_urgent(target, &msg).await?;
            }
            DeliveryMode::Steer => {
                self.deliver_steer(target, &msg).await?;
            }
        }

        if let (Some(seconds), Some(sender)) = (msg.notify_after_seconds, msg.sender) {
            self.spawn_notify_after(msg.id, seconds, sender, target);
        }

        Ok(msg)
    }

    /// §4.5.1 step 4: "unconditionally, regardless of the recipient's later
    /// state" — this job does not check `is_idle`, `delivered_at`, or
    /// anything else about `target` before firing back at `sender`.
    fn spawn_notify_after(&self, msg_id: Uuid, seconds: u64, sender: SessionId, target: SessionId) {
        let Some(this) = self.weak_self.get().and_then(Weak::upgrade) else { return };
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(seconds)).await;
            let name = this.registry.get(target).await.map(|s| s.friendly_name.unwrap_or(s.name)).unwrap_or_else(|| target.to_string());
            let _ = this
                .queue_message(
                    sender,
                    None,
                    None,
                    format!("\u{23f0} {name} has not responded to message {msg_id}"),
                    DeliveryMode::Sequential,
                    None,
                    None,
                    false,
                    false,
                )
                .await;
        });
    }

    /// §4.5.3.
    pub async fn try_deliver(&self, target: SessionId, important_only: bool) -> SmResult<()> {
        let mutex = self.mutex_for(target).await;
        let _guard = mutex.lock().await;

        let session = match self.registry.get(target).await {
            Some(s) => s,
            None => return Ok(()),
        };
        if !session.provider.is_tmux_hosted() {
            return Ok(());
        }
        let window = session.window_name.clone();

        let now = Utc::now();
        let mut pending = self
            .store
            .pending_messages(target, now)
            .await
            .map_err(|e| SmError::ExternalIo(e.to_string()))?;
        if important_only {
            pending.retain(|m| matches!(m.mode, DeliveryMode::Important | DeliveryMode::Urgent));
        }
        pending.truncate(self.config.max_batch_size);
        if pending.is_empty() {
            return Ok(());
        }

        let saved_input = self
            .terminal
            .capture_pane(&window, 1)
            .await
            .ok()
            .map(|p| p.lines().last().unwrap_or("").to_string());

        for msg in &pending {
            let sent = self
                .terminal
                .send_text_then_enter(&window, &msg.text, self.config.settle_delay)
                .await;
            match sent {
                Ok(()) => {
                    self.store
                        .mark_delivered(msg.id, Utc::now())
                        .await
                        .map_err(|e| SmError::ExternalIo(e.to_string()))?;
                    self.on_delivered(msg).await;
                }
                Err(e) => {
                    tracing::warn!(session = %target, error = %e, "delivery failed, leaving message queued");
                    break;
                }
            }
        }

        if let Some(text) = saved_input {
            if !text.trim().is_empty() {
                let _ = self.terminal.send_text_then_enter(&window, &text, Duration::from_millis(0)).await;
            }
        }

        Ok(())
    }

    /// §4.5.4.
    pub async fn deliver_urgent(&self, target: SessionId, msg: &QueuedMessage) -> SmResult<()> {
        let mutex = self.mutex_for(target).await;
        let _guard = mutex.lock().await;

        let session = self.registry.get(target).await.ok_or_else(|| SmError::NotFound(target.to_string()))?;
        if !session.provider.is_tmux_hosted() {
            return Err(SmError::Validation(format!("session {target} has no terminal window")));
        }
        let window = session.window_name.clone();

        if session.completion_status.is_some() {
            let _ = self.terminal.send_key(&window, "Enter").await;
        }

        let _ = self.terminal.send_key(&window, "Escape").await;
        let _ = sm_terminal::poll_prompt_ready(self.terminal.as_ref(), &window, self.config.ready_poll_timeout).await;

        match self.terminal.send_text_then_enter(&window, &msg.text, self.config.settle_delay).await {
            Ok(()) => {
                self.store.mark_delivered(msg.id, Utc::now()).await.map_err(|e| SmError::ExternalIo(e.to_string()))?;
                self.on_delivered(msg).await;
                Ok(())
            }
            Err(e) => {
                tracing::warn!(session = %target, error = %e, "urgent delivery failed");
                Err(SmError::ExternalIo(e.to_string()))
            }
        }
    }

    /// Like [`Self::deliver_urgent`] but without the initial Escape — the
    /// resolution this crate settled on for the `steer` open question
    /// (`spec.md` §9).
    pub async fn deliver_steer(&self, target: SessionId, msg: &QueuedMessage) -> SmResult<()> {
        let mutex = self.mutex_for(target).await;
        let _guard = mutex.lock().await;

        let session = self.registry.get(target).await.ok_or_else(|| SmError::NotFound(target.to_string()))?;
        if !session.provider.is_tmux_hosted() {
            return Err(SmError::Validation(format!("session {target} has no terminal window")));
        }
        let window = session.window_name.clone();

        let _ = sm_terminal::poll_prompt_ready(self.terminal.as_ref(), &window, self.config.ready_poll_timeout).await;

        match self.terminal.send_text_then_enter(&window, &msg.text, self.config.settle_delay).await {
            Ok(()) => {
                self.store.mark_delivered(msg.id, Utc::now()).await.map_err(|e| SmError::ExternalIo(e.to_string()))?;
                self.on_delivered(msg).await;
                Ok(())
            }
            Err(e) => {
                tracing::warn!(session = %target, error = %e, "steer delivery failed");
                Err(SmError::ExternalIo(e.to_string()))
            }
        }
    }

    /// §4.5.3 step c / §4.5.6: bookkeeping after a successful send.
    async fn on_delivered(&self, msg: &QueuedMessage) {
        if msg.notify_on_delivery {
            self.notifier
                .notify(NotificationEvent {
                    session_id: msg.sender.unwrap_or(msg.target),
                    kind: NotificationKind::Completion,
                    text: format!("delivered to {}: {}", msg.target, truncate(&msg.text, 80)),
                })
                .await;
        }

        if msg.notify_on_stop {
            let idle_now = self.is_idle(msg.target).await;
            self.mutate_state(msg.target, |state| {
                if idle_now {
                    state.stop_notify_sender_id = msg.sender;
                    state.stop_notify_sender_name = msg.sender_name.clone();
                } else {
                    state.paste_buffered_notify_sender_id = msg.sender;
                    state.paste_buffered_notify_sender_name = msg.sender_name.clone();
                }
            })
            .await;
        }
    }

    /// §4.5.5: the Stop-hook contract. The single entry point every
    /// `Stop` lifecycle hook callback funnels through.
    pub async fn mark_session_idle(&self, session_id: SessionId) -> SmResult<()> {
        let now = Utc::now();

        let fence_absorbed = {
            let mut state = self.state.write().await;
            let s = state.entry(session_id).or_default();
            s.consume_skip_fence(now, self.config.skip_fence_window_seconds)
        };
        if fence_absorbed {
            return Ok(());
        }

        // §4.5.7 step 2: a pending handoff takes over this Stop entirely.
        let pending_handoff = self.state.read().await.get(&session_id).and_then(|s| s.pending_handoff_path.clone());
        if let Some(path) = pending_handoff {
            self.mutate_state(session_id, |s| s.pending_handoff_path = None).await;
            self.run_handoff(session_id, path).await;
            return Ok(());
        }

        self.mutate_state(session_id, |s| {
            s.is_idle = true;
            s.last_idle_at = Some(now);
        })
        .await;
        self.registry.update_status(session_id, SessionStatus::Idle).await?;

        self.run_stop_notify_chain(session_id, now).await;

        self.try_deliver(session_id, false).await?;
        Ok(())
    }

    /// §4.5.6.
    async fn run_stop_notify_chain(&self, session_id: SessionId, now: chrono::DateTime<Utc>) {
        let fire = {
            let mut state = self.state.write().await;
            let s = state.entry(session_id).or_default();
            if s.paste_buffered_notify_sender_id.is_some() && s.stop_notify_sender_id.is_none() {
                s.stop_notify_sender_id = s.paste_buffered_notify_sender_id.take();
                s.stop_notify_sender_name = s.paste_buffered_notify_sender_name.take();
                None
            } else if let Some(sender) = s.stop_notify_sender_id.take() {
                let name = s.stop_notify_sender_name.take();
                s.last_stop_notify_fired_at = Some(now);
                Some((sender, name))
            } else {
                None
            }
        };

        if let Some((sender, name)) = fire {
            let target_name = name.unwrap_or_else(|| session_id.to_string());
            let _ = self
                .queue_message(
                    sender,
                    None,
                    None,
                    format!("\u{1f6d1} {target_name} has stopped"),
                    DeliveryMode::Sequential,
                    None,
                    None,
                    false,
                    false,
                )
                .await;
        }
    }

    /// §4.5.7: self-directed context rotation.
    pub async fn schedule_handoff(&self, session_id: SessionId, requester_id: SessionId, file_path: String) -> SmResult<()> {
        if requester_id != session_id {
            return Err(SmError::Unauthorized("handoff may only be requested by the session itself".into()));
        }
        let session = self.registry.get(session_id).await.ok_or_else(|| SmError::NotFound(session_id.to_string()))?;
        if session.provider == Provider::CodexApp {
            return Err(SmError::Validation("handoff is not supported for codex-app sessions".into()));
        }
        if !tokio::fs::try_exists(&file_path).await.unwrap_or(false) {
            return Err(SmError::Validation(format!("handoff file does not exist: {file_path}")));
        }
        self.mutate_state(session_id, |s| s.pending_handoff_path = Some(file_path)).await;
        Ok(())
    }

    /// Steps 3-6 of §4.5.7, run once the deferred Stop arrives.
    async fn run_handoff(&self, session_id: SessionId, file_path: String) {
        let now = Utc::now();
        self.mutate_state(session_id, |s| s.arm_skip_fence(now)).await;

        let result = self.run_handoff_steps(session_id, &file_path).await;
        if let Err(e) = result {
            tracing::warn!(session = %session_id, error = %e, "handoff failed, restoring idle state");
            self.mutate_state(session_id, |s| {
                s.is_idle = true;
                s.last_idle_at = Some(now);
                s.stop_notify_skip_count = 0;
                s.skip_count_armed_at = None;
            })
            .await;
            let _ = self.registry.update_status(session_id, SessionStatus::Idle).await;
            let _ = self.try_deliver(session_id, false).await;
        }
    }

    async fn run_handoff_steps(&self, session_id: SessionId, file_path: &str) -> SmResult<()> {
        let mutex = self.mutex_for(session_id).await;
        let _guard = mutex.lock().await;

        let session = self.registry.get(session_id).await.ok_or_else(|| SmError::NotFound(session_id.to_string()))?;
        let window = session.window_name.clone();

        self.terminal.send_key(&window, "Escape").await.map_err(|e| SmError::ExternalIo(e.to_string()))?;
        let _ = sm_terminal::poll_prompt_ready(self.terminal.as_ref(), &window, self.config.ready_poll_timeout).await;

        self.terminal
            .send_text_then_enter(&window, "/clear", self.config.settle_delay)
            .await
            .map_err(|e| SmError::ExternalIo(e.to_string()))?;
        let _ = sm_terminal::poll_prompt_ready(self.terminal.as_ref(), &window, self.config.ready_poll_timeout).await;

        let content = tokio::fs::read_to_string(file_path).await.map_err(|e| SmError::ExternalIo(e.to_string()))?;
        self.terminal
            .send_text_then_enter(&window, &content, self.config.settle_delay)
            .await
            .map_err(|e| SmError::ExternalIo(e.to_string()))?;

        self.registry.set_pending_handoff(session_id, Some(file_path.to_string())).await?;
        Ok(())
    }

    /// Watch-for-idle Phase 1 helper: whether the target has any pending
    /// messages, used by the timer service's polling loop (§4.6).
    pub async fn has_pending_messages(&self, target: SessionId) -> bool {
        self.store
            .pending_messages(target, Utc::now())
            .await
            .map(|v| !v.is_empty())
            .unwrap_or(false)
    }

    pub fn terminal(&self) -> &Arc<dyn Terminal> {
        &self.terminal
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.notifier
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(max).collect();
        out.push('\u{2026}');
        out
    }
}

/// The entry point for `watch(...)` is `sm-engine`'s `TimerService`, which
/// owns the background polling task; this type only needs to expose the
/// bits above that the watch loop reads. `Uuid` re-exported for callers
/// building a `WatchRegistration`.
pub type WatchId = Uuid;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::LoggingNotifier;
    use crate::registry::Registry;
    use sm_terminal::recording::RecordingTerminal;

    async fn harness() -> (Arc<DeliveryEngine>, Arc<Registry>, Arc<RecordingTerminal>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open_in_memory().unwrap());
        let registry = Arc::new(Registry::new_empty(Arc::clone(&store)));
        let terminal = Arc::new(RecordingTerminal::new());
        let notifier = Arc::new(LoggingNotifier);
        let engine = DeliveryEngine::new(
            Arc::clone(&store),
            Arc::clone(&registry),
            terminal.clone() as Arc<dyn Terminal>,
            notifier,
            EngineConfig::default(),
        );
        (engine, registry, terminal, dir)
    }

    async fn seeded_session(registry: &Registry, dir: &std::path::Path) -> SessionId {
        let session = Registry::new_session("/tmp".into(), Provider::Claude, None, None, dir);
        let id = session.id;
        registry.insert(session, &dir.join("sessions.json")).await.unwrap();
        id
    }

    #[tokio::test]
    async fn sequential_message_delivers_without_idle_gate() {
        let (engine, registry, terminal, dir) = harness().await;
        let target = seeded_session(&registry, dir.path()).await;
        let window = registry.get(target).await.unwrap().window_name;
        terminal.set_pane(&window, "> ");

        engine
            .queue_message(target, None, None, "hello".into(), DeliveryMode::Sequential, None, None, false, false)
            .await
            .unwrap();

        let calls = terminal.calls();
        assert!(calls.iter().any(|c| matches!(c, sm_terminal::recording::Call::SendTextThenEnter { text, .. } if text == "hello")));
    }

    #[tokio::test]
    async fn urgent_path_sends_escape_before_text() {
        let (engine, registry, terminal, dir) = harness().await;
        let target = seeded_session(&registry, dir.path()).await;
        let window = registry.get(target).await.unwrap().window_name;
        terminal.set_pane(&window, "> ");

        let msg = engine
            .queue_message(target, None, None, "urgent!".into(), DeliveryMode::Urgent, None, None, false, false)
            .await
            .unwrap();
        assert!(msg.delivered_at.is_some());

        let calls = terminal.calls();
        let escape_idx = calls.iter().position(|c| matches!(c, sm_terminal::recording::Call::SendKey { key, .. } if key == "Escape")).unwrap();
        let text_idx = calls
            .iter()
            .position(|c| matches!(c, sm_terminal::recording::Call::SendTextThenEnter { text, .. } if text == "urgent!"))
            .unwrap();
        assert!(escape_idx < text_idx);
    }

    #[tokio::test]
    async fn skip_fence_absorbs_handoff_clear_stop() {
        let (engine, registry, _terminal, dir) = harness().await;
        let target = seeded_session(&registry, dir.path()).await;

        engine.mutate_state(target, |s| s.arm_skip_fence(Utc::now())).await;
        engine.mark_session_idle(target).await.unwrap();
        // Fence absorbed this Stop; is_idle must still be false.
        assert!(!engine.is_idle(target).await);
    }

    #[tokio::test]
    async fn stop_notify_chain_fires_on_second_stop_only() {
        let (engine, registry, terminal, dir) = harness().await;
        let target = seeded_session(&registry, dir.path()).await;
        let sender = seeded_session(&registry, dir.path()).await;
        let window = registry.get(target).await.unwrap().window_name;
        terminal.set_pane(&window, "> ");

        // Delivered mid-turn (not idle yet): goes to paste-buffered.
        engine
            .queue_message(target, Some(sender), Some("sender".into()), "hi".into(), DeliveryMode::Sequential, None, None, false, true)
            .await
            .unwrap();
        assert!(engine.has_pending_paste_buffer(target).await);

        // First Stop: promote paste-buffered -> stop-notify, don't fire.
        engine.mark_session_idle(target).await.unwrap();
        assert!(!engine.has_pending_paste_buffer(target).await);

        // Second Stop: fires the notification as a queued message to sender.
        engine.mark_session_idle(target).await.unwrap();
        let pending = engine.store().pending_messages(sender, Utc::now()).await.unwrap();
        assert!(pending.iter().any(|m| m.text.contains("has stopped")));
    }

    #[tokio::test]
    async fn notify_after_seconds_fires_unconditionally_to_sender() {
        let (engine, registry, terminal, dir) = harness().await;
        let target = seeded_session(&registry, dir.path()).await;
        let sender = seeded_session(&registry, dir.path()).await;
        let window = registry.get(target).await.unwrap().window_name;
        terminal.set_pane(&window, "> ");

        // Delivered right away — the follow-up must still fire later,
        // "regardless of the recipient's later state" (`spec.md` §4.5.1).
        engine
            .queue_message(target, Some(sender), Some("sender".into()), "hi".into(), DeliveryMode::Sequential, None, Some(0), false, false)
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        let pending = engine.store().pending_messages(sender, Utc::now()).await.unwrap();
        assert!(pending.iter().any(|m| m.text.contains("has not responded")));
    }
}
