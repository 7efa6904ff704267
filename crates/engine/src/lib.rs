// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! C3–C6: the session registry, output monitor, delivery engine, and timer
//! service, wired together behind one top-level value.
//!
//! `spec.md` §9 "Global mutable state": the registry and delivery-state map
//! are process-wide but only ever touched through this value — there is no
//! ambient static anywhere in the crate.

pub mod config;
pub mod delivery;
pub mod monitor;
pub mod notifier;
pub mod patterns;
pub mod registry;
pub mod timers;

use std::path::Path;
use std::sync::Arc;

use sm_core::id::SessionId;
use sm_core::SmResult;
use sm_store::Store;
use sm_terminal::Terminal;

use crate::config::EngineConfig;
use crate::delivery::DeliveryEngine;
use crate::monitor::MonitorSupervisor;
use crate::notifier::Notifier;
use crate::registry::Registry;
use crate::timers::TimerService;

/// Owns the scheduler's state: the session registry, the delivery engine,
/// the per-session output monitors, and the timer service. Constructed once
/// at `sm-daemon` startup.
pub struct Engine {
    pub registry: Arc<Registry>,
    pub delivery: Arc<DeliveryEngine>,
    pub monitor: Arc<MonitorSupervisor>,
    pub timers: Arc<TimerService>,
}

impl Engine {
    pub async fn new(
        store: Arc<Store>,
        terminal: Arc<dyn Terminal>,
        notifier: Arc<dyn Notifier>,
        config: EngineConfig,
        snapshot_path: &Path,
    ) -> SmResult<Self> {
        let registry = Arc::new(Registry::load(store.clone(), snapshot_path).await?);
        let delivery = DeliveryEngine::new(
            store.clone(),
            registry.clone(),
            terminal.clone(),
            notifier.clone(),
            config.clone(),
        );
        let monitor = Arc::new(MonitorSupervisor::new(
            registry.clone(),
            delivery.clone(),
            terminal.clone(),
            notifier.clone(),
            config.clone(),
        ));
        let timers = Arc::new(TimerService::new(
            store.clone(),
            registry.clone(),
            delivery.clone(),
            terminal.clone(),
            notifier.clone(),
            config.clone(),
        ));
        Ok(Self { registry, delivery, monitor, timers })
    }

    /// Start every cooperative job this session needs: its output monitor
    /// and, if it has one, its remind/parent-wake registrations. Called
    /// once after a session is inserted into the registry.
    pub async fn start_session_jobs(&self, id: SessionId) {
        self.monitor.spawn(id).await;
        self.timers.resume_session(id).await;
    }

    /// Tear down every cooperative job for a session, typically right
    /// before it is removed from the registry.
    pub async fn stop_session_jobs(&self, id: SessionId) {
        self.monitor.cancel(id).await;
        self.timers.cancel_all(id).await;
    }

    /// Re-arm jobs for every session already in the registry — called once
    /// at startup after `Registry::load` to resume monitoring/timers that
    /// existed before a restart.
    pub async fn resume_all(&self) {
        for session in self.registry.list(true).await {
            self.start_session_jobs(session.id).await;
        }
        self.timers.resume_scheduled_reminders().await;
    }

    /// Cancel every outstanding cooperative job. Called on graceful
    /// shutdown (`spec.md` §9 "Cooperative-task lifetimes").
    pub async fn shutdown(&self) {
        self.monitor.shutdown().await;
        self.timers.shutdown().await;
    }
}
