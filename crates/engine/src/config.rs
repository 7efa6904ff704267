// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tunables for C3–C6, collected in one place so `sm-daemon`'s
//! `clap::Parser` config can thread them through without every component
//! re-deriving its own constant set.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Output monitor poll interval (`spec.md` §4.4).
    pub monitor_poll_interval: Duration,
    /// Seconds of no pane growth before a session is considered idle.
    pub idle_threshold_seconds: u64,
    /// Every Nth tick, probe whether the window still exists.
    pub window_liveness_check_every_ticks: u32,
    /// Suppress idle notifications for this long after a Stop-driven
    /// response notification (`output_monitor.py` `_idle_cooldown`).
    pub idle_notification_cooldown_seconds: i64,
    /// Crash-recovery debounce after a successful attempt.
    pub crash_recovery_success_cooldown_seconds: i64,
    /// Crash-recovery debounce after a failed attempt.
    pub crash_recovery_failure_cooldown_seconds: i64,

    /// Bound on messages drained per `try_deliver` batch.
    pub max_batch_size: usize,
    /// Settle delay between text and Enter (`spec.md` §4.1).
    pub settle_delay: Duration,
    /// Timeout for the urgent path's prompt-readiness poll (§4.5.4).
    pub ready_poll_timeout: Duration,
    /// Interval between prompt-readiness polls.
    pub ready_poll_interval: Duration,
    /// How many lines of pane history to capture for readiness/idle probes.
    pub capture_lines: u32,

    /// Skip-fence TTL: how long an armed fence stays live (§4.5.5).
    pub skip_fence_window_seconds: i64,
    /// Suppression window after a stop-notify firing, shared by the
    /// watch-for-idle redundant-ping guard (§4.5.6 / §4.6).
    pub stop_notify_suppression_seconds: i64,

    /// Watch-for-idle poll interval (§4.6).
    pub watch_poll_interval: Duration,

    /// Default thresholds an EM's auto-registered remind carries
    /// (scenario 6, §8).
    pub default_remind_soft_seconds: u64,
    pub default_remind_hard_seconds: u64,

    /// Context-usage one-shot thresholds (§4.6).
    pub context_warning_percentage: f64,
    pub context_critical_percentage: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            monitor_poll_interval: Duration::from_secs(1),
            idle_threshold_seconds: 300,
            window_liveness_check_every_ticks: 30,
            idle_notification_cooldown_seconds: 300,
            crash_recovery_success_cooldown_seconds: 30,
            crash_recovery_failure_cooldown_seconds: 5,
            max_batch_size: 20,
            settle_delay: sm_terminal::DEFAULT_SETTLE_DELAY,
            ready_poll_timeout: sm_terminal::DEFAULT_READY_POLL_TIMEOUT,
            ready_poll_interval: sm_terminal::READY_POLL_INTERVAL,
            capture_lines: 50,
            skip_fence_window_seconds: 8,
            stop_notify_suppression_seconds: 10,
            watch_poll_interval: Duration::from_secs(2),
            default_remind_soft_seconds: 180,
            default_remind_hard_seconds: 300,
            context_warning_percentage: 50.0,
            context_critical_percentage: 65.0,
        }
    }
}
