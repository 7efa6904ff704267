// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use chrono::{DateTime, Utc};

use crate::id::SessionId;

/// Per-session runtime state held alongside the registry. Not required to
/// survive restart in full — see `spec.md` §3 and the watch-for-idle Phase 3
/// fallback in §4.6, which exists precisely because this struct is empty
/// after a restart.
#[derive(Debug, Clone, Default)]
pub struct SessionDeliveryState {
    pub is_idle: bool,
    pub last_idle_at: Option<DateTime<Utc>>,

    /// What the agent's own prompt currently contains, read from the pane.
    pub pending_user_input: Option<String>,
    pub pending_input_first_seen: Option<DateTime<Utc>>,
    /// User text preserved across a delivery cycle.
    pub saved_user_input: Option<String>,

    pub pending_handoff_path: Option<String>,

    pub stop_notify_sender_id: Option<SessionId>,
    pub stop_notify_sender_name: Option<String>,

    pub paste_buffered_notify_sender_id: Option<SessionId>,
    pub paste_buffered_notify_sender_name: Option<String>,

    pub stop_notify_skip_count: u32,
    pub skip_count_armed_at: Option<DateTime<Utc>>,

    /// Timestamp of the last stop-notify firing, used by the watch-for-idle
    /// 10s suppression window (`spec.md` §4.5.6 / §4.6).
    pub last_stop_notify_fired_at: Option<DateTime<Utc>>,
}

impl SessionDeliveryState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the skip fence for one upcoming Stop hook.
    pub fn arm_skip_fence(&mut self, now: DateTime<Utc>) {
        self.stop_notify_skip_count += 1;
        self.skip_count_armed_at = Some(now);
    }

    /// True if the skip fence is live and still within its TTL window.
    pub fn skip_fence_is_live(&self, now: DateTime<Utc>, window_seconds: i64) -> bool {
        self.stop_notify_skip_count > 0
            && self
                .skip_count_armed_at
                .map(|armed| now - armed <= chrono::Duration::seconds(window_seconds))
                .unwrap_or(false)
    }

    /// Consume one unit of the skip fence. Returns `true` if the fence
    /// absorbed this call (caller must return without touching `is_idle`).
    pub fn consume_skip_fence(&mut self, now: DateTime<Utc>, window_seconds: i64) -> bool {
        if self.skip_fence_is_live(now, window_seconds) {
            self.stop_notify_skip_count -= 1;
            if self.stop_notify_skip_count == 0 {
                self.skip_count_armed_at = None;
            }
            true
        } else {
            // Stale fence: clear it and fall through.
            self.stop_notify_skip_count = 0;
            self.skip_count_armed_at = None;
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_skip_fence_does_not_absorb() {
        let mut s = SessionDeliveryState::new();
        assert!(!s.consume_skip_fence(Utc::now(), 8));
    }

    #[test]
    fn armed_skip_fence_absorbs_once() {
        let mut s = SessionDeliveryState::new();
        let now = Utc::now();
        s.arm_skip_fence(now);
        assert!(s.consume_skip_fence(now, 8));
        assert_eq!(s.stop_notify_skip_count, 0);
        // second call within window: already zero, fence no longer live.
        assert!(!s.consume_skip_fence(now, 8));
    }

    #[test]
    fn stale_skip_fence_does_not_absorb() {
        let mut s = SessionDeliveryState::new();
        let armed = Utc::now() - chrono::Duration::seconds(20);
        s.arm_skip_fence(armed);
        assert!(!s.consume_skip_fence(Utc::now(), 8));
        assert_eq!(s.stop_notify_skip_count, 0);
    }
}
