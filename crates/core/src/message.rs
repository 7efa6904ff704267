// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::id::SessionId;

/// Delivery discipline for a queued message. See `spec.md` §4.5 and the
/// GLOSSARY.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    /// Enqueue and deliver FIFO; no idle gate.
    Sequential,
    /// Enqueue but skip ahead of sequential messages in the same batch.
    Important,
    /// Preempt: Escape the target, wait for prompt-ready, then deliver.
    Urgent,
    /// Like `Urgent`, but without the initial Escape — the target's TUI is
    /// left to either absorb the text mid-turn or discard it cleanly.
    /// `spec.md` §9 leaves this mode's exact semantics an open question;
    /// this is the resolution this crate settled on.
    Steer,
}

impl DeliveryMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sequential => "sequential",
            Self::Important => "important",
            Self::Urgent => "urgent",
            Self::Steer => "steer",
        }
    }
}

/// A message addressed to a target session's input stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedMessage {
    pub id: Uuid,
    pub target: SessionId,
    pub sender: Option<SessionId>,
    pub sender_name: Option<String>,
    pub text: String,
    pub mode: DeliveryMode,
    pub queued_at: DateTime<Utc>,
    pub timeout_at: Option<DateTime<Utc>>,
    /// Fire a one-shot "delivered" echo back to the sender once this
    /// message's write is confirmed, independent of the recipient's later
    /// state. Named in `spec.md` §6's request body but not tabled in §3;
    /// see SPEC_FULL.md §3.
    pub notify_on_delivery: bool,
    /// Follow-up reminder for the sender if the recipient stays
    /// unresponsive for this many seconds after queueing.
    pub notify_after_seconds: Option<u64>,
    /// Fire a one-shot "I've stopped" message to the sender the next time
    /// the recipient goes idle.
    pub notify_on_stop: bool,
    pub delivered_at: Option<DateTime<Utc>>,
}

impl QueuedMessage {
    pub fn new(
        target: SessionId,
        sender: Option<SessionId>,
        sender_name: Option<String>,
        text: String,
        mode: DeliveryMode,
        timeout_seconds: Option<u64>,
        notify_after_seconds: Option<u64>,
        notify_on_delivery: bool,
        notify_on_stop: bool,
    ) -> Self {
        let queued_at = Utc::now();
        Self {
            id: Uuid::new_v4(),
            target,
            sender,
            sender_name,
            text,
            mode,
            queued_at,
            timeout_at: timeout_seconds.map(|s| queued_at + chrono::Duration::seconds(s as i64)),
            notify_on_delivery,
            notify_after_seconds,
            notify_on_stop,
            delivered_at: None,
        }
    }

    /// `pending ≡ delivered_at IS NULL AND (timeout_at IS NULL OR now < timeout_at)`.
    pub fn is_pending(&self, now: DateTime<Utc>) -> bool {
        self.delivered_at.is_none() && self.timeout_at.map(|t| now < t).unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_invariant_holds_for_fresh_message() {
        let msg = QueuedMessage::new(
            SessionId::generate(),
            None,
            None,
            "hi".into(),
            DeliveryMode::Sequential,
            None,
            None,
            false,
            false,
        );
        assert!(msg.is_pending(Utc::now()));
    }

    #[test]
    fn delivered_message_is_not_pending() {
        let mut msg = QueuedMessage::new(
            SessionId::generate(),
            None,
            None,
            "hi".into(),
            DeliveryMode::Sequential,
            None,
            None,
            false,
            false,
        );
        msg.delivered_at = Some(Utc::now());
        assert!(!msg.is_pending(Utc::now()));
    }

    #[test]
    fn timed_out_message_is_not_pending() {
        let msg = QueuedMessage::new(
            SessionId::generate(),
            None,
            None,
            "hi".into(),
            DeliveryMode::Sequential,
            Some(0),
            None,
            false,
            false,
        );
        let later = Utc::now() + chrono::Duration::seconds(5);
        assert!(!msg.is_pending(later));
    }
}
