// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared data model for the session manager: sessions, queued messages,
//! delivery state, background-job registrations, and the tool-use audit
//! log. Holds no I/O of its own — `sm-store` persists these types and
//! `sm-engine` mutates them.

pub mod delivery_state;
pub mod error;
pub mod id;
pub mod message;
pub mod registration;
pub mod session;
pub mod tool_use;

pub use delivery_state::SessionDeliveryState;
pub use error::{ErrorCode, SmError};
pub use id::SessionId;
pub use message::{DeliveryMode, QueuedMessage};
pub use registration::{
    ContextMonitorEnrolment, ParentWakeRegistration, RemindRegistration, ScheduledReminder,
    WatchRegistration,
};
pub use session::{ActivityState, Provider, Session, SessionStatus};
pub use tool_use::{HookType, ToolUseEntry};
