// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `sm` subcommands: the CLI front-end the core deliberately treats as an
//! out-of-scope collaborator (`spec.md` §1) — every handler here is a thin
//! translation to one HTTP call against `smd`.

pub mod send;
pub mod session;
pub mod watch;

use clap::Subcommand;

use crate::client::SmClient;
use crate::config::SmConfig;

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create a session and launch its terminal window.
    Spawn(session::SpawnArgs),
    /// List live sessions.
    List(session::ListArgs),
    /// Show one session's full record.
    Get { id: String },
    /// Kill a session (ownership-gated if `--requester` is given).
    Kill(session::KillArgs),
    /// List a session's children.
    Children(session::ChildrenArgs),
    /// Capture a session's visible pane output.
    Output {
        id: String,
        #[arg(long)]
        lines: Option<u32>,
    },
    /// Print a session's activity-state summary.
    Summary { id: String },
    /// Queue a message for delivery into a target session's input stream.
    Send(send::SendArgs),
    /// Send a single named key.
    Key { target: String, key: String },
    /// `/clear` a session and reset its completion/role/status cache.
    Clear { target: String },
    /// Schedule a self-directed context rotation.
    Handoff { target: String, file_path: String },
    /// Mark a session's task complete (self-only).
    TaskComplete {
        target: String,
        status: String,
        #[arg(long)]
        message: Option<String>,
    },
    /// Set or clear the free-text agent-status line.
    Status {
        target: String,
        #[arg(long)]
        clear: bool,
        text: Option<String>,
    },
    /// Set or clear the current-task field.
    Task {
        target: String,
        #[arg(long)]
        clear: bool,
        text: Option<String>,
    },
    /// Set or clear the session's role tag.
    Role {
        target: String,
        #[arg(long)]
        clear: bool,
        text: Option<String>,
    },
    /// Arm a one-shot watch-for-idle against a target session.
    Watch(watch::WatchArgs),
    /// Arm a one-shot reminder for the caller's own session.
    Remind { delay_seconds: u64, message: String },
    /// Arm a periodic heartbeat from the caller to its parent session.
    ParentWake { period_seconds: u64 },
}

pub async fn dispatch(client: &SmClient, cfg: &SmConfig, command: Command) -> anyhow::Result<i32> {
    match command {
        Command::Spawn(args) => session::spawn(client, args).await,
        Command::List(args) => session::list(client, args).await,
        Command::Get { id } => session::get(client, id).await,
        Command::Kill(args) => session::kill(client, args).await,
        Command::Children(args) => session::children(client, args).await,
        Command::Output { id, lines } => session::output(client, id, lines).await,
        Command::Summary { id } => session::summary(client, id).await,
        Command::Send(args) => send::send(client, cfg, args).await,
        Command::Key { target, key } => send::key(client, target, key).await,
        Command::Clear { target } => send::clear(client, target).await,
        Command::Handoff { target, file_path } => send::handoff(client, cfg, target, file_path).await,
        Command::TaskComplete { target, status, message } => send::task_complete(client, target, status, message).await,
        Command::Status { target, clear, text } => send::set_field(client, target, "agent-status", field_value(clear, text)?).await,
        Command::Task { target, clear, text } => send::set_field(client, target, "task", field_value(clear, text)?).await,
        Command::Role { target, clear, text } => send::set_field(client, target, "role", field_value(clear, text)?).await,
        Command::Watch(args) => watch::watch(client, cfg, args).await,
        Command::Remind { delay_seconds, message } => watch::remind(client, cfg, delay_seconds, message).await,
        Command::ParentWake { period_seconds } => watch::parent_wake(client, cfg, period_seconds).await,
    }
}

/// `--clear` wins over a provided `text`: `sm task T --clear` always
/// clears, regardless of a stray positional. Exactly one of `--clear` or
/// `text` must be given — neither is a usage error, not a silent clear.
fn field_value(clear: bool, text: Option<String>) -> anyhow::Result<Option<String>> {
    match (clear, text) {
        (true, _) => Ok(None),
        (false, Some(t)) => Ok(Some(t)),
        (false, None) => anyhow::bail!("expected text or --clear"),
    }
}
