// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `sm watch` / `sm remind` / `sm parent-wake` — the three timer-arming
//! subcommands an agent calls on itself (`spec.md` §4.6, §6).

use clap::Args;
use serde_json::json;

use crate::client::SmClient;
use crate::config::SmConfig;

#[derive(Debug, Args)]
pub struct WatchArgs {
    pub target: String,
    #[arg(long, default_value = "120")]
    pub timeout_seconds: u64,
}

pub async fn watch(client: &SmClient, cfg: &SmConfig, args: WatchArgs) -> anyhow::Result<i32> {
    let watcher = cfg.require_session_manager_id()?;
    let body = json!({
        "target_session_id": args.target,
        "watcher_session_id": watcher,
        "timeout_seconds": args.timeout_seconds,
    });
    match client.post_json::<_, serde_json::Value>("/scheduler/watch", &body).await {
        Ok(v) => {
            println!("{}", serde_json::to_string_pretty(&v)?);
            Ok(0)
        }
        Err(e) => {
            eprintln!("error: {e}");
            Ok(e.exit_code)
        }
    }
}

pub async fn remind(client: &SmClient, cfg: &SmConfig, delay_seconds: u64, message: String) -> anyhow::Result<i32> {
    let session_id = cfg.require_session_manager_id()?;
    let body = json!({ "session_id": session_id, "delay_seconds": delay_seconds, "message": message });
    match client.post_empty("/scheduler/remind", &body).await {
        Ok(()) => Ok(0),
        Err(e) => {
            eprintln!("error: {e}");
            Ok(e.exit_code)
        }
    }
}

pub async fn parent_wake(client: &SmClient, cfg: &SmConfig, period_seconds: u64) -> anyhow::Result<i32> {
    let session_id = cfg.require_session_manager_id()?;
    match client.get::<sm_core::session::Session>(&format!("/sessions/{session_id}")).await {
        Ok(session) => {
            let Some(parent) = session.parent_session_id else {
                eprintln!("error: session {session_id} has no parent");
                return Ok(1);
            };
            let body = json!({
                "child_session_id": session_id,
                "parent_session_id": parent.to_string(),
                "period_seconds": period_seconds,
            });
            match client.post_empty("/scheduler/parent-wake", &body).await {
                Ok(()) => Ok(0),
                Err(e) => {
                    eprintln!("error: {e}");
                    Ok(e.exit_code)
                }
            }
        }
        Err(e) => {
            eprintln!("error: {e}");
            Ok(e.exit_code)
        }
    }
}
