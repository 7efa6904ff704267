// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `sm send` and the other messaging/status subcommands: `key`, `clear`,
//! `handoff`, `task-complete`, `status`/`task`/`role`.

use clap::Args;
use serde_json::json;
use sm_core::message::QueuedMessage;

use crate::client::SmClient;
use crate::config::SmConfig;
use crate::dispatch;

#[derive(Debug, Args)]
pub struct SendArgs {
    pub target: String,
    /// Message text. Omit when using `--template`.
    pub text: Vec<String>,
    #[arg(long, default_value = "sequential")]
    pub mode: String,
    #[arg(long)]
    pub sender_name: Option<String>,
    #[arg(long)]
    pub timeout_seconds: Option<u64>,
    #[arg(long)]
    pub notify_after_seconds: Option<u64>,
    #[arg(long)]
    pub notify_on_delivery: bool,
    #[arg(long)]
    pub notify_on_stop: bool,
    /// Dispatch-template name, loaded from `.sm/dispatch_templates.yaml`
    /// (SPEC_FULL.md §4.8). Remaining positional args are `key=value` pairs.
    #[arg(long)]
    pub template: Option<String>,
}

pub async fn send(client: &SmClient, cfg: &SmConfig, args: SendArgs) -> anyhow::Result<i32> {
    let text = match &args.template {
        Some(name) => {
            let cwd = std::env::current_dir()?;
            let templates_path = dispatch::find_templates_file(&cwd)
                .ok_or_else(|| anyhow::anyhow!("no .sm/dispatch_templates.yaml found"))?;
            let vars = dispatch::parse_kv_args(&args.text)?;
            dispatch::expand_template(&templates_path, name, &vars)?
        }
        None => args.text.join(" "),
    };
    if text.is_empty() {
        anyhow::bail!("no message text given (pass text or --template)");
    }

    let body = json!({
        "text": text,
        "mode": args.mode,
        "sender": cfg.session_manager_id,
        "sender_name": args.sender_name,
        "timeout_seconds": args.timeout_seconds,
        "notify_after_seconds": args.notify_after_seconds,
        "notify_on_delivery": args.notify_on_delivery,
        "notify_on_stop": args.notify_on_stop,
    });
    match client
        .post_json::<_, QueuedMessage>(&format!("/sessions/{}/input", args.target), &body)
        .await
    {
        Ok(msg) => {
            let status = if msg.delivered_at.is_some() { "delivered" } else { "queued" };
            println!("{status} {}", msg.id);
            Ok(0)
        }
        Err(e) => {
            eprintln!("error: {e}");
            Ok(e.exit_code)
        }
    }
}

pub async fn key(client: &SmClient, target: String, key: String) -> anyhow::Result<i32> {
    match client.post_empty(&format!("/sessions/{target}/key"), &json!({ "key": key })).await {
        Ok(()) => Ok(0),
        Err(e) => {
            eprintln!("error: {e}");
            Ok(e.exit_code)
        }
    }
}

pub async fn clear(client: &SmClient, target: String) -> anyhow::Result<i32> {
    match client.post_empty::<()>(&format!("/sessions/{target}/clear"), &()).await {
        Ok(()) => Ok(0),
        Err(e) => {
            eprintln!("error: {e}");
            Ok(e.exit_code)
        }
    }
}

pub async fn handoff(client: &SmClient, cfg: &SmConfig, target: String, file_path: String) -> anyhow::Result<i32> {
    let body = json!({ "file_path": file_path, "requester_id": cfg.session_manager_id });
    match client.post_empty(&format!("/sessions/{target}/handoff"), &body).await {
        Ok(()) => {
            println!("handoff scheduled for {target}");
            Ok(0)
        }
        Err(e) => {
            eprintln!("error: {e}");
            Ok(e.exit_code)
        }
    }
}

pub async fn task_complete(client: &SmClient, target: String, status: String, message: Option<String>) -> anyhow::Result<i32> {
    let body = json!({ "status": status, "message": message });
    match client.post_empty(&format!("/sessions/{target}/task-complete"), &body).await {
        Ok(()) => Ok(0),
        Err(e) => {
            eprintln!("error: {e}");
            Ok(e.exit_code)
        }
    }
}

/// Shared by `sm status`, `sm task`, `sm role` — all three are a
/// `PATCH .../{field}` taking `{"value": text | null}`.
pub async fn set_field(client: &SmClient, target: String, field: &str, value: Option<String>) -> anyhow::Result<i32> {
    let body = json!({ "value": value });
    match client.patch_empty(&format!("/sessions/{target}/{field}"), &body).await {
        Ok(()) => Ok(0),
        Err(e) => {
            eprintln!("error: {e}");
            Ok(e.exit_code)
        }
    }
}
