// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `sm spawn` / `list` / `get` / `kill` / `children` / `output` /
//! `tool-calls` / `summary` — session lifecycle and introspection.

use clap::Args;
use serde_json::json;
use sm_core::session::Session;

use crate::client::SmClient;

#[derive(Debug, Args)]
pub struct SpawnArgs {
    /// `claude`, `codex`, or `codex-app`.
    pub provider: String,
    pub working_dir: String,
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long)]
    pub parent: Option<String>,
    #[arg(long)]
    pub em: bool,
    #[arg(long)]
    pub role: Option<String>,
    #[arg(long)]
    pub command: Option<String>,
    #[arg(long = "arg")]
    pub args: Vec<String>,
    #[arg(long)]
    pub spawn_prompt: Option<String>,
}

pub async fn spawn(client: &SmClient, args: SpawnArgs) -> anyhow::Result<i32> {
    let body = json!({
        "provider": args.provider,
        "working_dir": args.working_dir,
        "friendly_name": args.name,
        "parent_session_id": args.parent,
        "is_em": args.em,
        "role": args.role,
        "command": args.command,
        "args": args.args,
        "spawn_prompt": args.spawn_prompt,
    });
    match client.post_json::<_, Session>("/sessions", &body).await {
        Ok(session) => {
            println!("{}", serde_json::to_string_pretty(&session)?);
            Ok(0)
        }
        Err(e) => {
            eprintln!("error: {e}");
            Ok(e.exit_code)
        }
    }
}

#[derive(Debug, Args)]
pub struct ListArgs {
    #[arg(long)]
    pub include_stopped: bool,
}

pub async fn list(client: &SmClient, args: ListArgs) -> anyhow::Result<i32> {
    let path = if args.include_stopped { "/sessions?include_stopped=true" } else { "/sessions" };
    match client.get::<Vec<Session>>(path).await {
        Ok(sessions) => {
            for s in sessions {
                let name = s.friendly_name.clone().unwrap_or_else(|| s.id.to_string());
                println!("{:<10} {:<20} {:?} {:?}", s.id, name, s.status, s.provider);
            }
            Ok(0)
        }
        Err(e) => {
            eprintln!("error: {e}");
            Ok(e.exit_code)
        }
    }
}

pub async fn get(client: &SmClient, id: String) -> anyhow::Result<i32> {
    match client.get::<Session>(&format!("/sessions/{id}")).await {
        Ok(session) => {
            println!("{}", serde_json::to_string_pretty(&session)?);
            Ok(0)
        }
        Err(e) => {
            eprintln!("error: {e}");
            Ok(e.exit_code)
        }
    }
}

#[derive(Debug, Args)]
pub struct KillArgs {
    pub id: String,
    #[arg(long)]
    pub requester: Option<String>,
}

pub async fn kill(client: &SmClient, args: KillArgs) -> anyhow::Result<i32> {
    let path = match args.requester {
        Some(r) => format!("/sessions/{}?requester_id={}", args.id, r),
        None => format!("/sessions/{}", args.id),
    };
    match client.delete_empty(&path).await {
        Ok(()) => {
            println!("killed {}", args.id);
            Ok(0)
        }
        Err(e) => {
            eprintln!("error: {e}");
            Ok(e.exit_code)
        }
    }
}

#[derive(Debug, Args)]
pub struct ChildrenArgs {
    pub id: String,
    #[arg(long)]
    pub recursive: bool,
}

pub async fn children(client: &SmClient, args: ChildrenArgs) -> anyhow::Result<i32> {
    let path = format!("/sessions/{}/children?recursive={}", args.id, args.recursive);
    match client.get::<Vec<Session>>(&path).await {
        Ok(sessions) => {
            for s in sessions {
                println!("{} {:?}", s.id, s.status);
            }
            Ok(0)
        }
        Err(e) => {
            eprintln!("error: {e}");
            Ok(e.exit_code)
        }
    }
}

pub async fn output(client: &SmClient, id: String, lines: Option<u32>) -> anyhow::Result<i32> {
    let path = match lines {
        Some(n) => format!("/sessions/{id}/output?lines={n}"),
        None => format!("/sessions/{id}/output"),
    };
    match client.get::<serde_json::Value>(&path).await {
        Ok(body) => {
            if let Some(text) = body.get("text").and_then(|v| v.as_str()) {
                println!("{text}");
            }
            Ok(0)
        }
        Err(e) => {
            eprintln!("error: {e}");
            Ok(e.exit_code)
        }
    }
}

pub async fn summary(client: &SmClient, id: String) -> anyhow::Result<i32> {
    match client.get::<serde_json::Value>(&format!("/sessions/{id}/summary")).await {
        Ok(body) => {
            println!("{}", serde_json::to_string_pretty(&body)?);
            Ok(0)
        }
        Err(e) => {
            eprintln!("error: {e}");
            Ok(e.exit_code)
        }
    }
}
