// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scenario 2, `spec.md` §8: an urgent message preempts a session that is
//! still `running` (not idle) — Escape, poll for prompt-readiness, deliver.

use sm_specs::{session_id, spawn_session, World};
use sm_terminal::recording::Call;

#[tokio::test]
async fn urgent_message_escapes_then_polls_then_delivers() {
    let world = World::build().await;
    let session = spawn_session(&world.server, "claude", None, false).await;
    let id = session_id(&session);
    let window = session["window_name"].as_str().unwrap().to_string();
    assert_eq!(session["status"], "running");

    // Prompt is ready on the very first probe.
    world.terminal.set_pane(&window, "some mid-turn output\n> ");

    let resp = world
        .server
        .post(&format!("/sessions/{id}/input"))
        .json(&serde_json::json!({ "text": "STOP NOW", "mode": "urgent" }))
        .await;
    resp.assert_status_ok();
    let msg: sm_core::message::QueuedMessage = resp.json();
    assert!(msg.delivered_at.is_some());

    assert_eq!(
        world.terminal.calls(),
        vec![
            Call::CreateWindow { name: window.clone(), working_dir: "/tmp".into(), command: "claude".into(), args: vec![] },
            Call::SendKey { name: window.clone(), key: "Escape".into() },
            Call::CapturePane { name: window.clone(), lines: 1 },
            Call::SendTextThenEnter { name: window, text: "STOP NOW".into() },
        ]
    );
}
