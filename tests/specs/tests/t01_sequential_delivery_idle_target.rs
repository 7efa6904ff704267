// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scenario 1, `spec.md` §8: sequential delivery into an idle target.

use sm_specs::{fire_stop_hook, session_id, spawn_session, World};
use sm_terminal::recording::Call;

#[tokio::test]
async fn sequential_message_delivers_immediately_to_idle_target() {
    let world = World::build().await;
    let session = spawn_session(&world.server, "claude", None, false).await;
    let id = session_id(&session);
    let window = session["window_name"].as_str().unwrap().to_string();

    fire_stop_hook(&world.server, &id).await;

    let resp = world
        .server
        .post(&format!("/sessions/{id}/input"))
        .json(&serde_json::json!({ "text": "hello", "mode": "sequential" }))
        .await;
    resp.assert_status_ok();
    let msg: sm_core::message::QueuedMessage = resp.json();
    assert!(msg.delivered_at.is_some(), "sequential delivery to an idle target must settle synchronously");

    assert_eq!(
        world.terminal.calls(),
        vec![
            Call::CreateWindow { name: window.clone(), working_dir: "/tmp".into(), command: "claude".into(), args: vec![] },
            Call::CapturePane { name: window.clone(), lines: 1 },
            Call::SendTextThenEnter { name: window, text: "hello".into() },
        ]
    );

    let last = world.store.last_message_for_session(sm_core::id::SessionId::parse(&id).unwrap()).await.unwrap();
    assert!(last.unwrap().delivered_at.is_some());
}
