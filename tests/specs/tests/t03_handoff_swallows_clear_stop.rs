// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scenario 3, `spec.md` §8: a scheduled handoff takes over the next Stop
//! entirely, then arms a one-shot skip fence against the `/clear` it just
//! sent itself (which will trigger its own Stop once Claude processes it).

use sm_specs::{fire_stop_hook, session_id, spawn_session, World};
use sm_terminal::recording::Call;

#[tokio::test]
async fn handoff_preempts_stop_then_fence_absorbs_the_next_one() {
    let world = World::build().await;
    let session = spawn_session(&world.server, "claude", None, false).await;
    let id = session_id(&session);
    let window = session["window_name"].as_str().unwrap().to_string();

    let handoff_file = tempfile::NamedTempFile::new().unwrap();
    std::fs::write(handoff_file.path(), "# resume here\ncontext carried forward").unwrap();

    // Prompt reads ready on every probe so both polls in the handoff
    // sequence resolve on their first capture.
    world.terminal.set_pane(&window, "> ");

    let resp = world
        .server
        .post(&format!("/sessions/{id}/handoff"))
        .json(&serde_json::json!({
            "file_path": handoff_file.path().to_str().unwrap(),
            "requester_id": id,
        }))
        .await;
    resp.assert_status(axum::http::StatusCode::ACCEPTED);

    // The deferred Stop: this is the one the handoff itself intercepts.
    fire_stop_hook(&world.server, &id).await;

    let after_handoff = world.server.get(&format!("/sessions/{id}")).await.json::<serde_json::Value>();
    assert_eq!(after_handoff["status"], "running", "a handoff-consumed Stop must not flip status to idle");

    assert_eq!(
        world.terminal.calls(),
        vec![
            Call::CreateWindow { name: window.clone(), working_dir: "/tmp".into(), command: "claude".into(), args: vec![] },
            Call::SendKey { name: window.clone(), key: "Escape".into() },
            Call::CapturePane { name: window.clone(), lines: 1 },
            Call::SendTextThenEnter { name: window.clone(), text: "/clear".into() },
            Call::CapturePane { name: window.clone(), lines: 1 },
            Call::SendTextThenEnter { name: window.clone(), text: "# resume here\ncontext carried forward".into() },
        ]
    );

    // The real Claude process now emits its own Stop in response to the
    // `/clear` the handoff just sent — the armed skip fence swallows it.
    fire_stop_hook(&world.server, &id).await;
    let after_fence = world.server.get(&format!("/sessions/{id}")).await.json::<serde_json::Value>();
    assert_eq!(after_fence["status"], "running", "the fenced Stop must also be swallowed");

    // A third Stop, past the fence's single use, goes through normally.
    fire_stop_hook(&world.server, &id).await;
    let after_real_stop = world.server.get(&format!("/sessions/{id}")).await.json::<serde_json::Value>();
    assert_eq!(after_real_stop["status"], "idle");
}
