// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scenario 6, `spec.md` §8: spawning a child under an engineering-manager
//! parent cascades a remind registration, a context-monitor enrolment, and
//! a `notify_on_stop` arming, all pointed back at the parent.

use sm_specs::{fire_stop_hook, session_id, spawn_session, World};
use sm_terminal::recording::Call;

#[tokio::test]
async fn spawning_under_an_em_parent_registers_the_standard_child_cascade() {
    let world = World::build().await;

    let parent = spawn_session(&world.server, "claude", None, true).await;
    let parent_id = session_id(&parent);
    let parent_window = parent["window_name"].as_str().unwrap().to_string();

    let child = spawn_session(&world.server, "claude", Some(parent_id.clone()), false).await;
    let child_id = session_id(&child);
    let child_session_id = sm_core::id::SessionId::parse(&child_id).unwrap();

    let remind = world.store.get_remind(child_session_id).await.unwrap();
    let remind = remind.expect("EM spawn must register a remind for its child");
    assert_eq!(remind.soft_threshold_seconds, 180);
    assert_eq!(remind.hard_threshold_seconds, 300);

    let enrolments = world.store.list_context_monitor_enrolments().await.unwrap();
    let enrolment = enrolments
        .into_iter()
        .find(|e| e.session_id == child_session_id)
        .expect("EM spawn must enroll its child in the context monitor");
    assert_eq!(enrolment.notify_target_session_id, Some(sm_core::id::SessionId::parse(&parent_id).unwrap()));

    // Sending the child text, then a Stop, must report back to the parent.
    let resp = world
        .server
        .post(&format!("/sessions/{child_id}/input"))
        .json(&serde_json::json!({ "text": "go", "mode": "sequential" }))
        .await;
    resp.assert_status_ok();

    fire_stop_hook(&world.server, &child_id).await;

    let parent_texts: Vec<String> = world
        .terminal
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            Call::SendTextThenEnter { name, text } if name == parent_window => Some(text),
            _ => None,
        })
        .collect();
    assert!(
        parent_texts.iter().any(|t| t.contains("has stopped")),
        "the parent must receive a stop-notify once its EM child goes idle, got: {parent_texts:?}"
    );
}
