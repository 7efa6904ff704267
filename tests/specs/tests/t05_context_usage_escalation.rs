// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scenario 5, `spec.md` §8: the context-usage watchdog's one-shot
//! warning/critical thresholds, and the `compaction` event that resets
//! both one-shot flags immediately so the next status line can re-fire a
//! threshold even before `compaction_complete` arrives (`spec.md` §4.5.9,
//! §4.6).

use sm_specs::{session_id, spawn_session, World};
use sm_terminal::recording::Call;

fn send_texts(world: &World) -> Vec<String> {
    world
        .terminal
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            Call::SendTextThenEnter { text, .. } => Some(text),
            _ => None,
        })
        .collect()
}

async fn post_context_usage(world: &World, id: &str, event: &str, percentage: Option<f64>) {
    let resp = world
        .server
        .post("/hooks/context-usage")
        .json(&serde_json::json!({
            "session_manager_id": id,
            "event": event,
            "percentage": percentage,
        }))
        .await;
    resp.assert_status(axum::http::StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn warning_then_critical_then_one_shots_suppress_until_compaction_resets_them() {
    let world = World::build().await;
    let session = spawn_session(&world.server, "claude", None, false).await;
    let id = session_id(&session);

    let resp = world
        .server
        .post(&format!("/sessions/{id}/context-monitor"))
        .json(&serde_json::json!({ "enabled": true, "notify_target_session_id": id }))
        .await;
    resp.assert_status(axum::http::StatusCode::NO_CONTENT);

    post_context_usage(&world, &id, "context_usage", Some(55.0)).await;
    post_context_usage(&world, &id, "context_usage", Some(70.0)).await;
    post_context_usage(&world, &id, "context_usage", Some(80.0)).await;

    let texts = send_texts(&world);
    assert_eq!(texts.len(), 2, "the 80% probe must not produce a third message once both one-shots fired");
    assert!(texts[0].contains("55%") && texts[0].contains("warning"));
    assert!(texts[1].contains("70%") && texts[1].contains("critical"));

    // `compaction` alone resets both one-shot flags — no intervening
    // `compaction_complete` needed, and no message is produced by the
    // event itself (notify target is the session's own id here).
    post_context_usage(&world, &id, "compaction", None).await;
    assert_eq!(send_texts(&world).len(), 2, "the compaction event itself produces no user-visible message");

    // The warning threshold re-fires immediately, even at the same
    // percentage as before, because the flags were reset by `compaction`.
    post_context_usage(&world, &id, "context_usage", Some(55.0)).await;
    let texts = send_texts(&world);
    assert_eq!(texts.len(), 3, "the warning threshold must refire once compaction resets the flags");
    assert!(texts[2].contains("55%") && texts[2].contains("warning"));
}
