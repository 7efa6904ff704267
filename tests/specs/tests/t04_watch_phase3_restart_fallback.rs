// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scenario 4, `spec.md` §8: watch-for-idle's Phase 3 fallback. The target
//! has no in-memory `SessionDeliveryState` (simulating a just-restarted
//! daemon that only has the persisted `status` to go on) and no terminal
//! window (`codex-app`), so neither Phase 1's memory check nor Phase 2's
//! terminal probe can fire — only the persisted-status fallback can.

use std::time::Duration;

use sm_specs::{session_id, spawn_session, wait_until, World};

#[tokio::test]
async fn phase_three_fallback_notifies_watcher_from_persisted_status_alone() {
    let world = World::build().await;

    let target = spawn_session(&world.server, "codex-app", None, false).await;
    let target_id = session_id(&target);
    let target_session_id = sm_core::id::SessionId::parse(&target_id).unwrap();

    // Bypass the delivery engine entirely: only the registry's persisted
    // status says this session is idle, exactly as after a restart.
    world.engine.registry.update_status(target_session_id, sm_core::session::SessionStatus::Idle).await.unwrap();
    assert!(!world.engine.delivery.is_idle(target_session_id).await);

    let watcher = spawn_session(&world.server, "claude", None, false).await;
    let watcher_id = session_id(&watcher);
    let watcher_window = watcher["window_name"].as_str().unwrap().to_string();

    let resp = world
        .server
        .post("/scheduler/watch")
        .json(&serde_json::json!({
            "target_session_id": target_id,
            "watcher_session_id": watcher_id,
            "timeout_seconds": 30,
        }))
        .await;
    resp.assert_status_ok();

    let seen = wait_until(Duration::from_secs(2), Duration::from_millis(10), || {
        world.terminal.calls().iter().any(|c| matches!(
            c,
            sm_terminal::recording::Call::SendTextThenEnter { name, text }
            if name == &watcher_window && text.contains("is idle")
        ))
    })
    .await;
    assert!(seen, "watcher never received the idle notification via the Phase 3 fallback");
}
