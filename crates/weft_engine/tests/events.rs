mod common;

use common::*;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use weft_domain::{ItemKind, TurnPhase, WorkspaceId};
use weft_engine::{ApprovalDecision, SendOptions, SendOutcome};

async fn notify(h: &Harness, method: &str, params: Value) -> bool {
    h.engine
        .handle_notification("ws-1", method, &params, None)
        .await
}

#[tokio::test]
async fn turn_lifecycle_follows_notifications() {
    let h = harness();
    let t1 = thread("t1");
    h.engine.actions().activate_thread(&ws(), &t1);

    notify(
        &h,
        "turn/started",
        json!({ "threadId": "t1", "turn": { "id": "turn-1", "status": "inProgress" } }),
    )
    .await;
    let store = h.engine.store();
    assert!(store.is_processing(&t1));
    assert_eq!(store.active_turn_id(&t1).as_deref(), Some("turn-1"));

    notify(
        &h,
        "item/agentMessage/delta",
        json!({ "threadId": "t1", "itemId": "msg-1", "delta": "Hel" }),
    )
    .await;
    notify(
        &h,
        "item/agentMessage/delta",
        json!({ "threadId": "t1", "itemId": "msg-1", "delta": "lo" }),
    )
    .await;
    assert!(matches!(
        store.items(&t1).as_slice(),
        [item] if matches!(&item.kind, ItemKind::Message { text, .. } if text == "Hello")
    ));

    h.clock.advance(5_000);
    notify(
        &h,
        "turn/completed",
        json!({ "threadId": "t1", "turn": { "id": "turn-1", "status": "completed" } }),
    )
    .await;
    assert!(!store.is_processing(&t1));
    assert_eq!(store.active_turn_id(&t1), None);
    let status = store.read(|state| state.status(&t1).cloned().unwrap_or_default());
    assert_eq!(status.phase, TurnPhase::Completed);
    assert_eq!(status.last_duration_ms, Some(5_000));
    assert!(status.has_unread);
}

#[tokio::test]
async fn turns_on_the_focused_thread_do_not_mark_unread() {
    let h = harness();
    let t1 = thread("t1");
    h.engine.set_active_workspace(Some(ws()));
    h.engine.actions().activate_thread(&ws(), &t1);
    start_running_turn(&h, &t1, "turn-1");

    notify(
        &h,
        "turn/completed",
        json!({ "threadId": "t1", "turn": { "id": "turn-1", "status": "interrupted" } }),
    )
    .await;
    let status = h
        .engine
        .store()
        .read(|state| state.status(&t1).cloned().unwrap_or_default());
    assert_eq!(status.phase, TurnPhase::Interrupted);
    assert!(!status.has_unread);
}

#[tokio::test]
async fn retryable_errors_keep_the_turn_running() {
    let h = harness();
    let t1 = thread("t1");
    start_running_turn(&h, &t1, "turn-1");

    notify(
        &h,
        "error",
        json!({ "threadId": "t1", "error": { "message": "rate limited" }, "willRetry": true }),
    )
    .await;
    let store = h.engine.store();
    assert!(store.is_processing(&t1));

    notify(
        &h,
        "error",
        json!({ "threadId": "t1", "error": { "message": "stream closed" }, "willRetry": false }),
    )
    .await;
    assert!(!store.is_processing(&t1));
    let status = store.read(|state| state.status(&t1).cloned().unwrap_or_default());
    assert_eq!(status.phase, TurnPhase::Failed);
    assert_eq!(status.last_error_message.as_deref(), Some("stream closed"));
}

#[tokio::test]
async fn server_echo_replaces_the_optimistic_steer_message() {
    let h = harness();
    let t1 = thread("t1");
    start_running_turn(&h, &t1, "turn-1");
    h.rpc.push("turn/steer", Ok(json!({ "result": { "turnId": "turn-1" } })));

    let outcome = h
        .engine
        .messaging()
        .send_message_to_thread(&ws(), &t1, "use the new API", SendOptions::default())
        .await;
    assert_eq!(outcome, Ok(SendOutcome::Steered));

    notify(
        &h,
        "item/completed",
        json!({
            "threadId": "t1",
            "item": {
                "type": "userMessage",
                "id": "user-7",
                "content": [{ "type": "text", "text": "use the new API" }]
            }
        }),
    )
    .await;
    assert_eq!(item_ids(&h, &t1), ["user-7"]);
}

#[tokio::test]
async fn review_mode_items_toggle_reviewing() {
    let h = harness();
    let t1 = thread("t1");
    let reviewing = || {
        h.engine
            .store()
            .read(|state| state.status(&t1).is_some_and(|status| status.is_reviewing))
    };

    notify(
        &h,
        "item/started",
        json!({ "threadId": "t1", "item": { "type": "enteredReviewMode", "id": "r1", "review": "current changes" } }),
    )
    .await;
    assert!(reviewing());

    notify(
        &h,
        "item/completed",
        json!({ "threadId": "t1", "item": { "type": "exitedReviewMode", "id": "r2", "review": "looks good" } }),
    )
    .await;
    assert!(!reviewing());
}

#[tokio::test]
async fn collab_tool_calls_link_spawned_threads() {
    let h = harness();
    notify(
        &h,
        "item/started",
        json!({
            "threadId": "t1",
            "item": {
                "type": "collabAgentToolCall",
                "id": "call-1",
                "tool": "spawn_agent",
                "receiverThreadIds": ["child-1"]
            }
        }),
    )
    .await;

    let child = thread("child-1");
    let store = h.engine.store();
    assert_eq!(
        store.read(|state| state.parent_by_thread.get(&child).cloned()),
        Some(thread("t1"))
    );
    assert!(store.read(|state| state.thread(&ws(), &child).is_some()));
}

#[tokio::test]
async fn thread_started_adds_the_thread_with_its_name() {
    let h = harness();
    notify(
        &h,
        "thread/started",
        json!({ "thread": { "id": "t5", "name": "Investigate flake", "createdAt": 1_700_000_000 } }),
    )
    .await;
    let summary = h
        .engine
        .store()
        .read(|state| state.thread(&ws(), &thread("t5")).cloned())
        .unwrap();
    assert_eq!(summary.name, "Investigate flake");
    assert_eq!(summary.created_at, 1_700_000_000_000);

    notify(
        &h,
        "thread/name/updated",
        json!({ "threadId": "t5", "threadName": "Flaky test fixed" }),
    )
    .await;
    let name = h
        .engine
        .store()
        .read(|state| state.thread(&ws(), &thread("t5")).map(|thread| thread.name.clone()));
    assert_eq!(name.as_deref(), Some("Flaky test fixed"));
}

#[tokio::test]
async fn plan_and_diff_updates_are_stored_and_cleared_on_the_next_turn() {
    let h = harness();
    let t1 = thread("t1");
    notify(
        &h,
        "turn/plan/updated",
        json!({
            "threadId": "t1",
            "turnId": "turn-1",
            "plan": [{ "step": "write tests", "status": "inProgress" }]
        }),
    )
    .await;
    notify(
        &h,
        "turn/diff/updated",
        json!({ "threadId": "t1", "turnId": "turn-1", "diff": "--- a\n+++ b" }),
    )
    .await;
    let store = h.engine.store();
    assert!(store.read(|state| state.plan_by_thread.get(&t1).is_some_and(|plan| plan.steps.len() == 1)));
    assert!(store.read(|state| state.diff_by_thread.contains_key(&t1)));

    notify(
        &h,
        "turn/started",
        json!({ "threadId": "t1", "turnId": "turn-2" }),
    )
    .await;
    assert!(store.read(|state| !state.plan_by_thread.contains_key(&t1)));
    assert!(store.read(|state| !state.diff_by_thread.contains_key(&t1)));
}

#[tokio::test]
async fn unknown_notifications_are_ignored() {
    let h = harness();
    assert!(!notify(&h, "thread/tokenUsage/updated", json!({ "threadId": "t1" })).await);
}

#[tokio::test]
async fn approvals_are_queued_and_answered() {
    let h = harness();
    h.rpc.set_default("approval/respond", Ok(json!({ "result": {} })));
    let request_id = json!(17);

    let handled = h
        .engine
        .handle_notification(
            "ws-1",
            "item/commandExecution/requestApproval",
            &json!({ "threadId": "t1", "command": "rm -rf target" }),
            Some(&request_id),
        )
        .await;
    assert!(handled);
    let store = h.engine.store();
    assert_eq!(store.read(|state| state.approvals.len()), 1);

    h.engine
        .approvals()
        .respond_to_approval(&ws(), &request_id, ApprovalDecision::AcceptForSession)
        .await
        .unwrap();
    assert!(store.read(|state| state.approvals.is_empty()));
    let args = &h.rpc.args("approval/respond")[0];
    assert_eq!(args["id"], json!(17));
    assert_eq!(args["result"], json!({ "decision": "acceptForSession" }));
}

#[tokio::test]
async fn failed_approval_responses_keep_the_request() {
    let h = harness();
    h.rpc.push("approval/respond", Err("request expired".to_owned()));
    let request_id = json!("req-1");
    h.engine
        .handle_notification(
            "ws-1",
            "item/fileChange/requestApproval",
            &json!({ "threadId": "t1" }),
            Some(&request_id),
        )
        .await;

    let result = h
        .engine
        .approvals()
        .respond_to_approval(&ws(), &request_id, ApprovalDecision::Decline)
        .await;
    assert_eq!(result, Err("request expired".to_owned()));
    assert_eq!(h.engine.store().read(|state| state.approvals.len()), 1);
}

#[tokio::test]
async fn user_input_requests_are_answered_per_question() {
    let h = harness();
    h.rpc.set_default("userInput/respond", Ok(json!({ "result": {} })));
    let request_id = json!(3);
    h.engine
        .handle_notification(
            "ws-1",
            "item/tool/requestUserInput",
            &json!({
                "threadId": "t1",
                "turnId": "turn-1",
                "questions": [{
                    "id": "q1",
                    "header": "Branch",
                    "question": "Which branch?",
                    "options": [{ "label": "main" }, { "label": "dev" }]
                }]
            }),
            Some(&request_id),
        )
        .await;
    let store = h.engine.store();
    let prompts = store.read(|state| {
        state
            .user_input_requests
            .first()
            .map(|request| request.prompts.clone())
            .unwrap_or_default()
    });
    assert_eq!(prompts.len(), 1);
    assert_eq!(prompts[0].options, ["main", "dev"]);

    let answers = BTreeMap::from([("q1".to_owned(), vec!["dev".to_owned()])]);
    h.engine
        .approvals()
        .respond_to_user_input(&WorkspaceId::new("ws-1"), &request_id, answers)
        .await
        .unwrap();
    assert!(store.read(|state| state.user_input_requests.is_empty()));
    assert_eq!(
        h.rpc.args("userInput/respond")[0]["result"],
        json!({ "answers": { "q1": { "answers": ["dev"] } } })
    );
}
