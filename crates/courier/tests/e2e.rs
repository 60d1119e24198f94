// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end pipeline tests over the full stack: ingestion, routing,
//! rate limiting, turn execution, approvals, and audit.

use courier_config::LimitsConfig;
use courier_core::types::ApprovalStatus;
use courier_queue::names;
use courier_storage::queries::updates;
use courier_test_utils::{ScriptEvent, TestHarness};
use serde_json::json;

const CHAT: i64 = 100;
const USER: i64 = 2001;

#[tokio::test]
async fn duplicate_webhook_yields_one_row_and_one_job() {
    let harness = TestHarness::builder().build().await.unwrap();

    let first = harness
        .deliver_update(TestHarness::text_update(42, CHAT, USER, "hello"))
        .await
        .unwrap();
    assert!(!first.is_duplicate());

    let second = harness
        .deliver_update(TestHarness::text_update(42, CHAT, USER, "hello"))
        .await
        .unwrap();
    assert!(second.is_duplicate());

    // Exactly one stored row.
    let row = updates::get_update(&harness.db, 42).await.unwrap().unwrap();
    assert_eq!(row.update_id, 42);

    // Exactly one update job.
    let job = harness.queue.dequeue(names::UPDATES).await.unwrap().unwrap();
    assert_eq!(job.job_id, "update-42");
    harness.queue.ack(job.id).await.unwrap();
    assert!(harness.queue.dequeue(names::UPDATES).await.unwrap().is_none());
}

#[tokio::test]
async fn burst_limit_denies_the_fourth_message() {
    let harness = TestHarness::builder()
        .with_limits(LimitsConfig {
            free_burst_max: 3,
            free_minute_max: 100,
            free_daily_max: 1000,
            chat_minute_max: 1000,
            ..LimitsConfig::default()
        })
        .build()
        .await
        .unwrap();

    for i in 0..3 {
        harness.provider.push_text(&format!("reply {i}"));
    }
    for i in 0..4 {
        harness.send_text(10 + i, CHAT, USER, "message").await.unwrap();
    }

    let texts = harness.transport.texts_for(CHAT);
    // Three agent replies plus one rate-limit notice.
    assert_eq!(texts.len(), 4, "texts: {texts:?}");
    assert!(texts[3].contains("too quickly"), "got: {}", texts[3]);
    assert_eq!(harness.provider.remaining(), 0);
}

#[tokio::test]
async fn approval_happy_path_resumes_with_confirmation() {
    let harness = TestHarness::builder().build().await.unwrap();

    // Turn 1: the model wants to move value.
    harness.provider.push_script(vec![
        ScriptEvent::Text("Preparing the transfer.".into()),
        ScriptEvent::ToolUse {
            id: "tc-1".into(),
            name: "sendMessage".into(),
            input: json!({"to": "EQabc", "amount": 2.5}),
        },
        ScriptEvent::Stop,
    ]);
    // Turn 2 (resume): a trivial completion the policy must rewrite.
    harness.provider.push_text("done");

    harness.send_text(1, CHAT, USER, "send 2.5 to EQabc").await.unwrap();

    // The tool has not run; an approval card is up.
    assert_eq!(harness.send_tool.calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    let token = harness.last_approval_token().expect("approval card presented");
    let approval = harness.engine.get_by_token(&token).await.unwrap().unwrap();
    assert_eq!(approval.status, ApprovalStatus::Requested);

    // Tap Approve within the TTL.
    let card = harness.transport.last_keyboard_message().unwrap();
    harness
        .tap(2, CHAT, USER, card.message_id, &format!("ap:{token}:approve"))
        .await
        .unwrap();

    // Approved, executed, confirmed.
    let approval = harness.engine.get_by_token(&token).await.unwrap().unwrap();
    assert_eq!(approval.status, ApprovalStatus::Approved);
    assert_eq!(harness.send_tool.calls.load(std::sync::atomic::Ordering::SeqCst), 1);

    let texts = harness.transport.texts_for(CHAT);
    let confirmation = texts
        .iter()
        .find(|t| t.starts_with("Approval received."))
        .expect("forced confirmation message");
    assert!(confirmation.contains("Protected action executed"));

    // Audit: requested then decided, chain intact.
    let events = harness.audit.recent(20).await.unwrap();
    let types: Vec<&str> = events.iter().rev().map(|e| e.event_type.as_str()).collect();
    assert!(types.contains(&"approval.requested"));
    assert!(types.contains(&"approval.decided"));
    assert!(harness.audit.verify_chain().await.unwrap().intact());
}

#[tokio::test]
async fn cautious_profile_requires_a_double_tap() {
    let harness = TestHarness::builder().build().await.unwrap();

    // The user opts into the cautious profile via a settings chip.
    harness.tap(1, CHAT, USER, 1, "cfg:user:risk:cautious").await.unwrap();

    harness.provider.push_script(vec![ScriptEvent::ToolUse {
        id: "tc-1".into(),
        name: "sendMessage".into(),
        input: json!({"to": "EQabc", "amount": 150.0}),
    }, ScriptEvent::Stop]);
    harness.provider.push_text("done");

    harness.send_text(2, CHAT, USER, "send it all").await.unwrap();
    let token = harness.last_approval_token().unwrap();
    let card = harness.transport.last_keyboard_message().unwrap();

    // First tap: a confirmation toast, no decision.
    harness
        .tap(3, CHAT, USER, card.message_id, &format!("ap:{token}:approve"))
        .await
        .unwrap();
    let approval = harness.engine.get_by_token(&token).await.unwrap().unwrap();
    assert_eq!(approval.status, ApprovalStatus::Requested);
    let acks = harness.transport.callback_acks.lock().unwrap().clone();
    let toast = acks.last().unwrap().1.as_deref().unwrap();
    assert!(toast.contains("tap Approve again"), "got: {toast}");

    // Second tap within the window: decided.
    harness
        .tap(4, CHAT, USER, card.message_id, &format!("ap:{token}:approve"))
        .await
        .unwrap();
    let approval = harness.engine.get_by_token(&token).await.unwrap().unwrap();
    assert_eq!(approval.status, ApprovalStatus::Approved);
}

#[tokio::test]
async fn provider_fallback_recovers_a_turn_pre_stream() {
    let harness = TestHarness::builder().with_fallback_provider().build().await.unwrap();

    harness
        .provider
        .push_script(vec![ScriptEvent::Error("primary exploded".into())]);
    harness
        .fallback
        .as_ref()
        .unwrap()
        .push_text("Recovered answer from the fallback.");

    harness.send_text(1, CHAT, USER, "hello").await.unwrap();

    let texts = harness.transport.texts_for(CHAT);
    assert_eq!(texts, vec!["Recovered answer from the fallback."]);

    let events = harness.audit.recent(10).await.unwrap();
    let fallback = events
        .iter()
        .find(|e| e.event_type == "agent.turn.provider.fallback")
        .expect("fallback audit event");
    assert_eq!(fallback.metadata["primaryProvider"], "mock:primary");
    assert_eq!(fallback.metadata["fallbackProvider"], "mock:fallback");
}

#[tokio::test]
async fn mid_stream_failure_dead_letters_with_a_friendly_line() {
    let harness = TestHarness::builder().build().await.unwrap();

    // Every attempt emits deltas then dies: never fallback-eligible.
    for _ in 0..5 {
        harness.provider.push_script(vec![
            ScriptEvent::Text("partial ".into()),
            ScriptEvent::Error("stream cut".into()),
        ]);
    }

    harness.send_text(1, CHAT, USER, "hello").await.unwrap();

    // Burn through the retry budget.
    for _ in 0..5 {
        harness.make_jobs_due().await.unwrap();
        harness.drain().await.unwrap();
    }

    let letters = harness.queue.list_dead_letters(10).await.unwrap();
    assert_eq!(letters.len(), 1);
    assert!(letters[0].0.starts_with("turn-update-1"));
    assert!(!letters[0].2.is_empty(), "dead letter carries the correlation id");

    let texts = harness.transport.texts_for(CHAT);
    assert_eq!(
        texts.iter().filter(|t| t.contains("could not complete")).count(),
        1,
        "exactly one friendly failure line: {texts:?}"
    );
}

#[tokio::test]
async fn untouched_approval_expires_and_notifies() {
    let harness = TestHarness::builder().build().await.unwrap();

    harness.provider.push_script(vec![ScriptEvent::ToolUse {
        id: "tc-1".into(),
        name: "sendMessage".into(),
        input: json!({"to": "EQabc", "amount": 2.5}),
    }, ScriptEvent::Stop]);
    harness.send_text(1, CHAT, USER, "send 2.5").await.unwrap();

    let token = harness.last_approval_token().unwrap();

    // TTL passes; the expiry job fires.
    harness.expire_approvals_now().await.unwrap();
    harness.make_jobs_due().await.unwrap();
    harness.run_approval_jobs().await.unwrap();

    let approval = harness.engine.get_by_token(&token).await.unwrap().unwrap();
    assert_eq!(approval.status, ApprovalStatus::Expired);

    // The prompt card was edited and a follow-up notice sent.
    let edits = harness.transport.edited.lock().unwrap().clone();
    assert!(edits.iter().any(|e| e.text.contains("expired")));
    let texts = harness.transport.texts_for(CHAT);
    assert!(texts.iter().any(|t| t.contains("expired")));

    // A late tap is rejected.
    let card = harness.transport.last_keyboard_message().unwrap();
    harness
        .tap(2, CHAT, USER, card.message_id, &format!("ap:{token}:approve"))
        .await
        .unwrap();
    let approval = harness.engine.get_by_token(&token).await.unwrap().unwrap();
    assert_eq!(approval.status, ApprovalStatus::Expired);
}

#[tokio::test]
async fn countdown_rerenders_the_pending_card() {
    let harness = TestHarness::builder().build().await.unwrap();

    harness.provider.push_script(vec![ScriptEvent::ToolUse {
        id: "tc-1".into(),
        name: "sendMessage".into(),
        input: json!({"amount": 2.5}),
    }, ScriptEvent::Stop]);
    harness.send_text(1, CHAT, USER, "send 2.5").await.unwrap();

    harness.make_jobs_due().await.unwrap();
    harness.run_approval_jobs().await.unwrap();

    let edits = harness.transport.edited.lock().unwrap().clone();
    let refresh = edits.iter().find(|e| e.text.contains("Expires in"));
    assert!(refresh.is_some(), "countdown must re-render the card");
    assert!(refresh.unwrap().keyboard.is_some());

    // The countdown re-enqueued itself.
    harness.make_jobs_due().await.unwrap();
    let next = harness
        .queue
        .dequeue(names::APPROVAL_COUNTDOWNS)
        .await
        .unwrap();
    assert!(next.is_some());
}

#[tokio::test]
async fn read_only_turn_runs_tools_without_approval() {
    let harness = TestHarness::builder().build().await.unwrap();

    harness.provider.push_script(vec![ScriptEvent::ToolUse {
        id: "tc-1".into(),
        name: "getBalance".into(),
        input: json!({"address": "EQabc"}),
    }, ScriptEvent::Stop]);
    harness.provider.push_text("You hold 12.4.");

    harness.send_text(1, CHAT, USER, "balance?").await.unwrap();

    assert_eq!(
        harness.balance_tool.calls.load(std::sync::atomic::Ordering::SeqCst),
        1
    );
    let texts = harness.transport.texts_for(CHAT);
    assert_eq!(texts, vec!["You hold 12.4."]);
    assert!(harness.last_approval_token().is_none());
}

#[tokio::test]
async fn commands_answer_without_spending_model_turns() {
    let harness = TestHarness::builder().build().await.unwrap();

    harness.send_text(1, CHAT, USER, "/start").await.unwrap();
    harness.send_text(2, CHAT, USER, "/settings").await.unwrap();

    let texts = harness.transport.texts_for(CHAT);
    assert_eq!(texts.len(), 2);
    assert!(texts[1].contains("Your settings"));
    // No provider scripts were consumed or defaulted: zero turns ran.
    assert_eq!(harness.queue.depth().await.unwrap(), 0);
}

#[tokio::test]
async fn recovery_sweep_rescues_a_persisted_but_unqueued_update() {
    let harness = TestHarness::builder().build().await.unwrap();
    harness.provider.push_text("rescued reply");

    // Simulate an update persisted while the queue was unavailable.
    updates::try_insert(
        &harness.db,
        77,
        &TestHarness::text_update(77, CHAT, USER, "are you there?").to_string(),
    )
    .await
    .unwrap();

    let recovered = harness.ingestor.recover_once().await.unwrap();
    assert_eq!(recovered, 1);
    harness.drain().await.unwrap();

    let texts = harness.transport.texts_for(CHAT);
    assert_eq!(texts, vec!["rescued reply"]);
    let row = updates::get_update(&harness.db, 77).await.unwrap().unwrap();
    assert_eq!(row.status, courier_core::types::UpdateStatus::Processed);
}
