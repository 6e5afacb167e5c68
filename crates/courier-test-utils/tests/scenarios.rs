// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end dispatch flows over a full `Courier`.
//!
//! Each test builds an isolated harness: fresh SQLite, a manual clock, a
//! mocked SMTP provider and the real Twilio callback parser.

use std::time::Duration as StdDuration;

use chrono::Duration;
use courier_core::types::{CanonicalEvent, WebhookPayload};
use courier_core::{Channel, Clock, DeliveryStatus, ProviderKind, ScheduledStatus};
use courier_dispatch::{DispatchOutcome, RetryPolicy};
use courier_test_utils::{TestHarness, email_draft, sms_draft};

// ---- Send, then reconcile by webhook ----

#[tokio::test]
async fn email_send_records_external_id_and_sent_event() {
    let harness = TestHarness::new().await.unwrap();
    harness.smtp().succeed_with("MID-1");

    let draft = email_draft("a@x.com").with_from("b@y.com");
    let result = harness.courier.send_now(draft).await.unwrap();
    assert!(result.success);
    assert_eq!(result.provider, "smtp");

    let view = harness.courier.communication(result.id.unwrap()).await.unwrap();
    assert_eq!(view.record.status, DeliveryStatus::Sent);
    assert_eq!(view.record.external_id.as_deref(), Some("MID-1"));
    assert!(view.record.sent_at.is_some());
    assert_eq!(view.events.len(), 1);
    assert_eq!(view.events[0].event_type, CanonicalEvent::Sent);

    let sent = harness.smtp().sent_messages();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "a@x.com");
    assert_eq!(sent[0].from, "b@y.com");
    assert_eq!(sent[0].subject.as_deref(), Some("Hi"));
    assert_eq!(sent[0].body, "text");
}

#[tokio::test]
async fn twilio_delivered_callback_completes_the_record() {
    let harness = TestHarness::new().await.unwrap();
    harness.smtp().succeed_with("MID-1");
    let id = harness
        .courier
        .send_now(email_draft("a@x.com").with_from("b@y.com"))
        .await
        .unwrap()
        .id
        .unwrap();

    let payload = WebhookPayload::form("MessageSid=MID-1&MessageStatus=delivered");
    let report = harness.courier.ingest_webhook("twilio", &payload).await.unwrap();
    assert_eq!(report.applied, 1);
    assert_eq!(report.status_changes, 1);

    let view = harness.courier.communication(id).await.unwrap();
    assert_eq!(view.record.status, DeliveryStatus::Delivered);
    assert!(view.record.delivered_at.is_some());
    assert_eq!(view.events.len(), 2);
    assert_eq!(view.events[1].event_type, CanonicalEvent::Delivered);
}

#[tokio::test]
async fn terminal_status_never_regresses() {
    let harness = TestHarness::builder()
        .with_mock(ProviderKind::Twilio)
        .build()
        .await
        .unwrap();
    harness.mock(ProviderKind::Twilio).succeed_with("SM42");
    let id = harness
        .courier
        .send_now(sms_draft("+15550002222"))
        .await
        .unwrap()
        .id
        .unwrap();
    let record = harness.store.get_communication(id).await.unwrap().unwrap();
    assert_eq!(record.provider.as_deref(), Some("twilio"));
    assert_eq!(record.from_address.as_deref(), Some("+15550001111"));

    let twilio = harness.mock(ProviderKind::Twilio);
    twilio
        .emit("SM42", CanonicalEvent::Delivered)
        .emit("SM42", CanonicalEvent::Failed)
        .emit("SM42", CanonicalEvent::Sent)
        .emit("SM42", CanonicalEvent::Bounced);
    let report = harness
        .courier
        .ingest_webhook("twilio", &WebhookPayload::form(""))
        .await
        .unwrap();
    assert_eq!(report.applied, 4);
    assert_eq!(report.status_changes, 1);

    let view = harness.courier.communication(id).await.unwrap();
    assert_eq!(view.record.status, DeliveryStatus::Delivered);
    assert!(view.record.failed_at.is_none());
    // every callback is kept in the history
    assert_eq!(view.events.len(), 5);
}

#[tokio::test]
async fn callback_for_unknown_message_is_ignored() {
    let harness = TestHarness::new().await.unwrap();
    let payload = WebhookPayload::form("MessageSid=SMdeadbeef&MessageStatus=failed");
    let report = harness.courier.ingest_webhook("twilio", &payload).await.unwrap();
    assert_eq!(report.received, 1);
    assert_eq!(report.unmatched, 1);
    assert_eq!(report.applied, 0);
}

// ---- Scheduling ----

#[tokio::test]
async fn scheduled_send_waits_for_its_time() {
    let harness = TestHarness::new().await.unwrap();
    let at = harness.clock.now() + Duration::hours(1);
    let scheduled = harness.courier.schedule(&email_draft("a@x.com"), at).await.unwrap();

    let report = harness.courier.process_due().await.unwrap();
    assert_eq!(report.claimed, 0);
    assert_eq!(harness.smtp().call_count(), 0);
    let record = harness.store.get_communication(scheduled.id).await.unwrap().unwrap();
    assert_eq!(record.scheduled_status, ScheduledStatus::Scheduled);

    harness.clock.advance(Duration::minutes(61));
    let report = harness.courier.process_due().await.unwrap();
    assert_eq!(report.sent, 1);
    assert_eq!(harness.smtp().call_count(), 1);
    let record = harness.store.get_communication(scheduled.id).await.unwrap().unwrap();
    assert_eq!(record.scheduled_status, ScheduledStatus::Immediate);
    assert_eq!(record.status, DeliveryStatus::Sent);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_process_due_sends_each_record_once() {
    let harness = TestHarness::builder().with_batch_size(50).build().await.unwrap();
    let at = harness.clock.now();
    for n in 0..10 {
        harness
            .courier
            .schedule(&email_draft(&format!("lead{n}@x.com")), at)
            .await
            .unwrap();
    }

    let runners: Vec<_> = (0..4)
        .map(|_| {
            let courier = harness.courier.clone();
            tokio::spawn(async move { courier.process_due().await.unwrap() })
        })
        .collect();
    let mut sent = 0;
    for runner in runners {
        sent += runner.await.unwrap().sent;
    }

    assert_eq!(sent, 10);
    assert_eq!(harness.smtp().call_count(), 10);
}

#[tokio::test]
async fn cancelled_schedule_is_never_sent() {
    let harness = TestHarness::new().await.unwrap();
    let at = harness.clock.now() + Duration::minutes(30);
    let scheduled = harness.courier.schedule(&email_draft("a@x.com"), at).await.unwrap();
    assert!(harness.courier.cancel(scheduled.id).await.unwrap());

    harness.clock.advance(Duration::hours(1));
    harness.courier.process_due().await.unwrap();
    assert_eq!(harness.smtp().call_count(), 0);
}

// ---- Compliance ----

#[tokio::test]
async fn opt_out_blocks_marketing_but_not_transactional() {
    let harness = TestHarness::new().await.unwrap();
    let marketing = email_draft("a@x.com").with_category("marketing");
    harness
        .courier
        .preferences()
        .opt_out(marketing.subject_entity, Channel::Email, Some("marketing"), None, None)
        .await
        .unwrap();

    let id = harness.courier.create(&marketing).await.unwrap();
    let outcome = harness.courier.dispatcher().dispatch(id).await.unwrap();
    assert!(matches!(outcome, DispatchOutcome::ComplianceBlocked { .. }));
    assert_eq!(harness.smtp().call_count(), 0);

    let transactional = email_draft("a@x.com").with_category("transactional");
    let result = harness.courier.send_now(transactional).await.unwrap();
    assert!(result.success);
    assert_eq!(harness.smtp().call_count(), 1);
}

#[tokio::test]
async fn unsubscribe_link_opts_out_and_is_idempotent() {
    let harness = TestHarness::new().await.unwrap();
    let draft = email_draft("a@x.com").with_category("newsletter");
    let pref = harness
        .courier
        .preferences()
        .opt_in(draft.subject_entity, Channel::Email, Some("newsletter"), None)
        .await
        .unwrap();

    let gate = harness.courier.preferences();
    let first = gate.unsubscribe(&pref.unsubscribe_token, Some("203.0.113.9")).await.unwrap();
    let second = gate.unsubscribe(&pref.unsubscribe_token, None).await.unwrap();
    assert!(!first.unwrap().opted_in);
    assert!(!second.unwrap().opted_in);
    assert_eq!(gate.audit_trail(pref.id).await.unwrap().len(), 3);

    let result = harness.courier.send_now(draft).await.unwrap();
    assert!(!result.success);
    assert_eq!(harness.smtp().call_count(), 0);
}

// ---- Retry ----

#[tokio::test]
async fn transient_failures_stop_after_max_attempts() {
    let harness = TestHarness::new().await.unwrap();
    harness
        .smtp()
        .fail_transient("421 busy (1)")
        .fail_transient("421 busy (2)")
        .fail_transient("421 busy (3)");
    let id = harness.courier.send(email_draft("a@x.com")).await.unwrap().id.unwrap();
    let worker = harness.courier.worker(StdDuration::from_secs(1));

    worker.tick().await.unwrap();
    harness.clock.advance(Duration::seconds(30));
    worker.tick().await.unwrap();
    harness.clock.advance(Duration::seconds(60));
    worker.tick().await.unwrap();
    harness.clock.advance(Duration::hours(2));
    worker.tick().await.unwrap();

    assert_eq!(harness.smtp().call_count(), 3);
    let record = harness.store.get_communication(id).await.unwrap().unwrap();
    assert_eq!(record.status, DeliveryStatus::Failed);
    assert!(record.error_message.unwrap().contains("421 busy (3)"));
    assert!(record.failed_at.is_some());
}

#[tokio::test]
async fn single_attempt_policy_fails_immediately() {
    let harness = TestHarness::builder()
        .with_retry_policy(RetryPolicy {
            max_attempts: 1,
            ..RetryPolicy::default()
        })
        .build()
        .await
        .unwrap();
    harness.smtp().fail_transient("connection reset");

    let result = harness.courier.send_now(email_draft("a@x.com")).await.unwrap();
    assert!(!result.success);
    assert_eq!(result.status, DeliveryStatus::Failed);
    assert_eq!(harness.smtp().call_count(), 1);
}

#[tokio::test]
async fn configuration_error_is_not_retried() {
    let harness = TestHarness::new().await.unwrap();
    harness.smtp().fail_config("smtp_host is not set");
    let id = harness.courier.send(email_draft("a@x.com")).await.unwrap().id.unwrap();
    let worker = harness.courier.worker(StdDuration::from_secs(1));

    worker.tick().await.unwrap();
    harness.clock.advance(Duration::hours(2));
    worker.tick().await.unwrap();

    assert_eq!(harness.smtp().call_count(), 1);
    let record = harness.store.get_communication(id).await.unwrap().unwrap();
    assert_eq!(record.status, DeliveryStatus::Failed);
}

// ---- Idempotency ----

#[tokio::test]
async fn repeated_send_of_a_sent_record_makes_no_provider_call() {
    let harness = TestHarness::new().await.unwrap();
    harness.smtp().succeed_with("MID-5");
    let id = harness
        .courier
        .send_now(email_draft("a@x.com"))
        .await
        .unwrap()
        .id
        .unwrap();

    for _ in 0..2 {
        let again = harness.courier.deliver(id).await.unwrap();
        assert!(again.success);
        assert_eq!(again.external_id.as_deref(), Some("MID-5"));
    }
    assert_eq!(harness.smtp().call_count(), 1);
    assert_eq!(harness.courier.communication(id).await.unwrap().events.len(), 1);
}

#[tokio::test]
async fn disabled_channel_fails_without_provider_call() {
    let harness = TestHarness::builder()
        .with_env(
            Channel::Email,
            courier_core::ChannelSettings {
                is_enabled: Some(false),
                ..Default::default()
            },
        )
        .build()
        .await
        .unwrap();
    let result = harness.courier.send_now(email_draft("a@x.com")).await.unwrap();
    assert!(!result.success);
    assert!(result.error.unwrap().contains("email is not configured"));
    assert_eq!(harness.smtp().call_count(), 0);
}
