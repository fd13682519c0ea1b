// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end tests for the messaging pipeline over in-memory adapters.
//!
//! Each test builds an isolated TestHarness. Tests are independent and
//! order-insensitive.

use std::time::Duration;

use parley_core::types::{
    DeliveryStatus, MediaKind, Message, MessageDirection, MessageKind, ProbeAnswer, SendPayload,
};
use parley_core::{ConversationId, InstanceId, ParleyError};
use parley_messaging::{OutboundMedia, ProbeState};
use parley_test_utils::{
    conversation, DispatchScript, FunctionCall, ProbeScript, TargetScript, TestHarness,
};

const ANA: &str = "5511999998888";

fn connected() -> ProbeScript {
    ProbeScript::Answer(ProbeAnswer::Connected)
}

fn inbound(conversation: &str, text: &str) -> Message {
    let mut message = Message::outbound(
        ConversationId::from(conversation),
        MessageKind::Text,
        Some(text.to_string()),
        None,
    );
    message.direction = MessageDirection::Inbound;
    message.status = DeliveryStatus::Delivered;
    message
}

// ---- Test 1: Starting conversations ----

#[tokio::test]
async fn test_start_normalizes_address_and_assigns_initiator() {
    let harness = TestHarness::builder()
        .with_instance("sales", "Sales", connected())
        .build()
        .unwrap();

    let thread = harness
        .session
        .start("(11) 99999-8888", &InstanceId::from("sales"))
        .await
        .unwrap();

    assert_eq!(thread.conversation.counterparty_address, ANA);
    assert_eq!(thread.conversation.assigned_user_id, Some(harness.user()));
    assert_eq!(harness.store.conversations().len(), 1);
}

#[tokio::test]
async fn test_start_reuses_conversation_on_same_instance() {
    let harness = TestHarness::builder()
        .with_instance("sales", "Sales", connected())
        .with_conversation(conversation("c1", ANA, "sales", 0))
        .build()
        .unwrap();

    let thread = harness
        .session
        .start("+55 11 99999-8888", &InstanceId::from("sales"))
        .await
        .unwrap();

    assert_eq!(thread.conversation.id, ConversationId::from("c1"));
    assert_eq!(harness.store.conversations().len(), 1);
}

#[tokio::test]
async fn test_start_on_other_instance_creates_sibling() {
    let harness = TestHarness::builder()
        .with_instance("sales", "Sales", connected())
        .with_instance("support", "Support", connected())
        .with_conversation(conversation("c1", ANA, "sales", 0))
        .build()
        .unwrap();

    let thread = harness
        .session
        .start(ANA, &InstanceId::from("support"))
        .await
        .unwrap();

    assert_ne!(thread.conversation.id, ConversationId::from("c1"));
    assert_eq!(thread.conversation.channel_instance_id, InstanceId::from("support"));
    assert_eq!(thread.siblings.len(), 2);
    assert_eq!(harness.store.conversations().len(), 2);

    let switcher = harness.session.switcher();
    assert_eq!(switcher.len(), 2);
    assert!(switcher
        .iter()
        .all(|e| e.state == ProbeState::Verified(parley_core::ConnectivityStatus::Connected)));
}

#[tokio::test]
async fn test_disconnected_instance_blocks_start() {
    let harness = TestHarness::builder()
        .with_instance("down", "Old phone", ProbeScript::Answer(ProbeAnswer::Disconnected))
        .build()
        .unwrap();

    let err = harness
        .session
        .start(ANA, &InstanceId::from("down"))
        .await
        .unwrap_err();

    assert!(matches!(err, ParleyError::ChannelUnavailable { .. }));
    assert!(err.notice().contains("Old phone"), "got: {}", err.notice());
    assert!(harness.store.conversations().is_empty());
}

#[tokio::test]
async fn test_failed_probe_does_not_block_start() {
    let harness = TestHarness::builder()
        .with_instance("flaky", "Flaky", ProbeScript::Fail)
        .build()
        .unwrap();

    let thread = harness
        .session
        .start(ANA, &InstanceId::from("flaky"))
        .await
        .unwrap();
    assert_eq!(thread.conversation.channel_instance_id, InstanceId::from("flaky"));
}

#[tokio::test]
async fn test_short_address_is_rejected() {
    let harness = TestHarness::builder()
        .with_instance("sales", "Sales", connected())
        .build()
        .unwrap();

    let err = harness
        .session
        .start("12345", &InstanceId::from("sales"))
        .await
        .unwrap_err();
    assert!(matches!(err, ParleyError::InvalidAddress { .. }));
    assert!(harness.functions.calls().is_empty());
}

// ---- Test 2: Sibling switching ----

#[tokio::test]
async fn test_open_selects_most_recent_and_switch_sends_on_own_instance() {
    let harness = TestHarness::builder()
        .with_instance("sales", "Sales", connected())
        .with_instance("support", "Support", connected())
        .with_conversation(conversation("c-sales", ANA, "sales", 10))
        .with_conversation(conversation("c-support", ANA, "support", 0))
        .build()
        .unwrap();

    let thread = harness.session.open(ANA, None).await.unwrap();
    assert_eq!(thread.conversation.id, ConversationId::from("c-sales"));

    let switched = harness
        .session
        .switch_instance(&InstanceId::from("support"))
        .unwrap();
    assert_eq!(switched.id, ConversationId::from("c-support"));

    harness.session.send_text("hello from support").await.unwrap();

    let sent = harness.functions.dispatched();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].channel_instance_id, InstanceId::from("support"));
    assert_eq!(sent[0].conversation_id, ConversationId::from("c-support"));
    assert_eq!(sent[0].recipient, ANA);

    // Siblings keep their own history.
    assert!(harness.store.messages(&ConversationId::from("c-sales")).is_empty());
    let messages = harness.store.messages(&ConversationId::from("c-support"));
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].status, DeliveryStatus::Sent);
}

#[tokio::test]
async fn test_switch_to_unknown_instance_is_not_found() {
    let harness = TestHarness::builder()
        .with_instance("sales", "Sales", connected())
        .with_conversation(conversation("c1", ANA, "sales", 0))
        .build()
        .unwrap();

    harness.session.open(ANA, None).await.unwrap();
    assert!(harness.session.switcher().is_empty());
    assert!(matches!(
        harness.session.switch_instance(&InstanceId::from("other")),
        Err(ParleyError::NotFound { .. })
    ));
}

// ---- Test 3: Text sends ----

#[tokio::test]
async fn test_provider_rejection_marks_message_failed() {
    let harness = TestHarness::builder()
        .with_instance("sales", "Sales", connected())
        .with_conversation(conversation("c1", ANA, "sales", 0))
        .build()
        .unwrap();
    harness
        .functions
        .script_dispatch(DispatchScript::Reject("number is not on WhatsApp".into()));

    harness.session.open(ANA, None).await.unwrap();
    let err = harness.session.send_text("hi").await.unwrap_err();
    assert!(matches!(err, ParleyError::ProviderRejected { .. }));

    let messages = harness.store.messages(&ConversationId::from("c1"));
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].status, DeliveryStatus::Failed);
    assert_eq!(
        messages[0].failure_detail.as_deref(),
        Some("number is not on WhatsApp")
    );
}

#[tokio::test]
async fn test_transport_failure_marks_message_failed() {
    let harness = TestHarness::builder()
        .with_instance("sales", "Sales", connected())
        .with_conversation(conversation("c1", ANA, "sales", 0))
        .build()
        .unwrap();
    harness
        .functions
        .script_dispatch(DispatchScript::Fail("connection reset".into()));

    harness.session.open(ANA, None).await.unwrap();
    assert!(matches!(
        harness.session.send_text("hi").await,
        Err(ParleyError::Transport { .. })
    ));

    let messages = harness.store.messages(&ConversationId::from("c1"));
    assert_eq!(messages[0].status, DeliveryStatus::Failed);
    assert!(messages[0]
        .failure_detail
        .as_deref()
        .is_some_and(|d| d.starts_with("sending:")));
}

#[tokio::test]
async fn test_disconnected_instance_blocks_send() {
    let harness = TestHarness::builder()
        .with_instance("down", "Down", ProbeScript::Answer(ProbeAnswer::Disconnected))
        .with_conversation(conversation("c1", ANA, "down", 0))
        .build()
        .unwrap();

    harness.session.open(ANA, None).await.unwrap();
    assert!(matches!(
        harness.session.send_text("hi").await,
        Err(ParleyError::ChannelUnavailable { .. })
    ));
    assert!(harness.functions.dispatched().is_empty());
    assert_eq!(harness.store.message_count(), 0);
}

#[tokio::test]
async fn test_send_without_open_thread_fails() {
    let harness = TestHarness::builder().build().unwrap();
    assert!(matches!(
        harness.session.send_text("hi").await,
        Err(ParleyError::NotFound { .. })
    ));
}

#[tokio::test]
async fn test_receipt_during_send_is_not_regressed() {
    let harness = TestHarness::builder()
        .with_instance("sales", "Sales", connected())
        .with_conversation(conversation("c1", ANA, "sales", 0))
        .build()
        .unwrap();
    let store = harness.store.clone();
    harness.functions.on_dispatch(move |request| {
        assert!(store.apply_receipt(&request.message_id, DeliveryStatus::Delivered));
    });

    harness.session.open(ANA, None).await.unwrap();
    let sent = harness.session.send_text("hi").await.unwrap();
    assert_eq!(sent.status, DeliveryStatus::Sent);

    let messages = harness.store.messages(&ConversationId::from("c1"));
    assert_eq!(messages[0].status, DeliveryStatus::Delivered);
}

#[tokio::test]
async fn test_unsaved_failure_is_reported_with_outcome() {
    let harness = TestHarness::builder()
        .with_instance("sales", "Sales", connected())
        .with_conversation(conversation("c1", ANA, "sales", 0))
        .build()
        .unwrap();
    let store = harness.store.clone();
    harness.functions.on_dispatch(move |_| store.set_unavailable(true));
    harness
        .functions
        .script_dispatch(DispatchScript::Reject("number is not on WhatsApp".into()));

    harness.session.open(ANA, None).await.unwrap();
    let err = harness.session.send_text("hi").await.unwrap_err();
    match &err {
        ParleyError::DataUnavailable { message, .. } => {
            assert!(
                message.contains("failed (number is not on WhatsApp)"),
                "got: {message}"
            );
        }
        other => panic!("expected DataUnavailable, got {other:?}"),
    }
    assert!(err.notice().contains("could not be saved"));
}

#[tokio::test]
async fn test_unsaved_sent_status_is_reported() {
    let harness = TestHarness::builder()
        .with_instance("sales", "Sales", connected())
        .with_conversation(conversation("c1", ANA, "sales", 0))
        .build()
        .unwrap();
    let store = harness.store.clone();
    harness.functions.on_dispatch(move |_| store.set_unavailable(true));

    harness.session.open(ANA, None).await.unwrap();
    match harness.session.send_text("hi").await {
        Err(ParleyError::DataUnavailable { message, .. }) => {
            assert!(message.contains("message is sent"), "got: {message}");
        }
        other => panic!("expected DataUnavailable, got {other:?}"),
    }
    assert_eq!(harness.functions.dispatched().len(), 1);
}

#[tokio::test]
async fn test_empty_text_is_rejected_before_probing() {
    let harness = TestHarness::builder()
        .with_instance("sales", "Sales", connected())
        .with_conversation(conversation("c1", ANA, "sales", 0))
        .build()
        .unwrap();

    harness.session.open(ANA, None).await.unwrap();
    let calls_before = harness.functions.calls().len();
    assert!(matches!(
        harness.session.send_text("   ").await,
        Err(ParleyError::InvalidMessage { .. })
    ));
    assert_eq!(harness.functions.calls().len(), calls_before);
    assert_eq!(harness.store.message_count(), 0);
}

// ---- Test 4: Cooldown ----

#[tokio::test(start_paused = true)]
async fn test_cooldown_rejection_does_not_wait_for_probe() {
    let harness = TestHarness::builder()
        .with_instance("slow", "Slow", ProbeScript::Hang)
        .with_conversation(conversation("c1", ANA, "slow", 0))
        .with_cooldown(Duration::from_millis(5000))
        .with_probe_timeout(Duration::from_millis(500))
        .build()
        .unwrap();

    harness.session.open(ANA, None).await.unwrap();
    harness.session.send_text("first").await.unwrap();
    let probes = harness
        .functions
        .calls()
        .iter()
        .filter(|c| matches!(c, FunctionCall::Probe(_)))
        .count();

    match harness.session.send_text("second").await {
        Err(ParleyError::AdmissionRejected { retry_after, .. }) => {
            assert_eq!(retry_after, Duration::from_millis(5000));
        }
        other => panic!("expected admission rejection, got {other:?}"),
    }
    let probes_after = harness
        .functions
        .calls()
        .iter()
        .filter(|c| matches!(c, FunctionCall::Probe(_)))
        .count();
    assert_eq!(probes_after, probes);
}

#[tokio::test(start_paused = true)]
async fn test_cooldown_spans_conversations() {
    let harness = TestHarness::builder()
        .with_instance("sales", "Sales", connected())
        .with_instance("support", "Support", connected())
        .with_conversation(conversation("c-sales", ANA, "sales", 10))
        .with_conversation(conversation("c-support", ANA, "support", 0))
        .with_cooldown(Duration::from_millis(5000))
        .build()
        .unwrap();

    harness.session.open(ANA, None).await.unwrap();
    harness.session.send_text("first").await.unwrap();

    tokio::time::advance(Duration::from_millis(2000)).await;
    harness
        .session
        .switch_instance(&InstanceId::from("support"))
        .unwrap();
    let err = harness.session.send_text("second").await.unwrap_err();
    match err {
        ParleyError::AdmissionRejected { retry_after, .. } => {
            assert_eq!(retry_after, Duration::from_millis(3000));
        }
        other => panic!("expected admission rejection, got {other:?}"),
    }
    assert_eq!(harness.store.message_count(), 1);

    tokio::time::advance(Duration::from_millis(3000)).await;
    harness.session.send_text("third").await.unwrap();
    assert_eq!(harness.functions.dispatched().len(), 2);
}

// ---- Test 5: Media ----

#[tokio::test]
async fn test_oversized_image_never_reaches_network() {
    let harness = TestHarness::builder()
        .with_instance("sales", "Sales", connected())
        .with_conversation(conversation("c1", ANA, "sales", 0))
        .build()
        .unwrap();
    harness.session.open(ANA, None).await.unwrap();
    let calls_after_open = harness.functions.calls().len();

    let image = OutboundMedia::new(MediaKind::Image, vec![0; 12 * 1024 * 1024], "image/jpeg");
    let err = harness.session.send_media(image).await.unwrap_err();

    assert!(matches!(err, ParleyError::MediaRejected { .. }));
    assert!(err.notice().contains("12MB"), "got: {}", err.notice());
    assert_eq!(harness.functions.calls().len(), calls_after_open);
    assert!(harness.storage.uploads().is_empty());
    assert_eq!(harness.store.message_count(), 0);
}

#[tokio::test]
async fn test_media_is_uploaded_before_dispatch() {
    let harness = TestHarness::builder()
        .with_instance("sales", "Sales", connected())
        .with_conversation(conversation("c1", ANA, "sales", 0))
        .build()
        .unwrap();
    harness.session.open(ANA, None).await.unwrap();

    let image = OutboundMedia::new(MediaKind::Image, vec![7; 2048], "image/png")
        .with_caption("receipt");
    let message = harness.session.send_media(image).await.unwrap();

    let calls: Vec<FunctionCall> = harness
        .functions
        .calls()
        .into_iter()
        .filter(|c| !matches!(c, FunctionCall::Probe(_)))
        .collect();
    assert_eq!(calls.len(), 2);
    assert!(matches!(calls[0], FunctionCall::UploadTarget(_)));
    let FunctionCall::Dispatch(request) = &calls[1] else {
        panic!("expected a dispatch after the upload target, got {calls:?}");
    };

    let uploads = harness.storage.uploads();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].bytes.len(), 2048);
    match &request.payload {
        SendPayload::Media {
            kind,
            storage_path,
            caption,
            ..
        } => {
            assert_eq!(*kind, MediaKind::Image);
            assert_eq!(storage_path, &uploads[0].storage_path);
            assert_eq!(caption.as_deref(), Some("receipt"));
        }
        other => panic!("expected media payload, got {other:?}"),
    }

    assert_eq!(message.status, DeliveryStatus::Sent);
    assert_eq!(message.media_path.as_deref(), Some(uploads[0].storage_path.as_str()));
}

#[tokio::test]
async fn test_refused_target_fails_message_without_dispatch() {
    let harness = TestHarness::builder()
        .with_instance("sales", "Sales", connected())
        .with_conversation(conversation("c1", ANA, "sales", 0))
        .build()
        .unwrap();
    harness
        .functions
        .script_upload_target(TargetScript::Refuse("bucket quota exceeded".into()));
    harness.session.open(ANA, None).await.unwrap();

    let doc = OutboundMedia::new(MediaKind::Document, vec![1; 512], "application/pdf")
        .with_file_name("invoice.pdf");
    let err = harness.session.send_media(doc).await.unwrap_err();

    assert!(matches!(err, ParleyError::TargetUnavailable { .. }));
    assert!(harness.functions.dispatched().is_empty());
    let messages = harness.store.messages(&ConversationId::from("c1"));
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].status, DeliveryStatus::Failed);
    assert!(messages[0]
        .failure_detail
        .as_deref()
        .is_some_and(|d| d.contains("bucket quota exceeded")));
}

#[tokio::test]
async fn test_failed_upload_fails_message_without_dispatch() {
    let harness = TestHarness::builder()
        .with_instance("sales", "Sales", connected())
        .with_conversation(conversation("c1", ANA, "sales", 0))
        .build()
        .unwrap();
    harness.storage.fail_with(403, "signature expired");
    harness.session.open(ANA, None).await.unwrap();

    let image = OutboundMedia::new(MediaKind::Image, vec![1; 128], "image/jpeg");
    assert!(matches!(
        harness.session.send_media(image).await,
        Err(ParleyError::UploadFailed { status: 403, .. })
    ));
    assert!(harness.functions.dispatched().is_empty());
    let messages = harness.store.messages(&ConversationId::from("c1"));
    assert_eq!(messages[0].status, DeliveryStatus::Failed);
}

// ---- Test 6: Voice notes ----

#[tokio::test]
async fn test_cancelled_recording_sends_nothing() {
    let harness = TestHarness::builder()
        .with_instance("sales", "Sales", connected())
        .with_conversation(conversation("c1", ANA, "sales", 0))
        .with_capture(&["audio/ogg;codecs=opus"])
        .build()
        .unwrap();
    harness.session.open(ANA, None).await.unwrap();

    let session = harness.session.recorder().unwrap().start().await.unwrap();
    session.cancel();

    assert_eq!(harness.functions.upload_target_requests(), 0);
    assert!(harness.storage.uploads().is_empty());
    assert_eq!(harness.store.message_count(), 0);
}

#[tokio::test]
async fn test_recorded_voice_note_is_sent_as_audio() {
    let harness = TestHarness::builder()
        .with_instance("sales", "Sales", connected())
        .with_conversation(conversation("c1", ANA, "sales", 0))
        .with_capture(&["audio/mp4", "audio/ogg;codecs=opus"])
        .build()
        .unwrap();
    if let Some(device) = &harness.capture {
        device.set_recording(vec![9; 4096]);
    }
    harness.session.open(ANA, None).await.unwrap();

    let capture = harness.session.recorder().unwrap().start().await.unwrap();
    let audio = capture.finish().await.unwrap();
    let message = harness.session.send_audio(audio).await.unwrap();

    assert_eq!(message.kind, MessageKind::Audio);
    let sent = harness.functions.dispatched();
    match &sent[0].payload {
        SendPayload::Media {
            kind, mime_type, ..
        } => {
            assert_eq!(*kind, MediaKind::Audio);
            assert_eq!(mime_type, "audio/ogg;codecs=opus");
        }
        other => panic!("expected media payload, got {other:?}"),
    }
}

// ---- Test 7: Thread sync ----

#[tokio::test]
async fn test_pushed_message_reaches_open_thread() {
    let harness = TestHarness::builder()
        .with_instance("sales", "Sales", connected())
        .with_conversation(conversation("c1", ANA, "sales", 0))
        .build()
        .unwrap();
    harness.session.open(ANA, None).await.unwrap();
    let handle = harness.session.spawn_sync().await;
    let mut snapshots = harness.session.sync().subscribe();

    harness
        .store
        .add_message(&harness.org(), inbound("c1", "is the order ready?"));

    tokio::time::timeout(
        Duration::from_secs(5),
        snapshots.wait_for(|s| s.as_ref().is_some_and(|s| s.messages.len() == 1)),
    )
    .await
    .expect("snapshot with the pushed message")
    .unwrap();

    let current = harness.session.sync().current().unwrap();
    assert_eq!(current.conversation_id, ConversationId::from("c1"));
    assert_eq!(current.messages[0].text.as_deref(), Some("is the order ready?"));

    harness.session.shutdown();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_closed_feed_falls_back_to_polling() {
    let harness = TestHarness::builder()
        .with_instance("sales", "Sales", connected())
        .with_conversation(conversation("c1", ANA, "sales", 0))
        .build()
        .unwrap();
    harness.session.open(ANA, None).await.unwrap();
    let handle = harness.session.spawn_sync().await;
    let mut snapshots = harness.session.sync().subscribe();

    harness.store.close_feeds();
    harness
        .store
        .add_message(&harness.org(), inbound("c1", "anyone there?"));

    tokio::time::timeout(
        Duration::from_secs(10),
        snapshots.wait_for(|s| s.as_ref().is_some_and(|s| s.messages.len() == 1)),
    )
    .await
    .expect("polling picks up the message")
    .unwrap();

    harness.session.shutdown();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_opening_unread_thread_marks_it_read_once() {
    let mut unread = conversation("c1", ANA, "sales", 0);
    unread.unread_count = 3;
    let harness = TestHarness::builder()
        .with_instance("sales", "Sales", connected())
        .with_conversation(unread)
        .build()
        .unwrap();

    harness.session.open(ANA, None).await.unwrap();
    harness.session.sync().refresh().await.unwrap();
    harness.session.sync().refresh().await.unwrap();

    assert_eq!(harness.store.mark_read_calls(), 1);
    let view = harness.session.inbox(None).await.unwrap();
    assert_eq!(view.total_unread, 0);
}
