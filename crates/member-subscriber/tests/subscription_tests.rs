//! Member subscription integration tests.
//!
//! Drives member controllers through a room backed by the scripted transport
//! and checks request order, state, observer notifications and handle
//! accounting.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use common::types::{MemberId, StreamId};
use member_subscriber::errors::SubscriberError;
use member_subscriber::observer::MemberEvent;
use member_subscriber::subscription::SubscriptionState;
use member_subscriber::transport::{MediaMode, RendererId, ScriptedOutcome};
use ms_test_utils::{wait_for_state, wait_until, TestMember, TestRoom};

const STREAMS: [&str; 5] = ["s0", "s1", "s2", "s3", "s4"];

fn request_trace(room: &TestRoom, member_id: &MemberId) -> Vec<(String, MediaMode)> {
    room.transport()
        .requests_for(member_id)
        .into_iter()
        .map(|r| (r.stream_id.to_string(), r.mode))
        .collect()
}

/// First `k` candidates fail, candidate `k` succeeds: exactly `k + 1`
/// requests in list order, one at a time.
#[tokio::test]
async fn test_sequential_retry_until_success() {
    for k in 0..STREAMS.len() {
        let mut builder = TestRoom::builder();
        for stream in STREAMS.iter().take(k) {
            builder = builder.fail(stream);
        }
        let room = builder.build();

        let member = room
            .join(TestMember::remote("ann").with_streams(&STREAMS))
            .await;
        let snapshot = wait_for_state(&member, SubscriptionState::Subscribed).await;

        let expected: Vec<(String, MediaMode)> = STREAMS
            .iter()
            .take(k + 1)
            .map(|s| ((*s).to_string(), MediaMode::Video))
            .collect();
        assert_eq!(request_trace(&room, member.member_id()), expected);
        assert_eq!(room.transport().max_in_flight(), 1);
        assert_eq!(
            snapshot.active_stream,
            STREAMS.get(k).map(|s| StreamId::new(*s))
        );
    }
}

/// Every candidate fails: one request each, back to `NotSubscribed`, a
/// single unavailable notification.
#[tokio::test]
async fn test_exhaustion_notifies_once() {
    for len in 1..=STREAMS.len() {
        let room = TestRoom::builder()
            .default_outcome(ScriptedOutcome::Fail)
            .build();
        let ids: Vec<&str> = STREAMS.iter().take(len).copied().collect();

        let member = room
            .join(TestMember::remote("ann").with_streams(&ids))
            .await;
        let metrics = room.metrics().clone();
        wait_until("exhaustion", || {
            let metrics = metrics.clone();
            async move { metrics.exhaustion_count() == 1 }
        })
        .await;

        let snapshot = member.snapshot().await.unwrap();
        assert_eq!(snapshot.state, SubscriptionState::NotSubscribed);
        assert!(snapshot.renderer_id.is_none());
        assert_eq!(room.transport().requests().len(), len);

        let unavailable = room
            .recorder()
            .events()
            .into_iter()
            .filter(|e| matches!(e, MemberEvent::MediaUnavailable { .. }))
            .count();
        assert_eq!(unavailable, 1);
        assert_eq!(room.transport().ledger().outstanding(), 0);
    }
}

/// A completion issued before a stream-list change is discarded and its
/// handles released.
#[tokio::test]
async fn test_stale_success_after_stream_change() {
    let room = TestRoom::builder().hold("A").build();
    let member_id = MemberId::new("ann");
    let member = room
        .join(TestMember::remote("ann").with_streams(&["A"]))
        .await;

    room.transport().wait_for_held(&StreamId::new("A")).await;
    room.publish(&member_id, &["B"]);

    let snapshot = wait_for_state(&member, SubscriptionState::Subscribed).await;
    assert_eq!(snapshot.active_stream, Some(StreamId::new("B")));
    let renderer = snapshot.renderer_id.expect("renderer bound");

    assert!(room.transport().release_held(&StreamId::new("A"), true));
    let metrics = room.metrics().clone();
    wait_until("stale completion", || {
        let metrics = metrics.clone();
        async move { metrics.stale_completion_count() == 1 }
    })
    .await;

    let after = member.snapshot().await.unwrap();
    assert_eq!(after.state, SubscriptionState::Subscribed);
    assert_eq!(after.renderer_id, Some(renderer));

    // Only B's renderer and subscriber are alive.
    assert_eq!(room.transport().ledger().outstanding(), 2);
    assert_eq!(
        room.recorder().events_for(&member_id),
        vec![
            MemberEvent::RendererAvailable {
                member_id: member_id.clone(),
                renderer_id: renderer,
            },
            MemberEvent::VideoAvailabilityChanged {
                member_id: member_id.clone(),
                enabled: true,
            },
        ]
    );
}

/// A failed completion from an old generation does not advance the retry.
#[tokio::test]
async fn test_stale_failure_does_not_retry() {
    let room = TestRoom::builder().hold("A").build();
    let member_id = MemberId::new("ann");
    let member = room
        .join(TestMember::remote("ann").with_streams(&["A", "A2"]))
        .await;

    room.transport().wait_for_held(&StreamId::new("A")).await;
    room.publish(&member_id, &["B"]);
    wait_for_state(&member, SubscriptionState::Subscribed).await;

    room.transport().release_held(&StreamId::new("A"), false);
    let metrics = room.metrics().clone();
    wait_until("stale completion", || {
        let metrics = metrics.clone();
        async move { metrics.stale_completion_count() == 1 }
    })
    .await;

    assert_eq!(
        request_trace(&room, &member_id),
        vec![
            ("A".to_string(), MediaMode::Video),
            ("B".to_string(), MediaMode::Video),
        ]
    );
}

/// Disposing twice releases once and notifies once.
#[tokio::test]
async fn test_dispose_is_idempotent() {
    let room = TestRoom::builder().build();
    let member = room
        .join(TestMember::remote("ann").with_streams(&["A"]))
        .await;
    wait_for_state(&member, SubscriptionState::Subscribed).await;

    member.dispose().await.unwrap();
    let events = room.recorder().events();
    let counts = room.transport().ledger().counts();

    member.dispose().await.unwrap();

    assert_eq!(room.recorder().events(), events);
    assert_eq!(room.transport().ledger().counts(), counts);
    assert_eq!(counts.renderers_disposed, 1);
    assert_eq!(counts.subscribers_disposed, 1);
    assert_eq!(room.transport().ledger().outstanding(), 0);
}

/// Disposing while a request is in flight releases the late result.
#[tokio::test]
async fn test_dispose_while_pending() {
    let room = TestRoom::builder().hold("A").build();
    let member = room
        .join(TestMember::remote("ann").with_streams(&["A"]))
        .await;
    room.transport().wait_for_held(&StreamId::new("A")).await;

    member.dispose().await.unwrap();
    room.transport().release_held(&StreamId::new("A"), true);

    let transport = room.transport().clone();
    wait_until("late handles released", || {
        let ledger = transport.ledger();
        async move { ledger.counts().renderers_created == 1 && ledger.outstanding() == 0 }
    })
    .await;
    assert!(room.recorder().events().is_empty());
}

/// The local participant is never subscribed through the transport.
#[tokio::test]
async fn test_self_member_never_subscribes() {
    let room = TestRoom::builder().build();
    let me = MemberId::new("me");
    let member = room
        .join(TestMember::local("me").with_streams(&["local-cam", "local-mic"]))
        .await;

    let err = member.subscribe(MediaMode::Video).await.unwrap_err();
    assert!(matches!(err, SubscriberError::LocalMember));

    room.publish(&me, &["local-cam-2"]);
    wait_until("stream list applied", || {
        let member = member.clone();
        async move { member.snapshot().await.unwrap().stream_count == 1 }
    })
    .await;

    member.update_local_media(false, true).await.unwrap();

    assert!(room.transport().requests().is_empty());
    assert_eq!(
        room.recorder().events_for(&me),
        vec![MemberEvent::VideoAvailabilityChanged {
            member_id: me.clone(),
            enabled: true,
        }]
    );
}

/// `[A, B, C]`, A and B fail, C succeeds in video mode.
#[tokio::test]
async fn test_third_candidate_trace() {
    let room = TestRoom::builder().fail("A").fail("B").build();
    let member_id = MemberId::new("ann");
    let member = room
        .join(TestMember::remote("ann").with_streams(&["A", "B", "C"]))
        .await;

    let snapshot = wait_for_state(&member, SubscriptionState::Subscribed).await;

    assert_eq!(
        request_trace(&room, &member_id),
        vec![
            ("A".to_string(), MediaMode::Video),
            ("B".to_string(), MediaMode::Video),
            ("C".to_string(), MediaMode::Video),
        ]
    );
    assert_eq!(snapshot.renderer_id, Some(RendererId(1)));
    assert_eq!(
        room.recorder().events_for(&member_id),
        vec![
            MemberEvent::RendererAvailable {
                member_id: member_id.clone(),
                renderer_id: RendererId(1),
            },
            MemberEvent::VideoAvailabilityChanged {
                member_id: member_id.clone(),
                enabled: true,
            },
        ]
    );
}

/// With audio fallback a failed video candidate is retried audio-only first.
#[tokio::test]
async fn test_audio_fallback_policy() {
    let room = TestRoom::builder()
        .audio_fallback()
        .mode_outcome("A", MediaMode::Video, ScriptedOutcome::Fail)
        .build();
    let member_id = MemberId::new("ann");
    let member = room
        .join(TestMember::remote("ann").with_streams(&["A", "B"]))
        .await;

    let snapshot = wait_for_state(&member, SubscriptionState::Subscribed).await;
    assert_eq!(snapshot.active_stream, Some(StreamId::new("A")));
    assert_eq!(snapshot.active_mode, Some(MediaMode::Audio));
    assert!(snapshot.audio_available);
    assert!(!snapshot.video_available);
    assert_eq!(
        request_trace(&room, &member_id),
        vec![
            ("A".to_string(), MediaMode::Video),
            ("A".to_string(), MediaMode::Audio),
        ]
    );
}

/// Without the fallback policy a failed video candidate moves straight on.
#[tokio::test]
async fn test_default_policy_keeps_mode() {
    let room = TestRoom::builder()
        .mode_outcome("A", MediaMode::Video, ScriptedOutcome::Fail)
        .build();
    let member_id = MemberId::new("ann");
    let member = room
        .join(TestMember::remote("ann").with_streams(&["A", "B"]))
        .await;

    wait_for_state(&member, SubscriptionState::Subscribed).await;
    assert_eq!(
        request_trace(&room, &member_id),
        vec![
            ("A".to_string(), MediaMode::Video),
            ("B".to_string(), MediaMode::Video),
        ]
    );
}

/// A stream-list change while subscribed replaces the renderer.
#[tokio::test]
async fn test_stream_change_replaces_renderer() {
    let room = TestRoom::builder().build();
    let member_id = MemberId::new("ann");
    let member = room
        .join(TestMember::remote("ann").with_streams(&["A"]))
        .await;
    let first = wait_for_state(&member, SubscriptionState::Subscribed).await;

    room.publish(&member_id, &["B"]);
    let second = ms_test_utils::wait_for_snapshot(&member, |s| {
        s.state == SubscriptionState::Subscribed && s.active_stream == Some(StreamId::new("B"))
    })
    .await;

    assert_ne!(first.renderer_id, second.renderer_id);
    assert!(second.generation > first.generation);
    let counts = room.transport().ledger().counts();
    assert_eq!(counts.renderers_created, 2);
    assert_eq!(counts.renderers_disposed, 1);
    assert_eq!(counts.subscribers_disposed, 1);
}

/// An empty stream list tears down without subscribing or reporting
/// unavailability.
#[tokio::test]
async fn test_empty_stream_list() {
    let room = TestRoom::builder().build();
    let member_id = MemberId::new("ann");
    let member = room
        .join(TestMember::remote("ann").with_streams(&["A"]))
        .await;
    wait_for_state(&member, SubscriptionState::Subscribed).await;

    room.publish(&member_id, &[]);
    let snapshot = wait_for_snapshot_count(&member, 0).await;

    assert_eq!(snapshot.state, SubscriptionState::NotSubscribed);
    assert_eq!(room.transport().ledger().outstanding(), 0);
    assert!(!room
        .recorder()
        .events()
        .iter()
        .any(|e| matches!(e, MemberEvent::MediaUnavailable { .. })));

    let err = member.subscribe(MediaMode::Video).await.unwrap_err();
    assert!(matches!(err, SubscriberError::NoCandidates));
}

async fn wait_for_snapshot_count(
    member: &member_subscriber::actors::MemberActorHandle,
    count: usize,
) -> member_subscriber::actors::MemberSnapshot {
    ms_test_utils::wait_for_snapshot(member, |s| s.stream_count == count).await
}
