//! Room registry integration tests.
//!
//! Covers member add/remove/update, room leave and handle accounting across
//! several members subscribing at once.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use common::types::MemberId;
use member_subscriber::actors::{ActorMetrics, MemberInfo};
use member_subscriber::config::Config;
use member_subscriber::errors::SubscriberError;
use member_subscriber::observer::MemberEvent;
use member_subscriber::scenario::{replay, Scenario};
use member_subscriber::subscription::SubscriptionState;
use ms_test_utils::{wait_for_settled, wait_for_state, TestMember, TestRoom};

/// Each member retries on its own; the transport never sees two requests
/// from the same member at once.
#[tokio::test]
async fn test_members_subscribe_independently() {
    let room = TestRoom::builder().fail("ann-0").fail("bob-0").fail("bob-1").build();

    let ann = room
        .join(TestMember::remote("ann").with_streams(&["ann-0", "ann-1"]))
        .await;
    let bob = room
        .join(TestMember::remote("bob").with_streams(&["bob-0", "bob-1", "bob-2"]))
        .await;

    wait_for_state(&ann, SubscriptionState::Subscribed).await;
    wait_for_state(&bob, SubscriptionState::Subscribed).await;

    assert_eq!(room.transport().requests_for(ann.member_id()).len(), 2);
    assert_eq!(room.transport().requests_for(bob.member_id()).len(), 3);

    let status = wait_for_settled(room.room()).await;
    assert_eq!(status.member_count, 2);
    assert_eq!(status.subscribed_count(), 2);
    assert_eq!(room.metrics().subscription_count(), 2);
}

#[tokio::test]
async fn test_member_lookup_after_leave_fails() {
    let room = TestRoom::builder().build();
    room.join(TestMember::remote("ann").with_streams(&["A"])).await;

    room.room()
        .member_left(MemberId::new("ann"))
        .await
        .unwrap();

    let err = room.room().member(MemberId::new("ann")).await.unwrap_err();
    assert!(matches!(err, SubscriberError::MemberNotFound(_)));

    let err = room
        .room()
        .member_left(MemberId::new("ann"))
        .await
        .unwrap_err();
    assert!(matches!(err, SubscriberError::MemberNotFound(_)));
}

#[tokio::test]
async fn test_update_members_reconciles_registry() {
    let room = TestRoom::builder().build();
    room.publish(&MemberId::new("ann"), &["ann-0"]);
    room.publish(&MemberId::new("bob"), &["bob-0"]);

    let diff = room
        .room()
        .update_members(vec![
            TestMember::local("me").info(),
            TestMember::remote("ann").info(),
            TestMember::remote("bob").info(),
        ])
        .await
        .unwrap();
    assert_eq!(diff.joined.len(), 3);
    assert!(diff.left.is_empty());

    let status = wait_for_settled(room.room()).await;
    assert_eq!(status.subscribed_count(), 2);

    let diff = room
        .room()
        .update_members(vec![
            TestMember::local("me").info(),
            MemberInfo::remote(MemberId::new("ann"), "Annie"),
        ])
        .await
        .unwrap();
    assert!(diff.joined.is_empty());
    assert_eq!(diff.left, vec![MemberId::new("bob")]);
    assert_eq!(diff.renamed, vec![MemberId::new("ann")]);

    let status = wait_for_settled(room.room()).await;
    assert_eq!(status.member_count, 2);
    let ann = room.room().member(MemberId::new("ann")).await.unwrap();
    assert_eq!(ann.snapshot().await.unwrap().display_name, "Annie");

    // bob's handles went with him; ann's remain.
    assert_eq!(room.transport().ledger().outstanding(), 2);
}

/// Leaving the room releases every handle and rejects further joins.
#[tokio::test]
async fn test_leave_releases_everything() {
    let room = TestRoom::builder().hold("carl-0").build();
    room.join(TestMember::remote("ann").with_streams(&["ann-0"]))
        .await;
    room.join(TestMember::remote("bob").with_streams(&["bob-0"]))
        .await;
    room.join(TestMember::remote("carl").with_streams(&["carl-0"]))
        .await;
    room.join(TestMember::local("me")).await;

    room.transport()
        .wait_for_held(&common::types::StreamId::new("carl-0"))
        .await;
    let recorder = room.recorder().clone();
    ms_test_utils::wait_until("two members subscribed", || {
        let recorder = recorder.clone();
        async move {
            recorder
                .events()
                .iter()
                .filter(|e| matches!(e, MemberEvent::RendererAvailable { .. }))
                .count()
                == 2
        }
    })
    .await;

    room.room().leave().await.unwrap();
    room.transport()
        .release_held(&common::types::StreamId::new("carl-0"), true);

    let transport = room.transport().clone();
    ms_test_utils::wait_until("all handles released", || {
        let ledger = transport.ledger();
        async move { ledger.counts().renderers_created == 3 && ledger.outstanding() == 0 }
    })
    .await;

    let status = room.room().status().await.unwrap();
    assert!(status.is_closed);
    assert_eq!(status.member_count, 0);

    let err = room
        .room()
        .member_joined(TestMember::remote("dan").info())
        .await
        .unwrap_err();
    assert!(matches!(err, SubscriberError::RoomClosed));

    // Leaving again is a no-op.
    room.room().leave().await.unwrap();
}

/// Replaying a scenario file leaves nothing outstanding.
#[tokio::test]
async fn test_scenario_replay_releases_handles() {
    let scenario = Scenario::from_json(
        r#"{
            "room_id": "standup",
            "members": [
                { "member_id": "me", "is_self": true, "streams": [{ "stream_id": "local" }] },
                { "member_id": "ann", "streams": [
                    { "stream_id": "ann-hd", "outcome": "fail" },
                    { "stream_id": "ann-sd" }
                ] },
                { "member_id": "bob", "streams": [{ "stream_id": "bob-0", "outcome": "fail" }] }
            ],
            "steps": [
                { "action": "settle" },
                { "action": "unsubscribe", "member_id": "ann" },
                { "action": "subscribe", "member_id": "ann", "mode": "audio" },
                { "action": "member_left", "member_id": "bob" }
            ]
        }"#,
    )
    .unwrap();

    let metrics = ActorMetrics::new();
    let report = replay(scenario, &Config::default(), metrics.clone())
        .await
        .unwrap();

    assert_eq!(report.outstanding_handles, 0);
    assert_eq!(report.max_in_flight, 1);
    assert!(report.requests.iter().all(|r| r.member_id.as_str() != "me"));
    assert_eq!(metrics.exhaustion_count(), 1);

    let ann = report
        .status
        .members
        .iter()
        .find(|m| m.member_id.as_str() == "ann")
        .unwrap();
    assert_eq!(ann.state, SubscriptionState::Subscribed);
    assert!(ann.audio_available);
    assert!(!ann.video_available);
}
