//! Room harness backed by the scripted transport.
//!
//! # Example
//!
//! ```rust,ignore
//! use ms_test_utils::{TestMember, TestRoom};
//!
//! let room = TestRoom::builder()
//!     .fail("a")
//!     .hold("slow")
//!     .build();
//!
//! let member = room.join(TestMember::remote("ann").with_streams(&["a", "b"])).await;
//! ```

use crate::fixtures::{candidates, TestMember};

use common::types::{MemberId, RoomId};
use member_subscriber::actors::{ActorMetrics, MemberActorHandle, RoomActorHandle};
use member_subscriber::config::Config;
use member_subscriber::observer::{EventRecorder, MemberObserver};
use member_subscriber::subscription::ModeFallback;
use member_subscriber::transport::{MediaMode, ScriptedOutcome, ScriptedTransport};
use std::sync::Arc;

/// A room actor wired to a scripted transport and an event recorder.
pub struct TestRoom {
    room: RoomActorHandle,
    transport: ScriptedTransport,
    recorder: Arc<EventRecorder>,
    metrics: Arc<ActorMetrics>,
}

impl TestRoom {
    /// Create a new `TestRoom` builder.
    #[must_use]
    pub fn builder() -> TestRoomBuilder {
        TestRoomBuilder::default()
    }

    /// The room actor handle.
    #[must_use]
    pub fn room(&self) -> &RoomActorHandle {
        &self.room
    }

    /// The scripted transport.
    #[must_use]
    pub fn transport(&self) -> &ScriptedTransport {
        &self.transport
    }

    /// Room-wide event recorder.
    #[must_use]
    pub fn recorder(&self) -> &Arc<EventRecorder> {
        &self.recorder
    }

    /// Shared actor metrics.
    #[must_use]
    pub fn metrics(&self) -> &Arc<ActorMetrics> {
        &self.metrics
    }

    /// Publish the member's streams, then join it.
    pub async fn join(&self, member: TestMember) -> MemberActorHandle {
        self.transport
            .publish_streams(&member.member_id, member.streams.clone());
        self.room
            .member_joined(member.info())
            .await
            .expect("member should join")
    }

    /// Replace a member's published stream list.
    pub fn publish(&self, member_id: &MemberId, ids: &[&str]) {
        self.transport.publish_streams(member_id, candidates(ids));
    }
}

impl Drop for TestRoom {
    fn drop(&mut self) {
        self.room.cancel();
    }
}

/// Builder for `TestRoom`.
#[derive(Default)]
pub struct TestRoomBuilder {
    room_id: Option<String>,
    default_outcome: Option<ScriptedOutcome>,
    outcomes: Vec<(String, ScriptedOutcome)>,
    mode_outcomes: Vec<(String, MediaMode, ScriptedOutcome)>,
    config: Config,
}

impl TestRoomBuilder {
    /// Set the room ID.
    #[must_use]
    pub fn room_id(mut self, id: impl Into<String>) -> Self {
        self.room_id = Some(id.into());
        self
    }

    /// Outcome for streams without a script.
    #[must_use]
    pub fn default_outcome(mut self, outcome: ScriptedOutcome) -> Self {
        self.default_outcome = Some(outcome);
        self
    }

    /// Make every request for the stream fail.
    #[must_use]
    pub fn fail(self, stream_id: &str) -> Self {
        self.outcome(stream_id, ScriptedOutcome::Fail)
    }

    /// Hold every request for the stream until released.
    #[must_use]
    pub fn hold(self, stream_id: &str) -> Self {
        self.outcome(stream_id, ScriptedOutcome::Hold)
    }

    /// Script the outcome for a stream.
    #[must_use]
    pub fn outcome(mut self, stream_id: &str, outcome: ScriptedOutcome) -> Self {
        self.outcomes.push((stream_id.to_string(), outcome));
        self
    }

    /// Script the outcome for a stream at one mode.
    #[must_use]
    pub fn mode_outcome(mut self, stream_id: &str, mode: MediaMode, outcome: ScriptedOutcome) -> Self {
        self.mode_outcomes
            .push((stream_id.to_string(), mode, outcome));
        self
    }

    /// Retry failed video candidates with audio.
    #[must_use]
    pub fn audio_fallback(mut self) -> Self {
        self.config.mode_fallback = ModeFallback::AudioThenNext;
        self
    }

    /// Mode for automatic subscribes.
    #[must_use]
    pub fn preferred_mode(mut self, mode: MediaMode) -> Self {
        self.config.preferred_mode = mode;
        self
    }

    /// Build the room. Must be called inside a tokio runtime.
    #[must_use]
    pub fn build(self) -> TestRoom {
        let transport = ScriptedTransport::new()
            .with_default_outcome(self.default_outcome.unwrap_or(ScriptedOutcome::Succeed));
        for (stream_id, outcome) in self.outcomes {
            transport.script(stream_id.as_str(), outcome);
        }
        for (stream_id, mode, outcome) in self.mode_outcomes {
            transport.script_mode(stream_id.as_str(), mode, outcome);
        }

        let recorder = EventRecorder::new();
        let metrics = ActorMetrics::new();
        let room_id = self.room_id.map_or_else(RoomId::generate, RoomId::new);

        let room = RoomActorHandle::new(
            room_id,
            Arc::new(transport.clone()),
            &self.config,
            vec![Arc::clone(&recorder) as Arc<dyn MemberObserver>],
            Arc::clone(&metrics),
        );

        TestRoom {
            room,
            transport,
            recorder,
            metrics,
        }
    }
}
