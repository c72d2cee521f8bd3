//! Scenario replay against the scripted transport.
//!
//! A scenario describes a room: its members, the streams each one publishes
//! and how the transport answers requests for those streams, plus an
//! optional list of steps applied after the initial member list settles.
//!
//! ```json
//! {
//!   "room_id": "standup",
//!   "members": [
//!     { "member_id": "me", "is_self": true },
//!     { "member_id": "ann", "display_name": "Ann",
//!       "streams": [
//!         { "stream_id": "a", "outcome": "fail" },
//!         { "stream_id": "b", "outcome": "fail" },
//!         { "stream_id": "c" }
//!       ] }
//!   ],
//!   "steps": [
//!     { "action": "publish_streams", "member_id": "ann",
//!       "streams": [{ "stream_id": "d" }] },
//!     { "action": "settle" }
//!   ]
//! }
//! ```
//!
//! Replaying returns the observer event trace, the transport request log,
//! the final room status and the resource ledger.

use crate::actors::{ActorMetrics, MemberInfo, RoomActorHandle, RoomStatus};
use crate::config::Config;
use crate::errors::SubscriberError;
use crate::observer::{EventRecorder, MemberObserver, RecordedEvent};
use crate::subscription::{Generation, SubscriptionState};
use crate::transport::{
    LedgerCounts, MediaMode, ScriptedOutcome, ScriptedTransport, StreamCandidate,
    SubscribeRequest,
};

use common::types::{MemberId, RoomId, StreamId};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Poll interval while waiting for members to settle.
const SETTLE_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Errors raised while loading or replaying a scenario.
#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("Failed to read scenario: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid scenario: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Scenario step failed: {0}")]
    Subscriber(#[from] SubscriberError),

    #[error("Members did not settle within {0:?}")]
    SettleTimeout(Duration),
}

/// A published stream and its scripted transport behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ScenarioStream {
    pub stream_id: String,
    /// Outcome for requests at any mode (default: the scenario default).
    #[serde(default)]
    pub outcome: Option<ScriptedOutcome>,
    /// Outcome for audio requests only.
    #[serde(default)]
    pub audio_outcome: Option<ScriptedOutcome>,
}

/// A room member.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ScenarioMember {
    pub member_id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub is_self: bool,
    #[serde(default)]
    pub streams: Vec<ScenarioStream>,
}

impl ScenarioMember {
    fn info(&self) -> MemberInfo {
        MemberInfo {
            member_id: MemberId::new(self.member_id.clone()),
            display_name: self
                .display_name
                .clone()
                .unwrap_or_else(|| self.member_id.clone()),
            is_self: self.is_self,
        }
    }
}

/// A step applied after the initial member list settles.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ScenarioStep {
    /// Replace a member's published stream list.
    PublishStreams {
        member_id: String,
        streams: Vec<ScenarioStream>,
    },
    /// Explicit subscribe on a member controller.
    Subscribe { member_id: String, mode: MediaMode },
    /// Explicit unsubscribe on a member controller.
    Unsubscribe { member_id: String },
    /// A member joins.
    MemberJoined { member: ScenarioMember },
    /// A member leaves.
    MemberLeft { member_id: String },
    /// Complete the oldest held request for a stream.
    ReleaseHeld { stream_id: String, succeed: bool },
    /// Wait until no member has a request in flight.
    Settle,
}

/// A room scenario.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub room_id: Option<String>,
    /// Outcome of streams without a scripted outcome (default: succeed).
    #[serde(default)]
    pub default_outcome: Option<ScriptedOutcome>,
    pub members: Vec<ScenarioMember>,
    #[serde(default)]
    pub steps: Vec<ScenarioStep>,
}

impl Scenario {
    /// Parse a scenario from JSON.
    pub fn from_json(json: &str) -> Result<Self, ScenarioError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a scenario file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ScenarioError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}

/// Outcome of a replay.
#[derive(Debug, Clone, Serialize)]
pub struct ReplayReport {
    pub room_id: RoomId,
    /// Observer notifications in delivery order.
    pub events: Vec<RecordedEvent>,
    /// Transport subscribe requests in issue order.
    pub requests: Vec<SubscribeRequest>,
    /// Highest number of requests pending at once.
    pub max_in_flight: usize,
    /// Room status after the last step, before leaving.
    pub status: RoomStatus,
    /// Handle accounting after leaving the room.
    pub ledger: LedgerCounts,
    /// Handles never disposed; positive means a leak, negative a double
    /// release.
    pub outstanding_handles: i64,
}

/// Replay a scenario and leave the room afterwards.
pub async fn replay(
    scenario: Scenario,
    config: &Config,
    metrics: Arc<ActorMetrics>,
) -> Result<ReplayReport, ScenarioError> {
    let transport = ScriptedTransport::new()
        .with_default_outcome(scenario.default_outcome.unwrap_or(ScriptedOutcome::Succeed));

    for member in &scenario.members {
        publish(&transport, &member.member_id, &member.streams);
    }

    let room_id = scenario.room_id.map_or_else(RoomId::generate, RoomId::new);
    let recorder = EventRecorder::new();
    let room = RoomActorHandle::new(
        room_id.clone(),
        Arc::new(transport.clone()),
        config,
        vec![Arc::clone(&recorder) as Arc<dyn MemberObserver>],
        metrics,
    );

    info!(
        target: "ms.scenario",
        room_id = %room_id,
        members = scenario.members.len(),
        steps = scenario.steps.len(),
        "Replaying scenario"
    );

    let members: Vec<MemberInfo> = scenario.members.iter().map(ScenarioMember::info).collect();
    let driven = drive(&room, &transport, config, members, scenario.steps).await;

    // Tear down on every path so no member or held request outlives the replay.
    let left = room.leave().await;
    let abandoned = transport.release_all_held(false);
    if abandoned > 0 {
        debug!(
            target: "ms.scenario",
            abandoned,
            "Failed held requests left unreleased by the scenario"
        );
    }
    room.cancel();

    let status = driven?;
    left?;

    let ledger = transport.ledger();
    Ok(ReplayReport {
        room_id,
        events: recorder.timeline(),
        requests: transport.requests(),
        max_in_flight: transport.max_in_flight(),
        status,
        ledger: ledger.counts(),
        outstanding_handles: ledger.outstanding(),
    })
}

/// Join the initial members, apply every step and capture the final status.
async fn drive(
    room: &RoomActorHandle,
    transport: &ScriptedTransport,
    config: &Config,
    members: Vec<MemberInfo>,
    steps: Vec<ScenarioStep>,
) -> Result<RoomStatus, ScenarioError> {
    room.update_members(members).await?;
    settle(room, transport, config.settle_timeout).await?;

    for step in steps {
        debug!(target: "ms.scenario", step = ?step, "Applying step");
        apply(room, transport, config, step).await?;
    }

    settle(room, transport, config.settle_timeout).await?;
    Ok(room.status().await?)
}

async fn apply(
    room: &RoomActorHandle,
    transport: &ScriptedTransport,
    config: &Config,
    step: ScenarioStep,
) -> Result<(), ScenarioError> {
    match step {
        ScenarioStep::PublishStreams { member_id, streams } => {
            publish(transport, &member_id, &streams);
        }
        ScenarioStep::Subscribe { member_id, mode } => {
            room.member(MemberId::new(member_id))
                .await?
                .subscribe(mode)
                .await?;
        }
        ScenarioStep::Unsubscribe { member_id } => {
            room.member(MemberId::new(member_id))
                .await?
                .unsubscribe()
                .await?;
        }
        ScenarioStep::MemberJoined { member } => {
            publish(transport, &member.member_id, &member.streams);
            room.member_joined(member.info()).await?;
        }
        ScenarioStep::MemberLeft { member_id } => {
            room.member_left(MemberId::new(member_id)).await?;
        }
        ScenarioStep::ReleaseHeld { stream_id, succeed } => {
            let stream_id = StreamId::new(stream_id);
            tokio::time::timeout(config.settle_timeout, transport.wait_for_held(&stream_id))
                .await
                .map_err(|_| ScenarioError::SettleTimeout(config.settle_timeout))?;
            transport.release_held(&stream_id, succeed);
        }
        ScenarioStep::Settle => {
            settle(room, transport, config.settle_timeout).await?;
        }
    }
    Ok(())
}

fn publish(transport: &ScriptedTransport, member_id: &str, streams: &[ScenarioStream]) {
    for stream in streams {
        if let Some(outcome) = stream.outcome {
            transport.script(stream.stream_id.as_str(), outcome);
        }
        if let Some(outcome) = stream.audio_outcome {
            transport.script_mode(stream.stream_id.as_str(), MediaMode::Audio, outcome);
        }
    }

    let candidates = streams
        .iter()
        .map(|s| StreamCandidate::new(s.stream_id.as_str()))
        .collect();
    transport.publish_streams(&MemberId::new(member_id), candidates);
}

/// Wait until members settle, bounded by `timeout`.
async fn settle(
    room: &RoomActorHandle,
    transport: &ScriptedTransport,
    timeout: Duration,
) -> Result<(), ScenarioError> {
    tokio::time::timeout(timeout, wait_until_settled(room, transport))
        .await
        .map_err(|_| ScenarioError::SettleTimeout(timeout))?
}

/// Poll until every outstanding request is held and nothing moved since
/// the previous poll.
///
/// Held requests only complete through a `release_held` step, so a member
/// parked on one counts as settled.
async fn wait_until_settled(
    room: &RoomActorHandle,
    transport: &ScriptedTransport,
) -> Result<(), ScenarioError> {
    let mut previous: Option<(Vec<Generation>, usize)> = None;
    loop {
        let status = room.status().await?;
        let generations: Vec<Generation> = status.members.iter().map(|m| m.generation).collect();
        let observed = (generations, transport.requests().len());

        let held = transport.held_total();
        let pending = status
            .members
            .iter()
            .filter(|m| m.state == SubscriptionState::Pending)
            .count();

        if transport.in_flight() == held && pending <= held && previous.as_ref() == Some(&observed)
        {
            return Ok(());
        }

        previous = Some(observed);
        tokio::time::sleep(SETTLE_POLL_INTERVAL).await;
    }
}
