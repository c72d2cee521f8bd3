//! Message types for actor communication.
//!
//! All inter-actor communication uses strongly-typed message passing via `tokio::sync::mpsc`.
//! Response patterns use `tokio::sync::oneshot` for request-reply semantics.

use crate::errors::{SubscriberError, TransportError};
use crate::observer::{MemberObserver, ObserverId};
use crate::subscription::{Generation, SubscriptionState};
use crate::transport::{MediaMode, MediaSubscription, RenderSurface, RendererId, StreamCandidate};

use common::types::{MemberId, RoomId, StreamId};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::oneshot;

use super::member::MemberActorHandle;

/// Messages sent to `MemberActor`.
///
/// Transport notifications and request completions arrive through the same
/// mailbox as caller requests, so the actor sees them in arrival order.
pub enum MemberMessage {
    /// Start watching the member's stream list.
    ObserveStreams {
        /// Responds `true` if observation started, `false` if already observing.
        respond_to: oneshot::Sender<bool>,
    },

    /// The member's published stream list changed (transport-driven).
    StreamsChanged { streams: Vec<StreamCandidate> },

    /// Caller-initiated subscribe against the latest stream list.
    Subscribe {
        mode: MediaMode,
        respond_to: oneshot::Sender<Result<(), SubscriberError>>,
    },

    /// A transport subscribe request finished (off the actor task).
    SubscribeCompleted {
        generation: Generation,
        result: Result<MediaSubscription, TransportError>,
    },

    /// Tear down the subscription but keep observing.
    Unsubscribe { respond_to: oneshot::Sender<()> },

    /// Bind the renderer to a view surface.
    AttachSurface {
        surface: RenderSurface,
        respond_to: oneshot::Sender<Result<(), SubscriberError>>,
    },

    /// Unbind the renderer from its surface.
    DetachSurface { respond_to: oneshot::Sender<()> },

    /// Local capture state changed (self member only).
    UpdateLocalMedia {
        audio_enabled: bool,
        video_enabled: bool,
        respond_to: oneshot::Sender<Result<(), SubscriberError>>,
    },

    /// Member display name changed.
    UpdateDisplayName { display_name: String },

    /// Register an observer.
    AddObserver {
        observer: Arc<dyn MemberObserver>,
        respond_to: oneshot::Sender<ObserverId>,
    },

    /// Unregister an observer.
    RemoveObserver {
        observer_id: ObserverId,
        respond_to: oneshot::Sender<bool>,
    },

    /// Get a snapshot of the member's subscription state.
    GetSnapshot {
        respond_to: oneshot::Sender<MemberSnapshot>,
    },

    /// Release everything and stop the actor.
    Dispose { respond_to: oneshot::Sender<()> },
}

/// Messages sent to `RoomActor`.
pub enum RoomMessage {
    /// A member joined the room.
    MemberJoined {
        member: MemberInfo,
        respond_to: oneshot::Sender<Result<MemberActorHandle, SubscriberError>>,
    },

    /// A member left the room.
    MemberLeft {
        member_id: MemberId,
        respond_to: oneshot::Sender<Result<(), SubscriberError>>,
    },

    /// The transport reported the full member list.
    UpdateMembers {
        members: Vec<MemberInfo>,
        respond_to: oneshot::Sender<Result<MembersDiff, SubscriberError>>,
    },

    /// Get a handle to a member controller.
    GetMember {
        member_id: MemberId,
        respond_to: oneshot::Sender<Result<MemberActorHandle, SubscriberError>>,
    },

    /// Get current room status.
    GetStatus {
        respond_to: oneshot::Sender<RoomStatus>,
    },

    /// Leave the room: dispose every member controller.
    Leave { respond_to: oneshot::Sender<()> },
}

// ----------------------------------------------------------------------------
// Supporting Types
// ----------------------------------------------------------------------------

/// Member attributes as announced by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberInfo {
    pub member_id: MemberId,
    pub display_name: String,
    /// Whether this is the local participant.
    pub is_self: bool,
}

impl MemberInfo {
    /// A remote member.
    #[must_use]
    pub fn remote(member_id: impl Into<MemberId>, display_name: impl Into<String>) -> Self {
        Self {
            member_id: member_id.into(),
            display_name: display_name.into(),
            is_self: false,
        }
    }

    /// The local participant.
    #[must_use]
    pub fn local(member_id: impl Into<MemberId>, display_name: impl Into<String>) -> Self {
        Self {
            member_id: member_id.into(),
            display_name: display_name.into(),
            is_self: true,
        }
    }
}

/// Point-in-time view of a member controller.
#[derive(Debug, Clone, Serialize)]
pub struct MemberSnapshot {
    pub member_id: MemberId,
    pub display_name: String,
    pub is_self: bool,
    pub state: SubscriptionState,
    pub generation: Generation,
    /// Length of the latest published stream list.
    pub stream_count: usize,
    /// Stream of the in-flight or active subscription.
    pub active_stream: Option<StreamId>,
    /// Mode of the in-flight or active subscription.
    pub active_mode: Option<MediaMode>,
    pub audio_available: bool,
    pub video_available: bool,
    pub renderer_id: Option<RendererId>,
    /// Whether the renderer is currently started on a surface.
    pub rendering: bool,
    pub observing_streams: bool,
    pub observer_count: usize,
    /// Mailbox depth when this snapshot request was received.
    pub mailbox_depth: usize,
    pub mailbox_peak_depth: usize,
}

/// Result of reconciling the member registry with a full member list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MembersDiff {
    pub joined: Vec<MemberId>,
    pub left: Vec<MemberId>,
    pub renamed: Vec<MemberId>,
}

/// Room status (for debugging and the replay report).
#[derive(Debug, Clone, Serialize)]
pub struct RoomStatus {
    pub room_id: RoomId,
    pub member_count: usize,
    pub members: Vec<MemberSnapshot>,
    pub is_closed: bool,
    pub mailbox_depth: usize,
}

impl RoomStatus {
    /// Members currently in `Subscribed`.
    #[must_use]
    pub fn subscribed_count(&self) -> usize {
        self.members
            .iter()
            .filter(|m| m.state == SubscriptionState::Subscribed)
            .count()
    }

    /// True once no member has a request in flight.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.members
            .iter()
            .all(|m| m.state != SubscriptionState::Pending)
    }
}
