//! `RoomActor` - member registry and supervisor for member actors.
//!
//! The `RoomActor` is the top-level actor for one joined room:
//!
//! - Supervises one `MemberActor` per room member
//! - Handles member join/leave and full member-list reconciliation
//! - Attaches room-wide observers to every member controller
//! - Owns the root `CancellationToken` for the room
//! - Monitors child actor health (panic detection via `JoinHandle`)
//!
//! # Leaving
//!
//! `leave()` disposes every member controller and closes the registry;
//! further joins are rejected with `RoomClosed`. Cancelling the handle tears
//! the whole hierarchy down through child tokens.

use crate::config::Config;
use crate::errors::SubscriberError;
use crate::observability::{record_actor_panic, set_members_active};
use crate::observer::MemberObserver;
use crate::transport::Transport;

use super::member::{MemberActor, MemberActorHandle, MemberSettings};
use super::messages::{MemberInfo, MembersDiff, RoomMessage, RoomStatus};
use super::metrics::{ActorMetrics, ActorType, MailboxMonitor};

use common::types::{MemberId, RoomId};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// How long a disposed member task may take to finish before it is reported.
const MEMBER_EXIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle to the `RoomActor`.
///
/// This is the public interface for interacting with the room.
/// All methods are async and return results via oneshot channels.
#[derive(Clone, Debug)]
pub struct RoomActorHandle {
    sender: mpsc::Sender<RoomMessage>,
    cancel_token: CancellationToken,
    room_id: RoomId,
}

impl RoomActorHandle {
    /// Create a new `RoomActor` and return a handle to it.
    ///
    /// This spawns the actor task and returns immediately.
    ///
    /// # Arguments
    ///
    /// * `room_id` - Room identifier
    /// * `transport` - Media transport shared by all member controllers
    /// * `config` - Mailbox sizes and subscribe policy
    /// * `observers` - Observers attached to every member that joins
    /// * `metrics` - Shared actor metrics
    #[must_use]
    pub fn new(
        room_id: RoomId,
        transport: Arc<dyn Transport>,
        config: &Config,
        observers: Vec<Arc<dyn MemberObserver>>,
        metrics: Arc<ActorMetrics>,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(config.room_mailbox_capacity);
        let cancel_token = CancellationToken::new();

        let actor = RoomActor {
            mailbox: MailboxMonitor::new(ActorType::Room, room_id.as_str()),
            room_id: room_id.clone(),
            transport,
            member_settings: MemberSettings::from(config),
            observers,
            receiver,
            cancel_token: cancel_token.clone(),
            members: BTreeMap::new(),
            is_closed: false,
            metrics,
        };

        tokio::spawn(actor.run());

        Self {
            sender,
            cancel_token,
            room_id,
        }
    }

    /// Get the room ID.
    #[must_use]
    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    /// Register a member and start its controller.
    pub async fn member_joined(
        &self,
        member: MemberInfo,
    ) -> Result<MemberActorHandle, SubscriberError> {
        let (tx, rx) = oneshot::channel();
        self.send(RoomMessage::MemberJoined {
            member,
            respond_to: tx,
        })
        .await?;
        Self::receive(rx).await?
    }

    /// Dispose a member's controller and remove it from the registry.
    pub async fn member_left(&self, member_id: MemberId) -> Result<(), SubscriberError> {
        let (tx, rx) = oneshot::channel();
        self.send(RoomMessage::MemberLeft {
            member_id,
            respond_to: tx,
        })
        .await?;
        Self::receive(rx).await?
    }

    /// Reconcile the registry with the full member list.
    pub async fn update_members(
        &self,
        members: Vec<MemberInfo>,
    ) -> Result<MembersDiff, SubscriberError> {
        let (tx, rx) = oneshot::channel();
        self.send(RoomMessage::UpdateMembers {
            members,
            respond_to: tx,
        })
        .await?;
        Self::receive(rx).await?
    }

    /// Get a handle to a member's controller.
    pub async fn member(&self, member_id: MemberId) -> Result<MemberActorHandle, SubscriberError> {
        let (tx, rx) = oneshot::channel();
        self.send(RoomMessage::GetMember {
            member_id,
            respond_to: tx,
        })
        .await?;
        Self::receive(rx).await?
    }

    /// Get the current room status.
    pub async fn status(&self) -> Result<RoomStatus, SubscriberError> {
        let (tx, rx) = oneshot::channel();
        self.send(RoomMessage::GetStatus { respond_to: tx }).await?;
        Self::receive(rx).await
    }

    /// Leave the room: dispose every member controller.
    pub async fn leave(&self) -> Result<(), SubscriberError> {
        let (tx, rx) = oneshot::channel();
        self.send(RoomMessage::Leave { respond_to: tx }).await?;
        Self::receive(rx).await
    }

    /// Cancel the actor (for immediate shutdown).
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Check if the actor is cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    async fn send(&self, message: RoomMessage) -> Result<(), SubscriberError> {
        self.sender
            .send(message)
            .await
            .map_err(|_| SubscriberError::RoomClosed)
    }

    async fn receive<T>(rx: oneshot::Receiver<T>) -> Result<T, SubscriberError> {
        rx.await
            .map_err(|e| SubscriberError::Internal(format!("response receive failed: {e}")))
    }
}

/// Internal state for a managed member.
struct ManagedMember {
    /// Handle to the member actor.
    handle: MemberActorHandle,
    /// Join handle for monitoring the actor task.
    task_handle: JoinHandle<()>,
    /// Display name last announced by the transport.
    display_name: String,
    /// Join timestamp.
    joined_at: i64,
}

/// The `RoomActor` implementation.
struct RoomActor {
    room_id: RoomId,
    transport: Arc<dyn Transport>,
    member_settings: MemberSettings,
    /// Room-wide observers attached to each member on join.
    observers: Vec<Arc<dyn MemberObserver>>,
    receiver: mpsc::Receiver<RoomMessage>,
    /// Cancellation token (root).
    cancel_token: CancellationToken,
    /// Managed members, ordered by id.
    members: BTreeMap<MemberId, ManagedMember>,
    /// Set once the room has been left.
    is_closed: bool,
    metrics: Arc<ActorMetrics>,
    mailbox: MailboxMonitor,
}

impl RoomActor {
    /// Run the actor message loop.
    #[instrument(skip_all, name = "ms.actor.room", fields(room_id = %self.room_id))]
    async fn run(mut self) {
        info!(
            target: "ms.actor.room",
            room_id = %self.room_id,
            "RoomActor started"
        );

        loop {
            // Check for terminated member actors
            self.check_member_health().await;

            tokio::select! {
                // Handle cancellation
                () = self.cancel_token.cancelled() => {
                    info!(
                        target: "ms.actor.room",
                        room_id = %self.room_id,
                        "RoomActor received cancellation signal"
                    );
                    self.shutdown().await;
                    break;
                }

                // Handle messages
                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => {
                            self.mailbox.record_receive(self.receiver.len() + 1);
                            self.handle_message(message).await;
                            self.mailbox.record_processed();
                            self.metrics.record_message_processed();
                        }
                        None => {
                            info!(
                                target: "ms.actor.room",
                                room_id = %self.room_id,
                                "RoomActor channel closed, exiting"
                            );
                            self.shutdown().await;
                            break;
                        }
                    }
                }
            }
        }

        info!(
            target: "ms.actor.room",
            room_id = %self.room_id,
            members_remaining = self.members.len(),
            messages_processed = self.mailbox.messages_processed(),
            "RoomActor stopped"
        );
    }

    /// Handle a single message.
    async fn handle_message(&mut self, message: RoomMessage) {
        match message {
            RoomMessage::MemberJoined { member, respond_to } => {
                let result = self.member_joined(member).await;
                let _ = respond_to.send(result);
            }

            RoomMessage::MemberLeft {
                member_id,
                respond_to,
            } => {
                let result = self.member_left(&member_id).await;
                let _ = respond_to.send(result);
            }

            RoomMessage::UpdateMembers {
                members,
                respond_to,
            } => {
                let result = self.update_members(members).await;
                let _ = respond_to.send(result);
            }

            RoomMessage::GetMember {
                member_id,
                respond_to,
            } => {
                let result = self
                    .members
                    .get(&member_id)
                    .map(|managed| managed.handle.clone())
                    .ok_or(SubscriberError::MemberNotFound(member_id));
                let _ = respond_to.send(result);
            }

            RoomMessage::GetStatus { respond_to } => {
                let status = self.status().await;
                let _ = respond_to.send(status);
            }

            RoomMessage::Leave { respond_to } => {
                self.leave().await;
                let _ = respond_to.send(());
            }
        }
    }

    /// Spawn a member controller and start observing its streams.
    async fn member_joined(
        &mut self,
        member: MemberInfo,
    ) -> Result<MemberActorHandle, SubscriberError> {
        if self.is_closed {
            return Err(SubscriberError::RoomClosed);
        }

        if self.members.contains_key(&member.member_id) {
            return Err(SubscriberError::MemberExists(member.member_id));
        }

        debug!(
            target: "ms.actor.room",
            room_id = %self.room_id,
            member_id = %member.member_id,
            is_self = member.is_self,
            "Creating member actor"
        );

        let member_id = member.member_id.clone();
        let display_name = member.display_name.clone();

        let (handle, task_handle) = MemberActor::spawn(
            member,
            Arc::clone(&self.transport),
            self.member_settings,
            self.cancel_token.child_token(),
            Arc::clone(&self.metrics),
        );

        if let Err(e) = Self::start_member(&handle, &self.observers).await {
            warn!(
                target: "ms.actor.room",
                room_id = %self.room_id,
                member_id = %member_id,
                error = %e,
                "Member actor failed to start, cancelling"
            );
            handle.cancel();
            self.reap_member(&member_id, task_handle);
            return Err(e);
        }

        self.members.insert(
            member_id.clone(),
            ManagedMember {
                handle: handle.clone(),
                task_handle,
                display_name,
                joined_at: chrono::Utc::now().timestamp(),
            },
        );

        self.metrics.member_created();
        set_members_active(self.metrics.member_count());

        info!(
            target: "ms.actor.room",
            room_id = %self.room_id,
            member_id = %member_id,
            total_members = self.members.len(),
            "Member actor created"
        );

        Ok(handle)
    }

    /// Attach room observers, then start stream observation.
    ///
    /// Observers go in first so the first subscription outcome is not missed.
    async fn start_member(
        handle: &MemberActorHandle,
        observers: &[Arc<dyn MemberObserver>],
    ) -> Result<(), SubscriberError> {
        for observer in observers {
            handle.add_observer(Arc::clone(observer)).await?;
        }
        handle.observe_streams().await?;
        Ok(())
    }

    /// Dispose a member controller and forget it.
    async fn member_left(&mut self, member_id: &MemberId) -> Result<(), SubscriberError> {
        let Some(managed) = self.members.remove(member_id) else {
            return Err(SubscriberError::MemberNotFound(member_id.clone()));
        };

        self.dispose_member(member_id, managed).await;

        info!(
            target: "ms.actor.room",
            room_id = %self.room_id,
            member_id = %member_id,
            total_members = self.members.len(),
            "Member actor removed"
        );

        Ok(())
    }

    /// Join new members, remove departed ones and propagate renames.
    async fn update_members(
        &mut self,
        members: Vec<MemberInfo>,
    ) -> Result<MembersDiff, SubscriberError> {
        if self.is_closed {
            return Err(SubscriberError::RoomClosed);
        }

        let departed: Vec<MemberId> = {
            let present: HashSet<&MemberId> = members.iter().map(|m| &m.member_id).collect();
            self.members
                .keys()
                .filter(|id| !present.contains(id))
                .cloned()
                .collect()
        };

        let mut diff = MembersDiff::default();

        for member_id in departed {
            self.member_left(&member_id).await?;
            diff.left.push(member_id);
        }

        for member in members {
            match self.members.get_mut(&member.member_id) {
                Some(managed) => {
                    if managed.display_name != member.display_name {
                        managed.display_name.clone_from(&member.display_name);
                        managed
                            .handle
                            .update_display_name(member.display_name)
                            .await?;
                        diff.renamed.push(member.member_id);
                    }
                }
                None => {
                    let member_id = member.member_id.clone();
                    self.member_joined(member).await?;
                    diff.joined.push(member_id);
                }
            }
        }

        debug!(
            target: "ms.actor.room",
            room_id = %self.room_id,
            joined = diff.joined.len(),
            left = diff.left.len(),
            renamed = diff.renamed.len(),
            "Member list reconciled"
        );

        Ok(diff)
    }

    /// Get current room status.
    async fn status(&self) -> RoomStatus {
        let mut snapshots = Vec::with_capacity(self.members.len());
        for (member_id, managed) in &self.members {
            match managed.handle.snapshot().await {
                Ok(snapshot) => snapshots.push(snapshot),
                Err(e) => {
                    warn!(
                        target: "ms.actor.room",
                        room_id = %self.room_id,
                        member_id = %member_id,
                        joined_at = managed.joined_at,
                        error = %e,
                        "Failed to query member actor state"
                    );
                }
            }
        }

        RoomStatus {
            room_id: self.room_id.clone(),
            member_count: self.members.len(),
            members: snapshots,
            is_closed: self.is_closed,
            mailbox_depth: self.mailbox.current_depth(),
        }
    }

    /// Dispose every member and close the registry.
    async fn leave(&mut self) {
        if self.is_closed {
            return;
        }

        info!(
            target: "ms.actor.room",
            room_id = %self.room_id,
            member_count = self.members.len(),
            "Leaving room"
        );

        self.is_closed = true;
        let members = std::mem::take(&mut self.members);
        for (member_id, managed) in members {
            self.dispose_member(&member_id, managed).await;
        }
    }

    /// Dispose a member synchronously, then reap its task in the background.
    async fn dispose_member(&self, member_id: &MemberId, managed: ManagedMember) {
        if let Err(e) = managed.handle.dispose().await {
            warn!(
                target: "ms.actor.room",
                room_id = %self.room_id,
                member_id = %member_id,
                error = %e,
                "Member dispose failed, cancelling"
            );
            managed.handle.cancel();
        }

        self.metrics.member_removed();
        set_members_active(self.metrics.member_count());

        self.reap_member(member_id, managed.task_handle);
    }

    /// Await a member task in the background, recording panics.
    fn reap_member(&self, member_id: &MemberId, task_handle: JoinHandle<()>) {
        // Don't block the message loop on task completion
        let room_id = self.room_id.clone();
        let member_id = member_id.clone();
        let metrics = Arc::clone(&self.metrics);
        tokio::spawn(async move {
            match tokio::time::timeout(MEMBER_EXIT_TIMEOUT, task_handle).await {
                Ok(Ok(())) => {
                    debug!(
                        target: "ms.actor.room",
                        room_id = %room_id,
                        member_id = %member_id,
                        "Member actor task completed cleanly"
                    );
                }
                Ok(Err(e)) => {
                    if e.is_panic() {
                        metrics.record_panic(ActorType::Member);
                        record_actor_panic(ActorType::Member.as_str());
                    }
                    warn!(
                        target: "ms.actor.room",
                        room_id = %room_id,
                        member_id = %member_id,
                        error = ?e,
                        "Member actor task failed during removal"
                    );
                }
                Err(_) => {
                    warn!(
                        target: "ms.actor.room",
                        room_id = %room_id,
                        member_id = %member_id,
                        "Member actor task cleanup timed out"
                    );
                }
            }
        });
    }

    /// Cancel all member actors and wait for them to finish.
    async fn shutdown(&mut self) {
        self.is_closed = true;

        for managed in self.members.values() {
            managed.handle.cancel();
        }

        for (member_id, managed) in std::mem::take(&mut self.members) {
            match tokio::time::timeout(MEMBER_EXIT_TIMEOUT, managed.task_handle).await {
                Ok(Ok(())) => {
                    debug!(
                        target: "ms.actor.room",
                        room_id = %self.room_id,
                        member_id = %member_id,
                        "Member actor completed cleanly"
                    );
                }
                Ok(Err(e)) => {
                    warn!(
                        target: "ms.actor.room",
                        room_id = %self.room_id,
                        member_id = %member_id,
                        error = ?e,
                        "Member actor task panicked during shutdown"
                    );
                }
                Err(_) => {
                    warn!(
                        target: "ms.actor.room",
                        room_id = %self.room_id,
                        member_id = %member_id,
                        "Member actor shutdown timed out"
                    );
                }
            }
            self.metrics.member_removed();
        }

        set_members_active(self.metrics.member_count());

        info!(
            target: "ms.actor.room",
            room_id = %self.room_id,
            "Room shutdown complete"
        );
    }

    /// Check health of managed member actors.
    async fn check_member_health(&mut self) {
        let finished: Vec<MemberId> = self
            .members
            .iter()
            .filter(|(_, managed)| managed.task_handle.is_finished())
            .map(|(member_id, _)| member_id.clone())
            .collect();

        for member_id in finished {
            let Some(managed) = self.members.remove(&member_id) else {
                continue;
            };

            warn!(
                target: "ms.actor.room",
                room_id = %self.room_id,
                member_id = %member_id,
                "Member actor task finished unexpectedly"
            );

            if let Err(join_error) = managed.task_handle.await {
                if join_error.is_panic() {
                    error!(
                        target: "ms.actor.room",
                        room_id = %self.room_id,
                        member_id = %member_id,
                        error = ?join_error,
                        "Member actor panicked - investigation required"
                    );
                    self.metrics.record_panic(ActorType::Member);
                    record_actor_panic(ActorType::Member.as_str());
                }
            }

            self.metrics.member_removed();
            set_members_active(self.metrics.member_count());
        }
    }
}
