//! `MemberActor` - per-member subscription controller.
//!
//! Each `MemberActor`:
//! - Owns the media subscription of exactly one room member
//! - Watches the member's published stream list and re-subscribes on change
//! - Tries candidates one at a time, in transport order, until one succeeds
//! - Publishes audio/video/renderer availability to its observers
//!
//! # Ordering
//!
//! Caller requests, stream-list notifications and subscribe completions all
//! arrive through the actor mailbox. Transport calls run on their own task
//! and post a `SubscribeCompleted` carrying the generation they were issued
//! under; completions from an older generation are released and dropped.
//!
//! # Lifecycle
//!
//! 1. Spawned by the `RoomActor` when the member joins
//! 2. Runs until disposed, cancelled (room left) or every handle is dropped
//! 3. On exit every renderer and subscriber it still holds is released

use crate::config::Config;
use crate::errors::{SubscriberError, TransportError};
use crate::observability::{
    record_candidates_exhausted, record_renderer_start_failure, record_subscribe_duration,
    record_subscribe_outcome, record_subscribe_request, set_subscriptions_active,
    SubscribeOutcome,
};
use crate::observer::{MemberObserver, ObserverId, ObserverRegistry};
use crate::subscription::{
    Attempt, FailureStep, Generation, ModeFallback, SubscriptionMachine, SuccessStep,
};
use crate::transport::{MediaMode, MediaSubscription, RenderSurface, StreamCandidate, Transport};

use super::messages::{MemberInfo, MemberMessage, MemberSnapshot};
use super::metrics::{ActorMetrics, ActorType, MailboxMonitor};

use common::types::MemberId;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Per-member actor settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberSettings {
    /// Mailbox capacity.
    pub mailbox_capacity: usize,
    /// Mode used for automatic subscribes until a caller asks for another.
    pub preferred_mode: MediaMode,
    /// Retry policy for failed video requests.
    pub fallback: ModeFallback,
}

impl Default for MemberSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for MemberSettings {
    fn from(config: &Config) -> Self {
        Self {
            mailbox_capacity: config.member_mailbox_capacity,
            preferred_mode: config.preferred_mode,
            fallback: config.mode_fallback,
        }
    }
}

/// Handle to a `MemberActor`.
#[derive(Clone, Debug)]
pub struct MemberActorHandle {
    sender: mpsc::Sender<MemberMessage>,
    cancel_token: CancellationToken,
    member_id: MemberId,
    is_self: bool,
}

impl MemberActorHandle {
    /// Get the member ID.
    #[must_use]
    pub fn member_id(&self) -> &MemberId {
        &self.member_id
    }

    /// Whether this controller belongs to the local participant.
    #[must_use]
    pub fn is_self(&self) -> bool {
        self.is_self
    }

    /// Start watching the member's stream list.
    ///
    /// Returns `false` if the controller was already observing.
    pub async fn observe_streams(&self) -> Result<bool, SubscriberError> {
        let (tx, rx) = oneshot::channel();
        self.send(MemberMessage::ObserveStreams { respond_to: tx })
            .await?;
        Self::receive(rx).await
    }

    /// Subscribe to the member's latest stream list.
    ///
    /// Fails with `InvalidState` unless the controller is `NotSubscribed`.
    /// Returns once the first request is issued; the outcome is reported to
    /// observers.
    pub async fn subscribe(&self, mode: MediaMode) -> Result<(), SubscriberError> {
        let (tx, rx) = oneshot::channel();
        self.send(MemberMessage::Subscribe {
            mode,
            respond_to: tx,
        })
        .await?;
        Self::receive(rx).await?
    }

    /// Tear down the subscription but keep observing the stream list.
    pub async fn unsubscribe(&self) -> Result<(), SubscriberError> {
        let (tx, rx) = oneshot::channel();
        self.send(MemberMessage::Unsubscribe { respond_to: tx })
            .await?;
        Self::receive(rx).await
    }

    /// Release everything and stop the controller.
    ///
    /// Disposing an already disposed controller is a no-op.
    pub async fn dispose(&self) -> Result<(), SubscriberError> {
        let (tx, rx) = oneshot::channel();
        if self
            .sender
            .send(MemberMessage::Dispose { respond_to: tx })
            .await
            .is_err()
        {
            return Ok(());
        }

        // A dropped responder means the actor exited while the request was
        // queued, which releases the same resources.
        let _ = rx.await;
        Ok(())
    }

    /// Bind the renderer to a view surface.
    pub async fn attach_surface(&self, surface: RenderSurface) -> Result<(), SubscriberError> {
        let (tx, rx) = oneshot::channel();
        self.send(MemberMessage::AttachSurface {
            surface,
            respond_to: tx,
        })
        .await?;
        Self::receive(rx).await?
    }

    /// Unbind the renderer from its surface.
    pub async fn detach_surface(&self) -> Result<(), SubscriberError> {
        let (tx, rx) = oneshot::channel();
        self.send(MemberMessage::DetachSurface { respond_to: tx })
            .await?;
        Self::receive(rx).await
    }

    /// Forward the local capture state (self member only).
    pub async fn update_local_media(
        &self,
        audio_enabled: bool,
        video_enabled: bool,
    ) -> Result<(), SubscriberError> {
        let (tx, rx) = oneshot::channel();
        self.send(MemberMessage::UpdateLocalMedia {
            audio_enabled,
            video_enabled,
            respond_to: tx,
        })
        .await?;
        Self::receive(rx).await?
    }

    /// Update the member's display name.
    pub async fn update_display_name(&self, display_name: String) -> Result<(), SubscriberError> {
        self.send(MemberMessage::UpdateDisplayName { display_name })
            .await
    }

    /// Register an observer.
    pub async fn add_observer(
        &self,
        observer: Arc<dyn MemberObserver>,
    ) -> Result<ObserverId, SubscriberError> {
        let (tx, rx) = oneshot::channel();
        self.send(MemberMessage::AddObserver {
            observer,
            respond_to: tx,
        })
        .await?;
        Self::receive(rx).await
    }

    /// Unregister an observer. Returns `false` if it was not registered.
    pub async fn remove_observer(&self, observer_id: ObserverId) -> Result<bool, SubscriberError> {
        let (tx, rx) = oneshot::channel();
        self.send(MemberMessage::RemoveObserver {
            observer_id,
            respond_to: tx,
        })
        .await?;
        Self::receive(rx).await
    }

    /// Get a snapshot of the controller state.
    pub async fn snapshot(&self) -> Result<MemberSnapshot, SubscriberError> {
        let (tx, rx) = oneshot::channel();
        self.send(MemberMessage::GetSnapshot { respond_to: tx })
            .await?;
        Self::receive(rx).await
    }

    /// Cancel the member actor.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Check if the actor is cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    async fn send(&self, message: MemberMessage) -> Result<(), SubscriberError> {
        self.sender
            .send(message)
            .await
            .map_err(|e| SubscriberError::Internal(format!("channel send failed: {e}")))
    }

    async fn receive<T>(rx: oneshot::Receiver<T>) -> Result<T, SubscriberError> {
        rx.await
            .map_err(|e| SubscriberError::Internal(format!("response receive failed: {e}")))
    }
}

/// The `MemberActor` implementation.
pub struct MemberActor {
    member: MemberInfo,
    transport: Arc<dyn Transport>,
    settings: MemberSettings,
    /// Weak so that dropping every handle closes the mailbox.
    mailbox_sender: mpsc::WeakSender<MemberMessage>,
    receiver: mpsc::Receiver<MemberMessage>,
    /// Cancellation token (child of the room's token).
    cancel_token: CancellationToken,
    /// Cancels the stream-list forwarder; `Some` while observing.
    observe_token: Option<CancellationToken>,
    metrics: Arc<ActorMetrics>,
    mailbox: MailboxMonitor,
    machine: SubscriptionMachine,
    observers: ObserverRegistry,
    /// Latest published stream list.
    streams: Vec<StreamCandidate>,
    /// Subscription held while `Subscribed`.
    active: Option<MediaSubscription>,
    surface: Option<RenderSurface>,
    rendering: bool,
    audio_available: bool,
    video_available: bool,
    /// Start of the current retry sequence.
    sequence_started: Option<Instant>,
}

impl MemberActor {
    /// Spawn a new member actor.
    ///
    /// Returns a handle and the task join handle.
    pub fn spawn(
        member: MemberInfo,
        transport: Arc<dyn Transport>,
        settings: MemberSettings,
        cancel_token: CancellationToken,
        metrics: Arc<ActorMetrics>,
    ) -> (MemberActorHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(settings.mailbox_capacity);

        let handle = MemberActorHandle {
            sender: sender.clone(),
            cancel_token: cancel_token.clone(),
            member_id: member.member_id.clone(),
            is_self: member.is_self,
        };

        let actor = Self {
            mailbox: MailboxMonitor::new(ActorType::Member, member.member_id.as_str()),
            machine: SubscriptionMachine::new(settings.fallback),
            member,
            transport,
            settings,
            mailbox_sender: sender.downgrade(),
            receiver,
            cancel_token,
            observe_token: None,
            metrics,
            observers: ObserverRegistry::new(),
            streams: Vec::new(),
            active: None,
            surface: None,
            rendering: false,
            audio_available: false,
            video_available: false,
            sequence_started: None,
        };

        let task_handle = tokio::spawn(actor.run());

        (handle, task_handle)
    }

    /// Run the actor message loop.
    #[instrument(
        skip_all,
        name = "ms.actor.member",
        fields(member_id = %self.member.member_id, is_self = self.member.is_self)
    )]
    async fn run(mut self) {
        debug!(
            target: "ms.actor.member",
            member_id = %self.member.member_id,
            is_self = self.member.is_self,
            "MemberActor started"
        );

        loop {
            tokio::select! {
                // Handle cancellation
                () = self.cancel_token.cancelled() => {
                    debug!(
                        target: "ms.actor.member",
                        member_id = %self.member.member_id,
                        "MemberActor received cancellation signal"
                    );
                    self.shutdown("cancelled");
                    break;
                }

                // Handle messages
                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => {
                            self.mailbox.record_receive(self.receiver.len() + 1);
                            let should_exit = self.handle_message(message);
                            self.mailbox.record_processed();
                            self.metrics.record_message_processed();

                            if should_exit {
                                break;
                            }
                        }
                        None => {
                            debug!(
                                target: "ms.actor.member",
                                member_id = %self.member.member_id,
                                "MemberActor channel closed, exiting"
                            );
                            self.shutdown("channel_closed");
                            break;
                        }
                    }
                }
            }
        }

        self.drain_mailbox();

        info!(
            target: "ms.actor.member",
            member_id = %self.member.member_id,
            generation = %self.machine.generation(),
            messages_processed = self.mailbox.messages_processed(),
            "MemberActor stopped"
        );
    }

    /// Handle a single message. Returns true if the actor should exit.
    fn handle_message(&mut self, message: MemberMessage) -> bool {
        match message {
            MemberMessage::ObserveStreams { respond_to } => {
                let started = self.observe_streams();
                let _ = respond_to.send(started);
            }

            MemberMessage::StreamsChanged { streams } => {
                self.handle_streams_changed(streams);
            }

            MemberMessage::Subscribe { mode, respond_to } => {
                let result = self.subscribe(mode);
                let _ = respond_to.send(result);
            }

            MemberMessage::SubscribeCompleted { generation, result } => {
                self.handle_completion(generation, result);
            }

            MemberMessage::Unsubscribe { respond_to } => {
                self.teardown("unsubscribe");
                let _ = respond_to.send(());
            }

            MemberMessage::AttachSurface {
                surface,
                respond_to,
            } => {
                let result = self.attach_surface(surface);
                let _ = respond_to.send(result);
            }

            MemberMessage::DetachSurface { respond_to } => {
                self.detach_surface();
                let _ = respond_to.send(());
            }

            MemberMessage::UpdateLocalMedia {
                audio_enabled,
                video_enabled,
                respond_to,
            } => {
                let result = self.update_local_media(audio_enabled, video_enabled);
                let _ = respond_to.send(result);
            }

            MemberMessage::UpdateDisplayName { display_name } => {
                debug!(
                    target: "ms.actor.member",
                    member_id = %self.member.member_id,
                    "Display name updated"
                );
                self.member.display_name = display_name;
            }

            MemberMessage::AddObserver {
                observer,
                respond_to,
            } => {
                let id = self.observers.add(observer);
                let _ = respond_to.send(id);
            }

            MemberMessage::RemoveObserver {
                observer_id,
                respond_to,
            } => {
                let removed = self.observers.remove(observer_id);
                let _ = respond_to.send(removed);
            }

            MemberMessage::GetSnapshot { respond_to } => {
                let _ = respond_to.send(self.snapshot());
            }

            MemberMessage::Dispose { respond_to } => {
                self.shutdown("dispose");
                let _ = respond_to.send(());
                return true;
            }
        }

        false
    }

    /// Take the current stream list and start forwarding changes.
    ///
    /// Returns false if already observing.
    fn observe_streams(&mut self) -> bool {
        if self.observe_token.is_some() {
            return false;
        }

        let token = self.cancel_token.child_token();
        let mut streams = self.transport.watch_streams(&self.member.member_id);
        let initial = streams.borrow_and_update().clone();
        tokio::spawn(forward_stream_changes(
            streams,
            self.mailbox_sender.clone(),
            token.clone(),
        ));
        self.observe_token = Some(token);

        debug!(
            target: "ms.actor.member",
            member_id = %self.member.member_id,
            stream_count = initial.len(),
            "Observing stream list"
        );

        self.handle_streams_changed(initial);
        true
    }

    fn handle_streams_changed(&mut self, streams: Vec<StreamCandidate>) {
        debug!(
            target: "ms.actor.member",
            member_id = %self.member.member_id,
            stream_count = streams.len(),
            state = %self.machine.state(),
            "Stream list changed"
        );

        self.streams = streams;

        if self.member.is_self {
            return;
        }

        self.teardown("streams_changed");

        if self.streams.is_empty() {
            return;
        }

        match self.machine.begin(&self.streams, self.settings.preferred_mode) {
            Ok(attempt) => {
                self.sequence_started = Some(Instant::now());
                self.issue(attempt);
            }
            Err(e) => {
                debug_assert!(
                    !matches!(e, SubscriberError::InvalidState(_)),
                    "automatic subscribe rejected after teardown: {e}"
                );
                warn!(
                    target: "ms.actor.member",
                    member_id = %self.member.member_id,
                    error = %e,
                    "Automatic subscribe skipped"
                );
            }
        }
    }

    fn subscribe(&mut self, mode: MediaMode) -> Result<(), SubscriberError> {
        if self.member.is_self {
            return Err(SubscriberError::LocalMember);
        }

        match self.machine.begin(&self.streams, mode) {
            Ok(attempt) => {
                self.settings.preferred_mode = mode;
                self.sequence_started = Some(Instant::now());
                self.issue(attempt);
                Ok(())
            }
            Err(e) => {
                if e.is_usage_error() {
                    warn!(
                        target: "ms.actor.member",
                        member_id = %self.member.member_id,
                        error = %e,
                        "Subscribe rejected"
                    );
                } else {
                    debug!(
                        target: "ms.actor.member",
                        member_id = %self.member.member_id,
                        error = %e,
                        "Subscribe rejected"
                    );
                }
                Err(e)
            }
        }
    }

    /// Issue one transport request off the actor task.
    fn issue(&mut self, attempt: Attempt) {
        self.metrics.record_subscribe_request();
        record_subscribe_request(attempt.mode);

        debug!(
            target: "ms.actor.member",
            member_id = %self.member.member_id,
            stream_id = %attempt.candidate.stream_id(),
            mode = %attempt.mode,
            generation = %attempt.generation,
            attempt = self.machine.attempts(),
            "Issuing subscribe request"
        );

        let transport = Arc::clone(&self.transport);
        let member_id = self.member.member_id.clone();
        let mailbox = self.mailbox_sender.clone();

        tokio::spawn(async move {
            let result = transport
                .subscribe_to_stream(&member_id, &attempt.candidate, attempt.mode)
                .await;
            let message = MemberMessage::SubscribeCompleted {
                generation: attempt.generation,
                result,
            };
            deliver_or_release(&mailbox, message).await;
        });
    }

    fn handle_completion(
        &mut self,
        generation: Generation,
        result: Result<MediaSubscription, TransportError>,
    ) {
        match result {
            Ok(subscription) => match self.machine.complete_success(generation) {
                SuccessStep::Accepted(attempt) => self.accept(&attempt, subscription),
                SuccessStep::Stale => self.discard_stale(generation, Some(subscription)),
            },
            Err(error) => match self.machine.complete_failure(generation) {
                FailureStep::Retry(next) => {
                    record_subscribe_outcome(SubscribeOutcome::Failure);
                    debug!(
                        target: "ms.actor.member",
                        member_id = %self.member.member_id,
                        error = %error,
                        "Candidate failed, trying next"
                    );
                    self.issue(next);
                }
                FailureStep::Exhausted { attempts } => {
                    record_subscribe_outcome(SubscribeOutcome::Failure);
                    self.exhausted(attempts, &error);
                }
                FailureStep::Stale => self.discard_stale(generation, None),
            },
        }
    }

    fn accept(&mut self, attempt: &Attempt, subscription: MediaSubscription) {
        if let Some(previous) = self.active.take() {
            previous.release();
            self.metrics.subscription_released();
        }

        let renderer_id = subscription.renderer.id();
        self.active = Some(subscription);
        self.rendering = false;
        self.metrics.subscription_established();
        set_subscriptions_active(self.metrics.subscription_count());
        record_subscribe_outcome(SubscribeOutcome::Success);
        if let Some(started) = self.sequence_started.take() {
            record_subscribe_duration(started.elapsed());
        }

        info!(
            target: "ms.actor.member",
            member_id = %self.member.member_id,
            stream_id = %attempt.candidate.stream_id(),
            mode = %attempt.mode,
            renderer_id = %renderer_id,
            attempts = self.machine.attempts(),
            "Subscribed"
        );

        if let Some(surface) = self.surface.clone() {
            if let Err(e) = self.start_renderer(&surface) {
                record_renderer_start_failure();
                warn!(
                    target: "ms.actor.member",
                    member_id = %self.member.member_id,
                    error = %e,
                    "Renderer failed to start on attached surface"
                );
            }
        }

        let member_id = &self.member.member_id;
        self.observers
            .notify(|o| o.on_renderer_available(member_id, renderer_id));

        match attempt.mode {
            MediaMode::Video => self.set_video_available(true),
            MediaMode::Audio => self.set_audio_available(true),
        }
    }

    fn exhausted(&mut self, attempts: u32, last_error: &TransportError) {
        self.sequence_started = None;
        self.metrics.record_exhaustion();
        record_candidates_exhausted();

        warn!(
            target: "ms.actor.member",
            member_id = %self.member.member_id,
            attempts = attempts,
            last_error = %last_error,
            "No candidate stream could be subscribed"
        );

        let member_id = &self.member.member_id;
        self.observers.notify(|o| o.on_media_unavailable(member_id));
    }

    fn discard_stale(&mut self, generation: Generation, subscription: Option<MediaSubscription>) {
        self.metrics.record_stale_completion();
        record_subscribe_outcome(SubscribeOutcome::Stale);

        debug!(
            target: "ms.actor.member",
            member_id = %self.member.member_id,
            completion_generation = %generation,
            current_generation = %self.machine.generation(),
            carried_handles = subscription.is_some(),
            "Discarding stale completion"
        );

        if let Some(subscription) = subscription {
            subscription.release();
        }
    }

    /// Invalidate in-flight requests and release the active subscription.
    fn teardown(&mut self, reason: &'static str) {
        let previous = self.machine.reset();
        self.sequence_started = None;

        if let Some(subscription) = self.active.take() {
            subscription.release();
            self.rendering = false;
            self.metrics.subscription_released();
            set_subscriptions_active(self.metrics.subscription_count());
        }

        if !self.member.is_self {
            self.set_audio_available(false);
            self.set_video_available(false);
        }

        debug!(
            target: "ms.actor.member",
            member_id = %self.member.member_id,
            reason = reason,
            previous_state = %previous,
            generation = %self.machine.generation(),
            "Subscription torn down"
        );
    }

    /// Release everything before the actor exits.
    fn shutdown(&mut self, reason: &'static str) {
        self.teardown(reason);
        if let Some(token) = self.observe_token.take() {
            token.cancel();
        }
        self.surface = None;
        self.observers.clear();
    }

    /// Release handles carried by messages still queued after exit.
    fn drain_mailbox(&mut self) {
        self.receiver.close();
        while let Ok(message) = self.receiver.try_recv() {
            match message {
                MemberMessage::SubscribeCompleted {
                    result: Ok(subscription),
                    ..
                } => {
                    self.metrics.record_stale_completion();
                    subscription.release();
                }
                MemberMessage::Dispose { respond_to } => {
                    let _ = respond_to.send(());
                }
                _ => {}
            }
        }
    }

    fn attach_surface(&mut self, surface: RenderSurface) -> Result<(), SubscriberError> {
        debug!(
            target: "ms.actor.member",
            member_id = %self.member.member_id,
            surface = surface.as_str(),
            "Attaching surface"
        );

        self.surface = Some(surface.clone());
        self.start_renderer(&surface).map_err(|e| {
            record_renderer_start_failure();
            SubscriberError::Transport(e)
        })
    }

    fn detach_surface(&mut self) {
        self.surface = None;
        if self.rendering {
            if let Some(active) = self.active.as_mut() {
                active.renderer.stop();
            }
            self.rendering = false;
        }
    }

    /// Start (or restart) the active renderer on a surface.
    fn start_renderer(&mut self, surface: &RenderSurface) -> Result<(), TransportError> {
        let Some(active) = self.active.as_mut() else {
            return Ok(());
        };

        if self.rendering {
            active.renderer.stop();
            self.rendering = false;
        }

        active.renderer.start(surface)?;
        self.rendering = true;
        Ok(())
    }

    fn update_local_media(
        &mut self,
        audio_enabled: bool,
        video_enabled: bool,
    ) -> Result<(), SubscriberError> {
        if !self.member.is_self {
            return Err(SubscriberError::NotLocalMember);
        }

        self.set_audio_available(audio_enabled);
        self.set_video_available(video_enabled);
        Ok(())
    }

    fn set_audio_available(&mut self, enabled: bool) {
        if self.audio_available == enabled {
            return;
        }
        self.audio_available = enabled;
        let member_id = &self.member.member_id;
        self.observers
            .notify(|o| o.on_audio_availability_changed(member_id, enabled));
    }

    fn set_video_available(&mut self, enabled: bool) {
        if self.video_available == enabled {
            return;
        }
        self.video_available = enabled;
        let member_id = &self.member.member_id;
        self.observers
            .notify(|o| o.on_video_availability_changed(member_id, enabled));
    }

    fn snapshot(&self) -> MemberSnapshot {
        let current = self.machine.current();
        MemberSnapshot {
            member_id: self.member.member_id.clone(),
            display_name: self.member.display_name.clone(),
            is_self: self.member.is_self,
            state: self.machine.state(),
            generation: self.machine.generation(),
            stream_count: self.streams.len(),
            active_stream: current.map(|a| a.candidate.stream_id().clone()),
            active_mode: current.map(|a| a.mode),
            audio_available: self.audio_available,
            video_available: self.video_available,
            renderer_id: self.active.as_ref().map(|s| s.renderer.id()),
            rendering: self.rendering,
            observing_streams: self.observe_token.is_some(),
            observer_count: self.observers.len(),
            mailbox_depth: self.mailbox.current_depth(),
            mailbox_peak_depth: self.mailbox.peak_depth(),
        }
    }
}

/// Push every stream-list change into the member mailbox.
async fn forward_stream_changes(
    mut streams: watch::Receiver<Vec<StreamCandidate>>,
    mailbox: mpsc::WeakSender<MemberMessage>,
    cancel_token: CancellationToken,
) {
    loop {
        tokio::select! {
            () = cancel_token.cancelled() => break,
            changed = streams.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }

        let current = streams.borrow_and_update().clone();
        let Some(sender) = mailbox.upgrade() else {
            break;
        };

        tokio::select! {
            () = cancel_token.cancelled() => break,
            sent = sender.send(MemberMessage::StreamsChanged { streams: current }) => {
                if sent.is_err() {
                    break;
                }
            }
        }
    }
}

/// Post a completion to the actor, or release its handles if the actor is gone.
async fn deliver_or_release(mailbox: &mpsc::WeakSender<MemberMessage>, message: MemberMessage) {
    let undelivered = match mailbox.upgrade() {
        Some(sender) => match sender.send(message).await {
            Ok(()) => None,
            Err(mpsc::error::SendError(message)) => Some(message),
        },
        None => Some(message),
    };

    if let Some(MemberMessage::SubscribeCompleted {
        result: Ok(subscription),
        ..
    }) = undelivered
    {
        subscription.release();
    }
}
