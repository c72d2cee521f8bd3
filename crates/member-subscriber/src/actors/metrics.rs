//! Actor metrics and mailbox monitoring.
//!
//! Provides mailbox depth monitoring with per-actor thresholds:
//!
//! | Actor Type | Normal | Warning | Critical |
//! |------------|--------|---------|----------|
//! | Room       | < 100  | 100-500 | > 500    |
//! | Member     | < 16   | 16-48   | > 48     |
//!
//! Depth is sampled from the receiver on every receive, so it counts
//! messages still waiting behind the one being handled. A member mailbox
//! normally holds a handful of stream-list notifications and completions.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Mailbox depth thresholds for room actors.
pub const ROOM_MAILBOX_NORMAL: usize = 100;
pub const ROOM_MAILBOX_WARNING: usize = 500;

/// Mailbox depth thresholds for member actors.
pub const MEMBER_MAILBOX_NORMAL: usize = 16;
pub const MEMBER_MAILBOX_WARNING: usize = 48;

/// Actor type for metrics labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorType {
    /// RoomActor (one per joined room).
    Room,
    /// MemberActor (one per room member).
    Member,
}

impl ActorType {
    /// Returns the actor type as a string for metric labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ActorType::Room => "room",
            ActorType::Member => "member",
        }
    }

    /// Returns the warning threshold for this actor type.
    #[must_use]
    pub const fn warning_threshold(&self) -> usize {
        match self {
            ActorType::Room => ROOM_MAILBOX_WARNING,
            ActorType::Member => MEMBER_MAILBOX_WARNING,
        }
    }

    /// Returns the normal threshold for this actor type.
    #[must_use]
    pub const fn normal_threshold(&self) -> usize {
        match self {
            ActorType::Room => ROOM_MAILBOX_NORMAL,
            ActorType::Member => MEMBER_MAILBOX_NORMAL,
        }
    }
}

/// Mailbox depth level for alerting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailboxLevel {
    /// Below normal threshold.
    Normal,
    /// Between normal and warning thresholds.
    Warning,
    /// Above warning threshold.
    Critical,
}

/// Mailbox monitor for tracking queue depth.
#[derive(Debug)]
pub struct MailboxMonitor {
    actor_type: ActorType,
    /// Actor identifier (room_id or member_id).
    actor_id: String,
    depth: AtomicUsize,
    peak_depth: AtomicUsize,
    messages_processed: AtomicU64,
}

impl MailboxMonitor {
    /// Create a new mailbox monitor for the given actor.
    #[must_use]
    pub fn new(actor_type: ActorType, actor_id: impl Into<String>) -> Self {
        Self {
            actor_type,
            actor_id: actor_id.into(),
            depth: AtomicUsize::new(0),
            peak_depth: AtomicUsize::new(0),
            messages_processed: AtomicU64::new(0),
        }
    }

    /// Record a message taken from the mailbox.
    ///
    /// `depth` is the number of queued messages including the one just
    /// received, sampled from the receiver.
    pub fn record_receive(&self, depth: usize) {
        self.depth.store(depth, Ordering::Relaxed);
        self.peak_depth.fetch_max(depth, Ordering::Relaxed);

        let level = self.level_for_depth(depth);
        if level == MailboxLevel::Critical {
            warn!(
                target: "ms.actor.mailbox",
                actor_type = self.actor_type.as_str(),
                actor_id = %self.actor_id,
                depth,
                threshold = self.actor_type.warning_threshold(),
                "Mailbox depth critical"
            );
        } else if level == MailboxLevel::Warning {
            debug!(
                target: "ms.actor.mailbox",
                actor_type = self.actor_type.as_str(),
                actor_id = %self.actor_id,
                depth,
                "Mailbox depth elevated"
            );
        }
    }

    /// Record a message having been processed.
    pub fn record_processed(&self) {
        self.messages_processed.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn current_depth(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn peak_depth(&self) -> usize {
        self.peak_depth.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn messages_processed(&self) -> u64 {
        self.messages_processed.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn current_level(&self) -> MailboxLevel {
        self.level_for_depth(self.current_depth())
    }

    fn level_for_depth(&self, depth: usize) -> MailboxLevel {
        if depth > self.actor_type.warning_threshold() {
            MailboxLevel::Critical
        } else if depth > self.actor_type.normal_threshold() {
            MailboxLevel::Warning
        } else {
            MailboxLevel::Normal
        }
    }
}

/// Aggregated in-process counters for the actor system.
///
/// Shared by the room and its member actors; read by status reports and
/// tests. Prometheus emission lives in `observability::metrics`.
#[derive(Debug, Default)]
pub struct ActorMetrics {
    /// Member controllers currently alive.
    pub active_members: AtomicUsize,
    /// Members currently in `Subscribed`.
    pub active_subscriptions: AtomicUsize,
    /// Transport subscribe requests issued.
    pub subscribe_requests: AtomicU64,
    /// Completions discarded because their generation was invalidated.
    pub stale_completions: AtomicU64,
    /// Retry sequences that ran out of candidates.
    pub exhaustions: AtomicU64,
    /// Total actor panics (indicates bugs).
    pub actor_panics: AtomicU64,
    /// Total messages processed across all actors.
    pub total_messages_processed: AtomicU64,
}

impl ActorMetrics {
    /// Create a new shared metrics instance.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn member_created(&self) {
        self.active_members.fetch_add(1, Ordering::Relaxed);
    }

    pub fn member_removed(&self) {
        self.active_members.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn subscription_established(&self) {
        self.active_subscriptions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn subscription_released(&self) {
        self.active_subscriptions.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn record_subscribe_request(&self) {
        self.subscribe_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stale_completion(&self) {
        self.stale_completions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_exhaustion(&self) {
        self.exhaustions.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an actor panic.
    pub fn record_panic(&self, actor_type: ActorType) {
        self.actor_panics.fetch_add(1, Ordering::Relaxed);
        tracing::error!(
            target: "ms.actor.panic",
            actor_type = actor_type.as_str(),
            total_panics = self.actor_panics.load(Ordering::Relaxed),
            "Actor panic detected - indicates bug, investigation required"
        );
    }

    pub fn record_message_processed(&self) {
        self.total_messages_processed
            .fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn member_count(&self) -> usize {
        self.active_members.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.active_subscriptions.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn subscribe_request_count(&self) -> u64 {
        self.subscribe_requests.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn stale_completion_count(&self) -> u64 {
        self.stale_completions.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn exhaustion_count(&self) -> u64 {
        self.exhaustions.load(Ordering::Relaxed)
    }
}
