//! In-process scripted transport.
//!
//! Drives member controllers without a real media stack: each stream is
//! scripted to succeed, fail, or hold its completion until the caller
//! releases it. Every request is logged and every renderer/subscriber handle
//! is accounted for in a [`ResourceLedger`], so leaked or double-released
//! handles show up as counter mismatches.
//!
//! Used by the scenario replay binary and by the test suites.

use super::{
    MediaMode, MediaSubscription, RenderSurface, Renderer, RendererId, StreamCandidate,
    Subscriber, Transport,
};
use crate::errors::TransportError;

use async_trait::async_trait;
use common::types::{MemberId, StreamId};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{oneshot, watch, Notify};
use tracing::debug;

/// Scripted result of a subscribe request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptedOutcome {
    /// Complete successfully with fresh handles.
    Succeed,
    /// Complete with `TransportError::StreamNotFound`.
    Fail,
    /// Park the request until [`ScriptedTransport::release_held`] is called.
    Hold,
}

/// One logged `subscribe_to_stream` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscribeRequest {
    pub member_id: MemberId,
    pub stream_id: StreamId,
    pub mode: MediaMode,
}

/// Handle accounting counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LedgerCounts {
    pub renderers_created: u64,
    pub renderers_started: u64,
    pub renderers_stopped: u64,
    pub renderers_disposed: u64,
    pub subscribers_created: u64,
    pub subscribers_stopped: u64,
    pub subscribers_disposed: u64,
}

/// Tracks creation and release of every handle the transport hands out.
#[derive(Debug, Default)]
pub struct ResourceLedger {
    counts: Mutex<LedgerCounts>,
    next_renderer_id: AtomicU64,
    fail_renderer_start: Mutex<bool>,
}

impl ResourceLedger {
    /// Create a new shared ledger.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Snapshot of the counters.
    #[must_use]
    pub fn counts(&self) -> LedgerCounts {
        *self.lock_counts()
    }

    /// Handles created but not yet disposed (renderers plus subscribers).
    ///
    /// Negative when more disposals than creations were recorded.
    #[must_use]
    pub fn outstanding(&self) -> i64 {
        let counts = self.counts();
        balance(counts.renderers_created, counts.renderers_disposed)
            .saturating_add(balance(counts.subscribers_created, counts.subscribers_disposed))
    }

    /// Make subsequent `Renderer::start` calls fail.
    pub fn set_fail_renderer_start(&self, fail: bool) {
        *self
            .fail_renderer_start
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = fail;
    }

    /// Mint a subscriber/renderer pair accounted in this ledger.
    #[must_use]
    pub fn create_subscription(self: &Arc<Self>) -> MediaSubscription {
        let id = RendererId(self.next_renderer_id.fetch_add(1, Ordering::Relaxed) + 1);
        self.record(|c| {
            c.renderers_created += 1;
            c.subscribers_created += 1;
        });

        MediaSubscription {
            subscriber: Box::new(ScriptedSubscriber {
                ledger: Arc::clone(self),
            }),
            renderer: Box::new(ScriptedRenderer {
                id,
                ledger: Arc::clone(self),
                surface: None,
            }),
        }
    }

    fn should_fail_start(&self) -> bool {
        *self
            .fail_renderer_start
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, update: impl FnOnce(&mut LedgerCounts)) {
        update(&mut self.lock_counts());
    }

    fn lock_counts(&self) -> MutexGuard<'_, LedgerCounts> {
        self.counts.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn balance(created: u64, disposed: u64) -> i64 {
    if created >= disposed {
        i64::try_from(created - disposed).unwrap_or(i64::MAX)
    } else {
        i64::try_from(disposed - created).map_or(i64::MIN, |over| -over)
    }
}

#[derive(Debug)]
struct ScriptedRenderer {
    id: RendererId,
    ledger: Arc<ResourceLedger>,
    surface: Option<RenderSurface>,
}

impl Renderer for ScriptedRenderer {
    fn id(&self) -> RendererId {
        self.id
    }

    fn start(&mut self, surface: &RenderSurface) -> Result<(), TransportError> {
        if self.ledger.should_fail_start() {
            return Err(TransportError::Renderer(format!(
                "{} cannot render into {}",
                self.id,
                surface.as_str()
            )));
        }
        self.surface = Some(surface.clone());
        self.ledger.record(|c| c.renderers_started += 1);
        Ok(())
    }

    fn stop(&mut self) {
        self.surface = None;
        self.ledger.record(|c| c.renderers_stopped += 1);
    }

    fn dispose(self: Box<Self>) {
        self.ledger.record(|c| c.renderers_disposed += 1);
    }
}

#[derive(Debug)]
struct ScriptedSubscriber {
    ledger: Arc<ResourceLedger>,
}

impl Subscriber for ScriptedSubscriber {
    fn stop(&mut self) {
        self.ledger.record(|c| c.subscribers_stopped += 1);
    }

    fn dispose(self: Box<Self>) {
        self.ledger.record(|c| c.subscribers_disposed += 1);
    }
}

#[derive(Debug)]
struct TransportState {
    streams: HashMap<MemberId, watch::Sender<Vec<StreamCandidate>>>,
    outcomes: HashMap<StreamId, ScriptedOutcome>,
    mode_outcomes: HashMap<(StreamId, MediaMode), ScriptedOutcome>,
    default_outcome: ScriptedOutcome,
    requests: Vec<SubscribeRequest>,
    held: HashMap<StreamId, VecDeque<oneshot::Sender<bool>>>,
    in_flight: usize,
    max_in_flight: usize,
}

impl TransportState {
    fn outcome_for(&self, stream_id: &StreamId, mode: MediaMode) -> ScriptedOutcome {
        self.mode_outcomes
            .get(&(stream_id.clone(), mode))
            .or_else(|| self.outcomes.get(stream_id))
            .copied()
            .unwrap_or(self.default_outcome)
    }
}

/// Scripted implementation of [`Transport`].
///
/// Cloning shares the script, request log and ledger.
#[derive(Debug, Clone)]
pub struct ScriptedTransport {
    state: Arc<Mutex<TransportState>>,
    ledger: Arc<ResourceLedger>,
    held_changed: Arc<Notify>,
}

impl Default for ScriptedTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedTransport {
    /// Create a transport where unscripted streams succeed.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(TransportState {
                streams: HashMap::new(),
                outcomes: HashMap::new(),
                mode_outcomes: HashMap::new(),
                default_outcome: ScriptedOutcome::Succeed,
                requests: Vec::new(),
                held: HashMap::new(),
                in_flight: 0,
                max_in_flight: 0,
            })),
            ledger: ResourceLedger::new(),
            held_changed: Arc::new(Notify::new()),
        }
    }

    /// Outcome for streams without an explicit script.
    #[must_use]
    pub fn with_default_outcome(self, outcome: ScriptedOutcome) -> Self {
        self.lock_state().default_outcome = outcome;
        self
    }

    /// Script the outcome of every request for a stream.
    pub fn script(&self, stream_id: impl Into<StreamId>, outcome: ScriptedOutcome) {
        self.lock_state().outcomes.insert(stream_id.into(), outcome);
    }

    /// Script the outcome of requests for a stream at one mode only.
    pub fn script_mode(
        &self,
        stream_id: impl Into<StreamId>,
        mode: MediaMode,
        outcome: ScriptedOutcome,
    ) {
        self.lock_state()
            .mode_outcomes
            .insert((stream_id.into(), mode), outcome);
    }

    /// Replace a member's published stream list and notify watchers.
    pub fn publish_streams(&self, member_id: &MemberId, streams: Vec<StreamCandidate>) {
        let mut state = self.lock_state();
        debug!(
            target: "ms.transport.scripted",
            member_id = %member_id,
            stream_count = streams.len(),
            "Publishing stream list"
        );
        state
            .streams
            .entry(member_id.clone())
            .or_insert_with(|| watch::channel(Vec::new()).0)
            .send_replace(streams);
    }

    /// All subscribe requests issued so far, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<SubscribeRequest> {
        self.lock_state().requests.clone()
    }

    /// Subscribe requests issued for one member, in order.
    #[must_use]
    pub fn requests_for(&self, member_id: &MemberId) -> Vec<SubscribeRequest> {
        self.lock_state()
            .requests
            .iter()
            .filter(|r| &r.member_id == member_id)
            .cloned()
            .collect()
    }

    /// Requests currently awaiting completion.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.lock_state().in_flight
    }

    /// Highest number of simultaneously pending requests observed.
    #[must_use]
    pub fn max_in_flight(&self) -> usize {
        self.lock_state().max_in_flight
    }

    /// Number of held requests for a stream.
    #[must_use]
    pub fn held_count(&self, stream_id: &StreamId) -> usize {
        self.lock_state().held.get(stream_id).map_or(0, VecDeque::len)
    }

    /// Number of held requests across all streams.
    #[must_use]
    pub fn held_total(&self) -> usize {
        self.lock_state().held.values().map(VecDeque::len).sum()
    }

    /// Complete every held request with the same result.
    ///
    /// Returns how many requests were released.
    pub fn release_all_held(&self, succeed: bool) -> usize {
        let senders: Vec<oneshot::Sender<bool>> = self
            .lock_state()
            .held
            .drain()
            .flat_map(|(_, queue)| queue)
            .collect();

        let released = senders.len();
        for sender in senders {
            let _ = sender.send(succeed);
        }
        if released > 0 {
            debug!(
                target: "ms.transport.scripted",
                released,
                succeed,
                "Releasing all held requests"
            );
        }
        released
    }

    /// Wait until at least one request for the stream is held.
    pub async fn wait_for_held(&self, stream_id: &StreamId) {
        loop {
            let notified = self.held_changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.held_count(stream_id) > 0 {
                return;
            }
            notified.await;
        }
    }

    /// Complete the oldest held request for a stream.
    ///
    /// Returns false if nothing was held.
    pub fn release_held(&self, stream_id: &StreamId, succeed: bool) -> bool {
        let sender = self
            .lock_state()
            .held
            .get_mut(stream_id)
            .and_then(VecDeque::pop_front);

        match sender {
            Some(sender) => {
                debug!(
                    target: "ms.transport.scripted",
                    stream_id = %stream_id,
                    succeed = succeed,
                    "Releasing held request"
                );
                let _ = sender.send(succeed);
                true
            }
            None => false,
        }
    }

    /// Shared handle ledger.
    #[must_use]
    pub fn ledger(&self) -> Arc<ResourceLedger> {
        Arc::clone(&self.ledger)
    }

    fn lock_state(&self) -> MutexGuard<'_, TransportState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    fn watch_streams(&self, member_id: &MemberId) -> watch::Receiver<Vec<StreamCandidate>> {
        let mut state = self.lock_state();
        state
            .streams
            .entry(member_id.clone())
            .or_insert_with(|| watch::channel(Vec::new()).0)
            .subscribe()
    }

    async fn subscribe_to_stream(
        &self,
        member_id: &MemberId,
        candidate: &StreamCandidate,
        mode: MediaMode,
    ) -> Result<MediaSubscription, TransportError> {
        let stream_id = candidate.stream_id().clone();

        let (outcome, held) = {
            let mut state = self.lock_state();
            state.requests.push(SubscribeRequest {
                member_id: member_id.clone(),
                stream_id: stream_id.clone(),
                mode,
            });
            state.in_flight += 1;
            state.max_in_flight = state.max_in_flight.max(state.in_flight);

            let outcome = state.outcome_for(&stream_id, mode);
            let held = if outcome == ScriptedOutcome::Hold {
                let (tx, rx) = oneshot::channel();
                state.held.entry(stream_id.clone()).or_default().push_back(tx);
                Some(rx)
            } else {
                None
            };
            (outcome, held)
        };

        debug!(
            target: "ms.transport.scripted",
            member_id = %member_id,
            stream_id = %stream_id,
            mode = %mode,
            outcome = ?outcome,
            "Subscribe request"
        );

        let succeed = match held {
            Some(rx) => {
                self.held_changed.notify_waiters();
                rx.await.unwrap_or(false)
            }
            None => outcome == ScriptedOutcome::Succeed,
        };

        self.lock_state().in_flight -= 1;

        if succeed {
            Ok(self.ledger.create_subscription())
        } else {
            Err(TransportError::StreamNotFound(stream_id.to_string()))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn member() -> MemberId {
        MemberId::new("member-1")
    }

    #[tokio::test]
    async fn test_scripted_outcomes() {
        let transport = ScriptedTransport::new();
        transport.script("bad", ScriptedOutcome::Fail);

        let ok = transport
            .subscribe_to_stream(&member(), &StreamCandidate::new("good"), MediaMode::Video)
            .await;
        assert!(ok.is_ok());
        ok.unwrap().release();

        let err = transport
            .subscribe_to_stream(&member(), &StreamCandidate::new("bad"), MediaMode::Video)
            .await;
        assert_eq!(
            err.unwrap_err(),
            TransportError::StreamNotFound("bad".to_string())
        );

        assert_eq!(transport.requests().len(), 2);
        assert_eq!(transport.ledger().outstanding(), 0);
    }

    #[tokio::test]
    async fn test_mode_script_overrides_stream_script() {
        let transport = ScriptedTransport::new();
        transport.script("s1", ScriptedOutcome::Fail);
        transport.script_mode("s1", MediaMode::Audio, ScriptedOutcome::Succeed);

        let video = transport
            .subscribe_to_stream(&member(), &StreamCandidate::new("s1"), MediaMode::Video)
            .await;
        assert!(video.is_err());

        let audio = transport
            .subscribe_to_stream(&member(), &StreamCandidate::new("s1"), MediaMode::Audio)
            .await;
        audio.unwrap().release();
    }

    #[tokio::test]
    async fn test_default_outcome() {
        let transport = ScriptedTransport::new().with_default_outcome(ScriptedOutcome::Fail);
        let result = transport
            .subscribe_to_stream(&member(), &StreamCandidate::new("any"), MediaMode::Audio)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_held_request_completes_on_release() {
        let transport = ScriptedTransport::new();
        transport.script("slow", ScriptedOutcome::Hold);
        let stream = StreamId::new("slow");

        let task = {
            let transport = transport.clone();
            tokio::spawn(async move {
                transport
                    .subscribe_to_stream(&member(), &StreamCandidate::new("slow"), MediaMode::Video)
                    .await
            })
        };

        tokio::time::timeout(Duration::from_secs(1), transport.wait_for_held(&stream))
            .await
            .expect("request should be held");
        assert_eq!(transport.in_flight(), 1);

        assert!(transport.release_held(&stream, true));
        let result = task.await.unwrap();
        result.unwrap().release();

        assert_eq!(transport.in_flight(), 0);
        assert_eq!(transport.max_in_flight(), 1);
        assert!(!transport.release_held(&stream, true));
    }

    #[tokio::test]
    async fn test_watch_streams_sees_published_lists() {
        let transport = ScriptedTransport::new();
        let mut rx = transport.watch_streams(&member());
        assert!(rx.borrow().is_empty());

        transport.publish_streams(&member(), vec![StreamCandidate::new("a")]);
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().len(), 1);

        // Lists published before anyone watches are kept.
        let other = MemberId::new("member-2");
        transport.publish_streams(&other, vec![StreamCandidate::new("b")]);
        let rx2 = transport.watch_streams(&other);
        assert_eq!(rx2.borrow().len(), 1);
    }

    #[test]
    fn test_renderer_start_failure() {
        let ledger = ResourceLedger::new();
        let mut subscription = ledger.create_subscription();
        ledger.set_fail_renderer_start(true);

        let result = subscription.renderer.start(&RenderSurface::new("view-1"));
        assert!(matches!(result, Err(TransportError::Renderer(_))));
        assert_eq!(ledger.counts().renderers_started, 0);

        subscription.release();
        assert_eq!(ledger.outstanding(), 0);
    }

    #[test]
    fn test_ledger_reports_over_release_as_negative() {
        let ledger = ResourceLedger::new();
        ledger.create_subscription().release();
        assert_eq!(ledger.outstanding(), 0);

        ledger.record(|c| {
            c.renderers_disposed += 1;
            c.subscribers_disposed += 1;
        });
        assert_eq!(ledger.outstanding(), -2);
    }

    #[tokio::test]
    async fn test_release_all_held() {
        let transport = ScriptedTransport::new().with_default_outcome(ScriptedOutcome::Hold);

        let mut tasks = Vec::new();
        for id in ["a", "b", "b"] {
            let transport = transport.clone();
            tasks.push(tokio::spawn(async move {
                transport
                    .subscribe_to_stream(&member(), &StreamCandidate::new(id), MediaMode::Video)
                    .await
            }));
        }

        tokio::time::timeout(Duration::from_secs(1), async {
            while transport.held_total() < 3 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("requests should be held");

        assert_eq!(transport.release_all_held(false), 3);
        for task in tasks {
            assert!(task.await.unwrap().is_err());
        }
        assert_eq!(transport.held_total(), 0);
        assert_eq!(transport.in_flight(), 0);
        assert_eq!(transport.release_all_held(false), 0);
    }
}
