//! Observer interface and registry for member media state.
//!
//! The registry never decides an observer's lifetime: observers are added
//! with [`ObserverRegistry::add`] and stay until the owner removes them with
//! the returned [`ObserverId`] (or the member is disposed).

use crate::transport::RendererId;

use chrono::{DateTime, Utc};
use common::types::MemberId;
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};

/// Receives media state changes of a member.
///
/// Called from the member's actor task; implementations must not block.
pub trait MemberObserver: Send + Sync {
    /// Audio became available or unavailable.
    fn on_audio_availability_changed(&self, _member_id: &MemberId, _enabled: bool) {}

    /// Video became available or unavailable.
    fn on_video_availability_changed(&self, _member_id: &MemberId, _enabled: bool) {}

    /// A renderer was bound; attach a surface to display it.
    fn on_renderer_available(&self, _member_id: &MemberId, _renderer_id: RendererId) {}

    /// Every published stream failed to subscribe.
    fn on_media_unavailable(&self, _member_id: &MemberId) {}
}

/// Registration handle returned by [`ObserverRegistry::add`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

/// Ordered set of registered observers.
#[derive(Default)]
pub struct ObserverRegistry {
    next_id: u64,
    observers: Vec<(ObserverId, Arc<dyn MemberObserver>)>,
}

impl ObserverRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer.
    pub fn add(&mut self, observer: Arc<dyn MemberObserver>) -> ObserverId {
        self.next_id += 1;
        let id = ObserverId(self.next_id);
        self.observers.push((id, observer));
        id
    }

    /// Unregister an observer. Returns false if the id is unknown.
    pub fn remove(&mut self, id: ObserverId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(registered, _)| *registered != id);
        self.observers.len() != before
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.observers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    /// Drop every registration.
    pub fn clear(&mut self) {
        self.observers.clear();
    }

    /// Invoke `f` on every observer in registration order.
    pub fn notify(&self, f: impl Fn(&dyn MemberObserver)) {
        for (_, observer) in &self.observers {
            f(observer.as_ref());
        }
    }
}

/// A recorded observer notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MemberEvent {
    AudioAvailabilityChanged { member_id: MemberId, enabled: bool },
    VideoAvailabilityChanged { member_id: MemberId, enabled: bool },
    RendererAvailable { member_id: MemberId, renderer_id: RendererId },
    MediaUnavailable { member_id: MemberId },
}

impl MemberEvent {
    /// The member the event belongs to.
    #[must_use]
    pub fn member_id(&self) -> &MemberId {
        match self {
            MemberEvent::AudioAvailabilityChanged { member_id, .. }
            | MemberEvent::VideoAvailabilityChanged { member_id, .. }
            | MemberEvent::RendererAvailable { member_id, .. }
            | MemberEvent::MediaUnavailable { member_id } => member_id,
        }
    }
}

/// Timestamped event as kept by [`EventRecorder`].
#[derive(Debug, Clone, Serialize)]
pub struct RecordedEvent {
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub event: MemberEvent,
}

/// Observer that keeps every notification in order.
#[derive(Debug, Default)]
pub struct EventRecorder {
    events: Mutex<Vec<RecordedEvent>>,
}

impl EventRecorder {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Recorded events without timestamps.
    #[must_use]
    pub fn events(&self) -> Vec<MemberEvent> {
        self.lock().iter().map(|r| r.event.clone()).collect()
    }

    /// Recorded events for one member.
    #[must_use]
    pub fn events_for(&self, member_id: &MemberId) -> Vec<MemberEvent> {
        self.lock()
            .iter()
            .filter(|r| r.event.member_id() == member_id)
            .map(|r| r.event.clone())
            .collect()
    }

    /// Recorded events with timestamps.
    #[must_use]
    pub fn timeline(&self) -> Vec<RecordedEvent> {
        self.lock().clone()
    }

    fn push(&self, event: MemberEvent) {
        self.lock().push(RecordedEvent {
            at: Utc::now(),
            event,
        });
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<RecordedEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MemberObserver for EventRecorder {
    fn on_audio_availability_changed(&self, member_id: &MemberId, enabled: bool) {
        self.push(MemberEvent::AudioAvailabilityChanged {
            member_id: member_id.clone(),
            enabled,
        });
    }

    fn on_video_availability_changed(&self, member_id: &MemberId, enabled: bool) {
        self.push(MemberEvent::VideoAvailabilityChanged {
            member_id: member_id.clone(),
            enabled,
        });
    }

    fn on_renderer_available(&self, member_id: &MemberId, renderer_id: RendererId) {
        self.push(MemberEvent::RendererAvailable {
            member_id: member_id.clone(),
            renderer_id,
        });
    }

    fn on_media_unavailable(&self, member_id: &MemberId) {
        self.push(MemberEvent::MediaUnavailable {
            member_id: member_id.clone(),
        });
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_add_remove() {
        let mut registry = ObserverRegistry::new();
        assert!(registry.is_empty());

        let first = registry.add(EventRecorder::new());
        let second = registry.add(EventRecorder::new());
        assert_ne!(first, second);
        assert_eq!(registry.len(), 2);

        assert!(registry.remove(first));
        assert!(!registry.remove(first));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_removed_observer_not_notified() {
        let mut registry = ObserverRegistry::new();
        let kept = EventRecorder::new();
        let removed = EventRecorder::new();
        registry.add(kept.clone());
        let removed_id = registry.add(removed.clone());
        registry.remove(removed_id);

        let member = MemberId::new("m1");
        registry.notify(|o| o.on_media_unavailable(&member));

        assert_eq!(
            kept.events(),
            vec![MemberEvent::MediaUnavailable {
                member_id: member.clone()
            }]
        );
        assert!(removed.events().is_empty());
    }

    #[test]
    fn test_recorder_filters_by_member() {
        let recorder = EventRecorder::new();
        let a = MemberId::new("a");
        let b = MemberId::new("b");

        recorder.on_video_availability_changed(&a, true);
        recorder.on_renderer_available(&b, RendererId(7));
        recorder.on_audio_availability_changed(&a, false);

        assert_eq!(recorder.events().len(), 3);
        assert_eq!(
            recorder.events_for(&b),
            vec![MemberEvent::RendererAvailable {
                member_id: b.clone(),
                renderer_id: RendererId(7)
            }]
        );
    }

    #[test]
    fn test_event_serializes_with_tag() {
        let event = MemberEvent::VideoAvailabilityChanged {
            member_id: MemberId::new("m"),
            enabled: true,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "video_availability_changed");
        assert_eq!(json["member_id"], "m");
        assert_eq!(json["enabled"], true);
    }
}
