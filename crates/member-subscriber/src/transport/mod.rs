//! Media transport seam.
//!
//! The transport owns everything real-time: stream announcements, media
//! subscription and the decode/render pipelines. The member controller only
//! sees it through [`Transport`], [`Renderer`] and [`Subscriber`].
//!
//! Renderer and subscriber handles wrap native resources. They are never
//! dropped implicitly by the controller: every handle is stopped and disposed
//! through [`MediaSubscription::release`] or the individual trait methods.

pub mod scripted;

use crate::errors::TransportError;

use async_trait::async_trait;
use common::types::{MemberId, StreamId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tokio::sync::watch;

pub use scripted::{
    LedgerCounts, ResourceLedger, ScriptedOutcome, ScriptedTransport, SubscribeRequest,
};

/// Media kind requested from the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaMode {
    /// Audio-only subscription.
    Audio,
    /// Video subscription (carries audio as well when published).
    Video,
}

impl MediaMode {
    /// Returns the mode as a string for logs and metric labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            MediaMode::Audio => "audio",
            MediaMode::Video => "video",
        }
    }
}

impl fmt::Display for MediaMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "audio" => Ok(MediaMode::Audio),
            "video" => Ok(MediaMode::Video),
            other => Err(format!("unknown media mode '{other}'")),
        }
    }
}

/// One entry of a member's published stream list.
///
/// The list order supplied by the transport is the order candidates are
/// tried in.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamCandidate {
    stream_id: StreamId,
}

impl StreamCandidate {
    /// Create a candidate for a published stream.
    #[must_use]
    pub fn new(stream_id: impl Into<StreamId>) -> Self {
        Self {
            stream_id: stream_id.into(),
        }
    }

    /// The transport's stream id.
    #[must_use]
    pub fn stream_id(&self) -> &StreamId {
        &self.stream_id
    }
}

impl From<StreamId> for StreamCandidate {
    fn from(stream_id: StreamId) -> Self {
        Self { stream_id }
    }
}

/// Opaque identifier of a renderer, handed to observers instead of the
/// renderer itself (the controller keeps exclusive ownership).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RendererId(pub u64);

impl fmt::Display for RendererId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "renderer-{}", self.0)
    }
}

/// Opaque reference to a view surface a renderer draws into.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RenderSurface(String);

impl RenderSurface {
    /// Wrap a UI-supplied surface reference.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the surface reference.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Active decode/render pipeline for one subscription.
pub trait Renderer: Send + fmt::Debug {
    /// Identifier published to observers.
    fn id(&self) -> RendererId;

    /// Start rendering into a surface.
    fn start(&mut self, surface: &RenderSurface) -> Result<(), TransportError>;

    /// Stop rendering. Safe to call when not started.
    fn stop(&mut self);

    /// Release the underlying native resource.
    fn dispose(self: Box<Self>);
}

/// Transport-level subscriber for one stream.
pub trait Subscriber: Send + fmt::Debug {
    /// Stop receiving media.
    fn stop(&mut self);

    /// Release the underlying native resource.
    fn dispose(self: Box<Self>);
}

/// Result of a successful `subscribe_to_stream` call.
#[derive(Debug)]
pub struct MediaSubscription {
    /// Transport subscriber handle.
    pub subscriber: Box<dyn Subscriber>,
    /// Renderer bound to the subscription.
    pub renderer: Box<dyn Renderer>,
}

impl MediaSubscription {
    /// Stop and dispose both handles.
    pub fn release(self) {
        let MediaSubscription {
            mut subscriber,
            mut renderer,
        } = self;

        renderer.stop();
        renderer.dispose();
        subscriber.stop();
        subscriber.dispose();
    }
}

/// The media transport as seen by member controllers.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Stream-list notification source for one member.
    ///
    /// The receiver always holds the member's latest published list.
    fn watch_streams(&self, member_id: &MemberId) -> watch::Receiver<Vec<StreamCandidate>>;

    /// Subscribe to one of a member's streams.
    async fn subscribe_to_stream(
        &self,
        member_id: &MemberId,
        candidate: &StreamCandidate,
        mode: MediaMode,
    ) -> Result<MediaSubscription, TransportError>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_media_mode_parse() {
        assert_eq!("video".parse::<MediaMode>().unwrap(), MediaMode::Video);
        assert_eq!(" Audio ".parse::<MediaMode>().unwrap(), MediaMode::Audio);
        assert!("screen".parse::<MediaMode>().is_err());
    }

    #[test]
    fn test_media_mode_as_str() {
        assert_eq!(MediaMode::Audio.as_str(), "audio");
        assert_eq!(MediaMode::Video.to_string(), "video");
    }

    #[test]
    fn test_release_stops_and_disposes_both_handles() {
        let ledger = ResourceLedger::new();
        let subscription = ledger.create_subscription();
        assert_eq!(ledger.outstanding(), 2);

        subscription.release();

        let counts = ledger.counts();
        assert_eq!(counts.renderers_stopped, 1);
        assert_eq!(counts.renderers_disposed, 1);
        assert_eq!(counts.subscribers_stopped, 1);
        assert_eq!(counts.subscribers_disposed, 1);
        assert_eq!(ledger.outstanding(), 0);
    }
}
