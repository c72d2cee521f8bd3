//! Member subscriber error types.
//!
//! Individual candidate failures never leave the member controller; they are
//! retried internally. What does surface here are caller contract violations
//! (e.g. subscribing while a subscription is already pending), registry
//! lookups and actor plumbing failures.

use crate::subscription::SubscriptionState;

use common::types::MemberId;
use thiserror::Error;

/// Errors returned by member controller and room operations.
#[derive(Debug, Error)]
pub enum SubscriberError {
    /// `subscribe` was called while not `NotSubscribed`.
    #[error("Subscribe requires NotSubscribed, current state is {0}")]
    InvalidState(SubscriptionState),

    /// `subscribe` was called with no published streams to try.
    #[error("No candidate streams published")]
    NoCandidates,

    /// Transport subscription requested for the local member.
    #[error("Local member media is not subscribed through the transport")]
    LocalMember,

    /// Local media state pushed to a remote member.
    #[error("Member is not the local participant")]
    NotLocalMember,

    /// Member not found in the room registry.
    #[error("Member not found: {0}")]
    MemberNotFound(MemberId),

    /// Member already registered in the room.
    #[error("Member already exists: {0}")]
    MemberExists(MemberId),

    /// Room has been left; no further member operations are accepted.
    #[error("Room closed")]
    RoomClosed,

    /// Transport layer error.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error (actor channel failures).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SubscriberError {
    /// Returns true if the error is a caller contract violation rather than
    /// a runtime condition.
    #[must_use]
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            SubscriberError::InvalidState(_)
                | SubscriberError::LocalMember
                | SubscriberError::NotLocalMember
                | SubscriberError::MemberExists(_)
        )
    }
}

/// Errors reported by the media transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The stream was announced but cannot be subscribed (yet).
    #[error("Stream not found: {0}")]
    StreamNotFound(String),

    /// The transport refused the subscription.
    #[error("Subscription rejected: {0}")]
    Rejected(String),

    /// Renderer operation failed.
    #[error("Renderer error: {0}")]
    Renderer(String),

    /// Transport is not reachable.
    #[error("Transport unavailable")]
    Unavailable,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_errors() {
        assert!(SubscriberError::InvalidState(SubscriptionState::Pending).is_usage_error());
        assert!(SubscriberError::LocalMember.is_usage_error());
        assert!(SubscriberError::NotLocalMember.is_usage_error());
        assert!(SubscriberError::MemberExists(MemberId::new("m")).is_usage_error());

        assert!(!SubscriberError::NoCandidates.is_usage_error());
        assert!(!SubscriberError::RoomClosed.is_usage_error());
        assert!(!SubscriberError::Internal("closed".to_string()).is_usage_error());
    }

    #[test]
    fn test_transport_error_conversion() {
        let err: SubscriberError = TransportError::Unavailable.into();
        assert!(matches!(
            err,
            SubscriberError::Transport(TransportError::Unavailable)
        ));
    }

    #[test]
    fn test_display_formatting() {
        assert_eq!(
            format!(
                "{}",
                SubscriberError::InvalidState(SubscriptionState::Subscribed)
            ),
            "Subscribe requires NotSubscribed, current state is subscribed"
        );
        assert_eq!(
            format!("{}", SubscriberError::MemberNotFound(MemberId::new("bob"))),
            "Member not found: bob"
        );
        assert_eq!(
            format!(
                "{}",
                SubscriberError::Transport(TransportError::StreamNotFound("s1".to_string()))
            ),
            "Transport error: Stream not found: s1"
        );
    }
}
