//! Pre-configured test data fixtures.
//!
//! Provides builders for:
//! - Room members (remote and local)
//! - Published stream lists

use common::types::MemberId;
use member_subscriber::actors::MemberInfo;
use member_subscriber::transport::StreamCandidate;
use uuid::Uuid;

/// Build a candidate list in the given order.
#[must_use]
pub fn candidates(ids: &[&str]) -> Vec<StreamCandidate> {
    ids.iter().map(|id| StreamCandidate::new(*id)).collect()
}

/// Test member fixture.
#[derive(Debug, Clone)]
pub struct TestMember {
    /// Member session ID.
    pub member_id: MemberId,
    /// Display name.
    pub display_name: String,
    /// Whether this is the local participant.
    pub is_self: bool,
    /// Streams published before the member joins.
    pub streams: Vec<StreamCandidate>,
}

impl TestMember {
    /// Create a remote member with the given ID.
    #[must_use]
    pub fn remote(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            member_id: MemberId::new(id.clone()),
            display_name: id,
            is_self: false,
            streams: Vec::new(),
        }
    }

    /// Create the local participant with the given ID.
    #[must_use]
    pub fn local(id: impl Into<String>) -> Self {
        Self {
            is_self: true,
            ..Self::remote(id)
        }
    }

    /// Create a remote member with a random ID.
    #[must_use]
    pub fn random() -> Self {
        Self::remote(format!("member-{}", Uuid::new_v4()))
    }

    /// Set the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    /// Set the streams published before joining.
    #[must_use]
    pub fn with_streams(mut self, ids: &[&str]) -> Self {
        self.streams = candidates(ids);
        self
    }

    /// Member attributes as announced to the room.
    #[must_use]
    pub fn info(&self) -> MemberInfo {
        MemberInfo {
            member_id: self.member_id.clone(),
            display_name: self.display_name.clone(),
            is_self: self.is_self,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_member_fixture() {
        let member = TestMember::remote("ann")
            .with_name("Ann")
            .with_streams(&["a", "b"]);
        assert_eq!(member.member_id.as_str(), "ann");
        assert!(!member.is_self);
        assert_eq!(member.streams.len(), 2);
        assert_eq!(member.info().display_name, "Ann");
    }

    #[test]
    fn test_local_member_fixture() {
        let member = TestMember::local("me");
        assert!(member.is_self);
        assert!(member.info().is_self);
    }

    #[test]
    fn test_random_members_differ() {
        assert_ne!(TestMember::random().member_id, TestMember::random().member_id);
    }
}
