//! # MS Test Utilities
//!
//! Shared test utilities for the member subscriber.
//!
//! ## Modules
//!
//! - `fixtures` - Member and candidate-list builders
//! - `harness` - `TestRoom`, a room actor wired to a scripted transport
//! - `wait` - Bounded polling helpers for actor state
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ms_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let room = TestRoom::builder().fail("a").build();
//!     let member = room.join(TestMember::remote("ann").with_streams(&["a", "b"])).await;
//!
//!     let snapshot = wait_for_state(&member, SubscriptionState::Subscribed).await;
//!     assert_eq!(snapshot.active_stream, Some(StreamId::new("b")));
//! }
//! ```

pub mod fixtures;
pub mod harness;
pub mod wait;

// Re-export commonly used items
pub use fixtures::*;
pub use harness::*;
pub use wait::*;
