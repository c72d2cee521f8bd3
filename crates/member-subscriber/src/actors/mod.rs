//! Actor model implementation for the member subscriber.
//!
//! ```text
//! RoomActor (one per joined room)
//! ├── owns the member registry
//! └── supervises N MemberActors
//!     └── MemberActor (one per room member)
//!         ├── owns the subscription state machine
//!         └── owns the active renderer and subscriber
//! ```
//!
//! # Key Design Decisions
//!
//! - **Serial per member**: Stream-list changes and subscribe completions are
//!   delivered through the member's mailbox, never handled concurrently
//! - **CancellationToken propagation**: The room passes child tokens to its members
//! - **Mailbox monitoring**: Depth thresholds per actor type (Room: 100/500, Member: 16/48)
//! - **Message passing**: All inter-actor communication via `tokio::sync::mpsc` channels
//!
//! # Modules
//!
//! - [`room`] - `RoomActor` registry that supervises member actors
//! - [`member`] - `MemberActor` per member, runs the subscribe/retry sequence
//! - [`messages`] - Message types for actor communication
//! - [`metrics`] - Mailbox monitoring and actor metrics

pub mod member;
pub mod messages;
pub mod metrics;
pub mod room;

// Re-export primary types
pub use member::{MemberActor, MemberActorHandle, MemberSettings};
pub use messages::*;
pub use metrics::{ActorMetrics, ActorType, MailboxMonitor};
pub use room::RoomActorHandle;
