//! Member Subscriber Library
//!
//! Media subscription controllers for the members of a joined real-time room.
//! For every remote member a controller:
//!
//! - Watches the member's published stream list
//! - Subscribes to one stream, trying candidates in transport order until one
//!   succeeds
//! - Tells observers when audio, video or a renderer becomes available, or
//!   when no stream could be subscribed
//! - Releases renderers and subscribers explicitly on teardown
//!
//! # Architecture
//!
//! ```text
//! RoomActor (one per joined room)
//! └── supervises N MemberActors
//!     └── MemberActor (one per member)
//!         ├── SubscriptionMachine (state + generation bookkeeping)
//!         └── Transport (subscribe requests run off the actor task)
//! ```
//!
//! # Key Design Decisions
//!
//! - **Generation tokens**: Every stream-list change and teardown bumps the
//!   member's generation; completions issued under an older one are released
//!   and dropped
//! - **Sequential retry**: At most one request per member is in flight
//! - **Self member**: The local participant is never subscribed through the
//!   transport; its capture state is forwarded to the same observers
//!
//! # Modules
//!
//! - [`actors`] - Room and member actors
//! - [`config`] - Configuration from environment
//! - [`errors`] - Error types
//! - [`observability`] - Prometheus metrics
//! - [`observer`] - Observer interface, registry and event recorder
//! - [`scenario`] - JSON scenario replay against the scripted transport
//! - [`subscription`] - Subscription state machine
//! - [`transport`] - Transport seam and the scripted transport

pub mod actors;
pub mod config;
pub mod errors;
pub mod observability;
pub mod observer;
pub mod scenario;
pub mod subscription;
pub mod transport;
