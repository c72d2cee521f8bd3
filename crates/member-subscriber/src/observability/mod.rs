//! Observability for the member subscriber.
//!
//! Metric labels are bounded to prevent cardinality explosion:
//! - `mode`: 2 values (audio, video)
//! - `outcome`: 3 values (success, failure, stale)
//! - `actor_type`: 2 values (room, member)
//!
//! Member and stream ids are never used as labels; they go in log fields.
//!
//! # Metrics
//!
//! | Metric | Type | Labels | Purpose |
//! |--------|------|--------|---------|
//! | `ms_subscribe_requests_total` | Counter | `mode` | Transport subscribe requests issued |
//! | `ms_subscribe_outcomes_total` | Counter | `outcome` | Completions by result |
//! | `ms_subscribe_duration_seconds` | Histogram | none | Retry sequence start to subscribed |
//! | `ms_candidates_exhausted_total` | Counter | none | Retry sequences with no subscribable stream |
//! | `ms_renderer_start_failures_total` | Counter | none | Renderer could not bind a surface |
//! | `ms_subscriptions_active` | Gauge | none | Members in `Subscribed` |
//! | `ms_members_active` | Gauge | none | Live member controllers |
//! | `ms_actor_panics_total` | Counter | `actor_type` | Actor tasks that panicked |

pub mod metrics;

pub use metrics::{
    init_metrics_recorder, record_actor_panic, record_candidates_exhausted,
    record_renderer_start_failure, record_subscribe_duration, record_subscribe_outcome,
    record_subscribe_request, set_members_active, set_subscriptions_active, SubscribeOutcome,
};
